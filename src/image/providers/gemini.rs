//! Gemini (Google) image generation provider.

use crate::error::{parse_retry_after, sanitize_error_message, ImageForgeError, Result};
use crate::image::encode::{decode_base64_lenient, encode_base64};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProviderKind,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the output was withheld by a safety filter.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_PROHIBITED_CONTENT",
    "BLOCKLIST",
    "RECITATION",
    "IMAGE_RECITATION",
    "SPII",
];

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "gemini-3-pro-image-preview",
        }
    }
}

impl std::str::FromStr for GeminiModel {
    type Err = ImageForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nano-banana" | "gemini-2.5-flash-image" => Ok(Self::NanoBanana),
            "nano-banana-pro" | "gemini-3-pro-image-preview" => Ok(Self::NanoBananaPro),
            other => Err(ImageForgeError::InvalidRequest(format!("unknown Gemini model: {other}"))),
        }
    }
}

/// Builder for GeminiProvider.
#[derive(Debug, Clone, Default)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API base URL. Falls back to `GEMINI_API_BASE`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets a timeout for the outbound generation call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .ok_or_else(|| {
                ImageForgeError::Auth("GEMINI_API_KEY or GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        let base_url = self
            .base_url
            .or_else(|| non_empty_env("GEMINI_API_BASE"))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }

        Ok(GeminiProvider {
            client: client.build()?,
            api_key,
            model: self.model,
            base_url,
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Gemini image generation provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    base_url: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    async fn generate_impl(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let start = Instant::now();

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            self.model.as_str(),
        );

        let body = GeminiRequest::from_generation_request(request);

        tracing::debug!(
            model = self.model.as_str(),
            images = request.images.len(),
            "sending Gemini generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let output = gemini_response.into_image()?;

        let data = decode_base64_lenient(&output.inline_data.data)?;
        let format = ImageFormat::from_mime_type(&output.inline_data.mime_type)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .unwrap_or_default();

        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(GeneratedImage::new(
            data,
            format,
            ImageProviderKind::Gemini,
            GenerationMetadata {
                model: Some(self.model.as_str().to_string()),
                duration_ms: Some(duration_ms),
                text: output.text,
            },
        ))
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> ImageForgeError {
        let text = sanitize_error_message(text);
        if status == 402 {
            return ImageForgeError::Billing(
                "Gemini billing issue: enable billing at https://aistudio.google.com".into(),
            );
        }
        if status == 404 {
            return ImageForgeError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            );
        }
        if status == 429 {
            let retry_after = parse_retry_after(headers).map(Duration::from_secs);
            return ImageForgeError::RateLimited { retry_after };
        }
        if status == 401 || status == 403 {
            return ImageForgeError::Auth(text);
        }
        let lower = text.to_lowercase();
        if lower.contains("safety")
            || lower.contains("blocked")
            || lower.contains("content_policy")
            || lower.contains("prohibited")
        {
            return ImageForgeError::ContentBlocked(text);
        }
        if status == 400 {
            return ImageForgeError::InvalidRequest(text);
        }
        ImageForgeError::Api {
            status,
            message: text,
        }
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        self.generate_impl(request).await
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Gemini
    }

    fn model(&self) -> &str {
        self.model.as_str()
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(ImageForgeError::Auth("Invalid API key".into())),
            404 => Err(ImageForgeError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            s if !(200..300).contains(&s) => Err(ImageForgeError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl GeminiRequest {
    fn from_generation_request(req: &GenerationRequest) -> Self {
        // Images first, in selection order, then the instruction.
        let mut parts: Vec<GeminiRequestPart> = req
            .images
            .iter()
            .map(|image| GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.format.mime_type().to_string(),
                    data: encode_base64(&image.data),
                },
            })
            .collect();

        parts.push(GeminiRequestPart::Text {
            text: req.prompt.clone(),
        });

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
                seed: req.seed,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    finish_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: String,
    data: String,
}

/// The image part of a successful response plus any accompanying text.
#[derive(Debug)]
struct ImageOutput {
    inline_data: InlineData,
    text: Option<String>,
}

impl GeminiResponse {
    /// Extracts the generated image, classifying every way it can be absent.
    fn into_image(self) -> Result<ImageOutput> {
        // Prompt blocks come back as HTTP 200 with no candidates.
        let block_reason = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone());
        if let Some(ref reason) = block_reason {
            let msg = self
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason_message.clone())
                .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
            tracing::warn!(reason = %reason, "Gemini blocked the prompt");
            return Err(ImageForgeError::ContentBlocked(msg));
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            ImageForgeError::NoImage("The model returned no candidates.".into())
        })?;

        if let Some(ref finish_reason) = candidate.finish_reason {
            if BLOCKING_FINISH_REASONS.contains(&finish_reason.as_str()) {
                tracing::warn!(reason = %finish_reason, "Gemini withheld the output");
                let mut msg = format!(
                    "Content blocked by Gemini safety filter: {}",
                    finish_reason
                );
                if let Some(ref detail) = candidate.finish_message {
                    msg.push_str(&format!(" ({detail})"));
                }
                return Err(ImageForgeError::ContentBlocked(msg));
            }
        }

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        let text = {
            let joined: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            (!joined.is_empty()).then(|| joined.join(" "))
        };

        match parts.into_iter().find_map(|p| p.inline_data) {
            Some(inline_data) => Ok(ImageOutput { inline_data, text }),
            None => Err(ImageForgeError::NoImage(describe_missing_image(
                candidate.finish_reason.as_deref(),
                candidate.finish_message.as_deref(),
                text.as_deref(),
            ))),
        }
    }
}

/// Combines whatever reason fields are present into one message.
fn describe_missing_image(
    finish_reason: Option<&str>,
    finish_message: Option<&str>,
    text: Option<&str>,
) -> String {
    let mut reasons = Vec::new();
    if let Some(reason) = finish_reason {
        reasons.push(format!("finish reason: {reason}"));
    }
    if let Some(message) = finish_message {
        reasons.push(format!("details: {message}"));
    }
    if let Some(text) = text {
        reasons.push(format!("model response: {text}"));
    }

    if reasons.is_empty() {
        "The model returned no image. Try a different prompt.".to_string()
    } else {
        format!("The model returned no image ({}).", reasons.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::types::InputImage;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_gemini_model_as_str() {
        assert_eq!(GeminiModel::NanoBanana.as_str(), "gemini-2.5-flash-image");
        assert_eq!(
            GeminiModel::NanoBananaPro.as_str(),
            "gemini-3-pro-image-preview"
        );
        assert_eq!(GeminiModel::default(), GeminiModel::NanoBanana);
    }

    #[test]
    fn test_gemini_model_from_str() {
        assert_eq!(
            "nano-banana-pro".parse::<GeminiModel>().unwrap(),
            GeminiModel::NanoBananaPro
        );
        assert!("dall-e".parse::<GeminiModel>().is_err());
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let provider = GeminiProviderBuilder::new()
            .api_key("test-key")
            .base_url("http://localhost:9/v1beta/")
            .model(GeminiModel::NanoBanana)
            .build()
            .unwrap();
        assert_eq!(provider.base_url, "http://localhost:9/v1beta");
        assert_eq!(provider.model(), "gemini-2.5-flash-image");
    }

    #[test]
    fn test_request_construction_text_only() {
        let req = GenerationRequest::new("A puppy");
        let gemini_req = GeminiRequest::from_generation_request(&req);

        assert_eq!(gemini_req.contents.len(), 1);
        assert_eq!(gemini_req.contents[0].parts.len(), 1);
        assert!(gemini_req.generation_config.seed.is_none());
    }

    #[test]
    fn test_request_construction_with_images_in_order() {
        let png = InputImage::from_bytes(PNG_MAGIC.to_vec()).unwrap();
        let req = GenerationRequest::new("Merge")
            .with_images([png.clone(), png])
            .with_seed(7);
        let json = serde_json::to_value(GeminiRequest::from_generation_request(&req)).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inline_data"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], "iVBORw0KGgoAAAAA");
        assert_eq!(parts[2]["text"], "Merge");
        assert_eq!(json["generationConfig"]["seed"], 7);
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_successful_response_yields_image_and_text() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here you go"},
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#,
        );
        let output = resp.into_image().unwrap();
        assert_eq!(output.inline_data.mime_type, "image/png");
        assert_eq!(output.text.as_deref(), Some("Here you go"));
    }

    #[test]
    fn test_prompt_feedback_block() {
        let resp = parse(
            r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked due to safety"
            }
        }"#,
        );
        match resp.into_image().unwrap_err() {
            ImageForgeError::ContentBlocked(msg) => assert_eq!(msg, "Prompt was blocked due to safety"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_prompt_feedback_block_without_message() {
        let resp = parse(r#"{"promptFeedback": {"blockReason": "OTHER"}}"#);
        match resp.into_image().unwrap_err() {
            ImageForgeError::ContentBlocked(msg) => assert_eq!(msg, "Prompt blocked: OTHER"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_safety_finish_reason() {
        let resp = parse(r#"{"candidates": [{"finishReason": "IMAGE_SAFETY"}]}"#);
        let err = resp.into_image().unwrap_err();
        assert!(matches!(err, ImageForgeError::ContentBlocked(ref m) if m.contains("IMAGE_SAFETY")));
    }

    #[test]
    fn test_missing_image_combines_reasons() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {"parts": [{"text": "I can only describe this image."}]},
                "finishReason": "STOP",
                "finishMessage": "completed"
            }]
        }"#,
        );
        match resp.into_image().unwrap_err() {
            ImageForgeError::NoImage(msg) => {
                assert!(msg.contains("finish reason: STOP"));
                assert!(msg.contains("details: completed"));
                assert!(msg.contains("model response: I can only describe this image."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_terminated_generation_without_parts() {
        let resp = parse(r#"{"candidates": [{"finishReason": "IMAGE_OTHER"}]}"#);
        match resp.into_image().unwrap_err() {
            ImageForgeError::NoImage(msg) => {
                assert_eq!(msg, "The model returned no image (finish reason: IMAGE_OTHER).")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_image_without_any_reason() {
        let resp = parse(r#"{"candidates": [{"content": {"parts": [{}]}}]}"#);
        match resp.into_image().unwrap_err() {
            ImageForgeError::NoImage(msg) => assert!(msg.contains("Try a different prompt")),
            other => panic!("unexpected error: {other:?}"),
        }

        let resp = parse(r#"{"candidates": []}"#);
        assert!(matches!(resp.into_image().unwrap_err(), ImageForgeError::NoImage(_)));
    }

    #[test]
    fn test_parse_error_mapping() {
        let provider = GeminiProvider::builder().api_key("k").build().unwrap();
        let headers = reqwest::header::HeaderMap::new();

        assert!(matches!(
            provider.parse_error(429, "slow down", &headers),
            ImageForgeError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            provider.parse_error(403, "denied", &headers),
            ImageForgeError::Auth(_)
        ));
        assert!(matches!(
            provider.parse_error(400, "request blocked by safety", &headers),
            ImageForgeError::ContentBlocked(_)
        ));
        assert!(matches!(
            provider.parse_error(400, "bad field", &headers),
            ImageForgeError::InvalidRequest(_)
        ));
        assert!(matches!(
            provider.parse_error(500, "boom", &headers),
            ImageForgeError::Api { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_generate_against_local_server() {
        use axum::http::{HeaderMap, Uri};
        use axum::Json;
        use serde_json::{json, Value};

        async fn fake_gemini(uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
            assert_eq!(uri.path(), "/v1beta/models/gemini-2.5-flash-image:generateContent");
            assert_eq!(headers["x-goog-api-key"], "test-key");
            assert_eq!(body["contents"][0]["parts"][1]["text"], "Edit");
            Json(json!({
                "candidates": [{
                    "content": {"parts": [
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgoAAAAA"}}
                    ]},
                    "finishReason": "STOP"
                }]
            }))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, axum::Router::new().fallback(fake_gemini))
                .await
                .unwrap();
        });

        let provider = GeminiProvider::builder()
            .api_key("test-key")
            .base_url(format!("http://{addr}/v1beta"))
            .build()
            .unwrap();
        let request = GenerationRequest::new("Edit")
            .with_image(InputImage::from_bytes(PNG_MAGIC.to_vec()).unwrap());

        let image = provider.generate(&request).await.unwrap();
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(image.data, PNG_MAGIC.to_vec());
        assert_eq!(image.metadata.model.as_deref(), Some("gemini-2.5-flash-image"));
    }
}
