//! JSON bodies returned by the upload route.

use crate::error::ImageForgeError;
use crate::image::GeneratedImage;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Success body of `POST /api/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Always true on success.
    pub ok: bool,
    /// Size of the generated image in bytes.
    pub size: usize,
    /// Generated image, base64 encoded.
    #[serde(default)]
    pub image_base64: String,
    /// MIME type of the generated image.
    #[serde(default)]
    pub mime_type: String,
}

impl From<&GeneratedImage> for UploadResponse {
    fn from(image: &GeneratedImage) -> Self {
        Self {
            ok: true,
            size: image.size(),
            image_base64: image.to_base64(),
            mime_type: image.format.mime_type().to_string(),
        }
    }
}

/// Failure body of every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message, shown to the user verbatim.
    pub error: String,
}

impl ImageForgeError {
    /// Message shown to upload clients.
    ///
    /// Internal faults are not described in detail.
    pub fn client_message(&self) -> String {
        match self {
            Self::ContentBlocked(msg) | Self::NoImage(msg) => msg.clone(),
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Auth(_) => "The server is not configured with a valid API key".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ImageForgeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "upload failed: {self}");
        } else {
            tracing::warn!(status = status.as_u16(), "upload rejected: {self}");
        }

        let retry_after = match &self {
            Self::RateLimited {
                retry_after: Some(delay),
            } => HeaderValue::from_str(&delay.as_secs().to_string()).ok(),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.client_message(),
            }),
        )
            .into_response();

        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{GenerationMetadata, ImageFormat, ImageProviderKind};
    use std::time::Duration;

    #[test]
    fn test_upload_response_wire_names() {
        let image = GeneratedImage::new(
            b"hello".to_vec(),
            ImageFormat::Jpeg,
            ImageProviderKind::Gemini,
            GenerationMetadata::default(),
        );
        let json = serde_json::to_value(UploadResponse::from(&image)).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["size"], 5);
        assert_eq!(json["imageBase64"], "aGVsbG8=");
        assert_eq!(json["mimeType"], "image/jpeg");
    }

    #[test]
    fn test_error_into_response_status() {
        let response = ImageForgeError::MissingInput.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ImageForgeError::NoImage("nothing".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ImageForgeError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[tokio::test]
    async fn test_rate_limit_body_is_readable() {
        let response = ImageForgeError::RateLimited { retry_after: None }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "the image service is rate limited, try again later");
        assert!(!body.error.contains("None"));
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let io = ImageForgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk /secret"));
        assert_eq!(io.client_message(), "Internal server error");
        let internal = ImageForgeError::Internal("transcode task panicked".into());
        assert_eq!(internal.client_message(), "Internal server error");
        assert_eq!(
            ImageForgeError::ContentBlocked("Prompt blocked: SAFETY".into()).client_message(),
            "Prompt blocked: SAFETY"
        );
    }
}
