//! Submitting a selection and prompt to the upload endpoint.

use crate::client::selection::SelectionSet;
use crate::error::{ImageForgeError, Result};
use crate::image::encode::{decode_base64_lenient, to_data_url};
use crate::image::ImageFormat;
use crate::server::response::{ErrorResponse, UploadResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default endpoint of a locally running server.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/api/upload";

/// A generated image decoded for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayImage {
    /// Decoded image bytes.
    pub data: Vec<u8>,
    /// MIME type declared by the server.
    pub mime_type: String,
    /// `data:` URL ready to be rendered.
    pub url: String,
}

impl DisplayImage {
    /// Returns the image format implied by the MIME type.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.mime_type)
    }

    /// Returns the size of the image in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

/// Builder for UploadClient.
#[derive(Debug, Clone, Default)]
pub struct UploadClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl UploadClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upload endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets a timeout for the whole request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<UploadClient> {
        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        Ok(UploadClient {
            http: http.build()?,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            busy: AtomicBool::new(false),
        })
    }
}

/// Client for `POST /api/upload` that allows one request at a time.
#[derive(Debug)]
pub struct UploadClient {
    http: reqwest::Client,
    endpoint: String,
    busy: AtomicBool,
}

/// Clears the busy flag when a submission ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl UploadClient {
    /// Creates a new `UploadClientBuilder`.
    pub fn builder() -> UploadClientBuilder {
        UploadClientBuilder::new()
    }

    /// Returns the endpoint this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns true while a submission is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Sends the prompt and selected images, returning the generated image.
    ///
    /// Fails with [`ImageForgeError::MissingInput`] before touching the network when
    /// both the prompt and the selection are empty, and with
    /// [`ImageForgeError::Busy`] if another submission has not finished yet. Server
    /// errors are surfaced verbatim as [`ImageForgeError::Server`].
    pub async fn submit(&self, prompt: &str, selection: &SelectionSet) -> Result<DisplayImage> {
        let prompt = prompt.trim();
        if prompt.is_empty() && selection.is_empty() {
            return Err(ImageForgeError::MissingInput);
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ImageForgeError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let mut form = reqwest::multipart::Form::new().text("prompt", prompt.to_string());
        for file in selection.files() {
            let part = reqwest::multipart::Part::bytes(file.data.clone())
                .file_name(file.name.clone())
                .mime_str(file.effective_mime_type())
                .map_err(|e| ImageForgeError::InvalidRequest(e.to_string()))?;
            form = form.part("files", part);
        }

        tracing::info!(
            endpoint = %self.endpoint,
            images = selection.len(),
            bytes = selection.total_bytes(),
            "submitting generation request"
        );

        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| {
                    if body.trim().is_empty() {
                        format!("Request failed with status {}", status.as_u16())
                    } else {
                        body.clone()
                    }
                });
            return Err(ImageForgeError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let payload: UploadResponse = serde_json::from_str(&body)?;
        decode_payload(payload)
    }
}

/// Turns a success payload into a displayable image.
fn decode_payload(payload: UploadResponse) -> Result<DisplayImage> {
    if payload.image_base64.is_empty() {
        return Err(ImageForgeError::NoImage("The server response contained no image.".into()));
    }
    let data = decode_base64_lenient(&payload.image_base64)?;
    let mime_type = if payload.mime_type.is_empty() {
        ImageFormat::from_magic_bytes(&data)
            .unwrap_or_default()
            .mime_type()
            .to_string()
    } else {
        payload.mime_type
    };
    let url = to_data_url(&mime_type, &data);
    Ok(DisplayImage {
        data,
        mime_type,
        url,
    })
}
