//! `POST /api/upload`: multipart prompt + images in, generated image out.

use crate::error::{ImageForgeError, Result};
use crate::image::encode::prepare_input;
use crate::image::{GenerationRequest, InputImage};
use crate::server::response::UploadResponse;
use crate::server::AppState;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use std::time::Instant;

/// Parsed multipart payload before defaults are applied.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub(crate) prompt: String,
    pub(crate) images: Vec<InputImage>,
    pub(crate) total_bytes: u64,
}

/// Handles an upload: parse, validate, generate, respond.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let start = Instant::now();
    let form = read_form(multipart, state.body_limit).await?;

    let limits = state.limits;
    if form.images.len() > limits.max_files {
        return Err(ImageForgeError::InvalidRequest(format!(
            "too many images: {} (maximum is {})",
            form.images.len(),
            limits.max_files
        )));
    }
    if form.total_bytes > limits.max_total_bytes {
        return Err(ImageForgeError::SelectionTooLarge {
            total: form.total_bytes,
            limit: limits.max_total_bytes,
        });
    }

    let request = GenerationRequest::new(form.prompt)
        .with_images(form.images)
        .resolve_prompt()?;

    tracing::info!(
        images = request.images.len(),
        prompt_len = request.prompt.len(),
        model = state.provider.model(),
        "generating image"
    );

    let image = state.provider.generate(&request).await?;

    tracing::info!(
        size = image.size(),
        format = image.format.extension(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "image generated"
    );

    Ok(Json(UploadResponse::from(&image)))
}

/// Collects the `prompt` text and every `file`/`files` part.
async fn read_form(mut multipart: Multipart, body_limit: usize) -> Result<UploadForm> {
    let mut form = UploadForm::default();
    let map_err = |e: MultipartError| multipart_error(e, body_limit);

    while let Some(field) = multipart.next_field().await.map_err(map_err)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => {
                form.prompt = field.text().await.map_err(map_err)?;
            }
            "file" | "files" => {
                let file_name = field.file_name().unwrap_or("unnamed").to_string();
                let data = field.bytes().await.map_err(map_err)?;
                // Browsers send an empty part for an untouched file input.
                if data.is_empty() {
                    continue;
                }
                form.total_bytes += data.len() as u64;
                let image = prepare_input(data.to_vec()).await.map_err(|e| match e {
                    ImageForgeError::InvalidRequest(msg) => {
                        ImageForgeError::InvalidRequest(format!("{file_name}: {msg}"))
                    }
                    other => other,
                })?;
                form.images.push(image);
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    Ok(form)
}

fn multipart_error(err: MultipartError, body_limit: usize) -> ImageForgeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ImageForgeError::BodyTooLarge { limit: body_limit }
    } else {
        ImageForgeError::InvalidRequest(err.body_text())
    }
}
