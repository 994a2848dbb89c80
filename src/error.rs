//! Error types for image selection, upload and generation.

use std::time::Duration;

/// Longest upstream error message passed through to callers.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while selecting, uploading or generating images.
#[derive(Debug, thiserror::Error)]
pub enum ImageForgeError {
    /// Neither a prompt nor any image was supplied.
    #[error("please enter a prompt or select at least one image")]
    MissingInput,

    /// The selected files exceed the total byte budget.
    #[error("selected images total {total} bytes, limit is {limit} bytes")]
    SelectionTooLarge {
        /// Combined size of the rejected selection.
        total: u64,
        /// Configured byte budget.
        limit: u64,
    },

    /// The request body exceeded the server's limit.
    #[error("request body exceeds the {limit} byte limit")]
    BodyTooLarge {
        /// Configured body limit.
        limit: usize,
    },

    /// A submission is already in flight.
    #[error("a generation request is already in progress")]
    Busy,

    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Billing is not enabled for the API key.
    #[error("billing error: {0}")]
    Billing(String),

    /// External API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status returned by the API.
        status: u16,
        /// Sanitized error body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("{}", describe_rate_limit(.retry_after))]
    RateLimited {
        /// Delay suggested by the API, if any.
        retry_after: Option<Duration>,
    },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The model finished without producing an image.
    #[error("no image generated: {0}")]
    NoImage(String),

    /// The API answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid request parameters or payload.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upload server rejected a submission.
    #[error("{message}")]
    Server {
        /// HTTP status returned by the server.
        status: u16,
        /// The server's `error` field, verbatim.
        message: String,
    },

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 or image data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g. reading a selected file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task failed before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ImageForgeError {
    /// Returns the HTTP status code reported to upload clients.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingInput | Self::InvalidRequest(_) | Self::Decode(_) => 400,
            Self::ContentBlocked(_) => 400,
            Self::SelectionTooLarge { .. } | Self::BodyTooLarge { .. } => 413,
            Self::NoImage(_) => 422,
            Self::RateLimited { .. } => 429,
            Self::Busy => 409,
            Self::Api { .. } | Self::Network(_) | Self::UnexpectedResponse(_) => 502,
            Self::Server { status, .. } => *status,
            Self::Auth(_) | Self::Billing(_) | Self::Io(_) | Self::Json(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

fn describe_rate_limit(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(
            "the image service is rate limited, try again in {} seconds",
            delay.as_secs().max(1)
        ),
        None => "the image service is rate limited, try again later".to_string(),
    }
}

/// Result type alias for imageforge operations.
pub type Result<T> = std::result::Result<T, ImageForgeError>;

/// Redacts API keys and truncates an upstream error body.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            let trimmed = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
            if trimmed.starts_with("AIza") && trimmed.len() >= 30 {
                word.replace(trimmed, "[REDACTED]")
            } else if let Some(pos) = word.find("key=") {
                format!("{}key=[REDACTED]", &word[..pos])
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = redacted.join(" ");

    if joined.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = joined.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        joined
    }
}

/// Reads a `Retry-After` header expressed in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
