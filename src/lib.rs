#![warn(missing_docs)]
//! imageforge - upload images with a prompt, get a generated image back.
//!
//! The crate has three layers:
//!
//! - [`client`]: the upload page's logic. A [`SelectionSet`] filters,
//!   deduplicates and caps picked files; an [`UploadClient`] submits them
//!   with a prompt as one multipart request; an [`UploadWidget`] keeps the
//!   resulting image or error.
//! - [`server`]: an axum router exposing `POST /api/upload`, which
//!   re-encodes the images for the generation API and maps its answer to a
//!   small JSON contract.
//! - [`image`]: the [`ImageProvider`] trait and the Gemini implementation.
//!
//! # Quick Start - Server
//!
//! ```no_run
//! use imageforge::server::{serve, ServerConfig};
//! use imageforge::GeminiProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> imageforge::Result<()> {
//!     let provider = Arc::new(GeminiProvider::builder().build()?);
//!     serve(ServerConfig::default(), provider).await
//! }
//! ```
//!
//! # Quick Start - Client
//!
//! ```no_run
//! use imageforge::{SelectedFile, SelectionMode, UploadClient, UploadWidget};
//!
//! #[tokio::main]
//! async fn main() -> imageforge::Result<()> {
//!     let client = UploadClient::builder().build()?;
//!     let mut widget = UploadWidget::new();
//!     widget.select([SelectedFile::from_path("cat.png")?], SelectionMode::Replace)?;
//!     widget.prompt = "Give the cat a tiny hat".into();
//!     let image = widget.submit(&client).await?;
//!     image.save("hat.png")?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini-image`: Gemini (Google) provider (default)
//! - `cli`: the `imageforge` binary (default)

mod error;

pub mod client;
pub mod image;
pub mod server;

// Re-export error types at crate root
pub use error::{ImageForgeError, Result};

pub use client::{
    DisplayImage, SelectedFile, SelectionLimits, SelectionMode, SelectionReport, SelectionSet,
    UploadClient, UploadWidget,
};
pub use crate::image::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProvider,
    ImageProviderKind, InputImage,
};
pub use server::{ServerConfig, UploadResponse};

#[cfg(feature = "gemini-image")]
pub use crate::image::providers::{GeminiModel, GeminiProvider, GeminiProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{SelectedFile, SelectionMode, SelectionSet, UploadClient, UploadWidget};
    pub use crate::error::{ImageForgeError, Result};
    pub use crate::image::{GeneratedImage, GenerationRequest, ImageProvider};

    #[cfg(feature = "gemini-image")]
    pub use crate::image::providers::GeminiProvider;
}
