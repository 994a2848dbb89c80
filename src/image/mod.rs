//! Image generation module.

pub mod encode;
mod provider;
pub mod providers;
mod types;

pub use provider::ImageProvider;
pub use types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProviderKind,
    InputImage, DEFAULT_MULTI_IMAGE_PROMPT, DEFAULT_SINGLE_IMAGE_PROMPT,
};
