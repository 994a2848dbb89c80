//! Core types for image generation.

use crate::error::{ImageForgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prompt used when several images arrive without instructions.
pub const DEFAULT_MULTI_IMAGE_PROMPT: &str = "Combine these images into a single cohesive image.";

/// Prompt used when a single image arrives without instructions.
pub const DEFAULT_SINGLE_IMAGE_PROMPT: &str = "Enhance this image.";

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
    /// GIF format. Only the first frame is kept when sent upstream.
    Gif,
    /// Windows bitmap.
    Bmp,
    /// TIFF format.
    Tiff,
    /// HEIC (HEIF with HEVC), as produced by phone cameras.
    Heic,
    /// Generic HEIF container.
    Heif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Heic => "heic",
            Self::Heif => "heif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Heic => "image/heic",
            Self::Heif => "image/heif",
        }
    }

    /// Parses a MIME type such as `image/jpeg`.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            "image/gif" => Some(Self::Gif),
            "image/bmp" => Some(Self::Bmp),
            "image/tiff" => Some(Self::Tiff),
            "image/heic" => Some(Self::Heic),
            "image/heif" => Some(Self::Heif),
            _ => None,
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "heic" => Some(Self::Heic),
            "heif" | "hif" => Some(Self::Heif),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        if data.starts_with(b"BM") {
            return Some(Self::Bmp);
        }

        // TIFF: little-endian II*\0 or big-endian MM\0*
        if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
            return Some(Self::Tiff);
        }

        // ISO-BMFF: size, "ftyp", major brand. AVIF shares the box but is not accepted.
        if &data[4..8] == b"ftyp" {
            return match &data[8..12] {
                b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"hevx" => Some(Self::Heic),
                b"mif1" | b"msf1" | b"heif" => Some(Self::Heif),
                _ => None,
            };
        }

        None
    }

    /// Checks if the given data matches this format's magic bytes.
    pub fn matches_bytes(&self, data: &[u8]) -> bool {
        Self::from_magic_bytes(data) == Some(*self)
    }

    /// Returns true if the generation API accepts this format as inline data.
    pub fn is_upstream_native(&self) -> bool {
        matches!(
            self,
            Self::Png | Self::Jpeg | Self::WebP | Self::Heic | Self::Heif
        )
    }
}

/// Image provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageProviderKind {
    /// Google Gemini image models.
    Gemini,
}

impl std::fmt::Display for ImageProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Text the model returned alongside the image, if any.
    pub text: Option<String>,
}

/// An image supplied as generation input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Format detected from the bytes.
    pub format: ImageFormat,
}

impl InputImage {
    /// Wraps raw bytes, detecting the format from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| ImageForgeError::InvalidRequest("unsupported or corrupt image data".into()))?;
        Ok(Self { data, format })
    }
}

/// A request to generate an image.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// The text prompt. May be empty until defaults are applied.
    pub prompt: String,
    /// Input images, in the order the user selected them.
    pub images: Vec<InputImage>,
    /// Seed for deterministic generation.
    pub seed: Option<u64>,
}

impl GenerationRequest {
    /// Creates a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
            seed: None,
        }
    }

    /// Appends an input image.
    pub fn with_image(mut self, image: InputImage) -> Self {
        self.images.push(image);
        self
    }

    /// Appends several input images.
    pub fn with_images(mut self, images: impl IntoIterator<Item = InputImage>) -> Self {
        self.images.extend(images);
        self
    }

    /// Sets the seed for deterministic generation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns true if this is an image editing request (has input images).
    pub fn is_edit(&self) -> bool {
        !self.images.is_empty()
    }

    /// Returns true if the prompt is blank.
    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    /// Fills in a default prompt when images were sent without one.
    ///
    /// Fails with [`ImageForgeError::MissingInput`] when there is neither a prompt
    /// nor an image.
    pub fn resolve_prompt(mut self) -> Result<Self> {
        if self.has_prompt() {
            self.prompt = self.prompt.trim().to_string();
            return Ok(self);
        }
        self.prompt = match self.images.len() {
            0 => return Err(ImageForgeError::MissingInput),
            1 => DEFAULT_SINGLE_IMAGE_PROMPT.to_string(),
            _ => DEFAULT_MULTI_IMAGE_PROMPT.to_string(),
        };
        Ok(self)
    }
}

/// A generated image with its data and metadata.
#[derive(Debug, Clone)]
#[must_use = "generated image should be saved or processed"]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Provider that generated this image.
    pub provider: ImageProviderKind,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(
        data: Vec<u8>,
        format: ImageFormat,
        provider: ImageProviderKind,
        metadata: GenerationMetadata,
    ) -> Self {
        Self {
            data,
            format,
            provider,
            metadata,
        }
    }

    /// Returns the actual format detected from magic bytes.
    pub fn detected_format(&self) -> Option<ImageFormat> {
        ImageFormat::from_magic_bytes(&self.data)
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}
