//! Transport encoding for images sent to and received from the API.

use crate::error::{ImageForgeError, Result};
use crate::image::types::{ImageFormat, InputImage};
use base64::Engine;
use std::io::Cursor;

/// Normalizes an uploaded image into a format the API accepts inline.
///
/// PNG, JPEG and WebP pass through untouched. Other decodable formats are
/// transcoded to PNG on the blocking thread pool.
pub async fn prepare_input(data: Vec<u8>) -> Result<InputImage> {
    let image = InputImage::from_bytes(data)?;
    if image.format.is_upstream_native() {
        return Ok(image);
    }

    // Decode + re-encode is CPU-bound
    tokio::task::spawn_blocking(move || transcode_to_png(image))
        .await
        .map_err(|e| ImageForgeError::Internal(format!("transcode task failed: {e}")))?
}

/// Decodes an image and re-encodes it as PNG. Blocks the calling thread.
pub fn transcode_to_png(image: InputImage) -> Result<InputImage> {
    tracing::debug!(from = ?image.format, "transcoding input image to PNG");
    let decoded = ::image::load_from_memory(&image.data).map_err(|e| {
        ImageForgeError::InvalidRequest(format!("could not decode {:?} image: {e}", image.format))
    })?;

    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), ::image::ImageFormat::Png)
        .map_err(|e| ImageForgeError::Decode(format!("PNG encoding failed: {e}")))?;

    Ok(InputImage {
        data: png,
        format: ImageFormat::Png,
    })
}

/// Encodes bytes as standard base64.
pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decodes a base64 string that may be imperfectly formatted.
///
/// Accepts a `data:` URL prefix, embedded whitespace and missing padding.
pub fn decode_base64_lenient(input: &str) -> Result<Vec<u8>> {
    let b64 = match input.find(";base64,") {
        Some(pos) => &input[pos + 8..],
        None => input,
    };

    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(cleaned.trim_end_matches('='))
        .map_err(|e| ImageForgeError::Decode(e.to_string()))
}

/// Builds a `data:` URL suitable for displaying an image.
pub fn to_data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, encode_base64(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_image(format: ::image::ImageFormat) -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(2, 2, ::image::Rgb([200, 10, 10]));
        let mut out = Vec::new();
        ::image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), format)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn test_native_formats_pass_through() {
        let png = tiny_image(::image::ImageFormat::Png);
        let prepared = prepare_input(png.clone()).await.unwrap();
        assert_eq!(prepared.format, ImageFormat::Png);
        assert_eq!(prepared.data, png);
    }

    #[tokio::test]
    async fn test_bmp_is_transcoded_to_png() {
        let bmp = tiny_image(::image::ImageFormat::Bmp);
        assert_eq!(ImageFormat::from_magic_bytes(&bmp), Some(ImageFormat::Bmp));

        let prepared = prepare_input(bmp).await.unwrap();
        assert_eq!(prepared.format, ImageFormat::Png);
        assert!(ImageFormat::Png.matches_bytes(&prepared.data));
    }

    #[tokio::test]
    async fn test_corrupt_gif_is_rejected() {
        let err = prepare_input(b"GIF89a\x00\x00garbage!".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ImageForgeError::InvalidRequest(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_tiff_transcodes_while_runtime_stays_responsive() {
        let tiff = tiny_image(::image::ImageFormat::Tiff);
        let ticker = tokio::spawn(async { tokio::task::yield_now().await });

        let prepared = prepare_input(tiff).await.unwrap();
        assert_eq!(prepared.format, ImageFormat::Png);
        assert!(ImageFormat::Png.matches_bytes(&prepared.data));
        ticker.await.unwrap();
    }

    #[test]
    fn test_transcode_to_png_rejects_garbage() {
        let image = InputImage {
            data: b"BM\x00\x00not really a bitmap".to_vec(),
            format: ImageFormat::Bmp,
        };
        assert!(matches!(
            transcode_to_png(image),
            Err(ImageForgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_decode_lenient_variants() {
        assert_eq!(decode_base64_lenient("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64_lenient("aGVsbG8").unwrap(), b"hello");
        assert_eq!(decode_base64_lenient("aGVs\nbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_lenient("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_base64_lenient("!!!").is_err());
    }

    #[test]
    fn test_data_url() {
        assert_eq!(to_data_url("image/png", b"hello"), "data:image/png;base64,aGVsbG8=");
    }
}
