use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};

use crate::llm::provider::ProviderError;

pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Fixed JPEG quality for attachments.
pub const JPEG_QUALITY: u8 = 80;

/// Longest edge, in pixels, of an uploaded image.
pub const MAX_EDGE: u32 = 1024;

/// Decodes any supported image, shrinks it to fit [`MAX_EDGE`], re-encodes it
/// as JPEG and returns the Base64 payload.
pub fn encode_jpeg_base64(bytes: &[u8]) -> Result<String, ProviderError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| ProviderError::InvalidImage(err.to_string()))?;
    let jpeg = compress_jpeg(&decoded)?;
    Ok(STANDARD.encode(jpeg))
}

fn compress_jpeg(image: &DynamicImage) -> Result<Vec<u8>, ProviderError> {
    let (width, height) = image.dimensions();
    let resized = if width > MAX_EDGE || height > MAX_EDGE {
        image.thumbnail(MAX_EDGE, MAX_EDGE)
    } else {
        image.clone()
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut buffer = Vec::new();
    rgb.write_to(
        &mut Cursor::new(&mut buffer),
        ImageOutputFormat::Jpeg(JPEG_QUALITY),
    )
    .map_err(|err| ProviderError::InvalidImage(err.to_string()))?;
    Ok(buffer)
}
