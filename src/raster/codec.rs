//! Still-image encode/decode for cross-boundary transfer
//!
//! Payloads are base64 PNG/WEBP/JPEG, optionally wrapped in a
//! `data:image/<fmt>;base64,` URI.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

/// JPEG/WEBP quality used for lossy encodes
const LOSSY_QUALITY: f32 = 90.0;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("WebP encode failed: {0}")]
    Webp(String),

    #[error("Buffer of {len} bytes does not hold a {width}x{height} RGBA image")]
    BufferSize { len: usize, width: u32, height: u32 },
}

impl From<CodecError> for String {
    fn from(e: CodecError) -> Self {
        e.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeFormat {
    #[default]
    Png,
    Webp,
    Jpeg,
}

impl EncodeFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            EncodeFormat::Png => "image/png",
            EncodeFormat::Webp => "image/webp",
            EncodeFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            EncodeFormat::Png => "png",
            EncodeFormat::Webp => "webp",
            EncodeFormat::Jpeg => "jpg",
        }
    }
}

/// Encode to raw file bytes
pub fn encode(image: &RgbaImage, format: EncodeFormat) -> Result<Vec<u8>, CodecError> {
    match format {
        EncodeFormat::Png => {
            let mut bytes = Vec::new();
            image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
            Ok(bytes)
        }
        EncodeFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut bytes = Vec::new();
            rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
            Ok(bytes)
        }
        EncodeFormat::Webp => {
            if image.width() == 0 || image.height() == 0 {
                return Err(CodecError::Webp("empty image".into()));
            }
            let encoder = webp::Encoder::from_rgba(image.as_raw(), image.width(), image.height());
            let memory = encoder
                .encode_simple(false, LOSSY_QUALITY)
                .map_err(|e| CodecError::Webp(format!("{:?}", e)))?;
            Ok(memory.to_vec())
        }
    }
}

/// Encode to bare base64
pub fn encode_base64(image: &RgbaImage, format: EncodeFormat) -> Result<String, CodecError> {
    let bytes = encode(image, format)?;
    tracing::debug!(
        "Encoded {}x{} image as {}: {} bytes",
        image.width(),
        image.height(),
        format.extension(),
        bytes.len()
    );
    Ok(BASE64.encode(bytes))
}

/// Encode to a `data:` URI
pub fn encode_data_uri(image: &RgbaImage, format: EncodeFormat) -> Result<String, CodecError> {
    Ok(format!(
        "data:{};base64,{}",
        format.mime_type(),
        encode_base64(image, format)?
    ))
}

/// Decode base64 (bare or data URI) of any supported format to RGBA.
pub fn decode_base64(data: &str) -> Result<RgbaImage, CodecError> {
    let payload = if data.starts_with("data:") {
        data.split_once(',').map(|(_, body)| body).unwrap_or(data)
    } else {
        data
    };
    let bytes = BASE64.decode(payload.trim())?;
    let img = image::load_from_memory(&bytes)?;
    Ok(img.to_rgba8())
}

/// Wrap a flat RGBA buffer, checking its length.
pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<RgbaImage, CodecError> {
    let len = pixels.len();
    if len as u64 != width as u64 * height as u64 * 4 {
        return Err(CodecError::BufferSize { len, width, height });
    }
    RgbaImage::from_raw(width, height, pixels).ok_or(CodecError::BufferSize { len, width, height })
}
