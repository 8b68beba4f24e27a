//! Image encoding: normalized grayscale → RGB PNG → base64 payload.
//!
//! OCR endpoints accept images as base64 data-URIs embedded in a JSON body.
//! PNG is lossless, so the sharpened strokes survive transport unchanged.
//! The grayscale buffer is expanded to three identical channels first since
//! not every vision backend accepts single-channel PNGs.

use crate::error::ExtractError;
use crate::pipeline::normalize::NormalizedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GrayImage};
use std::io::Cursor;
use tracing::debug;

/// A transport-ready encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Base64 (standard alphabet, padded) of the PNG bytes.
    pub data: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedPayload {
    /// `data:<mime>;base64,<data>` form accepted by OCR and vision APIs.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Encode a normalized image as a base64 RGB PNG.
pub fn encode_normalized(img: &NormalizedImage) -> Result<EncodedPayload, ExtractError> {
    encode_gray(img.as_gray())
}

/// Encode a grayscale buffer as a base64 RGB PNG.
pub fn encode_gray(gray: &GrayImage) -> Result<EncodedPayload, ExtractError> {
    let rgb = DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ExtractError::Encoding {
            detail: e.to_string(),
        })?;

    let data = STANDARD.encode(&buf);
    debug!("Encoded {}x{} image → {} bytes base64", width, height, data.len());

    Ok(EncodedPayload {
        data,
        mime_type: "image/png",
        width,
        height,
    })
}
