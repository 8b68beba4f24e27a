//! Image normalization: decode → grayscale → sharpen → upscale.
//!
//! The result is the canonical image fed to the encoder. The transform is
//! deterministic: the same input bytes always yield the same pixels.
//!
//! ## Why spawn_blocking?
//!
//! Decoding, convolution and Lanczos resampling of a 2000 px scan are all
//! CPU-bound and take tens of milliseconds. [`normalize_file`] moves the
//! work onto tokio's blocking pool so batch mode does not stall the worker
//! threads that drive the HTTP collaborators.

use crate::error::ExtractError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageReader, Luma};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 3×3 edge-enhancement kernel, row-major. Sums to 1, so flat regions keep
/// their intensity.
pub const SHARPEN_KERNEL: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];

/// A grayscale, sharpened image at least `min_width` pixels wide.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: GrayImage,
    original_width: u32,
    original_height: u32,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Dimensions of the decoded input before any resize.
    pub fn original_dimensions(&self) -> (u32, u32) {
        (self.original_width, self.original_height)
    }

    pub fn was_upscaled(&self) -> bool {
        self.pixels.width() != self.original_width
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn into_gray(self) -> GrayImage {
        self.pixels
    }

    /// Write the normalized pixels to `path` as PNG.
    pub fn save_png(&self, path: &Path) -> Result<(), ExtractError> {
        self.pixels
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| match e {
                image::ImageError::IoError(source) => ExtractError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source,
                },
                other => ExtractError::Encoding {
                    detail: other.to_string(),
                },
            })
    }
}

/// Decode and normalize the image at `path` on the blocking pool.
pub async fn normalize_file(path: &Path, min_width: u32) -> Result<NormalizedImage, ExtractError> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let img = decode(&path)?;
        Ok(normalize_image(&img, min_width))
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Normalize task panicked: {}", e)))?
}

/// Decode any supported raster file, sniffing the format from its content.
pub fn decode(path: &Path) -> Result<DynamicImage, ExtractError> {
    let decode_err = |detail: String| ExtractError::ImageDecode {
        path: path.to_path_buf(),
        detail,
    };

    let reader = ImageReader::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
            path: PathBuf::from(path),
        },
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: PathBuf::from(path),
        },
        _ => decode_err(e.to_string()),
    })?;

    reader
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))
}

/// Grayscale, sharpen, then upscale to `min_width` if narrower.
///
/// Never downscales. Height follows the width scale factor, rounded.
pub fn normalize_image(img: &DynamicImage, min_width: u32) -> NormalizedImage {
    let gray = img.to_luma8();
    let (original_width, original_height) = gray.dimensions();

    let sharpened = sharpen(&gray);
    let pixels = upscale_to_min_width(sharpened, min_width);

    debug!(
        "Normalized {}x{} → {}x{}",
        original_width,
        original_height,
        pixels.width(),
        pixels.height()
    );

    NormalizedImage {
        pixels,
        original_width,
        original_height,
    }
}

/// Convolve with [`SHARPEN_KERNEL`], saturating to 0–255.
///
/// Borders are handled by reflecting about the edge pixel (`dcb|abcd|cba`),
/// so edge rows and columns are sharpened like the interior instead of being
/// left untouched.
pub fn sharpen(src: &GrayImage) -> GrayImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0i32;
            for (k, weight) in SHARPEN_KERNEL.iter().enumerate() {
                let dx = (k % 3) as i64 - 1;
                let dy = (k / 3) as i64 - 1;
                let sx = reflect(x as i64 + dx, w);
                let sy = reflect(y as i64 + dy, h);
                acc += weight * src.get_pixel(sx, sy)[0] as i32;
            }
            out.put_pixel(x, y, Luma([acc.clamp(0, 255) as u8]));
        }
    }
    out
}

/// Reflect-101 index into `0..len`. A single-pixel axis maps everything to 0.
fn reflect(i: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let r = if i < 0 {
        -i
    } else if i >= len {
        2 * (len - 1) - i
    } else {
        i
    };
    r.clamp(0, len - 1) as u32
}

fn upscale_to_min_width(img: GrayImage, min_width: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || w >= min_width {
        return img;
    }

    let scale = min_width as f64 / w as f64;
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::resize(&img, min_width, new_h, FilterType::Lanczos3)
}
