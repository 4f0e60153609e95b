//! Image normalization and multi-resolution encoding.
//!
//! Everything here is synchronous and CPU-bound; callers run it on the
//! blocking pool.

use std::io::Cursor;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};

use blockfeed_shared::{BlockfeedError, Result};

/// Width ceiling of the processed original.
pub const MAX_WIDTH: u32 = 800;

/// One re-encoded output tier.
#[derive(Debug, Clone, Copy)]
pub struct Tier {
    /// Filename suffix before the extension.
    pub suffix: &'static str,
    /// Target width; narrower images are never enlarged.
    pub width: u32,
    /// WebP quality, 0–100.
    pub quality: f32,
}

pub const LARGE: Tier = Tier {
    suffix: "",
    width: MAX_WIDTH,
    quality: 85.0,
};
pub const MEDIUM: Tier = Tier {
    suffix: "-md",
    width: 400,
    quality: 80.0,
};
pub const SMALL: Tier = Tier {
    suffix: "-sm",
    width: 200,
    quality: 75.0,
};

/// Encoded outputs of one source image.
#[derive(Debug, Clone)]
pub struct Transcoded {
    /// Oriented, width-capped image in the source format.
    pub original: Vec<u8>,
    pub large: Vec<u8>,
    pub medium: Vec<u8>,
    pub small: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn image_err(context: &str, e: impl std::fmt::Display) -> BlockfeedError {
    BlockfeedError::Image(format!("{context}: {e}"))
}

/// Decode, orient, cap at [`MAX_WIDTH`], and encode all tiers.
pub fn transcode(bytes: &[u8]) -> Result<Transcoded> {
    let (processed, format) = decode_oriented(bytes)?;
    let processed = fit_width(processed, MAX_WIDTH);
    let (width, height) = processed.dimensions();

    let original = encode(&processed, format)?;
    let large = encode_webp(&fit_width(processed.clone(), LARGE.width), LARGE.quality)?;
    let medium = encode_webp(&fit_width(processed.clone(), MEDIUM.width), MEDIUM.quality)?;
    let small = encode_webp(&fit_width(processed, SMALL.width), SMALL.quality)?;

    Ok(Transcoded {
        original,
        large,
        medium,
        small,
        width,
        height,
    })
}

/// Apply the embedded orientation and re-encode in the source format.
///
/// Used for JPEG payloads on the plain-file path; the result carries no Exif block.
pub fn normalize_orientation(bytes: &[u8]) -> Result<Vec<u8>> {
    let (image, format) = decode_oriented(bytes)?;
    encode(&image, format)
}

fn decode_oriented(bytes: &[u8]) -> Result<(DynamicImage, ImageFormat)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| image_err("sniff", e))?;
    let format = reader
        .format()
        .ok_or_else(|| BlockfeedError::Image("unrecognized image format".into()))?;

    let mut decoder = reader.into_decoder().map_err(|e| image_err("decode", e))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).map_err(|e| image_err("decode", e))?;
    image.apply_orientation(orientation);

    Ok((image, format))
}

/// Scale down to `width` keeping the aspect ratio; never enlarges.
fn fit_width(image: DynamicImage, width: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w <= width {
        return image;
    }
    let height = ((u64::from(h) * u64::from(width) + u64::from(w) / 2) / u64::from(w)).max(1) as u32;
    image.resize_exact(width, height, FilterType::Lanczos3)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let opaque;
    // JPEG has no alpha channel.
    let image = if format == ImageFormat::Jpeg && image.color().has_alpha() {
        opaque = DynamicImage::ImageRgb8(image.to_rgb8());
        &opaque
    } else {
        image
    };
    image
        .write_to(&mut buf, format)
        .map_err(|e| image_err("encode", e))?;
    Ok(buf.into_inner())
}

fn encode_webp(image: &DynamicImage, quality: f32) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height()).encode(quality);
    if encoded.is_empty() {
        return Err(BlockfeedError::Image("webp encoder produced no output".into()));
    }
    Ok(encoded.to_vec())
}
