//! Upload decoding.
//!
//! Bytes of unknown format become an RGB raster, or nothing. A failed decode
//! is not an error: downstream it reads as "zero points detected".

use image::metadata::Orientation;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageReader, ImageResult, RgbImage};
use std::io::Cursor;

/// A decoded upload in RGB channel order.
pub struct DecodedImage {
    rgb: RgbImage,
}

impl DecodedImage {
    pub fn from_rgb(rgb: RgbImage) -> Option<Self> {
        if rgb.width() == 0 || rgb.height() == 0 {
            return None;
        }
        Some(Self { rgb })
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// Single-channel luma view for the keypoint detector.
    pub fn grayscale(&self) -> GrayImage {
        image::imageops::grayscale(&self.rgb)
    }
}

/// Decodes `bytes` as a color raster.
///
/// The raster is rotated or flipped as the EXIF Orientation tag asks, so a
/// phone photo stored sideways comes out upright. Returns `None` for empty
/// input, malformed data, unsupported formats and zero-sized images.
pub fn decode_image(bytes: &[u8]) -> Option<DecodedImage> {
    if bytes.is_empty() {
        log::debug!("decode skipped: empty upload");
        return None;
    }
    match decode_oriented(bytes) {
        Ok(decoded) => DecodedImage::from_rgb(decoded.to_rgb8()),
        Err(err) => {
            log::debug!("decode failed: {}", err);
            None
        }
    }
}

fn decode_oriented(bytes: &[u8]) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    // unreadable EXIF reads as upright
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}
