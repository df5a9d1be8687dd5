use anyhow::Result;
use image::GrayImage;
use imageproc::corners::corners_fast9;

use crate::detect::backend::KeypointBackend;
use crate::detect::result::Keypoint;

/// Default FAST intensity threshold.
pub const DEFAULT_FAST_THRESHOLD: u8 = 20;

/// FAST-9 needs a radius-3 Bresenham circle around each candidate.
const MIN_DIMENSION: u32 = 7;

/// FAST-9 corner detector on grayscale images.
///
/// Corners are reported in row-major scan order at integer pixel positions.
#[derive(Clone, Copy, Debug)]
pub struct FastKeypointBackend {
    threshold: u8,
}

impl FastKeypointBackend {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_FAST_THRESHOLD,
        }
    }

    /// Override the intensity threshold.
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }
}

impl Default for FastKeypointBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KeypointBackend for FastKeypointBackend {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn detect(&self, image: &GrayImage) -> Result<Vec<Keypoint>> {
        let (width, height) = image.dimensions();
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Ok(Vec::new());
        }
        let keypoints = corners_fast9(image, self.threshold)
            .into_iter()
            .map(|corner| Keypoint::new(corner.x as f32, corner.y as f32, corner.score))
            .collect();
        Ok(keypoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn bright_square(size: u32, inner: std::ops::Range<u32>) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if inner.contains(&x) && inner.contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn featureless_single_pixel_has_no_keypoints() {
        let backend = FastKeypointBackend::new();
        let keypoints = backend.detect(&GrayImage::new(1, 1)).unwrap();
        assert!(keypoints.is_empty());
    }

    #[test]
    fn flat_image_has_no_keypoints() {
        let backend = FastKeypointBackend::new();
        let image = GrayImage::from_pixel(32, 32, Luma([128]));
        assert!(backend.detect(&image).unwrap().is_empty());
    }

    #[test]
    fn square_corners_are_detected_inside_bounds() {
        let backend = FastKeypointBackend::new();
        let image = bright_square(32, 10..22);
        let keypoints = backend.detect(&image).unwrap();
        assert!(!keypoints.is_empty());
        for kp in &keypoints {
            assert!(kp.x >= 0.0 && kp.x < 32.0);
            assert!(kp.y >= 0.0 && kp.y < 32.0);
        }
        // row-major scan order
        for pair in keypoints.windows(2) {
            assert!((pair[0].y, pair[0].x) < (pair[1].y, pair[1].x));
        }
    }
}
