//! The two point extractors.
//!
//! Both take an already decoded image and produce records in the order the
//! capability reports them. Neither catches capability errors.

use anyhow::Result;

use crate::decode::DecodedImage;
use crate::detect::{KeypointBackend, LandmarkBackend};
use crate::points::{
    normalize_pixel, pixel_from_normalized, pixel_index, sample_rgb, PointRecord, PointSet,
};

/// Face-landmark branch.
///
/// Only the first reported face is used, even if the capability returns
/// more. `x`/`y` are clamped to `[0, 1]`; `z` passes through.
pub fn face_points(image: &DecodedImage, backend: &mut dyn LandmarkBackend) -> Result<PointSet> {
    let faces = backend.detect(image.rgb())?;
    let face = match faces.into_iter().next() {
        Some(face) => face,
        None => return Ok(PointSet::new()),
    };

    let (width, height) = image.dimensions();
    let mut points = PointSet::with_capacity(face.len());
    for lm in &face.landmarks {
        let px = pixel_from_normalized(lm.x as f64, width);
        let py = pixel_from_normalized(lm.y as f64, height);
        let (r, g, b) = sample_rgb(image.rgb(), px, py);
        points.push(PointRecord {
            x: clamp_unit(lm.x),
            y: clamp_unit(lm.y),
            z: lm.z,
            r,
            g,
            b,
        });
    }
    Ok(points)
}

/// Generic keypoint branch. Depth is always `0.0`.
pub fn keypoint_points(image: &DecodedImage, backend: &dyn KeypointBackend) -> Result<PointSet> {
    let gray = image.grayscale();
    let keypoints = backend.detect(&gray)?;

    let (width, height) = image.dimensions();
    let mut points = PointSet::with_capacity(keypoints.len());
    for kp in &keypoints {
        let (x_px, y_px) = (kp.x as f64, kp.y as f64);
        let px = pixel_index(x_px, width);
        let py = pixel_index(y_px, height);
        let (r, g, b) = sample_rgb(image.rgb(), px, py);
        points.push(PointRecord {
            x: clamp_unit(normalize_pixel(x_px, width) as f32),
            y: clamp_unit(normalize_pixel(y_px, height) as f32),
            z: 0.0,
            r,
            g,
            b,
        });
    }
    Ok(points)
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
