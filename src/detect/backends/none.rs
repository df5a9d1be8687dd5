use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::{LandmarkBackend, LandmarkBackendFactory, LandmarkOptions};
use crate::detect::result::FaceLandmarks;

/// Landmark capability that never finds a face.
///
/// Registered when no landmark model is configured; every request then
/// takes the keypoint branch.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFaceBackend;

impl NoFaceBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LandmarkBackendFactory for NoFaceBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn create(&self, _options: &LandmarkOptions) -> Result<Box<dyn LandmarkBackend>> {
        Ok(Box::new(NoFaceBackend))
    }
}

impl LandmarkBackend for NoFaceBackend {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<FaceLandmarks>> {
        Ok(Vec::new())
    }
}
