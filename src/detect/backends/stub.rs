use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};

use crate::detect::backend::{
    KeypointBackend, LandmarkBackend, LandmarkBackendFactory, LandmarkOptions,
};
use crate::detect::result::{FaceLandmarks, Keypoint};

/// Stub landmark capability for testing. Reports a scripted set of faces
/// for every image.
#[derive(Clone, Default)]
pub struct StubLandmarkFactory {
    faces: Vec<FaceLandmarks>,
    failure: Option<String>,
    acquisitions: Arc<AtomicUsize>,
}

impl StubLandmarkFactory {
    /// No face on any image.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(faces: Vec<FaceLandmarks>) -> Self {
        Self {
            faces,
            ..Self::default()
        }
    }

    /// Every detection call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Number of capabilities handed out so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl LandmarkBackendFactory for StubLandmarkFactory {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn create(&self, options: &LandmarkOptions) -> Result<Box<dyn LandmarkBackend>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubLandmarkBackend {
            faces: self.faces.clone(),
            failure: self.failure.clone(),
            max_faces: options.max_faces,
        }))
    }
}

struct StubLandmarkBackend {
    faces: Vec<FaceLandmarks>,
    failure: Option<String>,
    max_faces: usize,
}

impl LandmarkBackend for StubLandmarkBackend {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<FaceLandmarks>> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok(self.faces.iter().take(self.max_faces).cloned().collect())
    }
}

/// Stub keypoint detector for testing. Reports a scripted keypoint list.
#[derive(Clone, Default)]
pub struct StubKeypointBackend {
    keypoints: Vec<Keypoint>,
    failure: Option<String>,
}

impl StubKeypointBackend {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints,
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            keypoints: Vec::new(),
            failure: Some(message.to_string()),
        }
    }
}

impl KeypointBackend for StubKeypointBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, _image: &GrayImage) -> Result<Vec<Keypoint>> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok(self.keypoints.clone())
    }
}
