use anyhow::Result;
use image::{GrayImage, RgbImage};

use crate::detect::result::{FaceLandmarks, Keypoint};

/// How a landmark capability is configured when it is acquired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LandmarkOptions {
    /// Treat every input as an unrelated still image (no tracking).
    pub static_image_mode: bool,
    /// Upper bound on faces the capability reports.
    pub max_faces: usize,
}

impl LandmarkOptions {
    /// Still images, at most one face.
    pub const fn single_static() -> Self {
        Self {
            static_image_mode: true,
            max_faces: 1,
        }
    }
}

impl Default for LandmarkOptions {
    fn default() -> Self {
        Self::single_static()
    }
}

/// Face-landmark capability acquired for a single request.
///
/// Instances are created by a [`LandmarkBackendFactory`], used once and
/// dropped. They are never shared between requests.
pub trait LandmarkBackend {
    /// Detect faces in an RGB raster.
    ///
    /// Each face is an ordered set of landmarks with `x`/`y` normalized to
    /// the image extent. An empty vector means no face was found.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceLandmarks>>;
}

/// Produces scoped [`LandmarkBackend`] instances.
///
/// Factories are shared across request threads; anything they hold must be
/// immutable (model weights, thresholds).
pub trait LandmarkBackendFactory: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Acquire a capability configured with `options`.
    fn create(&self, options: &LandmarkOptions) -> Result<Box<dyn LandmarkBackend>>;
}

/// Generic salient-keypoint capability.
///
/// Detection is stateless per call, so one instance serves every request.
pub trait KeypointBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect keypoints on a grayscale raster, in detector order and pixel
    /// coordinates.
    fn detect(&self, image: &GrayImage) -> Result<Vec<Keypoint>>;
}
