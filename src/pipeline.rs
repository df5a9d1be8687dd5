//! Branch selection: face landmarks first, keypoints when no face is found.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::decode::{decode_image, DecodedImage};
use crate::detect::{KeypointBackend, LandmarkBackendFactory, LandmarkOptions};
use crate::extract::{face_points, keypoint_points};
use crate::points::PointSet;

/// Which extractor produced a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Branch {
    Face,
    Keypoints,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Face => write!(f, "face"),
            Branch::Keypoints => write!(f, "keypoints"),
        }
    }
}

/// Result of one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub branch: Branch,
    pub points: PointSet,
}

/// Decode → landmarks → (keypoints) pipeline.
///
/// Holds no per-request state. The landmark capability is acquired from the
/// factory for each run and released when the run ends.
pub struct PointCloudPipeline {
    landmarks: Arc<dyn LandmarkBackendFactory>,
    keypoints: Arc<dyn KeypointBackend>,
}

impl PointCloudPipeline {
    pub fn new(
        landmarks: Arc<dyn LandmarkBackendFactory>,
        keypoints: Arc<dyn KeypointBackend>,
    ) -> Self {
        Self {
            landmarks,
            keypoints,
        }
    }

    pub fn landmark_backend_name(&self) -> &'static str {
        self.landmarks.name()
    }

    pub fn keypoint_backend_name(&self) -> &'static str {
        self.keypoints.name()
    }

    /// Run the pipeline on uploaded bytes.
    ///
    /// Undecodable input yields an empty keypoint selection. Capability
    /// failures are returned as errors.
    pub fn process(&self, bytes: &[u8]) -> Result<Selection> {
        match decode_image(bytes) {
            Some(image) => self.process_image(&image),
            None => {
                log::info!("object keypoints: 0 points (undecodable upload)");
                Ok(Selection {
                    branch: Branch::Keypoints,
                    points: PointSet::new(),
                })
            }
        }
    }

    /// Run both branches against an already decoded image.
    pub fn process_image(&self, image: &DecodedImage) -> Result<Selection> {
        let face = {
            let mut backend = self.landmarks.create(&LandmarkOptions::single_static())?;
            face_points(image, backend.as_mut())?
        };
        if !face.is_empty() {
            log::info!("face detected: {} points", face.len());
            return Ok(Selection {
                branch: Branch::Face,
                points: face,
            });
        }

        let points = keypoint_points(image, self.keypoints.as_ref())?;
        log::info!("object keypoints: {} points", points.len());
        Ok(Selection {
            branch: Branch::Keypoints,
            points,
        })
    }
}
