//! Face-landmark point cloud service.
//!
//! Turns an uploaded image into a flat point cloud: face-mesh landmarks when
//! a face is found, generic keypoints otherwise.
//!
//! # Pipeline
//!
//! 1. **Decode** the upload once (`decode`). Undecodable bytes mean "no points".
//! 2. **Face landmarks** through a scoped landmark capability (`extract`,
//!    `detect`). The first face wins.
//! 3. **Keypoints** on the grayscale view, only when no face was found.
//! 4. **Encode** the records as headerless little-endian `f32` sextets (`wire`).
//!
//! # Module Structure
//!
//! - `points`: Point records and pixel-index normalization
//! - `decode`, `extract`, `pipeline`: the request pipeline
//! - `detect`: detector capabilities, backends and registry
//! - `wire`: binary encoding
//! - `config`, `api`: service configuration and HTTP surface

pub mod api;
pub mod config;
pub mod decode;
pub mod detect;
pub mod extract;
pub mod pipeline;
pub mod points;
pub mod wire;

pub use config::{ApiSettings, DetectSettings, ServiceConfig};
pub use decode::{decode_image, DecodedImage};
pub use detect::{
    BackendRegistry, FaceLandmarks, Keypoint, KeypointBackend, Landmark, LandmarkBackend,
    LandmarkBackendFactory, LandmarkOptions,
};
pub use pipeline::{Branch, PointCloudPipeline, Selection};
pub use points::{PointRecord, PointSet};
pub use wire::{decode_points, encode_points, RECORD_BYTES};
