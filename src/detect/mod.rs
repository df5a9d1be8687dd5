mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{KeypointBackend, LandmarkBackend, LandmarkBackendFactory, LandmarkOptions};
pub use backends::{FastKeypointBackend, NoFaceBackend, StubKeypointBackend, StubLandmarkFactory};
pub use registry::BackendRegistry;
pub use result::{FaceLandmarks, Keypoint, Landmark};
