pub mod fast;
pub mod none;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use fast::FastKeypointBackend;
pub use none::NoFaceBackend;
pub use stub::{StubKeypointBackend, StubLandmarkFactory};

#[cfg(feature = "backend-tract")]
pub use tract::TractFaceMeshFactory;
