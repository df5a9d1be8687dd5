/// A face landmark as reported by the landmark capability.
///
/// `x` and `y` are normalized to the image extent; `z` is model depth on
/// roughly the same scale as `x` and may be negative.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Ordered landmarks of one detected face.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceLandmarks {
    pub landmarks: Vec<Landmark>,
}

impl FaceLandmarks {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// Builds landmarks from a flat `[x0, y0, z0, x1, ...]` buffer.
    /// Trailing values that do not complete a triple are ignored.
    pub fn from_flat(values: &[f32]) -> Self {
        let landmarks = values
            .chunks_exact(3)
            .map(|v| Landmark::new(v[0], v[1], v[2]))
            .collect();
        Self { landmarks }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// A 2-D keypoint in pixel coordinates of the detector input.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Detector response strength.
    pub score: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, score: f32) -> Self {
        Self { x, y, score }
    }
}
