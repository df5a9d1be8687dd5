//! Point records and the pixel-index arithmetic shared by both extractors.
//!
//! A record is `(x, y, z, r, g, b)`. Positions are normalized against
//! `(dimension - 1)`, so pixel index `0` maps to `0.0` and the last pixel
//! index maps to `1.0`. Colors are 8-bit channels divided by 255.

use image::RgbImage;
use serde::Serialize;

/// One detected point: normalized position, depth and sampled color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PointRecord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl PointRecord {
    /// Fields in wire order.
    pub fn to_array(self) -> [f32; 6] {
        [self.x, self.y, self.z, self.r, self.g, self.b]
    }

    pub fn from_array(fields: [f32; 6]) -> Self {
        let [x, y, z, r, g, b] = fields;
        Self { x, y, z, r, g, b }
    }
}

/// Ordered sequence of records produced for a single request.
///
/// Order is the detector's native order. An empty set means nothing was
/// detected.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PointSet {
    records: Vec<PointRecord>,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: PointRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PointRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[PointRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PointRecord> {
        self.records
    }
}

impl From<Vec<PointRecord>> for PointSet {
    fn from(records: Vec<PointRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<PointRecord> for PointSet {
    fn from_iter<I: IntoIterator<Item = PointRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a PointRecord;
    type IntoIter = std::slice::Iter<'a, PointRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Rounds a pixel-space coordinate to the nearest pixel index inside
/// `[0, dimension - 1]`.
///
/// Ties round to even. Non-finite input lands on the nearest edge.
pub fn pixel_index(coord: f64, dimension: u32) -> u32 {
    let max = dimension.saturating_sub(1);
    if coord.is_nan() {
        return 0;
    }
    let rounded = coord.round_ties_even();
    if rounded <= 0.0 {
        0
    } else if rounded >= max as f64 {
        max
    } else {
        rounded as u32
    }
}

/// Maps a normalized coordinate back to a clamped pixel index.
pub fn pixel_from_normalized(normalized: f64, dimension: u32) -> u32 {
    pixel_index(normalized * dimension.saturating_sub(1) as f64, dimension)
}

/// Normalizes a pixel-space coordinate against `(dimension - 1)`.
///
/// A single-pixel axis has no extent, so every position on it is `0.0`.
pub fn normalize_pixel(coord: f64, dimension: u32) -> f64 {
    let extent = dimension.saturating_sub(1);
    if extent == 0 {
        return 0.0;
    }
    coord / extent as f64
}

/// Samples `image` at `(px, py)` and returns `(r, g, b)` in `[0, 1]`.
///
/// Callers pass indices produced by [`pixel_index`]; anything else is
/// clamped again here so the lookup never leaves the raster.
pub fn sample_rgb(image: &RgbImage, px: u32, py: u32) -> (f32, f32, f32) {
    let px = px.min(image.width().saturating_sub(1));
    let py = py.min(image.height().saturating_sub(1));
    let [r, g, b] = image.get_pixel(px, py).0;
    (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
}
