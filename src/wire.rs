//! Headerless point-cloud wire format.
//!
//! Each record is six little-endian IEEE-754 `f32` values in the order
//! `x, y, z, r, g, b`. Records are concatenated with no header, count,
//! separator or padding, so an empty set encodes to zero bytes. Consumers
//! must know the 24-byte record width out of band.

use anyhow::{anyhow, Result};

use crate::points::{PointRecord, PointSet};

/// Values per record.
pub const FIELDS_PER_RECORD: usize = 6;

/// Encoded size of one record in bytes.
pub const RECORD_BYTES: usize = FIELDS_PER_RECORD * 4;

/// Serialize `points` in wire order.
pub fn encode_points(points: &PointSet) -> Vec<u8> {
    let mut out = Vec::with_capacity(points.len() * RECORD_BYTES);
    for record in points {
        for value in record.to_array() {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

/// Parse a wire buffer back into records.
pub fn decode_points(bytes: &[u8]) -> Result<PointSet> {
    if bytes.len() % RECORD_BYTES != 0 {
        return Err(anyhow!(
            "point buffer length {} is not a multiple of {} bytes",
            bytes.len(),
            RECORD_BYTES
        ));
    }
    let points = bytes
        .chunks_exact(RECORD_BYTES)
        .map(|chunk| {
            let mut fields = [0f32; FIELDS_PER_RECORD];
            for (field, raw) in fields.iter_mut().zip(chunk.chunks_exact(4)) {
                *field = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
            PointRecord::from_array(fields)
        })
        .collect();
    Ok(points)
}
