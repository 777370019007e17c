//! Transport encoding for point payloads and bounding-box computation.
//!
//! Positions travel as base64 of little-endian f32 triples and part ids as
//! base64 of raw u8s, so browser clients can wrap them in typed arrays.

use crate::error::{LumenError, Result};
use crate::models::BoundingBox;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode xyz positions as base64 little-endian f32s.
pub fn encode_positions(positions: &[[f32; 3]]) -> String {
    let mut bytes = Vec::with_capacity(positions.len() * 12);
    for point in positions {
        for coord in point {
            bytes.extend_from_slice(&coord.to_le_bytes());
        }
    }
    STANDARD.encode(bytes)
}

/// Decode a position payload produced by [`encode_positions`].
pub fn decode_positions(data: &str) -> Result<Vec<[f32; 3]>> {
    let bytes = STANDARD.decode(data)?;
    if bytes.len() % 12 != 0 {
        return Err(LumenError::Encoding(format!(
            "position payload length {} is not a multiple of 12",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(12)
        .map(|chunk| {
            let mut point = [0.0f32; 3];
            for (axis, raw) in chunk.chunks_exact(4).enumerate() {
                point[axis] = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
            point
        })
        .collect())
}

/// Encode part ids as base64 bytes.
pub fn encode_part_ids(part_ids: &[u8]) -> String {
    STANDARD.encode(part_ids)
}

/// Decode a part-id payload produced by [`encode_part_ids`].
pub fn decode_part_ids(data: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(data)?)
}

/// Axis-aligned bounding box. An empty cloud yields a zero box.
pub fn compute_bbox(positions: &[[f32; 3]]) -> BoundingBox {
    if positions.is_empty() {
        return BoundingBox {
            min: [0.0; 3],
            max: [0.0; 3],
        };
    }
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for point in positions {
        for axis in 0..3 {
            min[axis] = min[axis].min(point[axis]);
            max[axis] = max[axis].max(point[axis]);
        }
    }
    BoundingBox { min, max }
}
