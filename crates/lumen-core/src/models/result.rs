//! Generation results as returned to callers and stored in the cache.

use crate::encoding::{decode_part_ids, decode_positions};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Text-to-image followed by direct part-mesh generation.
    Primary,
    /// Monolithic mesh, multi-view segmentation and mask fusion.
    Fallback,
    /// Procedural sphere when no model path produced geometry.
    Mock,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Primary => "primary",
            PipelineKind::Fallback => "fallback",
            PipelineKind::Mock => "mock",
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned bounding box of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// A labeled point cloud ready for transport.
///
/// Immutable once built, except `cached` and `generation_time_ms`, which a
/// cache hit rewrites to report retrieval latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Base64 of little-endian f32 xyz triples.
    pub positions: String,
    /// Base64 of one u8 part index per point.
    pub part_ids: String,
    pub part_names: Vec<String>,
    pub template_type: String,
    pub bounding_box: BoundingBox,
    pub cached: bool,
    pub generation_time_ms: u64,
    pub pipeline: PipelineKind,
}

impl GenerationResult {
    /// Decode the position payload.
    pub fn decode_positions(&self) -> Result<Vec<[f32; 3]>> {
        decode_positions(&self.positions)
    }

    /// Decode the part-id payload.
    pub fn decode_part_ids(&self) -> Result<Vec<u8>> {
        decode_part_ids(&self.part_ids)
    }

    /// Mark as served from cache with the given retrieval latency.
    pub fn into_cache_hit(mut self, retrieval_ms: u64) -> Self {
        self.cached = true;
        self.generation_time_ms = retrieval_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PipelineKind::Fallback).unwrap(),
            "\"fallback\""
        );
        let kind: PipelineKind = serde_json::from_str("\"mock\"").unwrap();
        assert_eq!(kind, PipelineKind::Mock);
        assert_eq!(PipelineKind::Primary.to_string(), "primary");
    }

    #[test]
    fn test_into_cache_hit_only_touches_timing_fields() {
        let result = GenerationResult {
            positions: String::new(),
            part_ids: String::new(),
            part_names: vec!["body".into()],
            template_type: "default".into(),
            bounding_box: BoundingBox {
                min: [-1.0; 3],
                max: [1.0; 3],
            },
            cached: false,
            generation_time_ms: 4200,
            pipeline: PipelineKind::Mock,
        };
        let hit = result.clone().into_cache_hit(3);
        assert!(hit.cached);
        assert_eq!(hit.generation_time_ms, 3);
        assert_eq!(hit.part_names, result.part_names);
        assert_eq!(hit.pipeline, result.pipeline);
    }
}
