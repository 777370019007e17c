//! Request and result types shared by the orchestrator, the cache and the
//! HTTP layer.

mod request;
mod result;

pub use request::{GenerateRequest, Quality};
pub use result::{BoundingBox, GenerationResult, PipelineKind};
