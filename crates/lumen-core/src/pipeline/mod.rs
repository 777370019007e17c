//! Generation pipeline: admission, the staged model job and metrics.

mod builder;
mod job;
mod metrics;
mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use job::{MeshModelFactory, ModelFactories, SegmenterFactory};
pub use metrics::{MetricsSnapshot, PipelineMetrics, StageFailures};
pub use orchestrator::Orchestrator;
