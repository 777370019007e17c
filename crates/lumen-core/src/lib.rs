//! Lumen Core - request orchestration for text-to-point-cloud generation.
//!
//! Turns a short concept ("a horse") into a labeled point cloud. Requests
//! pass through a two-tier result cache and a rolling admission window
//! before a staged model job runs: per-part generation first, then a
//! monolithic mesh with multi-view segmentation, then a procedural shape.
//! The models themselves sit behind the traits in [`inference`].
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_core::{GenerateRequest, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> lumen_core::Result<()> {
//!     let orchestrator = Orchestrator::builder().build().await;
//!
//!     let result = orchestrator.generate(GenerateRequest::new("a horse")).await?;
//!     println!("{} parts via {}", result.part_names.len(), result.pipeline);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod encoding;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod registry;
pub mod system;
pub mod templates;

// Re-export commonly used types
pub use cache::{BlobStore, CacheStats, ShapeCache};
pub use cancel::{CancellationToken, CancelledError};
pub use config::Settings;
pub use error::{LumenError, ModelError, Result};
pub use models::{BoundingBox, GenerateRequest, GenerationResult, PipelineKind, Quality};
pub use pipeline::{MetricsSnapshot, ModelFactories, Orchestrator, OrchestratorBuilder};
pub use registry::{LoadedModel, ModelRegistry};
pub use system::{GpuInfo, GpuMonitor};
