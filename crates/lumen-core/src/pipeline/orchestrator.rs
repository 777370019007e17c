//! Request orchestration: validation, cache, admission, generation.

use super::builder::OrchestratorBuilder;
use super::job::{GenerationJob, JobOutput, ModelFactories};
use super::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::cache::{CacheStats, ShapeCache};
use crate::cancel::CancellationToken;
use crate::config::Settings;
use crate::encoding::{compute_bbox, encode_part_ids, encode_positions};
use crate::error::{LumenError, Result};
use crate::models::{GenerateRequest, GenerationResult};
use crate::processing::MeshRenderer;
use crate::registry::ModelRegistry;
use crate::system::{GpuInfo, GpuMonitor};
use crate::templates::resolve;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Turns concept text into a labeled point cloud.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Orchestrator {
    pub(super) cache: Arc<ShapeCache>,
    pub(super) registry: Arc<ModelRegistry>,
    pub(super) metrics: Arc<PipelineMetrics>,
    pub(super) settings: Settings,
    pub(super) factories: ModelFactories,
    pub(super) renderer: Arc<dyn MeshRenderer>,
    pub(super) gpu: Arc<dyn GpuMonitor>,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Generate (or fetch from cache) the point cloud for a request.
    ///
    /// Cache hits bypass the rate limit. Only generations that pass
    /// admission are charged against it.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerationResult> {
        let start = Instant::now();
        let request = match request.validated(self.settings.max_request_text_length) {
            Ok(request) => request,
            Err(e) => {
                self.metrics.record_rejection();
                return Err(e);
            }
        };
        let text = request.text;

        if let Some(hit) = self.cache.get(&text).await {
            let retrieval_ms = elapsed_ms(start);
            self.metrics.record_cache_hit(retrieval_ms);
            debug!(text = %text, retrieval_ms, "Cache hit");
            return Ok(hit.into_cache_hit(retrieval_ms as u64));
        }

        if let Err(retry_after_secs) = self.metrics.try_admit(self.settings.generation_rate_limit) {
            self.metrics.record_rejection();
            warn!(text = %text, retry_after_secs, "Generation rate limit exceeded");
            return Err(LumenError::RateLimited { retry_after_secs });
        }

        let template = resolve(&text);
        info!(
            text = %text,
            template = template.kind,
            quality = ?request.quality,
            "Starting generation"
        );

        let cancel = CancellationToken::new();
        let job = GenerationJob {
            concept: text.clone(),
            template,
            quality: request.quality,
            max_points: self.settings.max_points,
            fallback_timeout: self.settings.fallback_timeout,
            vram_offload_threshold_gb: self.settings.vram_offload_threshold_gb,
            registry: Arc::clone(&self.registry),
            factories: self.factories.clone(),
            renderer: Arc::clone(&self.renderer),
            gpu: Arc::clone(&self.gpu),
            cancel: cancel.clone(),
        };

        let timeout = self.settings.generation_timeout;
        let handle = tokio::task::spawn_blocking(move || job.run());
        let outcome = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(LumenError::GenerationFailed {
                concept: text.clone(),
                reason: format!("generation task aborted: {}", join_error),
            }),
            Err(_) => {
                cancel.cancel();
                Err(LumenError::Timeout {
                    concept: text.clone(),
                    timeout,
                })
            }
        };

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                let e = self.classify_failure(&text, e);
                self.metrics.record_error(elapsed_ms(start));
                error!(text = %text, kind = e.kind(), "Generation failed: {}", e);
                return Err(e);
            }
        };

        let JobOutput {
            cloud,
            part_names,
            pipeline,
            failures,
            gpu_memory_gb,
        } = output;
        let latency_ms = elapsed_ms(start);
        let result = GenerationResult {
            bounding_box: compute_bbox(&cloud.positions),
            positions: encode_positions(&cloud.positions),
            part_ids: encode_part_ids(&cloud.part_ids),
            part_names,
            template_type: template.kind.to_string(),
            cached: false,
            generation_time_ms: latency_ms as u64,
            pipeline,
        };

        let cache = Arc::clone(&self.cache);
        let stored = result.clone();
        let key_text = text.clone();
        tokio::spawn(async move {
            cache.set(&key_text, &stored).await;
        });

        self.metrics.record_gpu_memory(gpu_memory_gb);
        self.metrics.record_generation(pipeline, latency_ms, failures);
        info!(
            text = %text,
            pipeline = %pipeline,
            points = cloud.len(),
            time_ms = latency_ms as u64,
            "Generation complete"
        );
        Ok(result)
    }

    /// Map a job failure onto the caller-facing taxonomy.
    fn classify_failure(&self, text: &str, err: LumenError) -> LumenError {
        match err {
            LumenError::OutOfMemory => {
                self.registry.reclaim_memory();
                self.gpu.refresh();
                LumenError::OutOfMemory
            }
            LumenError::Cancelled => LumenError::Timeout {
                concept: text.to_string(),
                timeout: self.settings.generation_timeout,
            },
            LumenError::GenerationFailed { concept, reason } if !concept.is_empty() => {
                LumenError::GenerationFailed { concept, reason }
            }
            LumenError::GenerationFailed { reason, .. } => LumenError::GenerationFailed {
                concept: text.to_string(),
                reason,
            },
            e @ LumenError::Timeout { .. } => e,
            other => LumenError::GenerationFailed {
                concept: text.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// True when models (or the skip flag) and the cache are usable.
    pub fn is_ready(&self) -> bool {
        let models_ready = self.settings.skip_model_load || !self.registry.loaded_names().is_empty();
        models_ready && self.cache.is_connected()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &Arc<ShapeCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current accelerator reading, if a GPU is being monitored.
    pub fn gpu_info(&self) -> Option<GpuInfo> {
        if !self.gpu.is_available() {
            return None;
        }
        self.gpu.gpu_info().ok()
    }
}
