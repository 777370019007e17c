//! Builder for configuring an [`Orchestrator`].

use super::job::{MeshModelFactory, ModelFactories, SegmenterFactory};
use super::metrics::PipelineMetrics;
use super::orchestrator::Orchestrator;
use crate::cache::{BlobStore, ShapeCache};
use crate::config::Settings;
use crate::processing::{MeshRenderer, RasterRenderer};
use crate::registry::ModelRegistry;
use crate::system::{GpuMonitor, NullGpuMonitor};
use std::sync::Arc;
use tracing::info;

/// Builder for configuring an [`Orchestrator`].
///
/// # Example
///
/// ```rust,ignore
/// use lumen_core::{Orchestrator, Settings};
/// use lumen_core::cache::store::SqliteBlobStore;
///
/// let store = SqliteBlobStore::open("./lumen-cache.sqlite")?;
/// let orchestrator = Orchestrator::builder()
///     .settings(Settings::default())
///     .blob_store(Arc::new(store))
///     .registry(registry)
///     .build()
///     .await;
/// ```
#[derive(Default)]
pub struct OrchestratorBuilder {
    settings: Settings,
    registry: Option<Arc<ModelRegistry>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    cache: Option<Arc<ShapeCache>>,
    factories: ModelFactories,
    renderer: Option<Arc<dyn MeshRenderer>>,
    gpu: Option<Arc<dyn GpuMonitor>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Model slots shared with whoever loads the models.
    ///
    /// Default: an empty registry (every request takes the procedural path).
    pub fn registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Durable tier for the result cache. Probed once in [`build`](Self::build).
    ///
    /// Ignored when a prebuilt cache is supplied with [`cache`](Self::cache).
    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// Use an existing cache instead of building one.
    pub fn cache(mut self, cache: Arc<ShapeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Loader for the mesh model, run the first time the fallback needs it.
    pub fn image_to_mesh_factory(mut self, factory: MeshModelFactory) -> Self {
        self.factories.image_to_mesh = Some(factory);
        self
    }

    /// Loader for the segmentation model, run the first time the fallback needs it.
    pub fn segmentation_factory(mut self, factory: SegmenterFactory) -> Self {
        self.factories.segmentation = Some(factory);
        self
    }

    /// Default: [`RasterRenderer`] at the configured resolution.
    pub fn renderer(mut self, renderer: Arc<dyn MeshRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Default: [`NullGpuMonitor`], which estimates usage from loaded models.
    pub fn gpu_monitor(mut self, gpu: Arc<dyn GpuMonitor>) -> Self {
        self.gpu = Some(gpu);
        self
    }

    /// Build the orchestrator.
    pub async fn build(self) -> Orchestrator {
        let capacity = self.settings.memory_cache_capacity;
        let cache = match (self.cache, self.blob_store) {
            (Some(cache), _) => cache,
            (None, Some(store)) => Arc::new(ShapeCache::connect(capacity, store).await),
            (None, None) => Arc::new(ShapeCache::memory_only(capacity)),
        };

        let orchestrator = Orchestrator {
            cache,
            registry: self.registry.unwrap_or_default(),
            metrics: Arc::new(PipelineMetrics::new(self.settings.rate_window)),
            factories: self.factories,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(RasterRenderer::default())),
            gpu: self.gpu.unwrap_or_else(|| Arc::new(NullGpuMonitor)),
            settings: self.settings,
        };

        info!(
            durable_cache = orchestrator.cache.has_durable_tier(),
            models = ?orchestrator.registry.loaded_names(),
            rate_limit = orchestrator.settings.generation_rate_limit,
            "Orchestrator initialized"
        );
        orchestrator
    }
}
