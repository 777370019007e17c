//! Centralized configuration for Lumen.
//!
//! Constant blocks hold the defaults; [`Settings`] carries the values a
//! running orchestrator actually uses and is what the server fills from its
//! command line and environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result cache configuration.
pub struct CacheConfig;

impl CacheConfig {
    pub const MEMORY_CAPACITY: usize = 200;
    /// Hex characters kept from the SHA-256 digest of a normalized concept.
    pub const KEY_HEX_LEN: usize = 16;
    /// Upper bound on tracked key -> normalized-text pairs for collision logging.
    pub const KEY_ORIGINS_MAX: usize = 10_000;
    pub const BLOB_PREFIX: &'static str = "shapes/";
    pub const BLOB_SUFFIX: &'static str = ".json";
    /// Concurrent durable reads during warm-up.
    pub const WARMUP_CONCURRENCY: usize = 8;
}

/// Generation pipeline configuration.
pub struct PipelineConfig;

impl PipelineConfig {
    pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(300);
    pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);
    pub const MAX_POINTS: usize = 2048;
    pub const GENERATION_RATE_LIMIT_PER_MINUTE: usize = 20;
    pub const RATE_WINDOW: Duration = Duration::from_secs(60);
    pub const VRAM_OFFLOAD_THRESHOLD_GB: f64 = 80.0;
    pub const MAX_REQUEST_TEXT_LENGTH: usize = 200;
    /// Fraction of requested parts that must decode for the primary path to win.
    pub const PRIMARY_MIN_PART_FRACTION: f64 = 0.5;
    /// Retry-after reported when the window is somehow empty.
    pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
    /// Mean and spread of the procedural sphere radius.
    pub const MOCK_RADIUS: f32 = 0.8;
    pub const MOCK_RADIUS_SIGMA: f32 = 0.1;
}

/// Multi-view renderer configuration.
pub struct RenderConfig;

impl RenderConfig {
    pub const RESOLUTION: usize = 512;
    pub const FIELD_OF_VIEW_Y: f32 = std::f32::consts::FRAC_PI_4;
}

/// Mask-to-face mapping configuration.
pub struct MappingConfig;

impl MappingConfig {
    /// Maximum distance (normalized mesh units) for a mirrored symmetric label.
    pub const SYMMETRY_DISTANCE: f32 = 0.3;
}

/// Metrics retention.
pub struct MetricsConfig;

impl MetricsConfig {
    pub const LATENCY_HISTORY: usize = 1000;
    pub const GENERATION_HISTORY: usize = 500;
}

/// HTTP server defaults.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8000;
    pub const MAX_CONCURRENT_REQUESTS: usize = 64;
    /// Generate requests accepted per client address per minute.
    pub const CLIENT_RATE_LIMIT_PER_MINUTE: u32 = 300;
}

/// Runtime settings for an orchestrator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overall deadline for the primary + fallback path.
    pub generation_timeout: Duration,
    /// Secondary deadline guarding the fallback sub-path.
    pub fallback_timeout: Duration,
    /// Points in every generated cloud.
    pub max_points: usize,
    /// Generations admitted per rate window.
    pub generation_rate_limit: usize,
    /// Length of the trailing admission window.
    pub rate_window: Duration,
    /// Allocated GPU memory above which fallback models are unloaded.
    pub vram_offload_threshold_gb: f64,
    pub memory_cache_capacity: usize,
    pub max_request_text_length: usize,
    /// Treat an empty model registry as ready (development and tests).
    pub skip_model_load: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            generation_timeout: PipelineConfig::GENERATION_TIMEOUT,
            fallback_timeout: PipelineConfig::FALLBACK_TIMEOUT,
            max_points: PipelineConfig::MAX_POINTS,
            generation_rate_limit: PipelineConfig::GENERATION_RATE_LIMIT_PER_MINUTE,
            rate_window: PipelineConfig::RATE_WINDOW,
            vram_offload_threshold_gb: PipelineConfig::VRAM_OFFLOAD_THRESHOLD_GB,
            memory_cache_capacity: CacheConfig::MEMORY_CAPACITY,
            max_request_text_length: PipelineConfig::MAX_REQUEST_TEXT_LENGTH,
            skip_model_load: false,
        }
    }
}
