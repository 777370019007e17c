//! Lumen Server - HTTP front end for point-cloud generation.
//!
//! Wires a `lumen_core::Orchestrator` to axum routes. All pipeline logic
//! lives in the core crate; this binary only parses configuration, installs
//! logging and serves requests.

mod handler;
mod middleware;
mod prometheus;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use lumen_core::cache::store::{FsBlobStore, SqliteBlobStore};
use lumen_core::config::{CacheConfig, PipelineConfig, ServerConfig};
use lumen_core::system::create_gpu_monitor;
use lumen_core::{BlobStore, ModelRegistry, Orchestrator, Settings};
use server::ServerOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lumen-server")]
#[command(about = "HTTP server for Lumen text-to-point-cloud generation")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "LUMEN_PORT", default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "LUMEN_HOST", default_value = ServerConfig::DEFAULT_HOST)]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LUMEN_JSON_LOGS")]
    json_logs: bool,

    /// Directory for the durable result cache
    #[arg(long, env = "LUMEN_CACHE_DIR", conflicts_with = "cache_db")]
    cache_dir: Option<PathBuf>,

    /// SQLite file for the durable result cache
    #[arg(long, env = "LUMEN_CACHE_DB")]
    cache_db: Option<PathBuf>,

    /// Load every stored result into memory at startup
    #[arg(long, env = "LUMEN_WARM_CACHE")]
    warm_cache: bool,

    #[arg(long, env = "GENERATION_TIMEOUT_SECONDS", default_value_t = PipelineConfig::GENERATION_TIMEOUT.as_secs())]
    generation_timeout_seconds: u64,

    #[arg(long, env = "FALLBACK_TIMEOUT_SECONDS", default_value_t = PipelineConfig::FALLBACK_TIMEOUT.as_secs())]
    fallback_timeout_seconds: u64,

    #[arg(long, env = "MAX_POINTS", default_value_t = PipelineConfig::MAX_POINTS)]
    max_points: usize,

    /// Generations admitted per rate window
    #[arg(long, env = "GENERATION_RATE_LIMIT", default_value_t = PipelineConfig::GENERATION_RATE_LIMIT_PER_MINUTE)]
    generation_rate_limit: usize,

    #[arg(long, env = "RATE_WINDOW_SECONDS", default_value_t = PipelineConfig::RATE_WINDOW.as_secs())]
    rate_window_seconds: u64,

    #[arg(long, env = "VRAM_OFFLOAD_THRESHOLD_GB", default_value_t = PipelineConfig::VRAM_OFFLOAD_THRESHOLD_GB)]
    vram_offload_threshold_gb: f64,

    #[arg(long, env = "MEMORY_CACHE_SIZE", default_value_t = CacheConfig::MEMORY_CAPACITY)]
    memory_cache_size: usize,

    #[arg(long, env = "MAX_REQUEST_TEXT_LENGTH", default_value_t = PipelineConfig::MAX_REQUEST_TEXT_LENGTH)]
    max_request_text_length: usize,

    /// Report ready without any loaded model
    #[arg(long, env = "SKIP_MODEL_LOAD")]
    skip_model_load: bool,

    /// Maximum requests handled concurrently
    #[arg(long, env = "LUMEN_MAX_CONCURRENT_REQUESTS", default_value_t = ServerConfig::MAX_CONCURRENT_REQUESTS)]
    max_concurrent_requests: usize,

    /// Generate requests per client address per minute (0 = unlimited)
    #[arg(long, env = "LUMEN_CLIENT_RATE_LIMIT", default_value_t = ServerConfig::CLIENT_RATE_LIMIT_PER_MINUTE)]
    client_rate_limit: u32,

    /// Mount the /debug routes
    #[arg(long, env = "ENABLE_DEBUG_ROUTES")]
    enable_debug_routes: bool,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        if self.max_points == 0 {
            anyhow::bail!("--max-points must be at least 1");
        }
        if self.rate_window_seconds == 0 {
            anyhow::bail!("--rate-window-seconds must be at least 1");
        }
        Ok(Settings {
            generation_timeout: Duration::from_secs(self.generation_timeout_seconds),
            fallback_timeout: Duration::from_secs(self.fallback_timeout_seconds),
            max_points: self.max_points,
            generation_rate_limit: self.generation_rate_limit,
            rate_window: Duration::from_secs(self.rate_window_seconds),
            vram_offload_threshold_gb: self.vram_offload_threshold_gb,
            memory_cache_capacity: self.memory_cache_size,
            max_request_text_length: self.max_request_text_length,
            skip_model_load: self.skip_model_load,
        })
    }

    fn server_options(&self) -> ServerOptions {
        ServerOptions {
            max_concurrent_requests: self.max_concurrent_requests,
            client_rate_limit_per_minute: self.client_rate_limit,
            enable_debug_routes: self.enable_debug_routes,
        }
    }

    fn blob_store(&self) -> Result<Option<Arc<dyn BlobStore>>> {
        if let Some(dir) = &self.cache_dir {
            let store = FsBlobStore::new(dir);
            return Ok(Some(Arc::new(store)));
        }
        if let Some(path) = &self.cache_db {
            let store = SqliteBlobStore::open(path)
                .with_context(|| format!("Failed to open cache database {}", path.display()))?;
            return Ok(Some(Arc::new(store)));
        }
        Ok(None)
    }
}

fn init_logging(args: &Args) {
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting Lumen server");

    let settings = args.settings()?;
    let mut builder = Orchestrator::builder()
        .settings(settings)
        .registry(Arc::new(ModelRegistry::new()))
        .gpu_monitor(Arc::from(create_gpu_monitor()));
    if let Some(store) = args.blob_store()? {
        info!("Durable cache backend: {}", store.name());
        builder = builder.blob_store(store);
    } else {
        warn!("No durable cache configured, results are kept in memory only");
    }
    let orchestrator = Arc::new(builder.build().await);

    if args.warm_cache {
        let cache = Arc::clone(orchestrator.cache());
        tokio::spawn(async move {
            let loaded = cache.load_all().await;
            info!("Cache warm-up loaded {} results", loaded);
        });
    }

    let addr = server::start_server(
        Arc::clone(&orchestrator),
        &args.host,
        args.port,
        args.server_options(),
    )
    .await?;

    // Machine-readable port line for supervisors and tests.
    println!("LUMEN_PORT={}", addr.port());

    info!("Lumen server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
