//! Prometheus text exposition of the pipeline metrics.

use lumen_core::MetricsSnapshot;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Inputs that live outside the metrics snapshot.
pub struct Exposition<'a> {
    pub metrics: &'a MetricsSnapshot,
    /// Slot name and whether a model is loaded in it.
    pub models: Vec<(&'a str, bool)>,
    pub gpu_memory_used_bytes: u64,
    pub cache_memory_entries: usize,
}

fn family(out: &mut String, name: &str, kind: &str, help: &str, samples: &[(String, f64)]) {
    out.push_str(&format!("# HELP {} {}\n# TYPE {} {}\n", name, help, name, kind));
    for (labels, value) in samples {
        out.push_str(&format!("{}{} {}\n", name, labels, value));
    }
}

fn single(value: f64) -> Vec<(String, f64)> {
    vec![(String::new(), value)]
}

impl Exposition<'_> {
    pub fn render(&self) -> String {
        let m = self.metrics;
        let mut out = String::new();
        family(
            &mut out,
            "lumen_requests_total",
            "counter",
            "Total requests to the generation pipeline",
            &single(m.requests_total as f64),
        );
        family(
            &mut out,
            "lumen_cache_hits_total",
            "counter",
            "Requests served from the result cache",
            &single(m.cache_hits as f64),
        );
        family(
            &mut out,
            "lumen_cache_hit_ratio",
            "gauge",
            "Cache hit ratio (0.0-1.0)",
            &single(m.cache_hit_rate),
        );
        let outcome = |pipeline: &str, result: &str| {
            format!("{{pipeline=\"{}\",outcome=\"{}\"}}", pipeline, result)
        };
        family(
            &mut out,
            "lumen_pipeline_runs_total",
            "counter",
            "Generation attempts per pipeline stage",
            &[
                (outcome("primary", "success"), m.primary_successes as f64),
                (outcome("primary", "failure"), m.primary_failures as f64),
                (outcome("fallback", "success"), m.fallback_successes as f64),
                (outcome("fallback", "failure"), m.fallback_failures as f64),
                (outcome("mock", "success"), m.mock_fallbacks as f64),
            ],
        );
        family(
            &mut out,
            "lumen_errors_total",
            "counter",
            "Requests that ended in an error",
            &single(m.errors_total as f64),
        );
        family(
            &mut out,
            "lumen_request_latency_milliseconds",
            "gauge",
            "Recent request latency",
            &[
                ("{quantile=\"0.5\"}".to_string(), m.latency_p50_ms),
                ("{quantile=\"0.95\"}".to_string(), m.latency_p95_ms),
                ("{quantile=\"mean\"}".to_string(), m.latency_mean_ms),
            ],
        );
        family(
            &mut out,
            "lumen_gpu_memory_bytes",
            "gauge",
            "GPU memory currently allocated in bytes",
            &single(self.gpu_memory_used_bytes as f64),
        );
        family(
            &mut out,
            "lumen_gpu_memory_peak_bytes",
            "gauge",
            "Peak GPU memory observed after a generation",
            &single((m.gpu_memory_peak_gb * BYTES_PER_GIB).round()),
        );
        let models: Vec<(String, f64)> = self
            .models
            .iter()
            .map(|(name, loaded)| {
                (
                    format!("{{model_name=\"{}\"}}", name),
                    if *loaded { 1.0 } else { 0.0 },
                )
            })
            .collect();
        family(
            &mut out,
            "lumen_model_load_status",
            "gauge",
            "Whether a model is loaded (1) or not (0)",
            &models,
        );
        family(
            &mut out,
            "lumen_recent_generations",
            "gauge",
            "Generations admitted in the current rate window",
            &single(m.recent_generations as f64),
        );
        family(
            &mut out,
            "lumen_cache_memory_entries",
            "gauge",
            "Results held in the in-memory cache tier",
            &single(self.cache_memory_entries as f64),
        );
        family(
            &mut out,
            "lumen_uptime_seconds",
            "counter",
            "Seconds since the pipeline started",
            &single(m.uptime_seconds as f64),
        );
        out
    }
}
