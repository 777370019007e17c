//! Rolling pipeline metrics and the generation admission window.

use crate::config::{MetricsConfig, PipelineConfig};
use crate::models::PipelineKind;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Which model stages failed before a generation settled on its pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFailures {
    pub primary: bool,
    pub fallback: bool,
}

/// Point-in-time view of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub primary_successes: u64,
    pub primary_failures: u64,
    pub fallback_successes: u64,
    pub fallback_failures: u64,
    pub mock_fallbacks: u64,
    pub errors_total: u64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_mean_ms: f64,
    pub gpu_memory_peak_gb: f64,
    pub recent_generations: usize,
    pub uptime_seconds: u64,
}

#[derive(Debug)]
struct Inner {
    requests_total: u64,
    cache_hits: u64,
    primary_successes: u64,
    primary_failures: u64,
    fallback_successes: u64,
    fallback_failures: u64,
    mock_fallbacks: u64,
    errors_total: u64,
    latencies: VecDeque<f64>,
    generations: VecDeque<Instant>,
    gpu_memory_peak_gb: f64,
}

/// Request counters, latency history and the admission window.
///
/// One mutex guards everything; no method holds it across an await.
pub struct PipelineMetrics {
    inner: Mutex<Inner>,
    rate_window: Duration,
    started: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new(PipelineConfig::RATE_WINDOW)
    }
}

impl PipelineMetrics {
    pub fn new(rate_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                requests_total: 0,
                cache_hits: 0,
                primary_successes: 0,
                primary_failures: 0,
                fallback_successes: 0,
                fallback_failures: 0,
                mock_fallbacks: 0,
                errors_total: 0,
                latencies: VecDeque::with_capacity(MetricsConfig::LATENCY_HISTORY),
                generations: VecDeque::with_capacity(MetricsConfig::GENERATION_HISTORY),
                gpu_memory_peak_gb: 0.0,
            }),
            rate_window,
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit one generation if fewer than `limit` started within the window.
    ///
    /// Admission is recorded immediately, so concurrent callers cannot
    /// overshoot the limit. On rejection returns the whole seconds until the
    /// oldest in-window generation expires, at least 1.
    pub fn try_admit(&self, limit: usize) -> Result<(), u64> {
        let now = Instant::now();
        let mut inner = self.lock();
        let window = self.rate_window;
        while inner
            .generations
            .front()
            .is_some_and(|&t| now.duration_since(t) >= window)
        {
            inner.generations.pop_front();
        }

        if inner.generations.len() >= limit {
            let retry_after = match inner.generations.front() {
                Some(&oldest) => {
                    let remaining = window.saturating_sub(now.duration_since(oldest));
                    (remaining.as_secs_f64().ceil() as u64).clamp(1, window.as_secs().max(1))
                }
                None => PipelineConfig::DEFAULT_RETRY_AFTER_SECS,
            };
            return Err(retry_after);
        }

        inner.generations.push_back(now);
        if inner.generations.len() > limit.max(MetricsConfig::GENERATION_HISTORY) {
            inner.generations.pop_front();
        }
        Ok(())
    }

    /// Generations started within the trailing window.
    pub fn recent_generations(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .generations
            .iter()
            .filter(|&&t| now.duration_since(t) < self.rate_window)
            .count()
    }

    pub fn record_cache_hit(&self, latency_ms: f64) {
        let mut inner = self.lock();
        inner.requests_total += 1;
        inner.cache_hits += 1;
        push_latency(&mut inner, latency_ms);
    }

    pub fn record_generation(&self, pipeline: PipelineKind, latency_ms: f64, failures: StageFailures) {
        let mut inner = self.lock();
        inner.requests_total += 1;
        push_latency(&mut inner, latency_ms);
        if failures.primary {
            inner.primary_failures += 1;
        }
        if failures.fallback {
            inner.fallback_failures += 1;
        }
        match pipeline {
            PipelineKind::Primary => inner.primary_successes += 1,
            PipelineKind::Fallback => inner.fallback_successes += 1,
            PipelineKind::Mock => inner.mock_fallbacks += 1,
        }
    }

    /// A request that ended in an error after admission.
    pub fn record_error(&self, latency_ms: f64) {
        let mut inner = self.lock();
        inner.requests_total += 1;
        inner.errors_total += 1;
        push_latency(&mut inner, latency_ms);
    }

    /// A request rejected before any work (validation, rate limit).
    pub fn record_rejection(&self) {
        let mut inner = self.lock();
        inner.requests_total += 1;
        inner.errors_total += 1;
    }

    pub fn record_gpu_memory(&self, gb: f64) {
        let mut inner = self.lock();
        if gb > inner.gpu_memory_peak_gb {
            inner.gpu_memory_peak_gb = gb;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let recent = self.recent_generations();
        let inner = self.lock();
        let mut sorted: Vec<f64> = inner.latencies.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let round1 = |v: f64| (v * 10.0).round() / 10.0;
        let (p50, p95, mean) = if n == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (
                round1(sorted[n / 2]),
                round1(sorted[((n as f64 * 0.95) as usize).min(n - 1)]),
                round1(sorted.iter().sum::<f64>() / n as f64),
            )
        };

        MetricsSnapshot {
            requests_total: inner.requests_total,
            cache_hits: inner.cache_hits,
            cache_hit_rate: (inner.cache_hits as f64 / inner.requests_total.max(1) as f64 * 1000.0)
                .round()
                / 1000.0,
            primary_successes: inner.primary_successes,
            primary_failures: inner.primary_failures,
            fallback_successes: inner.fallback_successes,
            fallback_failures: inner.fallback_failures,
            mock_fallbacks: inner.mock_fallbacks,
            errors_total: inner.errors_total,
            latency_p50_ms: p50,
            latency_p95_ms: p95,
            latency_mean_ms: mean,
            gpu_memory_peak_gb: inner.gpu_memory_peak_gb,
            recent_generations: recent,
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

fn push_latency(inner: &mut Inner, latency_ms: f64) {
    if inner.latencies.len() == MetricsConfig::LATENCY_HISTORY {
        inner.latencies.pop_front();
    }
    inner.latencies.push_back(latency_ms);
}
