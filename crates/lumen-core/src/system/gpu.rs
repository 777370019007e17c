//! GPU memory monitoring.
//!
//! The orchestrator reads allocated accelerator memory after generation to
//! feed the peak gauge and decide whether to offload fallback models.

use crate::error::Result;
use std::process::Command;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

const BYTES_PER_MIB: u64 = 1024 * 1024;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// GPU information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuInfo {
    /// GPU utilization percentage (0-100).
    pub usage: f32,
    /// Used GPU memory in bytes.
    pub memory_used: u64,
    /// Total GPU memory in bytes.
    pub memory_total: u64,
    pub name: Option<String>,
}

impl GpuInfo {
    pub fn memory_used_gb(&self) -> f64 {
        self.memory_used as f64 / BYTES_PER_GIB
    }
}

/// Trait for GPU monitoring implementations.
pub trait GpuMonitor: Send + Sync {
    /// Check if GPU monitoring is available.
    fn is_available(&self) -> bool;

    fn gpu_info(&self) -> Result<GpuInfo>;

    /// Allocated memory in GiB; 0 when unknown.
    fn memory_used_gb(&self) -> f64 {
        self.gpu_info().map(|info| info.memory_used_gb()).unwrap_or(0.0)
    }

    /// Drop cached readings.
    fn refresh(&self) {}
}

/// NVIDIA GPU monitor using nvidia-smi.
pub struct NvidiaSmiMonitor {
    cache_ttl: Duration,
    cache: RwLock<Option<(GpuInfo, Instant)>>,
    available: bool,
}

impl NvidiaSmiMonitor {
    /// Create a new NVIDIA GPU monitor caching readings for `cache_ttl`.
    pub fn new(cache_ttl: Duration) -> Self {
        let available = Command::new("nvidia-smi")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !available {
            debug!("nvidia-smi not available - GPU monitoring disabled");
        }

        Self {
            cache_ttl,
            cache: RwLock::new(None),
            available,
        }
    }

    fn query(&self) -> GpuInfo {
        if !self.available {
            return GpuInfo::default();
        }

        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=utilization.gpu,memory.used,memory.total,name",
                "--format=csv,noheader,nounits",
            ])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                parse_query_output(&stdout).unwrap_or_else(|| {
                    debug!("Unexpected nvidia-smi output format: {}", stdout.trim());
                    GpuInfo::default()
                })
            }
            Ok(output) => {
                debug!(
                    "nvidia-smi returned non-zero: {}",
                    String::from_utf8_lossy(&output.stderr)
                );
                GpuInfo::default()
            }
            Err(e) => {
                debug!("Failed to run nvidia-smi: {}", e);
                GpuInfo::default()
            }
        }
    }
}

impl Default for NvidiaSmiMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

/// Sum memory across every GPU line; utilization is averaged.
fn parse_query_output(stdout: &str) -> Option<GpuInfo> {
    let mut info = GpuInfo::default();
    let mut gpus = 0u32;
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 3 {
            return None;
        }
        info.usage += parts[0].parse::<f32>().unwrap_or(0.0);
        info.memory_used += parts[1].parse::<u64>().ok()? * BYTES_PER_MIB;
        info.memory_total += parts[2].parse::<u64>().ok()? * BYTES_PER_MIB;
        if info.name.is_none() {
            info.name = parts.get(3).map(|s| s.to_string());
        }
        gpus += 1;
    }
    if gpus == 0 {
        return None;
    }
    info.usage /= gpus as f32;
    Some(info)
}

impl GpuMonitor for NvidiaSmiMonitor {
    fn is_available(&self) -> bool {
        self.available
    }

    fn gpu_info(&self) -> Result<GpuInfo> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((info, timestamp)) = cache.as_ref() {
                if timestamp.elapsed() < self.cache_ttl {
                    return Ok(info.clone());
                }
            }
        }

        let info = self.query();
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) =
            Some((info.clone(), Instant::now()));
        Ok(info)
    }

    fn refresh(&self) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Monitor for hosts without a supported GPU. Always reports zero.
pub struct NullGpuMonitor;

impl GpuMonitor for NullGpuMonitor {
    fn is_available(&self) -> bool {
        false
    }

    fn gpu_info(&self) -> Result<GpuInfo> {
        Ok(GpuInfo::default())
    }
}

/// Create the appropriate GPU monitor for the current system.
pub fn create_gpu_monitor() -> Box<dyn GpuMonitor> {
    let nvidia_monitor = NvidiaSmiMonitor::default();
    if nvidia_monitor.is_available() {
        Box::new(nvidia_monitor)
    } else {
        Box::new(NullGpuMonitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_monitor() {
        let monitor = NullGpuMonitor;
        assert!(!monitor.is_available());
        assert_eq!(monitor.memory_used_gb(), 0.0);
    }

    #[test]
    fn test_parse_multi_gpu_output() {
        let info = parse_query_output("50, 1024, 81920, NVIDIA A100\n30, 2048, 81920, NVIDIA A100\n")
            .unwrap();
        assert_eq!(info.memory_used, 3072 * BYTES_PER_MIB);
        assert_eq!(info.usage, 40.0);
        assert_eq!(info.name.as_deref(), Some("NVIDIA A100"));
        assert!((info.memory_used_gb() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_query_output("").is_none());
        assert!(parse_query_output("N/A, N/A, N/A").is_none());
    }

    #[test]
    fn test_nvidia_monitor_creation() {
        // Passes whether or not nvidia-smi is installed.
        let monitor = NvidiaSmiMonitor::default();
        let _ = monitor.gpu_info();
        monitor.refresh();
    }
}
