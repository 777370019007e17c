//! Host system probes.

mod gpu;

pub use gpu::{create_gpu_monitor, GpuInfo, GpuMonitor, NullGpuMonitor, NvidiaSmiMonitor};
