// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Compute Backend Abstraction
//!
//! Provides a unified interface for the hardware that runs the LIF kernels
//! (CPU, WGPU, CUDA). Operators build a [`ForwardLaunch`] or
//! [`BackwardLaunch`] and hand it to whichever backend the
//! [`DeviceContext`](crate::DeviceContext) holds.

mod cpu;
#[cfg(feature = "cuda")]
mod cuda_backend;
#[cfg(feature = "gpu")]
mod wgpu_backend;

pub use cpu::{CPUBackend, DEFAULT_PARALLEL_THRESHOLD};
#[cfg(feature = "cuda")]
pub use cuda_backend::{enumerate_cuda_devices, is_cuda_available, CUDABackend};
#[cfg(feature = "gpu")]
pub use wgpu_backend::{is_gpu_available, WGPUBackend};

use lifgrad_npu_neural::types::{Device, Error, Result};
use tracing::{info, warn};

use crate::kernel::{BackwardBuffers, BackwardLaunch, ForwardBuffers, ForwardLaunch};

/// Compute backend trait (CPU, WGPU, CUDA)
///
/// Backends are stateless between calls: every buffer a launch touches is
/// owned by that launch. Implementations may assume the launch lengths are
/// consistent (checked by [`ForwardLaunch::new`] / [`BackwardLaunch::new`]).
pub trait ComputeBackend: Send + Sync {
    /// Get backend type name for logging/debugging
    fn backend_name(&self) -> &str;

    /// Device every tensor handed to this backend must be recorded on
    fn device(&self) -> Device;

    /// Run the charge/fire/reset kernel over `T` steps, optionally
    /// emitting local gradients
    fn forward(&self, launch: &ForwardLaunch<'_>) -> Result<ForwardBuffers>;

    /// Run the reverse-time gradient recurrence over `T` steps
    fn backward(&self, launch: &BackwardLaunch<'_>) -> Result<BackwardBuffers>;
}

/// Backend type enum for construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// CPU with rayon data parallelism
    CPU,

    /// GPU via WGPU (Metal/Vulkan/DirectX - cross-platform)
    WGPU,

    /// GPU via CUDA (NVIDIA only)
    CUDA,

    /// Auto-select based on population size and hardware availability
    #[default]
    Auto,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::CPU => write!(f, "CPU"),
            BackendType::WGPU => write!(f, "WGPU"),
            BackendType::CUDA => write!(f, "CUDA"),
            BackendType::Auto => write!(f, "Auto"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(BackendType::CPU),
            "wgpu" | "gpu" => Ok(BackendType::WGPU),
            "cuda" => Ok(BackendType::CUDA),
            "auto" => Ok(BackendType::Auto),
            _ => Err(Error::InvalidBackend(s.to_string())),
        }
    }
}

/// Configuration for backend construction and auto-selection
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Neurons per step at which the CPU backend goes parallel (default: 4,096)
    pub cpu_parallel_threshold: usize,

    /// Minimum neurons to consider WGPU GPU (default: 262,144)
    pub gpu_neuron_threshold: usize,

    /// Minimum neurons to consider CUDA GPU (default: 65,536)
    /// CUDA has lower launch overhead than WGPU, so it pays off earlier
    pub cuda_neuron_threshold: usize,

    /// Force CPU even if GPU would be beneficial
    pub force_cpu: bool,

    /// Force WGPU GPU even if CPU would be better (for testing)
    pub force_gpu: bool,

    /// Force CUDA GPU even if CPU/WGPU would be better (for testing)
    pub force_cuda: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cpu_parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            gpu_neuron_threshold: 262_144,
            cuda_neuron_threshold: 65_536,
            force_cpu: false,
            force_gpu: false,
            force_cuda: false,
        }
    }
}

/// Backend selection decision with rationale
#[derive(Debug, Clone)]
pub struct BackendDecision {
    pub backend_type: BackendType,
    pub reason: String,
    pub estimated_speedup: f32,
}

impl BackendDecision {
    fn cpu(reason: impl Into<String>) -> Self {
        Self {
            backend_type: BackendType::CPU,
            reason: reason.into(),
            estimated_speedup: 1.0,
        }
    }
}

#[cfg(not(feature = "gpu"))]
pub fn is_gpu_available() -> bool {
    false
}

#[cfg(not(feature = "cuda"))]
pub fn is_cuda_available() -> bool {
    false
}

/// Auto-select optimal backend based on population size and hardware
///
/// Selection priority:
/// 1. Honor force flags (force_cpu, force_cuda, force_gpu)
/// 2. Try CUDA (if available and population large enough)
/// 3. Try WGPU (if available and population large enough)
/// 4. Fall back to CPU - always available
pub fn select_backend(
    neuron_count: usize,
    time_steps: usize,
    config: &BackendConfig,
) -> BackendDecision {
    select_backend_with(
        neuron_count,
        time_steps,
        config,
        is_cuda_available,
        is_gpu_available,
    )
}

/// [`select_backend`] with injectable availability probes
pub fn select_backend_with(
    neuron_count: usize,
    time_steps: usize,
    config: &BackendConfig,
    cuda_available: impl Fn() -> bool,
    gpu_available: impl Fn() -> bool,
) -> BackendDecision {
    let time_steps = time_steps.max(1);

    // Force overrides
    if config.force_cpu {
        return BackendDecision::cpu("Forced CPU via configuration");
    }

    if config.force_cuda {
        if cuda_available() {
            return BackendDecision {
                backend_type: BackendType::CUDA,
                reason: "Forced CUDA via configuration".to_string(),
                estimated_speedup: estimate_cuda_speedup(neuron_count, time_steps),
            };
        }
        warn!("⚠️  CUDA forced but not available, falling back to CPU");
        return BackendDecision::cpu("CUDA forced but not available, falling back to CPU");
    }

    if config.force_gpu {
        if gpu_available() {
            return BackendDecision {
                backend_type: BackendType::WGPU,
                reason: "Forced WGPU via configuration".to_string(),
                estimated_speedup: estimate_gpu_speedup(neuron_count, time_steps),
            };
        }
        warn!("⚠️  WGPU forced but not available, falling back to CPU");
        return BackendDecision::cpu("WGPU forced but not available, falling back to CPU");
    }

    // Auto-selection: CUDA first, then WGPU, then CPU
    if neuron_count >= config.cuda_neuron_threshold && cuda_available() {
        let speedup = estimate_cuda_speedup(neuron_count, time_steps);
        if speedup > 1.5 {
            return BackendDecision {
                backend_type: BackendType::CUDA,
                reason: format!(
                    "CUDA selected: {} neurons x {} steps (NVIDIA GPU)",
                    neuron_count, time_steps
                ),
                estimated_speedup: speedup,
            };
        }
    }

    if neuron_count >= config.gpu_neuron_threshold && gpu_available() {
        let speedup = estimate_gpu_speedup(neuron_count, time_steps);
        if speedup > 1.5 {
            return BackendDecision {
                backend_type: BackendType::WGPU,
                reason: format!(
                    "WGPU selected: {} neurons x {} steps (cross-platform GPU)",
                    neuron_count, time_steps
                ),
                estimated_speedup: speedup,
            };
        }
    }

    BackendDecision::cpu(format!(
        "CPU selected: {} neurons x {} steps (below GPU thresholds or GPU not available)",
        neuron_count, time_steps
    ))
}

/// Cost model shared by both GPU estimates
///
/// Per launch the host uploads `x` and `v` and downloads spikes, the final
/// potential and (worst case) two local-gradient buffers. The CPU side is a
/// handful of flops per neuron per step.
fn estimate_speedup(
    neuron_count: usize,
    time_steps: usize,
    bandwidth_gbs: f32,
    fixed_overhead_us: f32,
    device_flops: f32,
) -> f32 {
    let neurons = neuron_count as f32;
    let steps = time_steps as f32;

    // x, spike, grad_s_to_h, grad_v_to_h per step; v in and out once
    let transfer_bytes = neurons * 4.0 * (steps * 4.0 + 2.0);
    let transfer_us = (transfer_bytes / (bandwidth_gbs * 1_000_000_000.0)) * 1_000_000.0
        + fixed_overhead_us;

    // ~25 flops per neuron-step with surrogate gradients
    let work = neurons * steps * 25.0;
    // Effective rate; the CPU path is bound by memory traffic, not ALUs
    let cpu_flops = 5_000_000_000.0;
    let cpu_us = work / (cpu_flops / 1_000_000.0);
    let device_us = work / (device_flops / 1_000_000.0);

    let speedup = cpu_us / (transfer_us + device_us);
    speedup.clamp(0.1, 100.0)
}

/// Estimate WGPU speedup (PCIe 4.0, ~200μs submit/readback overhead)
pub fn estimate_gpu_speedup(neuron_count: usize, time_steps: usize) -> f32 {
    estimate_speedup(neuron_count, time_steps, 25.0, 200.0, 10_000_000_000_000.0)
}

/// Estimate CUDA speedup (lower launch overhead than WGPU)
pub fn estimate_cuda_speedup(neuron_count: usize, time_steps: usize) -> f32 {
    estimate_speedup(neuron_count, time_steps, 32.0, 100.0, 19_500_000_000_000.0)
}

/// Construct a backend of the given type
///
/// `Auto` is resolved by the caller (see `DeviceContext::auto`); passing it
/// here selects with a population size of zero, i.e. CPU unless forced.
pub fn create_backend(
    backend_type: BackendType,
    config: &BackendConfig,
    device_ordinal: u32,
) -> Result<Box<dyn ComputeBackend>> {
    match backend_type {
        BackendType::CPU => {
            info!("🖥️  Using CPU backend (rayon)");
            Ok(Box::new(CPUBackend::with_parallel_threshold(
                config.cpu_parallel_threshold,
            )))
        }
        BackendType::WGPU => create_wgpu_backend(device_ordinal),
        BackendType::CUDA => create_cuda_backend(device_ordinal),
        BackendType::Auto => {
            let decision = select_backend(0, 1, config);
            info!(
                "🎯 Backend auto-selection: {} ({})",
                decision.backend_type, decision.reason
            );
            create_backend(decision.backend_type, config, device_ordinal)
        }
    }
}

#[cfg(feature = "gpu")]
fn create_wgpu_backend(device_ordinal: u32) -> Result<Box<dyn ComputeBackend>> {
    info!("🎮 Using WGPU backend (cross-platform GPU)");
    Ok(Box::new(WGPUBackend::new(device_ordinal)?))
}

#[cfg(not(feature = "gpu"))]
fn create_wgpu_backend(_device_ordinal: u32) -> Result<Box<dyn ComputeBackend>> {
    Err(Error::InvalidBackend(
        "WGPU requested but the 'gpu' feature is not enabled".to_string(),
    ))
}

#[cfg(feature = "cuda")]
fn create_cuda_backend(device_ordinal: u32) -> Result<Box<dyn ComputeBackend>> {
    info!("🚀 Using CUDA backend (NVIDIA GPU)");
    Ok(Box::new(CUDABackend::new(device_ordinal)?))
}

#[cfg(not(feature = "cuda"))]
fn create_cuda_backend(_device_ordinal: u32) -> Result<Box<dyn ComputeBackend>> {
    Err(Error::InvalidBackend(
        "CUDA requested but the 'cuda' feature is not enabled".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parse_and_display() {
        assert_eq!("cpu".parse::<BackendType>().unwrap(), BackendType::CPU);
        assert_eq!("GPU".parse::<BackendType>().unwrap(), BackendType::WGPU);
        assert_eq!("Cuda".parse::<BackendType>().unwrap(), BackendType::CUDA);
        assert_eq!("auto".parse::<BackendType>().unwrap(), BackendType::Auto);
        assert!(matches!(
            "tpu".parse::<BackendType>(),
            Err(Error::InvalidBackend(_))
        ));
        assert_eq!(BackendType::WGPU.to_string(), "WGPU");
        assert_eq!(BackendType::default(), BackendType::Auto);
    }

    #[test]
    fn test_speedup_grows_with_population() {
        let small = estimate_gpu_speedup(1_000, 1);
        let large = estimate_gpu_speedup(10_000_000, 16);
        assert!(small < 1.0);
        assert!(large > small);
        assert!(large <= 100.0);
    }

    #[test]
    fn test_cuda_beats_wgpu_estimate() {
        assert!(estimate_cuda_speedup(1_000_000, 8) > estimate_gpu_speedup(1_000_000, 8));
    }

    #[test]
    fn test_create_cpu_backend() {
        let config = BackendConfig {
            cpu_parallel_threshold: 17,
            ..Default::default()
        };
        let backend = create_backend(BackendType::CPU, &config, 0).unwrap();
        assert_eq!(backend.device(), Device::Cpu);
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_wgpu_without_feature_is_rejected() {
        let err = create_backend(BackendType::WGPU, &BackendConfig::default(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidBackend(_)));
    }
}
