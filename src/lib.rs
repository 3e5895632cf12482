// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # lifgrad
//!
//! Forward and backward kernels for a hard-reset Leaky Integrate-and-Fire
//! neuron trained with surrogate gradients, for use as the custom operator
//! behind an autograd graph.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! lifgrad = "0.1"                                  # CPU (rayon)
//! lifgrad = { version = "0.1", features = ["gpu"] } # + WGPU
//! ```
//!
//! ## Feature Flags
//! - **`gpu`**: WGPU backend (Vulkan/Metal/DirectX)
//! - **`cuda`**: CUDA backend (NVIDIA, kernels compiled with NVRTC)
//! - **`file-logging`**: JSON log files for the `lifgrad-selfcheck` binary
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lifgrad::prelude::*;
//!
//! let ctx = DeviceContext::cpu();
//! let x_seq = Tensor::from_vec(Device::Cpu, &[4, 2], vec![0.6; 8])?;
//! let v = Tensor::zeros(Device::Cpu, &[2]);
//!
//! let fwd = ops::sequence_forward_with_grad(
//!     &ctx, &x_seq.view(), &v.view(),
//!     1.0, 0.0,                       // v_threshold, v_reset
//!     2.0, false, SurrogateFunction::ATan,
//!     0.5,                            // 1 / tau
//! )?;
//!
//! let grad_spike = Tensor::from_vec(Device::Cpu, &[4, 2], vec![1.0; 8])?;
//! let grad_v_final = Tensor::zeros(Device::Cpu, &[2]);
//! let bwd = ops::sequence_backward(
//!     &ctx, &grad_spike.view(), &grad_v_final.view(),
//!     &fwd.grad_s_to_h_seq.view(), &fwd.grad_v_to_h_seq.view(),
//!     0.5,
//! )?;
//! assert_eq!(bwd.grad_x_seq.shape(), &[4, 2]);
//! # Ok::<(), LifError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use lifgrad_config as config;
pub use lifgrad_npu_engine as engine;
pub use lifgrad_npu_neural as neural;
pub use lifgrad_observability as observability;

pub use lifgrad_npu_engine::ops;

use lifgrad_config::LifgradConfig;
use lifgrad_npu_engine::{BackendConfig, BackendType};
use lifgrad_npu_neural::{LifParameters, Result, SurrogateFunction, SurrogateGradient};

/// Commonly used items
pub mod prelude {
    pub use lifgrad_npu_engine::{
        ops, BackendConfig, BackendType, DeviceContext, Tensor, TensorRef,
    };
    pub use lifgrad_npu_neural::{
        Device, LifError, LifParameters, SurrogateFunction, SurrogateGradient,
    };
}

/// Backend choice resolved from the `[backend]` section
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub backend_type: BackendType,
    pub config: BackendConfig,
    pub device_ordinal: u32,
}

/// Map the `[backend]` section onto the engine's backend settings
///
/// # Errors
///
/// `InvalidBackend` for an unknown backend name
pub fn backend_settings(config: &LifgradConfig) -> Result<BackendSettings> {
    let section = &config.backend;
    Ok(BackendSettings {
        backend_type: section.backend.parse()?,
        config: BackendConfig {
            cpu_parallel_threshold: section.cpu_parallel_threshold,
            gpu_neuron_threshold: section.gpu_neuron_threshold,
            cuda_neuron_threshold: section.cuda_neuron_threshold,
            force_cpu: section.force_cpu,
            force_gpu: section.force_gpu,
            force_cuda: section.force_cuda,
        },
        device_ordinal: section.device_ordinal,
    })
}

/// Map the `[neuron]` section onto kernel parameters and surrogate settings
///
/// # Errors
///
/// `InvalidSurrogate` for an unknown surrogate name
pub fn neuron_settings(config: &LifgradConfig) -> Result<(LifParameters, SurrogateGradient)> {
    let neuron = &config.neuron;
    let params = LifParameters::with_values(
        neuron.v_threshold,
        neuron.v_reset,
        neuron.reciprocal_tau(),
    );
    let function: SurrogateFunction = neuron.surrogate.parse()?;
    Ok((
        params,
        SurrogateGradient::new(function, neuron.alpha, neuron.detach_reset),
    ))
}

/// Map the `[system]` and `[logging]` sections onto the logging setup
pub fn logging_config(config: &LifgradConfig) -> lifgrad_observability::LoggingConfig {
    lifgrad_observability::LoggingConfig {
        level: config.system.log_level.clone(),
        format: config.logging.format.parse().unwrap_or_default(),
        file_output: config.logging.file_output,
        log_dir: config.logging.log_dir.clone(),
        ..Default::default()
    }
}
