// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # LIF Kernel Engine
//!
//! Forward and backward kernels for a hard-reset Leaky Integrate-and-Fire
//! neuron trained with surrogate gradients.
//!
//! ## Architecture
//! - [`ops`]: the six operators (single step / sequence, forward / forward-with-grad / backward)
//! - [`kernel`]: one generic forward and one generic backward launch behind them
//! - [`backend`]: CPU (rayon), WGPU (`gpu` feature) and CUDA (`cuda` feature)
//! - [`DeviceContext`]: the explicit execution context every operator takes
//! - [`tensor`]: dense `f32` buffers with shape, layout and device placement
//!
//! ```no_run
//! use lifgrad_npu_engine::{ops, DeviceContext, Tensor};
//! use lifgrad_npu_neural::types::Device;
//!
//! let ctx = DeviceContext::cpu();
//! let x_seq = Tensor::from_vec(Device::Cpu, &[2, 3], vec![0.4, 1.2, 0.0, 0.8, 0.1, 2.0])?;
//! let v = Tensor::zeros(Device::Cpu, &[3]);
//! let out = ops::sequence_forward(&ctx, &x_seq.view(), &v.view(), 1.0, 0.0, 0.5)?;
//! assert_eq!(out.spike_seq.shape(), &[2, 3]);
//! # Ok::<(), lifgrad_npu_neural::LifError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod backend;
pub mod device_context;
pub mod kernel;
pub mod ops;
pub mod tensor;
pub mod validation;

pub use backend::{
    create_backend, is_cuda_available, is_gpu_available, select_backend, BackendConfig,
    BackendDecision, BackendType, CPUBackend, ComputeBackend,
};
#[cfg(feature = "cuda")]
pub use backend::CUDABackend;
#[cfg(feature = "gpu")]
pub use backend::WGPUBackend;

pub use device_context::DeviceContext;
pub use kernel::{
    BackwardBuffers, BackwardLaunch, ForwardBuffers, ForwardLaunch, KernelTiming, KernelVariant,
    LocalGradientBuffers,
};
pub use ops::{
    sequence_backward, sequence_forward, sequence_forward_with_grad, step_backward, step_forward,
    step_forward_with_grad, SequenceBackward, SequenceForward, SequenceForwardWithGrad,
    StepBackward, StepForward, StepForwardWithGrad,
};
pub use tensor::{Tensor, TensorRef};

pub use lifgrad_npu_neural::{
    Device, LifError, LifParameters, Result, SurrogateFunction, SurrogateGradient,
};
