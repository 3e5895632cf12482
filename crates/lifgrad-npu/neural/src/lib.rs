// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # LIF Neural Computation (Platform-Agnostic)
//!
//! All per-neuron math for the hard-reset LIF kernels lives here, with no
//! knowledge of buffers, devices or backends:
//! - **Types**: parameters, devices, errors
//! - **Surrogate**: differentiable stand-ins for the spike step function
//! - **Models**: the hard-reset LIF charge/fire/reset rule and its local gradients
//!
//! Backends (CPU, WGPU, CUDA) in `lifgrad-npu-engine` all reproduce exactly
//! the functions in [`models::lif`]; the CPU backend calls them directly.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod types;

// Surrogate derivative dispatch
pub mod surrogate;

// Neuron models
pub mod models;

// Re-export types
pub use types::{
    Device, LifError, LifParameters, Result, SurrogateGradient,
};

pub use surrogate::SurrogateFunction;

pub use models::lif::{
    backward_neuron, charge, forward_neuron, forward_neuron_with_grad, local_gradients,
    LocalGradient, NeuronBackward, NeuronStep,
};
