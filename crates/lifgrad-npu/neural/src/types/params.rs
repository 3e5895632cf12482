// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scalar parameters shared read-only by every neuron of one call

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::surrogate::SurrogateFunction;

/// Hard-reset LIF parameters
///
/// Immutable for the duration of one call. Not validated by the kernels:
/// a pathological `reciprocal_tau` simply propagates through the arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct LifParameters {
    /// Firing threshold (v_th)
    pub v_threshold: f32,

    /// Potential written on spike (hard reset)
    pub v_reset: f32,

    /// 1 / tau, fraction of (x - (v - v_reset)) charged per step
    pub reciprocal_tau: f32,
}

impl LifParameters {
    /// Create LIF parameters with custom values
    pub fn with_values(v_threshold: f32, v_reset: f32, reciprocal_tau: f32) -> Self {
        Self {
            v_threshold,
            v_reset,
            reciprocal_tau,
        }
    }

    /// Create parameters from a membrane time constant instead of its reciprocal
    pub fn from_tau(v_threshold: f32, v_reset: f32, tau: f32) -> Self {
        Self::with_values(v_threshold, v_reset, 1.0 / tau)
    }

    /// `1 - reciprocal_tau`, the potential-to-potential gradient factor
    #[inline(always)]
    pub fn one_minus_reciprocal_tau(&self) -> f32 {
        1.0 - self.reciprocal_tau
    }
}

impl Default for LifParameters {
    fn default() -> Self {
        Self {
            v_threshold: 1.0,
            v_reset: 0.0,
            reciprocal_tau: 0.5, // tau = 2
        }
    }
}

/// Gradient capability of a forward launch
///
/// Present on the with-grad variants only; selects the surrogate derivative
/// and whether the reset branch joins the potential-gradient path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct SurrogateGradient {
    pub function: SurrogateFunction,

    /// Sharpness of the surrogate
    pub alpha: f32,

    /// Treat the reset as a graph boundary in grad_v_to_h
    pub detach_reset: bool,
}

impl SurrogateGradient {
    pub fn new(function: SurrogateFunction, alpha: f32, detach_reset: bool) -> Self {
        Self {
            function,
            alpha,
            detach_reset,
        }
    }
}

impl Default for SurrogateGradient {
    fn default() -> Self {
        Self {
            function: SurrogateFunction::ATan,
            alpha: 2.0,
            detach_reset: false,
        }
    }
}
