// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Hard-Reset LIF (Leaky Integrate-and-Fire) Neuron
//!
//! ## Model Dynamics
//!
//! ```text
//! Charging (pre-activation):
//!     h = v + r × (x − (v − v_reset))
//!
//!     Where:
//!     - x = input current
//!     - v = previous membrane potential
//!     - r = reciprocal_tau = 1 / tau
//!
//! Firing:
//!     s = (h ≥ v_th) ? 1 : 0
//!
//! Hard reset:
//!     v_next = s ? v_reset : h
//!
//! Local gradients (forward-with-grad):
//!     ∂s/∂h      = g(h − v_th, α)                    (surrogate)
//!     ∂v_next/∂h = (1 − s)                           (detach_reset)
//!                = (1 − s) + (v_reset − h) × ∂s/∂h  (otherwise)
//!
//! Backward (one step):
//!     grad_h = grad_s × ∂s/∂h + grad_v_next × ∂v_next/∂h
//!     grad_x = grad_h × r
//!     grad_v = grad_h × (1 − r)
//! ```
//!
//! These functions are the reference every backend must reproduce bit for bit
//! on the CPU and within float tolerance on GPUs.

use crate::types::{LifParameters, SurrogateGradient};

/// Output of one neuron for one time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeuronStep {
    /// Pre-activation (charged potential before reset)
    pub h: f32,
    /// 0.0 or 1.0
    pub spike: f32,
    pub v_next: f32,
}

/// Local derivatives stashed by forward-with-grad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalGradient {
    pub grad_s_to_h: f32,
    pub grad_v_to_h: f32,
}

/// Gradients flowing out of one neuron for one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeuronBackward {
    pub grad_x: f32,
    pub grad_v: f32,
}

/// Charge the membrane: `h = v + r × (x − (v − v_reset))`
#[inline(always)]
pub fn charge(x: f32, v: f32, params: &LifParameters) -> f32 {
    v + params.reciprocal_tau * (x - (v - params.v_reset))
}

/// Charge, fire and hard-reset one neuron
#[inline(always)]
pub fn forward_neuron(x: f32, v: f32, params: &LifParameters) -> NeuronStep {
    let h = charge(x, v, params);
    let fired = h >= params.v_threshold;
    NeuronStep {
        h,
        spike: if fired { 1.0 } else { 0.0 },
        v_next: if fired { params.v_reset } else { h },
    }
}

/// Local derivatives of a completed step
#[inline(always)]
pub fn local_gradients(
    step: &NeuronStep,
    params: &LifParameters,
    grad: &SurrogateGradient,
) -> LocalGradient {
    let grad_s_to_h = grad
        .function
        .derivative(step.h - params.v_threshold, grad.alpha);
    let not_fired = 1.0 - step.spike;
    let grad_v_to_h = if grad.detach_reset {
        not_fired
    } else {
        not_fired + (params.v_reset - step.h) * grad_s_to_h
    };
    LocalGradient {
        grad_s_to_h,
        grad_v_to_h,
    }
}

/// Forward step plus the local derivatives needed by backward
#[inline(always)]
pub fn forward_neuron_with_grad(
    x: f32,
    v: f32,
    params: &LifParameters,
    grad: &SurrogateGradient,
) -> (NeuronStep, LocalGradient) {
    let step = forward_neuron(x, v, params);
    let local = local_gradients(&step, params, grad);
    (step, local)
}

/// Combine upstream gradients with stashed local derivatives
#[inline(always)]
pub fn backward_neuron(
    grad_spike: f32,
    grad_v_next: f32,
    local: LocalGradient,
    reciprocal_tau: f32,
) -> NeuronBackward {
    let grad_h = grad_spike * local.grad_s_to_h + grad_v_next * local.grad_v_to_h;
    NeuronBackward {
        grad_x: grad_h * reciprocal_tau,
        grad_v: grad_h * (1.0 - reciprocal_tau),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surrogate::SurrogateFunction;

    fn unit_params() -> LifParameters {
        LifParameters::with_values(1.0, 0.0, 1.0)
    }

    #[test]
    fn test_fires_at_threshold() {
        let step = forward_neuron(1.0, 0.0, &unit_params());
        assert_eq!(step.h, 1.0);
        assert_eq!(step.spike, 1.0);
        assert_eq!(step.v_next, 0.0);
    }

    #[test]
    fn test_below_threshold_keeps_charge() {
        let step = forward_neuron(0.3, 0.0, &unit_params());
        assert_eq!(step.spike, 0.0);
        assert!((step.v_next - 0.3).abs() < 1e-7);
        assert_eq!(step.v_next, step.h);
    }

    #[test]
    fn test_leak_toward_reset() {
        // tau = 2: half of the gap between input and (v - v_reset) is charged
        let params = LifParameters::with_values(10.0, 0.0, 0.5);
        let step = forward_neuron(0.0, 1.0, &params);
        // Expected: 1.0 + 0.5 * (0.0 - 1.0) = 0.5
        assert!((step.h - 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_hard_reset_discards_overshoot() {
        let params = LifParameters::with_values(1.0, -0.2, 1.0);
        let step = forward_neuron(5.0, 0.0, &params);
        assert_eq!(step.spike, 1.0);
        assert_eq!(step.v_next, -0.2);
    }

    #[test]
    fn test_nan_input_does_not_fire() {
        // NaN comparisons are false: no spike, NaN propagates to v_next
        let step = forward_neuron(f32::NAN, 0.0, &unit_params());
        assert_eq!(step.spike, 0.0);
        assert!(step.v_next.is_nan());
    }

    #[test]
    fn test_local_gradients_detach_reset() {
        let params = unit_params();
        let attached = SurrogateGradient::new(SurrogateFunction::ATan, 2.0, false);
        let detached = SurrogateGradient::new(SurrogateFunction::ATan, 2.0, true);

        let (step, g_attached) = forward_neuron_with_grad(1.5, 0.0, &params, &attached);
        let (_, g_detached) = forward_neuron_with_grad(1.5, 0.0, &params, &detached);

        assert_eq!(step.spike, 1.0);
        assert_eq!(g_attached.grad_s_to_h, g_detached.grad_s_to_h);
        assert_eq!(g_detached.grad_v_to_h, 0.0);
        // (1 - 1) + (0 - 1.5) * g(0.5)
        let expected = -1.5 * SurrogateFunction::ATan.derivative(0.5, 2.0);
        assert!((g_attached.grad_v_to_h - expected).abs() < 1e-6);
    }

    #[test]
    fn test_local_gradients_without_spike() {
        let params = unit_params();
        let grad = SurrogateGradient::new(SurrogateFunction::Sigmoid, 4.0, false);
        let (step, local) = forward_neuron_with_grad(0.3, 0.0, &params, &grad);
        assert_eq!(step.spike, 0.0);
        let g = SurrogateFunction::Sigmoid.derivative(0.3 - 1.0, 4.0);
        assert!((local.grad_s_to_h - g).abs() < 1e-7);
        assert!((local.grad_v_to_h - (1.0 + (0.0 - 0.3) * g)).abs() < 1e-6);
    }

    #[test]
    fn test_backward_linearity() {
        let local = LocalGradient {
            grad_s_to_h: 0.4,
            grad_v_to_h: 0.7,
        };
        let out = backward_neuron(2.0, -1.0, local, 0.25);
        let grad_h = 2.0 * 0.4 + -1.0 * 0.7;
        assert!((out.grad_x + out.grad_v - grad_h).abs() < 1e-6);
        assert!((out.grad_x - grad_h * 0.25).abs() < 1e-7);
        assert!((out.grad_v - grad_h * 0.75).abs() < 1e-7);
    }

    #[test]
    fn test_backward_matches_finite_difference_of_charge() {
        // With the reset path detached and no spike, v_next = h; check dh/dx and dh/dv
        let params = LifParameters::with_values(10.0, 0.1, 0.3);
        let local = LocalGradient {
            grad_s_to_h: 0.0,
            grad_v_to_h: 1.0,
        };
        let out = backward_neuron(0.0, 1.0, local, params.reciprocal_tau);

        let eps = 1e-3f32;
        let (x, v) = (0.4f32, 0.2f32);
        let dh_dx = (charge(x + eps, v, &params) - charge(x - eps, v, &params)) / (2.0 * eps);
        let dh_dv = (charge(x, v + eps, &params) - charge(x, v - eps, &params)) / (2.0 * eps);
        assert!((out.grad_x - dh_dx).abs() < 1e-3);
        assert!((out.grad_v - dh_dv).abs() < 1e-3);
    }
}
