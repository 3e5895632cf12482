// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Kernel Launch Descriptors
//!
//! One forward kernel and one backward kernel serve all six operators:
//!
//! | operator                     | time steps | gradient capability |
//! |------------------------------|------------|---------------------|
//! | `step_forward`               | 1          | none                |
//! | `step_forward_with_grad`     | 1          | surrogate           |
//! | `sequence_forward`           | T          | none                |
//! | `sequence_forward_with_grad` | T          | surrogate           |
//! | `step_backward`              | 1          | n/a                 |
//! | `sequence_backward`          | T          | n/a                 |
//!
//! Buffers are flat, time-major: element `(t, i)` lives at `t * N + i`.
//! Backends receive launches whose buffer lengths have already been checked.

use std::fmt;
use std::sync::OnceLock;

use lifgrad_npu_neural::types::{LifError, LifParameters, Result, SurrogateGradient};

/// Gate for per-step kernel tracing (`LIFGRAD_TRACE_KERNEL=1`)
pub fn kernel_trace_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("LIFGRAD_TRACE_KERNEL")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

fn check_len(name: &'static str, buffer: &[f32], expected: usize) -> Result<()> {
    if buffer.len() != expected {
        return Err(LifError::ShapeMismatch {
            name,
            expected: vec![expected],
            actual: vec![buffer.len()],
        });
    }
    Ok(())
}

/// Which flavour of kernel a launch runs (for logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    Forward { time_steps: usize, with_grad: bool },
    Backward { time_steps: usize },
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            KernelVariant::Forward {
                time_steps,
                with_grad,
            } => {
                let base = if time_steps == 1 { "step" } else { "fptt" };
                let grad = if with_grad { "+grad" } else { "" };
                write!(f, "{}{}[T={}]", base, grad, time_steps)
            }
            KernelVariant::Backward { time_steps } => {
                let base = if time_steps == 1 { "step_backward" } else { "bptt" };
                write!(f, "{}[T={}]", base, time_steps)
            }
        }
    }
}

/// Forward kernel input: `x` is `[T, N]`, `v` is `[N]`
#[derive(Debug, Clone, Copy)]
pub struct ForwardLaunch<'a> {
    x: &'a [f32],
    v: &'a [f32],
    neuron_count: usize,
    time_steps: usize,
    params: LifParameters,
    gradient: Option<SurrogateGradient>,
}

impl<'a> ForwardLaunch<'a> {
    /// Describe a forward launch; `gradient = Some(..)` also produces local gradients
    pub fn new(
        x: &'a [f32],
        v: &'a [f32],
        time_steps: usize,
        params: LifParameters,
        gradient: Option<SurrogateGradient>,
    ) -> Result<Self> {
        if time_steps == 0 {
            return Err(LifError::EmptySequence("x_seq"));
        }
        let neuron_count = v.len();
        check_len("x_seq", x, neuron_count * time_steps)?;
        Ok(Self {
            x,
            v,
            neuron_count,
            time_steps,
            params,
            gradient,
        })
    }

    pub fn x(&self) -> &'a [f32] {
        self.x
    }

    pub fn v(&self) -> &'a [f32] {
        self.v
    }

    pub fn neuron_count(&self) -> usize {
        self.neuron_count
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn params(&self) -> &LifParameters {
        &self.params
    }

    pub fn gradient(&self) -> Option<&SurrogateGradient> {
        self.gradient.as_ref()
    }

    /// Total elements in each per-step output (`T * N`)
    pub fn element_count(&self) -> usize {
        self.neuron_count * self.time_steps
    }

    pub fn variant(&self) -> KernelVariant {
        KernelVariant::Forward {
            time_steps: self.time_steps,
            with_grad: self.gradient.is_some(),
        }
    }
}

/// Backward kernel input: per-step buffers are `[T, N]`, `grad_v_next` is `[N]`
#[derive(Debug, Clone, Copy)]
pub struct BackwardLaunch<'a> {
    grad_spike: &'a [f32],
    grad_v_next: &'a [f32],
    grad_s_to_h: &'a [f32],
    grad_v_to_h: &'a [f32],
    neuron_count: usize,
    time_steps: usize,
    reciprocal_tau: f32,
}

impl<'a> BackwardLaunch<'a> {
    pub fn new(
        grad_spike: &'a [f32],
        grad_v_next: &'a [f32],
        grad_s_to_h: &'a [f32],
        grad_v_to_h: &'a [f32],
        time_steps: usize,
        reciprocal_tau: f32,
    ) -> Result<Self> {
        if time_steps == 0 {
            return Err(LifError::EmptySequence("grad_spike_seq"));
        }
        let neuron_count = grad_v_next.len();
        let elements = neuron_count * time_steps;
        check_len("grad_spike", grad_spike, elements)?;
        check_len("grad_s_to_h", grad_s_to_h, elements)?;
        check_len("grad_v_to_h", grad_v_to_h, elements)?;
        Ok(Self {
            grad_spike,
            grad_v_next,
            grad_s_to_h,
            grad_v_to_h,
            neuron_count,
            time_steps,
            reciprocal_tau,
        })
    }

    pub fn grad_spike(&self) -> &'a [f32] {
        self.grad_spike
    }

    pub fn grad_v_next(&self) -> &'a [f32] {
        self.grad_v_next
    }

    pub fn grad_s_to_h(&self) -> &'a [f32] {
        self.grad_s_to_h
    }

    pub fn grad_v_to_h(&self) -> &'a [f32] {
        self.grad_v_to_h
    }

    pub fn neuron_count(&self) -> usize {
        self.neuron_count
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn reciprocal_tau(&self) -> f32 {
        self.reciprocal_tau
    }

    pub fn element_count(&self) -> usize {
        self.neuron_count * self.time_steps
    }

    pub fn variant(&self) -> KernelVariant {
        KernelVariant::Backward {
            time_steps: self.time_steps,
        }
    }
}

/// Detailed timing breakdown for one launch
#[derive(Debug, Clone, Default)]
pub struct KernelTiming {
    /// Time spent in the kernel itself (μs)
    pub compute_us: f64,

    /// Host/device copies (GPU only, μs)
    pub transfer_us: f64,

    /// Total launch time (μs)
    pub total_us: f64,
}

/// `grad_s_to_h` / `grad_v_to_h`, both `[T, N]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalGradientBuffers {
    pub grad_s_to_h: Vec<f32>,
    pub grad_v_to_h: Vec<f32>,
}

/// Forward kernel output
#[derive(Debug, Clone, Default)]
pub struct ForwardBuffers {
    /// `[T, N]`, each element exactly 0.0 or 1.0
    pub spike: Vec<f32>,
    /// `[N]`, potential after the last step
    pub v_final: Vec<f32>,
    /// Present iff the launch carried a surrogate gradient
    pub local_gradients: Option<LocalGradientBuffers>,
    pub timing: KernelTiming,
}

impl ForwardBuffers {
    /// Outputs of a launch with no neurons
    pub fn empty(launch: &ForwardLaunch<'_>) -> Self {
        Self {
            local_gradients: launch.gradient().map(|_| LocalGradientBuffers::default()),
            ..Default::default()
        }
    }
}

/// Backward kernel output
#[derive(Debug, Clone, Default)]
pub struct BackwardBuffers {
    /// `[T, N]`
    pub grad_x: Vec<f32>,
    /// `[N]`, gradient w.r.t. the potential before the first step
    pub grad_v: Vec<f32>,
    pub timing: KernelTiming,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_launch_checks_lengths() {
        let x = [0.0f32; 6];
        let v = [0.0f32; 3];
        let launch = ForwardLaunch::new(&x, &v, 2, LifParameters::default(), None).unwrap();
        assert_eq!(launch.neuron_count(), 3);
        assert_eq!(launch.element_count(), 6);

        let err = ForwardLaunch::new(&x, &v, 3, LifParameters::default(), None).unwrap_err();
        assert!(matches!(err, LifError::ShapeMismatch { name: "x_seq", .. }));

        let err = ForwardLaunch::new(&[], &[], 0, LifParameters::default(), None).unwrap_err();
        assert_eq!(err, LifError::EmptySequence("x_seq"));
    }

    #[test]
    fn test_backward_launch_checks_lengths() {
        let seq = [0.0f32; 4];
        let v = [0.0f32; 2];
        assert!(BackwardLaunch::new(&seq, &v, &seq, &seq, 2, 0.5).is_ok());
        let err = BackwardLaunch::new(&seq, &v, &seq[..3], &seq, 2, 0.5).unwrap_err();
        assert!(matches!(err, LifError::ShapeMismatch { name: "grad_s_to_h", .. }));
    }

    #[test]
    fn test_variant_display() {
        let grad = SurrogateGradient::default();
        let x = [0.0f32; 4];
        let v = [0.0f32; 1];
        let step = ForwardLaunch::new(&x[..1], &v, 1, LifParameters::default(), None).unwrap();
        let fptt = ForwardLaunch::new(&x, &v, 4, LifParameters::default(), Some(grad)).unwrap();
        assert_eq!(step.variant().to_string(), "step[T=1]");
        assert_eq!(fptt.variant().to_string(), "fptt+grad[T=4]");
        assert_eq!(
            KernelVariant::Backward { time_steps: 4 }.to_string(),
            "bptt[T=4]"
        );
    }

    #[test]
    fn test_empty_forward_buffers_keep_gradient_slot() {
        let gradient = Some(SurrogateGradient::default());
        let launch = ForwardLaunch::new(&[], &[], 3, LifParameters::default(), gradient).unwrap();
        let out = ForwardBuffers::empty(&launch);
        assert!(out.spike.is_empty());
        assert!(out.local_gradients.is_some());
    }
}
