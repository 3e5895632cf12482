// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # LIF Operators
//!
//! The six entry points an autograd graph calls. All share one argument
//! order: context, tensors, then scalars in the order
//! `v_threshold, v_reset, [alpha, detach_reset, surrogate,] reciprocal_tau`.
//!
//! ```text
//! step_forward                (x, v)                      -> spike, v_next
//! step_forward_with_grad      (x, v)                      -> spike, v_next, grad_s_to_h, grad_v_to_h
//! step_backward               (grad_spike, grad_v_next,
//!                              grad_s_to_h, grad_v_to_h)  -> grad_x, grad_v
//! sequence_forward            (x_seq, v)                  -> spike_seq, v_final
//! sequence_forward_with_grad  (x_seq, v)                  -> spike_seq, v_final, grad_s_to_h_seq, grad_v_to_h_seq
//! sequence_backward           (grad_spike_seq, grad_v_final,
//!                              grad_s_to_h_seq,
//!                              grad_v_to_h_seq)           -> grad_x_seq, grad_v_initial
//! ```
//!
//! Single-step operands all share one shape. Sequence operands are
//! `[T, ...rest]` with `T >= 1`, and the state operand has shape `rest`.
//! Each call checks devices, then layout, then shapes, and fails before any
//! kernel runs. Outputs are fresh tensors on the context's device.

use lifgrad_npu_neural::types::{LifError, LifParameters, Result, SurrogateGradient};
use lifgrad_npu_neural::SurrogateFunction;

use crate::device_context::DeviceContext;
use crate::kernel::{BackwardLaunch, ForwardLaunch};
use crate::tensor::{Tensor, TensorRef};
use crate::validation::{
    check_contiguous, check_devices, check_shape, contiguous_slice, split_time_axis, Operand,
};

/// Output of [`step_forward`]
#[derive(Debug, Clone, PartialEq)]
pub struct StepForward {
    pub spike: Tensor,
    pub v_next: Tensor,
}

/// Output of [`step_forward_with_grad`]
#[derive(Debug, Clone, PartialEq)]
pub struct StepForwardWithGrad {
    pub spike: Tensor,
    pub v_next: Tensor,
    pub grad_s_to_h: Tensor,
    pub grad_v_to_h: Tensor,
}

/// Output of [`step_backward`]
#[derive(Debug, Clone, PartialEq)]
pub struct StepBackward {
    pub grad_x: Tensor,
    pub grad_v: Tensor,
}

/// Output of [`sequence_forward`]
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceForward {
    pub spike_seq: Tensor,
    pub v_final: Tensor,
}

/// Output of [`sequence_forward_with_grad`]
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceForwardWithGrad {
    pub spike_seq: Tensor,
    pub v_final: Tensor,
    pub grad_s_to_h_seq: Tensor,
    pub grad_v_to_h_seq: Tensor,
}

/// Output of [`sequence_backward`]
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceBackward {
    pub grad_x_seq: Tensor,
    pub grad_v_initial: Tensor,
}

/// Operand names for one forward flavour
struct ForwardNames {
    input: &'static str,
    sequence: bool,
}

const STEP: ForwardNames = ForwardNames {
    input: "x",
    sequence: false,
};
const SEQUENCE: ForwardNames = ForwardNames {
    input: "x_seq",
    sequence: true,
};

/// Operand names for one backward flavour
struct BackwardNames {
    grad_spike: &'static str,
    grad_v: &'static str,
    grad_s_to_h: &'static str,
    grad_v_to_h: &'static str,
    sequence: bool,
}

const STEP_BACKWARD: BackwardNames = BackwardNames {
    grad_spike: "grad_spike",
    grad_v: "grad_v_next",
    grad_s_to_h: "grad_s_to_h",
    grad_v_to_h: "grad_v_to_h",
    sequence: false,
};
const SEQUENCE_BACKWARD: BackwardNames = BackwardNames {
    grad_spike: "grad_spike_seq",
    grad_v: "grad_v_final",
    grad_s_to_h: "grad_s_to_h_seq",
    grad_v_to_h: "grad_v_to_h_seq",
    sequence: true,
};

struct ForwardTensors {
    spike: Tensor,
    v_final: Tensor,
    local: Option<(Tensor, Tensor)>,
}

/// Validate, launch and shape the outputs of any forward flavour
fn run_forward(
    ctx: &DeviceContext,
    names: &ForwardNames,
    x: &TensorRef<'_>,
    v: &TensorRef<'_>,
    params: LifParameters,
    gradient: Option<SurrogateGradient>,
) -> Result<ForwardTensors> {
    let operands = [Operand::of(names.input, x), Operand::of("v", v)];
    check_devices(ctx.device(), &operands)?;
    check_contiguous(&operands)?;

    let time_steps = if names.sequence {
        let (time_steps, rest) = split_time_axis(names.input, x)?;
        check_shape("v", v, rest)?;
        time_steps
    } else {
        check_shape("v", v, x.shape())?;
        1
    };

    let launch = ForwardLaunch::new(
        contiguous_slice(names.input, x)?,
        contiguous_slice("v", v)?,
        time_steps,
        params,
        gradient,
    )?;
    let out = ctx.forward(&launch)?;

    let device = ctx.device();
    let local = match out.local_gradients {
        Some(local) => Some((
            Tensor::from_vec(device, x.shape(), local.grad_s_to_h)?,
            Tensor::from_vec(device, x.shape(), local.grad_v_to_h)?,
        )),
        None => None,
    };
    Ok(ForwardTensors {
        spike: Tensor::from_vec(device, x.shape(), out.spike)?,
        v_final: Tensor::from_vec(device, v.shape(), out.v_final)?,
        local,
    })
}

/// Local gradients a with-grad launch must have produced
fn local_gradients(
    ctx: &DeviceContext,
    local: Option<(Tensor, Tensor)>,
) -> Result<(Tensor, Tensor)> {
    local.ok_or_else(|| {
        LifError::ComputationError(format!(
            "{} backend returned no local gradients for a with-grad launch",
            ctx.backend_name()
        ))
    })
}

/// Validate, launch and shape the outputs of either backward flavour
fn run_backward(
    ctx: &DeviceContext,
    names: &BackwardNames,
    grad_spike: &TensorRef<'_>,
    grad_v: &TensorRef<'_>,
    grad_s_to_h: &TensorRef<'_>,
    grad_v_to_h: &TensorRef<'_>,
    reciprocal_tau: f32,
) -> Result<(Tensor, Tensor)> {
    let operands = [
        Operand::of(names.grad_spike, grad_spike),
        Operand::of(names.grad_v, grad_v),
        Operand::of(names.grad_s_to_h, grad_s_to_h),
        Operand::of(names.grad_v_to_h, grad_v_to_h),
    ];
    check_devices(ctx.device(), &operands)?;
    check_contiguous(&operands)?;

    let step_shape = grad_spike.shape();
    let time_steps = if names.sequence {
        let (time_steps, rest) = split_time_axis(names.grad_spike, grad_spike)?;
        check_shape(names.grad_v, grad_v, rest)?;
        time_steps
    } else {
        check_shape(names.grad_v, grad_v, step_shape)?;
        1
    };
    check_shape(names.grad_s_to_h, grad_s_to_h, step_shape)?;
    check_shape(names.grad_v_to_h, grad_v_to_h, step_shape)?;

    let launch = BackwardLaunch::new(
        contiguous_slice(names.grad_spike, grad_spike)?,
        contiguous_slice(names.grad_v, grad_v)?,
        contiguous_slice(names.grad_s_to_h, grad_s_to_h)?,
        contiguous_slice(names.grad_v_to_h, grad_v_to_h)?,
        time_steps,
        reciprocal_tau,
    )?;
    let out = ctx.backward(&launch)?;

    let device = ctx.device();
    Ok((
        Tensor::from_vec(device, step_shape, out.grad_x)?,
        Tensor::from_vec(device, grad_v.shape(), out.grad_v)?,
    ))
}

/// Charge, fire and hard-reset every neuron for one step
pub fn step_forward(
    ctx: &DeviceContext,
    x: &TensorRef<'_>,
    v: &TensorRef<'_>,
    v_threshold: f32,
    v_reset: f32,
    reciprocal_tau: f32,
) -> Result<StepForward> {
    let params = LifParameters::with_values(v_threshold, v_reset, reciprocal_tau);
    let out = run_forward(ctx, &STEP, x, v, params, None)?;
    Ok(StepForward {
        spike: out.spike,
        v_next: out.v_final,
    })
}

/// [`step_forward`] plus the local derivatives [`step_backward`] consumes
#[allow(clippy::too_many_arguments)]
pub fn step_forward_with_grad(
    ctx: &DeviceContext,
    x: &TensorRef<'_>,
    v: &TensorRef<'_>,
    v_threshold: f32,
    v_reset: f32,
    alpha: f32,
    detach_reset: bool,
    surrogate: SurrogateFunction,
    reciprocal_tau: f32,
) -> Result<StepForwardWithGrad> {
    let params = LifParameters::with_values(v_threshold, v_reset, reciprocal_tau);
    let gradient = SurrogateGradient::new(surrogate, alpha, detach_reset);
    let out = run_forward(ctx, &STEP, x, v, params, Some(gradient))?;
    let (grad_s_to_h, grad_v_to_h) = local_gradients(ctx, out.local)?;
    Ok(StepForwardWithGrad {
        spike: out.spike,
        v_next: out.v_final,
        grad_s_to_h,
        grad_v_to_h,
    })
}

/// Gradients w.r.t. input current and previous potential for one step
pub fn step_backward(
    ctx: &DeviceContext,
    grad_spike: &TensorRef<'_>,
    grad_v_next: &TensorRef<'_>,
    grad_s_to_h: &TensorRef<'_>,
    grad_v_to_h: &TensorRef<'_>,
    reciprocal_tau: f32,
) -> Result<StepBackward> {
    let (grad_x, grad_v) = run_backward(
        ctx,
        &STEP_BACKWARD,
        grad_spike,
        grad_v_next,
        grad_s_to_h,
        grad_v_to_h,
        reciprocal_tau,
    )?;
    Ok(StepBackward { grad_x, grad_v })
}

/// Forward pass through time: `x_seq` is `[T, ...]`, `v` the initial potential
pub fn sequence_forward(
    ctx: &DeviceContext,
    x_seq: &TensorRef<'_>,
    v: &TensorRef<'_>,
    v_threshold: f32,
    v_reset: f32,
    reciprocal_tau: f32,
) -> Result<SequenceForward> {
    let params = LifParameters::with_values(v_threshold, v_reset, reciprocal_tau);
    let out = run_forward(ctx, &SEQUENCE, x_seq, v, params, None)?;
    Ok(SequenceForward {
        spike_seq: out.spike,
        v_final: out.v_final,
    })
}

/// [`sequence_forward`] plus per-step local derivatives for [`sequence_backward`]
#[allow(clippy::too_many_arguments)]
pub fn sequence_forward_with_grad(
    ctx: &DeviceContext,
    x_seq: &TensorRef<'_>,
    v: &TensorRef<'_>,
    v_threshold: f32,
    v_reset: f32,
    alpha: f32,
    detach_reset: bool,
    surrogate: SurrogateFunction,
    reciprocal_tau: f32,
) -> Result<SequenceForwardWithGrad> {
    let params = LifParameters::with_values(v_threshold, v_reset, reciprocal_tau);
    let gradient = SurrogateGradient::new(surrogate, alpha, detach_reset);
    let out = run_forward(ctx, &SEQUENCE, x_seq, v, params, Some(gradient))?;
    let (grad_s_to_h_seq, grad_v_to_h_seq) = local_gradients(ctx, out.local)?;
    Ok(SequenceForwardWithGrad {
        spike_seq: out.spike,
        v_final: out.v_final,
        grad_s_to_h_seq,
        grad_v_to_h_seq,
    })
}

/// Backward pass through time, from the last step to the first
pub fn sequence_backward(
    ctx: &DeviceContext,
    grad_spike_seq: &TensorRef<'_>,
    grad_v_final: &TensorRef<'_>,
    grad_s_to_h_seq: &TensorRef<'_>,
    grad_v_to_h_seq: &TensorRef<'_>,
    reciprocal_tau: f32,
) -> Result<SequenceBackward> {
    let (grad_x_seq, grad_v_initial) = run_backward(
        ctx,
        &SEQUENCE_BACKWARD,
        grad_spike_seq,
        grad_v_final,
        grad_s_to_h_seq,
        grad_v_to_h_seq,
        reciprocal_tau,
    )?;
    Ok(SequenceBackward {
        grad_x_seq,
        grad_v_initial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifgrad_npu_neural::types::Device;

    fn cpu_tensor(shape: &[usize], data: Vec<f32>) -> Tensor {
        Tensor::from_vec(Device::Cpu, shape, data).unwrap()
    }

    #[test]
    fn test_step_forward_fires_at_threshold() {
        let ctx = DeviceContext::cpu();
        let x = cpu_tensor(&[1], vec![1.0]);
        let v = cpu_tensor(&[1], vec![0.0]);
        let out = step_forward(&ctx, &x.view(), &v.view(), 1.0, 0.0, 1.0).unwrap();
        assert_eq!(out.spike.as_slice(), &[1.0]);
        assert_eq!(out.v_next.as_slice(), &[0.0]);
    }

    #[test]
    fn test_step_forward_below_threshold() {
        let ctx = DeviceContext::cpu();
        let x = cpu_tensor(&[1], vec![0.3]);
        let v = cpu_tensor(&[1], vec![0.0]);
        let out = step_forward(&ctx, &x.view(), &v.view(), 1.0, 0.0, 1.0).unwrap();
        assert_eq!(out.spike.as_slice(), &[0.0]);
        assert!((out.v_next.as_slice()[0] - 0.3).abs() < 1e-7);
    }

    #[test]
    fn test_outputs_keep_input_shape() {
        let ctx = DeviceContext::cpu();
        let x = cpu_tensor(&[3, 2, 2], (0..12).map(|i| i as f32 * 0.2).collect());
        let v = Tensor::zeros(Device::Cpu, &[2, 2]);
        let out = sequence_forward_with_grad(
            &ctx,
            &x.view(),
            &v.view(),
            1.0,
            0.0,
            2.0,
            false,
            SurrogateFunction::ATan,
            0.5,
        )
        .unwrap();
        assert_eq!(out.spike_seq.shape(), &[3, 2, 2]);
        assert_eq!(out.v_final.shape(), &[2, 2]);
        assert_eq!(out.grad_s_to_h_seq.shape(), &[3, 2, 2]);
        assert_eq!(out.grad_v_to_h_seq.shape(), &[3, 2, 2]);
    }

    #[test]
    fn test_step_shapes_must_match() {
        let ctx = DeviceContext::cpu();
        let x = cpu_tensor(&[2, 2], vec![0.0; 4]);
        let v = cpu_tensor(&[4], vec![0.0; 4]);
        let err = step_forward(&ctx, &x.view(), &v.view(), 1.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, LifError::ShapeMismatch { name: "v", .. }));
    }

    #[test]
    fn test_device_checked_before_layout() {
        let ctx = DeviceContext::cpu();
        let base = ndarray::Array2::<f32>::zeros((2, 3)).into_dyn();
        let transposed = base.t();
        let x = TensorRef::new(transposed.view(), Device::Cpu);
        let v = Tensor::zeros(Device::Wgpu(0), &[3, 2]);
        let err = step_forward(&ctx, &x, &v.view(), 1.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, LifError::DeviceMismatch { name: "v", .. }));
    }

    #[test]
    fn test_step_backward_matches_hand_computation() {
        let ctx = DeviceContext::cpu();
        let gs = cpu_tensor(&[2], vec![1.0, 0.5]);
        let gv = cpu_tensor(&[2], vec![0.0, 2.0]);
        let gsh = cpu_tensor(&[2], vec![0.8, 0.1]);
        let gvh = cpu_tensor(&[2], vec![1.0, 0.5]);
        let out = step_backward(&ctx, &gs.view(), &gv.view(), &gsh.view(), &gvh.view(), 0.25)
            .unwrap();
        // grad_h = [0.8, 0.05 + 1.0]
        let expected_gx = [0.2f32, 1.05 * 0.25];
        let expected_gv = [0.6f32, 1.05 * 0.75];
        for i in 0..2 {
            assert!((out.grad_x.as_slice()[i] - expected_gx[i]).abs() < 1e-6);
            assert!((out.grad_v.as_slice()[i] - expected_gv[i]).abs() < 1e-6);
        }
    }
}
