// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # CUDA vs CPU Equivalence
//!
//! The CUDA kernels must match the CPU backend: spikes and potentials
//! exactly for inputs that are exact in `f32`, surrogate gradients to a
//! small tolerance. Skipped when no CUDA device is present.

#![cfg(feature = "cuda")]

use lifgrad_npu_engine::{is_cuda_available, ops, CUDABackend, DeviceContext, Tensor};
use lifgrad_npu_neural::types::Device;
use lifgrad_npu_neural::SurrogateFunction;

const GPU: Device = Device::Cuda(0);

/// Multiples of 1/64 in [-1, 3): forward arithmetic with r = 0.5 stays exact
fn quantized(len: usize, seed: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (((i + seed) * 7919) % 256) as f32 / 64.0 - 1.0)
        .collect()
}

fn contexts() -> Option<(DeviceContext, DeviceContext)> {
    if !is_cuda_available() {
        eprintln!("⚠️  No CUDA device, skipping");
        return None;
    }
    let gpu = CUDABackend::new(0).ok()?;
    Some((DeviceContext::cpu(), DeviceContext::from_backend(Box::new(gpu))))
}

fn on(device: Device, shape: &[usize], data: Vec<f32>) -> Tensor {
    Tensor::from_vec(device, shape, data).unwrap()
}

fn assert_close(a: &[f32], b: &[f32], tol: f32, what: &str) {
    assert_eq!(a.len(), b.len(), "{}: length", what);
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(
            (x - y).abs() <= tol * (1.0 + x.abs()),
            "{}[{}]: cpu {} vs gpu {}",
            what,
            i,
            x,
            y
        );
    }
}

#[test]
fn test_step_forward_matches_cpu() {
    let Some((cpu, gpu)) = contexts() else { return };
    let n = 4099;
    let x = quantized(n, 1);
    let v = quantized(n, 2);

    let expected = ops::step_forward(
        &cpu,
        &on(Device::Cpu, &[n], x.clone()).view(),
        &on(Device::Cpu, &[n], v.clone()).view(),
        1.0,
        0.0,
        0.5,
    )
    .unwrap();
    let actual = ops::step_forward(
        &gpu,
        &on(GPU, &[n], x).view(),
        &on(GPU, &[n], v).view(),
        1.0,
        0.0,
        0.5,
    )
    .unwrap();

    assert_eq!(actual.spike.device(), GPU);
    assert_eq!(expected.spike.as_slice(), actual.spike.as_slice());
    assert_eq!(expected.v_next.as_slice(), actual.v_next.as_slice());
}

#[test]
fn test_sequence_with_grad_matches_cpu_for_every_surrogate() {
    let Some((cpu, gpu)) = contexts() else { return };
    let (t, n) = (6, 1000);
    let x_seq = quantized(t * n, 3);
    let v = quantized(n, 4);

    for surrogate in [
        SurrogateFunction::ATan,
        SurrogateFunction::Sigmoid,
        SurrogateFunction::SoftSign,
        SurrogateFunction::PiecewiseQuadratic,
    ] {
        for detach_reset in [false, true] {
            let expected = ops::sequence_forward_with_grad(
                &cpu,
                &on(Device::Cpu, &[t, n], x_seq.clone()).view(),
                &on(Device::Cpu, &[n], v.clone()).view(),
                1.0,
                -0.25,
                2.0,
                detach_reset,
                surrogate,
                0.5,
            )
            .unwrap();
            let actual = ops::sequence_forward_with_grad(
                &gpu,
                &on(GPU, &[t, n], x_seq.clone()).view(),
                &on(GPU, &[n], v.clone()).view(),
                1.0,
                -0.25,
                2.0,
                detach_reset,
                surrogate,
                0.5,
            )
            .unwrap();

            assert_eq!(expected.spike_seq.as_slice(), actual.spike_seq.as_slice());
            assert_eq!(expected.v_final.as_slice(), actual.v_final.as_slice());
            assert_close(
                expected.grad_s_to_h_seq.as_slice(),
                actual.grad_s_to_h_seq.as_slice(),
                1e-5,
                "grad_s_to_h_seq",
            );
            assert_close(
                expected.grad_v_to_h_seq.as_slice(),
                actual.grad_v_to_h_seq.as_slice(),
                1e-5,
                "grad_v_to_h_seq",
            );
        }
    }
}

#[test]
fn test_sequence_backward_matches_cpu() {
    let Some((cpu, gpu)) = contexts() else { return };
    let (t, n) = (5, 777);
    let grad_spike = quantized(t * n, 5);
    let grad_v_final = quantized(n, 6);
    let gsh: Vec<f32> = quantized(t * n, 7).iter().map(|g| g.abs()).collect();
    let gvh: Vec<f32> = quantized(t * n, 8).iter().map(|g| 0.5 * g).collect();

    let expected = ops::sequence_backward(
        &cpu,
        &on(Device::Cpu, &[t, n], grad_spike.clone()).view(),
        &on(Device::Cpu, &[n], grad_v_final.clone()).view(),
        &on(Device::Cpu, &[t, n], gsh.clone()).view(),
        &on(Device::Cpu, &[t, n], gvh.clone()).view(),
        0.5,
    )
    .unwrap();
    let actual = ops::sequence_backward(
        &gpu,
        &on(GPU, &[t, n], grad_spike).view(),
        &on(GPU, &[n], grad_v_final).view(),
        &on(GPU, &[t, n], gsh).view(),
        &on(GPU, &[t, n], gvh).view(),
        0.5,
    )
    .unwrap();

    assert_close(
        expected.grad_x_seq.as_slice(),
        actual.grad_x_seq.as_slice(),
        1e-4,
        "grad_x_seq",
    );
    assert_close(
        expected.grad_v_initial.as_slice(),
        actual.grad_v_initial.as_slice(),
        1e-4,
        "grad_v_initial",
    );
}

#[test]
fn test_cpu_tensor_rejected_by_gpu_context() {
    let Some((_, gpu)) = contexts() else { return };
    let x = Tensor::zeros(Device::Cpu, &[8]);
    let v = Tensor::zeros(GPU, &[8]);
    let err = ops::step_forward(&gpu, &x.view(), &v.view(), 1.0, 0.0, 0.5).unwrap_err();
    assert!(err.is_precondition());
}
