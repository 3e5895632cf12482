// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Backend Selection Tests
//!
//! Validates that the auto-selection logic chooses the right backend
//! based on population size and hardware availability.

use lifgrad_npu_engine::backend::select_backend_with;
use lifgrad_npu_engine::*;

fn available() -> bool {
    true
}

fn unavailable() -> bool {
    false
}

#[test]
fn test_small_population_selects_cpu() {
    let config = BackendConfig::default();

    let decision = select_backend(10_000, 8, &config);

    assert_eq!(decision.backend_type, BackendType::CPU);
    assert!(decision.reason.contains("CPU selected"));
    assert_eq!(decision.estimated_speedup, 1.0);
}

#[test]
fn test_thresholds_with_hardware_present() {
    let config = BackendConfig::default();

    // Below both thresholds
    let decision = select_backend_with(10_000, 4, &config, available, available);
    assert_eq!(decision.backend_type, BackendType::CPU);

    // Above the CUDA threshold only
    let decision = select_backend_with(100_000, 4, &config, available, available);
    assert_eq!(decision.backend_type, BackendType::CUDA);
    assert!(decision.estimated_speedup > 1.5);

    // Above the WGPU threshold, no CUDA device
    let decision = select_backend_with(1_000_000, 4, &config, unavailable, available);
    assert_eq!(decision.backend_type, BackendType::WGPU);
    assert!(decision.reason.contains("WGPU selected"));
}

#[test]
fn test_cuda_preferred_over_wgpu() {
    let config = BackendConfig::default();
    let decision = select_backend_with(2_000_000, 16, &config, available, available);
    assert_eq!(decision.backend_type, BackendType::CUDA);
}

#[test]
fn test_large_population_without_gpu_falls_back_to_cpu() {
    let config = BackendConfig::default();
    let decision = select_backend_with(5_000_000, 16, &config, unavailable, unavailable);
    assert_eq!(decision.backend_type, BackendType::CPU);
    assert!(decision.reason.contains("GPU not available"));
}

#[test]
fn test_force_cpu() {
    let config = BackendConfig {
        force_cpu: true,
        ..Default::default()
    };

    let decision = select_backend_with(10_000_000, 64, &config, available, available);
    assert_eq!(decision.backend_type, BackendType::CPU);
    assert!(decision.reason.contains("Forced CPU"));
}

#[test]
fn test_force_gpu_with_and_without_adapter() {
    let config = BackendConfig {
        force_gpu: true,
        ..Default::default()
    };

    let decision = select_backend_with(100, 1, &config, unavailable, available);
    assert_eq!(decision.backend_type, BackendType::WGPU);
    assert!(decision.reason.contains("Forced WGPU"));

    let decision = select_backend_with(100, 1, &config, unavailable, unavailable);
    assert_eq!(decision.backend_type, BackendType::CPU);
    assert!(decision.reason.contains("falling back to CPU"));
}

#[test]
fn test_force_cuda_takes_priority_over_force_gpu() {
    let config = BackendConfig {
        force_cuda: true,
        force_gpu: true,
        ..Default::default()
    };
    let decision = select_backend_with(100, 1, &config, available, available);
    assert_eq!(decision.backend_type, BackendType::CUDA);
}

#[test]
fn test_custom_thresholds() {
    let config = BackendConfig {
        gpu_neuron_threshold: 50_000,
        cuda_neuron_threshold: usize::MAX,
        ..Default::default()
    };

    let decision = select_backend_with(400_000, 8, &config, available, available);
    assert_eq!(decision.backend_type, BackendType::WGPU);

    let decision = select_backend_with(40_000, 8, &config, available, available);
    assert_eq!(decision.backend_type, BackendType::CPU);
}

#[test]
fn test_auto_context_runs_operators() {
    let ctx = DeviceContext::auto(64, 2, &BackendConfig::default(), 0).unwrap();
    let x_seq = Tensor::from_vec(ctx.device(), &[2, 64], vec![0.7; 128]).unwrap();
    let v = Tensor::zeros(ctx.device(), &[64]);
    let out = ops::sequence_forward(&ctx, &x_seq.view(), &v.view(), 1.0, 0.0, 1.0).unwrap();
    assert!(out.spike_seq.as_slice().iter().all(|&s| s == 0.0));
}

#[test]
fn test_explicit_cpu_context_uses_parallel_threshold() {
    let config = BackendConfig {
        cpu_parallel_threshold: 1,
        ..Default::default()
    };
    let ctx = DeviceContext::new(BackendType::CPU, &config, 0).unwrap();
    assert_eq!(ctx.device(), Device::Cpu);

    let x = Tensor::from_vec(Device::Cpu, &[3], vec![0.2, 1.5, 1.0]).unwrap();
    let v = Tensor::zeros(Device::Cpu, &[3]);
    let out = ops::step_forward(&ctx, &x.view(), &v.view(), 1.0, 0.0, 1.0).unwrap();
    assert_eq!(out.spike.as_slice(), &[0.0, 1.0, 1.0]);
}
