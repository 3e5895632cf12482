// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! CUDA Backend for the hard-reset LIF kernels
//!
//! The kernels in `shaders/cuda/lif_hard_reset.cu` are compiled with NVRTC
//! when the backend is created, so no CUDA toolkit is needed at build time,
//! only a driver at run time.
//!
//! # Minimum Requirements
//! - NVIDIA GPU with Compute Capability 7.0+ (Volta/2017 or newer)
//! - CUDA 11.8 or later

use std::sync::Arc;
use std::time::Instant;

use cudarc::driver::{CudaDevice, CudaSlice, DeviceRepr, LaunchAsync, LaunchConfig};
use lifgrad_npu_neural::types::{Device, Error, Result};
use tracing::{debug, info};

use super::ComputeBackend;
use crate::kernel::{
    BackwardBuffers, BackwardLaunch, ForwardBuffers, ForwardLaunch, KernelTiming,
    LocalGradientBuffers,
};

const MODULE_NAME: &str = "lif_module";
const FORWARD_KERNEL: &str = "lif_forward_kernel";
const BACKWARD_KERNEL: &str = "lif_backward_kernel";

/// Threads per block; works well across all GPUs
const BLOCK_SIZE: u32 = 256;

/// Kernel parameter block, layout matches `struct LifParams` in the .cu source
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct CudaLifParams {
    neuron_count: u32,
    time_steps: u32,
    with_grad: u32,
    surrogate: u32,
    v_threshold: f32,
    v_reset: f32,
    reciprocal_tau: f32,
    alpha: f32,
    detach_reset: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

// SAFETY: plain-old-data with C layout identical to the device-side struct
unsafe impl DeviceRepr for CudaLifParams {}

fn cuda_err(context: &str) -> impl Fn(cudarc::driver::DriverError) -> Error + '_ {
    move |e| Error::ComputationError(format!("{}: {}", context, e))
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::ComputationError(format!("{} ({}) exceeds u32 range", what, value)))
}

fn launch_config(neuron_count: u32) -> LaunchConfig {
    LaunchConfig {
        grid_dim: (neuron_count.div_ceil(BLOCK_SIZE).max(1), 1, 1),
        block_dim: (BLOCK_SIZE, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// CUDA Backend for the LIF kernels
pub struct CUDABackend {
    name: String,
    device: Arc<CudaDevice>,
    gpu_id: u32,
}

impl CUDABackend {
    /// Open GPU `gpu_id` and compile/load both kernels
    pub fn new(gpu_id: u32) -> Result<Self> {
        info!("🔧 Initializing CUDA backend on GPU {}...", gpu_id);

        let device = CudaDevice::new(gpu_id as usize)
            .map_err(cuda_err("Failed to initialize CUDA device"))?;

        info!("📦 Compiling CUDA kernels with NVRTC...");
        let ptx = cudarc::nvrtc::compile_ptx(include_str!("shaders/cuda/lif_hard_reset.cu"))
            .map_err(|e| Error::ComputationError(format!("NVRTC compilation failed: {}", e)))?;

        device
            .load_ptx(ptx, MODULE_NAME, &[FORWARD_KERNEL, BACKWARD_KERNEL])
            .map_err(cuda_err("Failed to load LIF PTX"))?;

        info!("✅ CUDA kernels loaded successfully");

        Ok(Self {
            name: format!("CUDA (GPU {})", gpu_id),
            device,
            gpu_id,
        })
    }

    fn upload(&self, data: &[f32]) -> Result<CudaSlice<f32>> {
        if data.is_empty() {
            return self.alloc(0);
        }
        self.device
            .htod_copy(data.to_vec())
            .map_err(cuda_err("Failed to upload buffer"))
    }

    /// Zeroed device buffer; never zero-length
    fn alloc(&self, len: usize) -> Result<CudaSlice<f32>> {
        self.device
            .alloc_zeros::<f32>(len.max(1))
            .map_err(cuda_err("Failed to allocate device buffer"))
    }

    fn download(&self, buffer: &CudaSlice<f32>, len: usize) -> Result<Vec<f32>> {
        let mut host = self
            .device
            .dtoh_sync_copy(buffer)
            .map_err(cuda_err("Failed to download buffer"))?;
        host.truncate(len);
        Ok(host)
    }

    fn kernel(&self, name: &str) -> Result<cudarc::driver::CudaFunction> {
        self.device
            .get_func(MODULE_NAME, name)
            .ok_or_else(|| Error::ComputationError(format!("CUDA kernel {} not loaded", name)))
    }
}

impl ComputeBackend for CUDABackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        Device::Cuda(self.gpu_id)
    }

    fn forward(&self, launch: &ForwardLaunch<'_>) -> Result<ForwardBuffers> {
        let start = Instant::now();
        let n = launch.neuron_count();
        let elements = launch.element_count();
        let neuron_count = to_u32(n, "neuron count")?;
        let params = launch.params();
        let gradient = launch.gradient();
        let grad_len = if gradient.is_some() { elements } else { 0 };

        let kernel_params = CudaLifParams {
            neuron_count,
            time_steps: to_u32(launch.time_steps(), "time steps")?,
            with_grad: gradient.is_some() as u32,
            surrogate: gradient.map(|g| g.function.index()).unwrap_or(0),
            v_threshold: params.v_threshold,
            v_reset: params.v_reset,
            reciprocal_tau: params.reciprocal_tau,
            alpha: gradient.map(|g| g.alpha).unwrap_or(0.0),
            detach_reset: gradient.map(|g| g.detach_reset as u32).unwrap_or(0),
            ..Default::default()
        };

        let x_gpu = self.upload(launch.x())?;
        let v_gpu = self.upload(launch.v())?;
        let mut spike_gpu = self.alloc(elements)?;
        let mut v_final_gpu = self.alloc(n)?;
        let mut gsh_gpu = self.alloc(grad_len)?;
        let mut gvh_gpu = self.alloc(grad_len)?;
        let upload_us = start.elapsed().as_secs_f64() * 1e6;

        let compute_start = Instant::now();
        let kernel = self.kernel(FORWARD_KERNEL)?;
        unsafe {
            kernel.launch(
                launch_config(neuron_count),
                (
                    &x_gpu,
                    &v_gpu,
                    &mut spike_gpu,
                    &mut v_final_gpu,
                    &mut gsh_gpu,
                    &mut gvh_gpu,
                    kernel_params,
                ),
            )
        }
        .map_err(cuda_err("Forward kernel launch failed"))?;
        self.device
            .synchronize()
            .map_err(cuda_err("Failed to synchronize after forward kernel"))?;
        let compute_us = compute_start.elapsed().as_secs_f64() * 1e6;

        let download_start = Instant::now();
        let spike = self.download(&spike_gpu, elements)?;
        let v_final = self.download(&v_final_gpu, n)?;
        let local_gradients = if gradient.is_some() {
            Some(LocalGradientBuffers {
                grad_s_to_h: self.download(&gsh_gpu, elements)?,
                grad_v_to_h: self.download(&gvh_gpu, elements)?,
            })
        } else {
            None
        };
        let download_us = download_start.elapsed().as_secs_f64() * 1e6;

        debug!(
            "[CUDA] {} launched {} blocks",
            launch.variant(),
            neuron_count.div_ceil(BLOCK_SIZE)
        );

        Ok(ForwardBuffers {
            spike,
            v_final,
            local_gradients,
            timing: KernelTiming {
                compute_us,
                transfer_us: upload_us + download_us,
                total_us: start.elapsed().as_secs_f64() * 1e6,
            },
        })
    }

    fn backward(&self, launch: &BackwardLaunch<'_>) -> Result<BackwardBuffers> {
        let start = Instant::now();
        let n = launch.neuron_count();
        let elements = launch.element_count();
        let neuron_count = to_u32(n, "neuron count")?;

        let kernel_params = CudaLifParams {
            neuron_count,
            time_steps: to_u32(launch.time_steps(), "time steps")?,
            reciprocal_tau: launch.reciprocal_tau(),
            ..Default::default()
        };

        let gs_gpu = self.upload(launch.grad_spike())?;
        let gv_gpu = self.upload(launch.grad_v_next())?;
        let gsh_gpu = self.upload(launch.grad_s_to_h())?;
        let gvh_gpu = self.upload(launch.grad_v_to_h())?;
        let mut gx_gpu = self.alloc(elements)?;
        let mut gv_init_gpu = self.alloc(n)?;
        let upload_us = start.elapsed().as_secs_f64() * 1e6;

        let compute_start = Instant::now();
        let kernel = self.kernel(BACKWARD_KERNEL)?;
        unsafe {
            kernel.launch(
                launch_config(neuron_count),
                (
                    &gs_gpu,
                    &gv_gpu,
                    &gsh_gpu,
                    &gvh_gpu,
                    &mut gx_gpu,
                    &mut gv_init_gpu,
                    kernel_params,
                ),
            )
        }
        .map_err(cuda_err("Backward kernel launch failed"))?;
        self.device
            .synchronize()
            .map_err(cuda_err("Failed to synchronize after backward kernel"))?;
        let compute_us = compute_start.elapsed().as_secs_f64() * 1e6;

        let download_start = Instant::now();
        let grad_x = self.download(&gx_gpu, elements)?;
        let grad_v = self.download(&gv_init_gpu, n)?;
        let download_us = download_start.elapsed().as_secs_f64() * 1e6;

        Ok(BackwardBuffers {
            grad_x,
            grad_v,
            timing: KernelTiming {
                compute_us,
                transfer_us: upload_us + download_us,
                total_us: start.elapsed().as_secs_f64() * 1e6,
            },
        })
    }
}

/// Check if CUDA is available
pub fn is_cuda_available() -> bool {
    CudaDevice::new(0).is_ok()
}

/// Enumerate all CUDA devices: `(ordinal, name)`
pub fn enumerate_cuda_devices() -> Vec<(usize, String)> {
    let mut devices = Vec::new();
    for device_id in 0..16 {
        match CudaDevice::new(device_id) {
            Ok(_) => devices.push((device_id, format!("NVIDIA GPU {}", device_id))),
            Err(_) => break, // No more devices
        }
    }
    devices
}
