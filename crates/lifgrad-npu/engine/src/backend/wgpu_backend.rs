// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # WGPU Backend
//!
//! GPU-accelerated backend using WGPU (cross-platform GPU compute library).
//! Supports Metal (macOS), Vulkan (Linux), DirectX 12 (Windows).
//!
//! Each launch uploads its inputs, runs one dispatch with one invocation per
//! neuron (the shader loops over time), and blocks on readback. Nothing is
//! cached on the device between launches.

use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use lifgrad_npu_neural::types::{Device, Error, Result};
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use super::ComputeBackend;
use crate::kernel::{
    BackwardBuffers, BackwardLaunch, ForwardBuffers, ForwardLaunch, KernelTiming,
    LocalGradientBuffers,
};

/// Must match `@workgroup_size` in the shaders
const WORKGROUP_SIZE: u32 = 256;

/// Per-dimension dispatch limit guaranteed by WebGPU
const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;

/// Uniform block shared by both shaders (48 bytes, 16-byte aligned)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuLifParams {
    neuron_count: u32,
    time_steps: u32,
    with_grad: u32,
    surrogate: u32,
    v_threshold: f32,
    v_reset: f32,
    reciprocal_tau: f32,
    alpha: f32,
    detach_reset: u32,
    dispatch_width: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Workgroup grid for `neuron_count` invocations: `(x, y, invocations per row)`
///
/// Populations beyond 65,535 workgroups spill into the y dimension.
fn dispatch_geometry(neuron_count: u32) -> (u32, u32, u32) {
    let groups = neuron_count.div_ceil(WORKGROUP_SIZE).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        (groups, 1, groups * WORKGROUP_SIZE)
    } else {
        let rows = groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION);
        (
            MAX_WORKGROUPS_PER_DIMENSION,
            rows,
            MAX_WORKGROUPS_PER_DIMENSION * WORKGROUP_SIZE,
        )
    }
}

/// Size in bytes of an `f32` buffer; wgpu rejects zero-sized bindings
fn buffer_bytes(len: usize) -> u64 {
    (len.max(1) * std::mem::size_of::<f32>()) as u64
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::ComputationError(format!("{} ({}) exceeds u32 range", what, value)))
}

/// Check if a GPU adapter is available
pub fn is_gpu_available() -> bool {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .is_some()
}

/// WGPU backend for GPU acceleration
pub struct WGPUBackend {
    /// Backend name for logging
    name: String,

    /// Adapter index this backend was opened on
    ordinal: u32,

    /// WGPU device
    device: wgpu::Device,

    /// WGPU command queue
    queue: wgpu::Queue,

    /// Charge/fire/reset (+ local gradients) pipeline
    forward_pipeline: wgpu::ComputePipeline,

    /// Reverse-time gradient pipeline
    backward_pipeline: wgpu::ComputePipeline,
}

impl WGPUBackend {
    /// Open adapter `ordinal` (0 = the high-performance default) and build both pipelines
    pub fn new(ordinal: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = if ordinal == 0 {
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            }))
        } else {
            instance
                .enumerate_adapters(wgpu::Backends::all())
                .into_iter()
                .nth(ordinal as usize)
        };
        let adapter = adapter.ok_or_else(|| {
            Error::ComputationError(format!("Failed to find WGPU adapter {}", ordinal))
        })?;

        let adapter_info = adapter.get_info();
        let backend_name = format!("WGPU ({} - {:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("LIF Kernel Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| Error::ComputationError(format!("Failed to create device: {}", e)))?;

        let forward_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("LIF Forward Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/lif_forward.wgsl").into()),
        });
        let forward_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("LIF Forward Pipeline"),
            layout: None, // Auto-layout from shader
            module: &forward_shader,
            entry_point: "lif_forward_main",
        });

        let backward_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("LIF Backward Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/lif_backward.wgsl").into()),
        });
        let backward_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("LIF Backward Pipeline"),
            layout: None,
            module: &backward_shader,
            entry_point: "lif_backward_main",
        });

        info!("✅ {} ready (forward + backward pipelines)", backend_name);

        Ok(Self {
            name: backend_name,
            ordinal,
            device,
            queue,
            forward_pipeline,
            backward_pipeline,
        })
    }

    fn check_binding_size(&self, elements: usize) -> Result<()> {
        let limit = self.device.limits().max_storage_buffer_binding_size as u64;
        if buffer_bytes(elements) > limit {
            return Err(Error::ComputationError(format!(
                "{} elements exceed the device storage binding limit of {} bytes",
                elements, limit
            )));
        }
        Ok(())
    }

    fn input_buffer(&self, label: &str, data: &[f32]) -> wgpu::Buffer {
        if data.is_empty() {
            return self.output_buffer(label, 0);
        }
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE,
            })
    }

    fn output_buffer(&self, label: &str, len: usize) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: buffer_bytes(len),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    fn params_buffer(&self, params: &GpuLifParams) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("LIF Params"),
                contents: bytemuck::bytes_of(params),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Bind `buffers` to bindings 0..n of group 0 and run one dispatch to completion
    fn run(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
        grid: (u32, u32),
    ) {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(grid.0, grid.1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Copy each `(buffer, len)` into a mappable staging buffer and read it back (blocking)
    fn read_back(&self, sources: &[(&wgpu::Buffer, usize)]) -> Result<Vec<Vec<f32>>> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("LIF Readback"),
            });

        let staging: Vec<(wgpu::Buffer, usize)> = sources
            .iter()
            .map(|(source, len)| {
                let size = buffer_bytes(*len);
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("LIF Staging"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_buffer_to_buffer(source, 0, &buffer, 0, size);
                (buffer, *len)
            })
            .collect();
        self.queue.submit(Some(encoder.finish()));

        let (sender, receiver) = std::sync::mpsc::channel();
        for (buffer, _) in &staging {
            let sender = sender.clone();
            buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        }
        drop(sender);

        // Wait for mapping to complete
        self.device.poll(wgpu::Maintain::Wait);
        for _ in 0..staging.len() {
            receiver
                .recv()
                .map_err(|_| {
                    Error::ComputationError("Failed to receive buffer map result".to_string())
                })?
                .map_err(|e| Error::ComputationError(format!("Failed to map buffer: {:?}", e)))?;
        }

        let mut results = Vec::with_capacity(staging.len());
        for (buffer, len) in &staging {
            {
                let data = buffer.slice(..).get_mapped_range();
                let values: &[f32] = bytemuck::cast_slice(&data);
                results.push(values[..*len].to_vec());
            }
            buffer.unmap();
        }
        Ok(results)
    }
}

impl ComputeBackend for WGPUBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        Device::Wgpu(self.ordinal)
    }

    fn forward(&self, launch: &ForwardLaunch<'_>) -> Result<ForwardBuffers> {
        let start = Instant::now();
        let n = launch.neuron_count();
        let elements = launch.element_count();
        self.check_binding_size(elements)?;

        let neuron_count = to_u32(n, "neuron count")?;
        let (groups_x, groups_y, dispatch_width) = dispatch_geometry(neuron_count);
        let params = launch.params();
        let gradient = launch.gradient();
        let gpu_params = GpuLifParams {
            neuron_count,
            time_steps: to_u32(launch.time_steps(), "time steps")?,
            with_grad: gradient.is_some() as u32,
            surrogate: gradient.map(|g| g.function.index()).unwrap_or(0),
            v_threshold: params.v_threshold,
            v_reset: params.v_reset,
            reciprocal_tau: params.reciprocal_tau,
            alpha: gradient.map(|g| g.alpha).unwrap_or(0.0),
            detach_reset: gradient.map(|g| g.detach_reset as u32).unwrap_or(0),
            dispatch_width,
            _pad0: 0,
            _pad1: 0,
        };

        // Gradient outputs are 1-element placeholders when not requested
        let grad_len = if gradient.is_some() { elements } else { 0 };

        let x_buffer = self.input_buffer("LIF x_seq", launch.x());
        let v_buffer = self.input_buffer("LIF v_init", launch.v());
        let spike_buffer = self.output_buffer("LIF spike_seq", elements);
        let v_final_buffer = self.output_buffer("LIF v_final", n);
        let gsh_buffer = self.output_buffer("LIF grad_s_to_h", grad_len);
        let gvh_buffer = self.output_buffer("LIF grad_v_to_h", grad_len);
        let params_buffer = self.params_buffer(&gpu_params);
        let upload_us = start.elapsed().as_secs_f64() * 1e6;

        let compute_start = Instant::now();
        self.run(
            "LIF Forward",
            &self.forward_pipeline,
            &[
                &x_buffer,
                &v_buffer,
                &spike_buffer,
                &v_final_buffer,
                &gsh_buffer,
                &gvh_buffer,
                &params_buffer,
            ],
            (groups_x, groups_y),
        );
        let compute_us = compute_start.elapsed().as_secs_f64() * 1e6;

        let download_start = Instant::now();
        let mut sources = vec![(&spike_buffer, elements), (&v_final_buffer, n)];
        if gradient.is_some() {
            sources.push((&gsh_buffer, elements));
            sources.push((&gvh_buffer, elements));
        }
        let mut outputs = self.read_back(&sources)?.into_iter();
        let download_us = download_start.elapsed().as_secs_f64() * 1e6;

        let spike = outputs.next().unwrap_or_default();
        let v_final = outputs.next().unwrap_or_default();
        let local_gradients = if gradient.is_some() {
            Some(LocalGradientBuffers {
                grad_s_to_h: outputs.next().unwrap_or_default(),
                grad_v_to_h: outputs.next().unwrap_or_default(),
            })
        } else {
            None
        };

        debug!(
            "[WGPU] {} dispatched {}x{} workgroups",
            launch.variant(),
            groups_x,
            groups_y
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
        self.check_binding_size(elements)?;

        let neuron_count = to_u32(n, "neuron count")?;
        let (groups_x, groups_y, dispatch_width) = dispatch_geometry(neuron_count);
        let gpu_params = GpuLifParams {
            neuron_count,
            time_steps: to_u32(launch.time_steps(), "time steps")?,
            reciprocal_tau: launch.reciprocal_tau(),
            dispatch_width,
            ..GpuLifParams::zeroed()
        };

        let gs_buffer = self.input_buffer("LIF grad_spike_seq", launch.grad_spike());
        let gv_buffer = self.input_buffer("LIF grad_v_final", launch.grad_v_next());
        let gsh_buffer = self.input_buffer("LIF grad_s_to_h_seq", launch.grad_s_to_h());
        let gvh_buffer = self.input_buffer("LIF grad_v_to_h_seq", launch.grad_v_to_h());
        let gx_buffer = self.output_buffer("LIF grad_x_seq", elements);
        let gv_init_buffer = self.output_buffer("LIF grad_v_init", n);
        let params_buffer = self.params_buffer(&gpu_params);
        let upload_us = start.elapsed().as_secs_f64() * 1e6;

        let compute_start = Instant::now();
        self.run(
            "LIF Backward",
            &self.backward_pipeline,
            &[
                &gs_buffer,
                &gv_buffer,
                &gsh_buffer,
                &gvh_buffer,
                &gx_buffer,
                &gv_init_buffer,
                &params_buffer,
            ],
            (groups_x, groups_y),
        );
        let compute_us = compute_start.elapsed().as_secs_f64() * 1e6;

        let download_start = Instant::now();
        let mut outputs = self
            .read_back(&[(&gx_buffer, elements), (&gv_init_buffer, n)])?
            .into_iter();
        let download_us = download_start.elapsed().as_secs_f64() * 1e6;

        Ok(BackwardBuffers {
            grad_x: outputs.next().unwrap_or_default(),
            grad_v: outputs.next().unwrap_or_default(),
            timing: KernelTiming {
                compute_us,
                transfer_us: upload_us + download_us,
                total_us: start.elapsed().as_secs_f64() * 1e6,
            },
        })
    }
}
