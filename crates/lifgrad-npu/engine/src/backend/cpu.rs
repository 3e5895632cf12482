// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # CPU Backend
//!
//! Reference backend built directly on the per-neuron functions in
//! `lifgrad_npu_neural::models::lif`. Time steps run in order; inside a step
//! the neurons are split into rayon chunks once the population is large
//! enough to amortise the fork/join. The join at the end of each step is the
//! barrier the sequence drivers need.

use std::time::Instant;

use lifgrad_npu_neural::types::{Device, LifParameters, Result, SurrogateGradient};
use lifgrad_npu_neural::{backward_neuron, forward_neuron, forward_neuron_with_grad, LocalGradient};
use rayon::prelude::*;
use tracing::trace;

use super::ComputeBackend;
use crate::kernel::{
    kernel_trace_enabled, BackwardBuffers, BackwardLaunch, ForwardBuffers, ForwardLaunch,
    KernelTiming, LocalGradientBuffers,
};

/// Default neuron count above which a step is processed in parallel
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// Smallest rayon work item (neurons)
const MIN_CHUNK: usize = 1024;

/// CPU backend (rayon data parallelism)
pub struct CPUBackend {
    /// Backend name for logging
    name: String,

    /// Neuron count at which a step switches from sequential to parallel
    parallel_threshold: usize,
}

impl CPUBackend {
    pub fn new() -> Self {
        Self::with_parallel_threshold(DEFAULT_PARALLEL_THRESHOLD)
    }

    /// `usize::MAX` keeps every step on the calling thread
    pub fn with_parallel_threshold(parallel_threshold: usize) -> Self {
        Self {
            name: "CPU (rayon)".to_string(),
            parallel_threshold,
        }
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    fn is_parallel(&self, neuron_count: usize) -> bool {
        neuron_count >= self.parallel_threshold
    }

    fn chunk_size(&self, neuron_count: usize) -> usize {
        let workers = rayon::current_num_threads().max(1) * 4;
        (neuron_count / workers).max(MIN_CHUNK)
    }
}

impl Default for CPUBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// One step over a contiguous range of neurons; `v` is updated in place
fn forward_chunk(
    x: &[f32],
    v: &mut [f32],
    spike: &mut [f32],
    local: Option<(&mut [f32], &mut [f32])>,
    params: &LifParameters,
    gradient: Option<&SurrogateGradient>,
) {
    match (gradient, local) {
        (Some(grad), Some((grad_s_to_h, grad_v_to_h))) => {
            for ((((x, v), s), gsh), gvh) in x
                .iter()
                .zip(v.iter_mut())
                .zip(spike.iter_mut())
                .zip(grad_s_to_h.iter_mut())
                .zip(grad_v_to_h.iter_mut())
            {
                let (step, local) = forward_neuron_with_grad(*x, *v, params, grad);
                *s = step.spike;
                *v = step.v_next;
                *gsh = local.grad_s_to_h;
                *gvh = local.grad_v_to_h;
            }
        }
        _ => {
            for ((x, v), s) in x.iter().zip(v.iter_mut()).zip(spike.iter_mut()) {
                let step = forward_neuron(*x, *v, params);
                *s = step.spike;
                *v = step.v_next;
            }
        }
    }
}

/// One reverse step; `grad_v` holds dL/dv_next on entry and dL/dv on exit
fn backward_chunk(
    grad_spike: &[f32],
    grad_s_to_h: &[f32],
    grad_v_to_h: &[f32],
    grad_v: &mut [f32],
    grad_x: &mut [f32],
    reciprocal_tau: f32,
) {
    for ((((gs, gsh), gvh), gv), gx) in grad_spike
        .iter()
        .zip(grad_s_to_h)
        .zip(grad_v_to_h)
        .zip(grad_v.iter_mut())
        .zip(grad_x.iter_mut())
    {
        let local = LocalGradient {
            grad_s_to_h: *gsh,
            grad_v_to_h: *gvh,
        };
        let out = backward_neuron(*gs, *gv, local, reciprocal_tau);
        *gx = out.grad_x;
        *gv = out.grad_v;
    }
}

impl ComputeBackend for CPUBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn forward(&self, launch: &ForwardLaunch<'_>) -> Result<ForwardBuffers> {
        let start = Instant::now();
        let n = launch.neuron_count();
        let elements = launch.element_count();
        let params = launch.params();
        let gradient = launch.gradient();
        let parallel = self.is_parallel(n);
        let chunk = self.chunk_size(n);
        let trace_steps = kernel_trace_enabled();

        let mut v = launch.v().to_vec();
        let mut spike = vec![0.0f32; elements];
        let mut local = gradient.map(|_| LocalGradientBuffers {
            grad_s_to_h: vec![0.0; elements],
            grad_v_to_h: vec![0.0; elements],
        });

        for t in 0..launch.time_steps() {
            let rows = t * n..(t + 1) * n;
            let x_row = &launch.x()[rows.clone()];
            let spike_row = &mut spike[rows.clone()];
            let local_rows = local.as_mut().map(|buffers| {
                (
                    &mut buffers.grad_s_to_h[rows.clone()],
                    &mut buffers.grad_v_to_h[rows.clone()],
                )
            });

            if !parallel {
                forward_chunk(x_row, &mut v, spike_row, local_rows, params, gradient);
            } else if let Some((gsh_row, gvh_row)) = local_rows {
                x_row
                    .par_chunks(chunk)
                    .zip(v.par_chunks_mut(chunk))
                    .zip(spike_row.par_chunks_mut(chunk))
                    .zip(gsh_row.par_chunks_mut(chunk))
                    .zip(gvh_row.par_chunks_mut(chunk))
                    .for_each(|((((x, v), s), gsh), gvh)| {
                        forward_chunk(x, v, s, Some((gsh, gvh)), params, gradient)
                    });
            } else {
                x_row
                    .par_chunks(chunk)
                    .zip(v.par_chunks_mut(chunk))
                    .zip(spike_row.par_chunks_mut(chunk))
                    .for_each(|((x, v), s)| forward_chunk(x, v, s, None, params, gradient));
            }

            if trace_steps {
                let fired = spike[t * n..(t + 1) * n]
                    .iter()
                    .filter(|&&s| s != 0.0)
                    .count();
                trace!(
                    "[CPU] forward step {}/{}: {} of {} neurons fired",
                    t + 1,
                    launch.time_steps(),
                    fired,
                    n
                );
            }
        }

        let compute_us = start.elapsed().as_secs_f64() * 1e6;
        Ok(ForwardBuffers {
            spike,
            v_final: v,
            local_gradients: local,
            timing: KernelTiming {
                compute_us,
                transfer_us: 0.0,
                total_us: compute_us,
            },
        })
    }

    fn backward(&self, launch: &BackwardLaunch<'_>) -> Result<BackwardBuffers> {
        let start = Instant::now();
        let n = launch.neuron_count();
        let reciprocal_tau = launch.reciprocal_tau();
        let parallel = self.is_parallel(n);
        let chunk = self.chunk_size(n);
        let trace_steps = kernel_trace_enabled();

        let mut grad_v = launch.grad_v_next().to_vec();
        let mut grad_x = vec![0.0f32; launch.element_count()];

        for t in (0..launch.time_steps()).rev() {
            let rows = t * n..(t + 1) * n;
            let gs_row = &launch.grad_spike()[rows.clone()];
            let gsh_row = &launch.grad_s_to_h()[rows.clone()];
            let gvh_row = &launch.grad_v_to_h()[rows.clone()];
            let gx_row = &mut grad_x[rows];

            if parallel {
                gs_row
                    .par_chunks(chunk)
                    .zip(gsh_row.par_chunks(chunk))
                    .zip(gvh_row.par_chunks(chunk))
                    .zip(grad_v.par_chunks_mut(chunk))
                    .zip(gx_row.par_chunks_mut(chunk))
                    .for_each(|((((gs, gsh), gvh), gv), gx)| {
                        backward_chunk(gs, gsh, gvh, gv, gx, reciprocal_tau)
                    });
            } else {
                backward_chunk(gs_row, gsh_row, gvh_row, &mut grad_v, gx_row, reciprocal_tau);
            }

            if trace_steps {
                trace!(
                    "[CPU] backward step {}: {} neurons",
                    t,
                    n
                );
            }
        }

        let compute_us = start.elapsed().as_secs_f64() * 1e6;
        Ok(BackwardBuffers {
            grad_x,
            grad_v,
            timing: KernelTiming {
                compute_us,
                transfer_us: 0.0,
                total_us: compute_us,
            },
        })
    }
}
