// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Device Context
//!
//! The explicit execution context every operator takes. It owns one compute
//! backend; the backend's [`Device`] is the placement every operand of a call
//! must carry. There is no ambient "current device".

use lifgrad_npu_neural::types::{Device, Result};
use tracing::{debug, info, warn};

use crate::backend::{
    create_backend, select_backend, BackendConfig, BackendType, CPUBackend, ComputeBackend,
};
use crate::kernel::{BackwardBuffers, BackwardLaunch, ForwardBuffers, ForwardLaunch};

/// Launches slower than this are reported at warn level (μs)
const SLOW_LAUNCH_US: f64 = 20_000.0;

/// Execution context: one backend, one device
pub struct DeviceContext {
    backend: Box<dyn ComputeBackend>,
}

impl DeviceContext {
    /// Build a context for an explicit backend type
    ///
    /// `Auto` selects for an unknown population (CPU unless a force flag is set);
    /// use [`DeviceContext::auto`] when the population size is known.
    pub fn new(
        backend_type: BackendType,
        config: &BackendConfig,
        device_ordinal: u32,
    ) -> Result<Self> {
        let backend = create_backend(backend_type, config, device_ordinal)?;
        info!(
            "Device context ready: {} on {}",
            backend.backend_name(),
            backend.device()
        );
        Ok(Self { backend })
    }

    /// Pick the best backend for `neuron_count` neurons over `time_steps` steps
    ///
    /// A GPU backend that fails to initialise falls back to the CPU.
    pub fn auto(
        neuron_count: usize,
        time_steps: usize,
        config: &BackendConfig,
        device_ordinal: u32,
    ) -> Result<Self> {
        let decision = select_backend(neuron_count, time_steps, config);
        info!(
            "🎯 Backend auto-selection: {} ({})",
            decision.backend_type,
            decision.reason
        );
        if decision.estimated_speedup > 1.0 {
            info!("   Estimated speedup: {:.1}x", decision.estimated_speedup);
        }

        match Self::new(decision.backend_type, config, device_ordinal) {
            Ok(ctx) => Ok(ctx),
            Err(e) if decision.backend_type != BackendType::CPU => {
                warn!(
                    "⚠️  {} backend failed to initialise ({}), falling back to CPU",
                    decision.backend_type,
                    e
                );
                Self::new(BackendType::CPU, config, device_ordinal)
            }
            Err(e) => Err(e),
        }
    }

    /// CPU context with default settings
    pub fn cpu() -> Self {
        Self::from_backend(Box::new(CPUBackend::new()))
    }

    /// Wrap an already constructed backend
    pub fn from_backend(backend: Box<dyn ComputeBackend>) -> Self {
        Self { backend }
    }

    /// Device every operand passed with this context must be on
    pub fn device(&self) -> Device {
        self.backend.device()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    /// Run a forward launch on this context's backend
    pub fn forward(&self, launch: &ForwardLaunch<'_>) -> Result<ForwardBuffers> {
        if launch.neuron_count() == 0 {
            return Ok(ForwardBuffers::empty(launch));
        }

        debug!(
            "[{}] launching {} over {} neurons",
            self.backend.backend_name(),
            launch.variant(),
            launch.neuron_count()
        );

        let out = self.backend.forward(launch)?;
        self.report_timing(
            &launch.variant().to_string(),
            out.timing.total_us,
            launch.neuron_count(),
        );
        Ok(out)
    }

    /// Run a backward launch on this context's backend
    pub fn backward(&self, launch: &BackwardLaunch<'_>) -> Result<BackwardBuffers> {
        if launch.neuron_count() == 0 {
            return Ok(BackwardBuffers::default());
        }

        debug!(
            "[{}] launching {} over {} neurons",
            self.backend.backend_name(),
            launch.variant(),
            launch.neuron_count()
        );

        let out = self.backend.backward(launch)?;
        self.report_timing(
            &launch.variant().to_string(),
            out.timing.total_us,
            launch.neuron_count(),
        );
        Ok(out)
    }

    fn report_timing(&self, variant: &str, total_us: f64, neuron_count: usize) {
        if total_us > SLOW_LAUNCH_US {
            warn!(
                "[{}] slow launch: {} over {} neurons took {:.2}ms",
                self.backend.backend_name(),
                variant,
                neuron_count,
                total_us / 1000.0
            );
        } else {
            debug!(
                "[{}] {} done in {:.1}μs",
                self.backend.backend_name(),
                variant,
                total_us
            );
        }
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::cpu()
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("backend", &self.backend.backend_name())
            .field("device", &self.backend.device())
            .finish()
    }
}
