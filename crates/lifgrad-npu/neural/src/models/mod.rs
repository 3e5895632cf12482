// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Neuron Models
//!
//! Per-neuron update rules. Only the hard-reset LIF model is provided; soft
//! reset (subtracting the threshold) is not part of this crate.

pub mod lif;

pub use lif::{LocalGradient, NeuronBackward, NeuronStep};
