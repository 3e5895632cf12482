// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Neural Types Module
//!
//! Core type definitions shared by the kernel math and every backend.

pub mod device;
pub mod error;
pub mod params;

// Re-export commonly used types
pub use device::Device;
pub use error::{Error, LifError, Result};
pub use params::{LifParameters, SurrogateGradient};
