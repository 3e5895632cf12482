// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # lifgrad-observability
//!
//! Logging setup shared by lifgrad binaries and tests, with per-crate debug
//! flag support.
//!
//! Library crates only emit `tracing` events; installing a subscriber is
//! left to the application, which calls [`init_logging`] once.
//!
//! ## Features
//! - `file-logging`: JSON log files in timestamped run folders, with rotation

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known lifgrad crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "lifgrad",
    "lifgrad-npu-engine",
    "lifgrad-npu-neural",
    "lifgrad-config",
    "lifgrad-observability",
];
