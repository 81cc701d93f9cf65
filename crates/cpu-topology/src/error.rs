// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for topology probing and affinity control.

/// Errors that can occur when probing the CPU or changing affinity.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// A power mode outside `0..=2` was requested.
    #[error("invalid power mode {0}, expected 0 (all), 1 (little) or 2 (big)")]
    InvalidMode(i32),

    /// Thread affinity cannot be set on this platform.
    #[error("thread affinity is not supported on this platform")]
    AffinityUnsupported,

    /// A worker failed to pin itself to the requested mask.
    #[error("worker {worker} failed to set affinity: {source}")]
    AffinityFailed {
        worker: usize,
        source: std::io::Error,
    },

    /// An affinity mask with no CPUs was requested.
    #[error("affinity mask is empty")]
    EmptyMask,

    /// The worker pool could not be (re)built.
    #[error("failed to build worker pool: {0}")]
    PoolBuildError(String),

    /// Failed to read a sysfs or procfs file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse a value from a system file.
    #[error("failed to parse value from {path}: {detail}")]
    ParseError { path: String, detail: String },

    /// The expected sysfs or procfs path does not exist.
    #[error("system path not found: {path}")]
    NotAvailable { path: String },
}
