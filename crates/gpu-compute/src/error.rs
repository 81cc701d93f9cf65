// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device resources and command execution.

/// Errors that can occur on a compute device.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// The buffer id is unknown or was already freed.
    #[error("invalid device buffer #{0}")]
    InvalidBuffer(u64),

    /// The pipeline id is unknown or was already destroyed.
    #[error("invalid pipeline #{0}")]
    InvalidPipeline(u64),

    /// The same buffer was bound to more than one slot of a dispatch.
    #[error("buffer #{buffer} bound more than once in one dispatch")]
    BindingConflict { buffer: u64 },

    /// Data length does not match the buffer or binding layout.
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A compute kernel rejected its inputs.
    #[error("kernel '{kernel}' failed: {detail}")]
    KernelError { kernel: String, detail: String },
}
