// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for operator loading and execution.

use gpu_compute::GpuError;
use model_io::ModelError;
use tensor_core::TensorError;

/// Errors that can occur while loading or running a layer.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// Parameters or weights could not be loaded.
    #[error("failed to load parameters or weights: {0}")]
    ParamError(#[from] ModelError),

    /// A GPU entry point was called before `create_pipeline` succeeded.
    #[error("{kind}: pipeline not created")]
    NotReady { kind: &'static str },

    /// The layer does not implement the requested entry point.
    #[error("{kind} does not implement {op}")]
    Unsupported { op: &'static str, kind: &'static str },

    /// No factory is registered for the layer kind.
    #[error("unknown layer kind '{0}'")]
    UnknownKind(String),

    /// Input blobs do not fit the layer's parameters or weights.
    #[error("{kind}: {detail}")]
    ShapeMismatch { kind: &'static str, detail: String },

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("device error: {0}")]
    Device(#[from] GpuError),
}
