// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for parameter and weight streams.

/// Errors that can occur while reading parameters or weights.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A parameter or weight file could not be opened.
    #[error("failed to open {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    /// A required parameter is missing or malformed.
    #[error("parameter {id}: {detail}")]
    ParamError { id: i32, detail: String },

    /// The parameter stream does not start with the expected magic number.
    #[error("bad parameter stream magic '{0}', expected 7767517")]
    BadMagic(String),

    /// The parameter stream ended early or contains an unexpected token.
    #[error("malformed parameter stream: {0}")]
    MalformedStream(String),

    /// The weight stream ended before a tensor was complete.
    #[error("truncated weight data: expected {expected} bytes, got {actual}")]
    TruncatedWeights { expected: usize, actual: usize },

    /// A tagged weight record carries a storage tag this reader cannot decode.
    #[error("unknown weight storage tag {0:#010x}")]
    UnknownWeightTag(u32),

    /// A decoded tensor could not be constructed.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),
}
