// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for network loading and execution.

use cpu_topology::TopologyError;
use gpu_compute::GpuError;
use layers::LayerError;
use model_io::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The parameter or weight stream could not be read.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A layer failed to load, prepare or run.
    #[error("layer '{layer}': {source}")]
    LayerError {
        layer: String,
        #[source]
        source: LayerError,
    },

    /// The layer graph is inconsistent (arity, ordering, blob counts).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A blob name that the network does not define.
    #[error("unknown blob '{0}'")]
    UnknownBlob(String),

    /// A network input needed for the requested outputs was not supplied.
    #[error("input blob '{0}' was not provided")]
    MissingInput(String),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("device error: {0}")]
    Device(#[from] GpuError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl RuntimeError {
    pub(crate) fn layer(name: &str, source: LayerError) -> Self {
        RuntimeError::LayerError {
            layer: name.to_string(),
            source,
        }
    }
}
