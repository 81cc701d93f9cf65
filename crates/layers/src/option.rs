// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-call execution options.

use std::fmt;
use tensor_core::DType;

/// Which implementation of an operator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only configuration passed to every load and forward call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Worker threads for CPU operators.
    pub num_threads: usize,
    pub backend: Backend,
    /// Storage precision for device-resident weights.
    pub precision: DType,
    /// Allow operators to overwrite blobs nobody reads afterwards.
    pub lightmode: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            backend: Backend::Cpu,
            precision: DType::F32,
            lightmode: true,
        }
    }
}

impl RunOptions {
    /// Returns `true` if GPU entry points should be used where available.
    pub fn use_gpu(&self) -> bool {
        self.backend == Backend::Gpu
    }
}
