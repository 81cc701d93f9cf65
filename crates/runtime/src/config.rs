// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! num_threads = 4          # optional, defaults to the CPUs of power_mode
//! power_mode = "big"       # "all" | "little" | "big"
//! backend = "gpu"          # "cpu" | "gpu"
//! precision = "f16"        # "f32" | "f16"
//! lightmode = true
//! enable_profiling = false
//! ```
//!
//! The file only seeds startup values; nothing is written back.

use crate::RuntimeError;
use cpu_topology::PowerMode;
use layers::{Backend, RunOptions};
use std::path::Path;
use tensor_core::DType;

/// Power mode as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerModeSetting {
    #[default]
    All,
    Little,
    Big,
}

impl PowerModeSetting {
    pub fn mode(self) -> PowerMode {
        match self {
            PowerModeSetting::All => PowerMode::All,
            PowerModeSetting::Little => PowerMode::Little,
            PowerModeSetting::Big => PowerMode::Big,
        }
    }
}

/// Configuration for the runtime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of worker threads (defaults to the CPU count of `power_mode`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<usize>,
    pub power_mode: PowerModeSetting,
    pub backend: Backend,
    /// Storage precision of device-resident weights.
    pub precision: DType,
    /// Let layers overwrite blobs no later layer reads.
    pub lightmode: bool,
    /// Whether to record per-layer timings.
    pub enable_profiling: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            power_mode: PowerModeSetting::All,
            backend: Backend::Cpu,
            precision: DType::F32,
            lightmode: true,
            enable_profiling: false,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))?;
        if config.num_threads == Some(0) {
            return Err(RuntimeError::ConfigError(
                "num_threads must be at least 1".into(),
            ));
        }
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Resolves the number of worker threads.
    pub fn resolve_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| cpu_topology::thread_affinity_mask(self.power_mode.mode().as_i32()).count())
            .max(1)
    }

    /// The options every load and forward call of a network runs with.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            num_threads: self.resolve_threads(),
            backend: self.backend,
            precision: self.precision,
            lightmode: self.lightmode,
        }
    }
}
