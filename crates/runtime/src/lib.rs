// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Loads a network of layers and runs it.
//!
//! The runtime takes:
//! - A text parameter stream naming each layer, its kind, its input and
//!   output blobs, and its parameters.
//! - A binary weight stream read layer by layer.
//! - A [`RuntimeConfig`] choosing backend, precision, thread count and
//!   power mode.
//!
//! And executes the layers the requested outputs depend on, choosing each
//! layer's entry point with [`select_entry`].
//!
//! # Type-State Pipeline
//! ```text
//! Net<Empty> → Net<Parsed> → Net<Ready>
//! ```
//! Transitions are compile-time checked.
//!
//! # Threading
//! Forward passes run inside the global `cpu_topology::ThreadController`
//! pool, so the power mode and pool size set at startup apply to every
//! channel-parallel operator.

mod config;
mod dispatch;
mod error;
mod metrics;
mod net;

pub use config::{PowerModeSetting, RuntimeConfig};
pub use dispatch::{select_entry, EntryPoint};
pub use error::RuntimeError;
pub use metrics::{ForwardMetrics, LayerMetrics};
pub use net::{Empty, Net, NetOutput, NetState, Parsed, Ready, PARAM_MAGIC};
