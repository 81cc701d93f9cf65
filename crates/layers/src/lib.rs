// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # layers
//!
//! Operators and the contract the runtime drives them through.
//!
//! - [`Layer`] — lifecycle and forward entry points with default
//!   implementations; [`LayerCaps`] tells the caller which ones to use.
//! - [`RunOptions`] — per-run knobs (threads, backend, precision, lightmode).
//! - [`LayerRegistry`] — factories keyed by kind, with an optional GPU
//!   variant per kind.
//! - [`ops`] — the built-in operators.
//!
//! # Example
//! ```
//! use layers::{Backend, LayerRegistry, RunOptions};
//! use model_io::{ParamDict, ParamValue};
//! use tensor_core::{Shape, Tensor};
//!
//! let registry = LayerRegistry::builtin();
//! let pd = ParamDict::new().with(1, ParamValue::Int(2));
//! let argmax = registry.instantiate("ArgMax", Backend::Cpu, None, &pd).unwrap();
//!
//! let input = Tensor::from_f32(Shape::vector(3), &[0.2, 0.5, 0.3]).unwrap();
//! let top = argmax.forward(&input, &RunOptions::default()).unwrap();
//! assert_eq!(top.as_slice(), &[1.0, 2.0]);
//! ```

mod error;
mod layer;
mod option;
pub mod ops;
mod registry;

pub use error::LayerError;
pub use layer::{Layer, LayerCaps};
pub use option::{Backend, RunOptions};
pub use registry::{CpuFactory, GpuFactory, LayerRegistry};
