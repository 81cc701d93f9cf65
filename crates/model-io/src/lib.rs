// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-io
//!
//! Streams layer parameters and weights into the runtime.
//!
//! - [`DataReader`] — the origin-agnostic byte/text source with two
//!   operations: `scan` (next text token) and `read` (raw bytes).
//!   [`StreamReader`] wraps any buffered stream (usually a file) and
//!   [`MemoryReader`] wraps an in-memory or memory-mapped buffer.
//! - [`ParamDict`] — the typed `id -> value` lookup each layer reads its
//!   parameters from, filled from `id=value` tokens.
//! - [`ModelBin`] — decodes weight tensors (raw `f32` or tagged `f16`)
//!   out of a `DataReader`.
//!
//! # Example
//! ```
//! use model_io::{MemoryReader, ModelBin, WeightStorage};
//!
//! let bytes: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
//! let mut reader = MemoryReader::new(bytes);
//! let mut mb = ModelBin::new(&mut reader);
//! let weights = mb.load(2, WeightStorage::Raw).unwrap();
//! assert_eq!(weights.as_slice(), &[1.0, 2.0]);
//! ```

mod datareader;
mod error;
mod model_bin;
mod param_dict;

pub use datareader::{read_exact, scan_parsed, DataReader, MemoryReader, StreamReader};
pub use error::ModelError;
pub use model_bin::{ModelBin, WeightStorage, TAG_F16, TAG_F32};
pub use param_dict::{ParamDict, ParamTokens, ParamValue, ARRAY_ID_BASE, MAX_PARAM_COUNT};
