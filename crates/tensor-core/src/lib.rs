// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! The tensor value type that flows between layers.
//!
//! This crate provides:
//! - [`Tensor`] — an n-dimensional `f32` tensor with reference-counted,
//!   copy-on-write storage. Cloning a tensor is cheap and shares the buffer;
//!   the first mutation through a shared handle detaches it.
//! - [`Shape`] — dimension descriptors with channel-major helpers.
//! - [`DType`] — element types used for weight storage and precision modes.
//!
//! Layers treat tensors as opaque values: they read and write elements by
//! channel and never depend on how the storage is shared.

mod dtype;
mod error;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use shape::Shape;
pub use tensor::Tensor;
