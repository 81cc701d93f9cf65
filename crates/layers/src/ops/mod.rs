// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference operators.

mod argmax;
mod batchnorm;
mod batchnorm_gpu;
mod bias;
mod split;

pub use argmax::ArgMax;
pub use batchnorm::BatchNorm;
pub use batchnorm_gpu::BatchNormGpu;
pub use bias::Bias;
pub use split::Split;
