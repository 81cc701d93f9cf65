// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference-time batch normalization.
//!
//! Parameters: `0` = channels (required), `1` = eps (default `0.0`).
//! Weights, in order, each `channels` raw `f32` values: slope, mean,
//! variance, bias.
//!
//! The four weight vectors are folded at load time into a per-channel
//! scale `b = slope / sqrt(var + eps)` and shift `a = bias - mean * b`,
//! so that forward is `x = b * x + a`.

use crate::{Layer, LayerCaps, LayerError, RunOptions};
use model_io::{ModelBin, ParamDict, WeightStorage};
use rayon::prelude::*;
use tensor_core::{Shape, Tensor};

#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub channels: usize,
    pub eps: f32,
    a_data: Tensor,
    b_data: Tensor,
}

impl Default for BatchNorm {
    fn default() -> Self {
        Self {
            channels: 0,
            eps: 0.0,
            a_data: Tensor::zeros(Shape::vector(0)),
            b_data: Tensor::zeros(Shape::vector(0)),
        }
    }
}

impl BatchNorm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-channel shift.
    pub fn a_data(&self) -> &Tensor {
        &self.a_data
    }

    /// Per-channel scale.
    pub fn b_data(&self) -> &Tensor {
        &self.b_data
    }

    pub(crate) fn check_channels(&self, shape: &Shape) -> Result<(), LayerError> {
        if shape.channels() != self.channels {
            return Err(LayerError::ShapeMismatch {
                kind: "BatchNorm",
                detail: format!(
                    "input has {} channels, layer expects {}",
                    shape.channels(),
                    self.channels
                ),
            });
        }
        Ok(())
    }
}

impl Layer for BatchNorm {
    fn kind(&self) -> &'static str {
        "BatchNorm"
    }

    fn caps(&self) -> LayerCaps {
        LayerCaps {
            supports_inplace: true,
            ..Default::default()
        }
    }

    fn load_param(&mut self, pd: &ParamDict) -> Result<(), LayerError> {
        self.channels = pd.require_count(0)?;
        self.eps = pd.get_float(1, 0.0);
        Ok(())
    }

    fn load_model(&mut self, mb: &mut ModelBin<'_>) -> Result<(), LayerError> {
        let slope = mb.load(self.channels, WeightStorage::Raw)?;
        let mean = mb.load(self.channels, WeightStorage::Raw)?;
        let var = mb.load(self.channels, WeightStorage::Raw)?;
        let bias = mb.load(self.channels, WeightStorage::Raw)?;

        let (a, b): (Vec<f32>, Vec<f32>) = slope
            .as_slice()
            .iter()
            .zip(mean.as_slice())
            .zip(var.as_slice())
            .zip(bias.as_slice())
            .map(|(((&s, &m), &v), &bi)| {
                let sqrt_var = (v + self.eps).sqrt();
                (bi - s * m / sqrt_var, s / sqrt_var)
            })
            .unzip();

        self.a_data = Tensor::from_vec(Shape::vector(self.channels), a)?;
        self.b_data = Tensor::from_vec(Shape::vector(self.channels), b)?;
        tracing::debug!("BatchNorm: folded {} channels (eps={})", self.channels, self.eps);
        Ok(())
    }

    fn forward_inplace(&self, blob: &mut Tensor, _opt: &RunOptions) -> Result<(), LayerError> {
        self.check_channels(blob.shape())?;
        let size = blob.shape().channel_size();
        if size == 0 {
            return Ok(());
        }

        let a = self.a_data.as_slice();
        let b = self.b_data.as_slice();
        blob.as_mut_slice()
            .par_chunks_mut(size)
            .enumerate()
            .for_each(|(q, channel)| {
                let (aq, bq) = (a[q], b[q]);
                channel.iter_mut().for_each(|v| *v = bq * *v + aq);
            });
        Ok(())
    }
}
