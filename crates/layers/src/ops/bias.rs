// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-channel bias addition.
//!
//! Parameters: `0` = bias_data_size (required, must equal the channel
//! count of the input). Weights: `bias_data_size` raw `f32` values.

use crate::{Layer, LayerCaps, LayerError, RunOptions};
use model_io::{ModelBin, ParamDict, WeightStorage};
use rayon::prelude::*;
use tensor_core::{Shape, Tensor};

#[derive(Debug, Clone)]
pub struct Bias {
    pub bias_data_size: usize,
    pub bias_data: Tensor,
}

impl Default for Bias {
    fn default() -> Self {
        Self {
            bias_data_size: 0,
            bias_data: Tensor::zeros(Shape::vector(0)),
        }
    }
}

impl Bias {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Bias {
    fn kind(&self) -> &'static str {
        "Bias"
    }

    fn caps(&self) -> LayerCaps {
        LayerCaps {
            supports_inplace: true,
            ..Default::default()
        }
    }

    fn load_param(&mut self, pd: &ParamDict) -> Result<(), LayerError> {
        self.bias_data_size = pd.require_count(0)?;
        Ok(())
    }

    fn load_model(&mut self, mb: &mut ModelBin<'_>) -> Result<(), LayerError> {
        self.bias_data = mb.load(self.bias_data_size, WeightStorage::Raw)?;
        Ok(())
    }

    fn forward_inplace(&self, blob: &mut Tensor, _opt: &RunOptions) -> Result<(), LayerError> {
        let channels = blob.shape().channels();
        if channels != self.bias_data.num_elements() {
            return Err(LayerError::ShapeMismatch {
                kind: self.kind(),
                detail: format!(
                    "input has {channels} channels, bias has {}",
                    self.bias_data.num_elements()
                ),
            });
        }
        let size = blob.shape().channel_size();
        if size == 0 {
            return Ok(());
        }

        let bias = self.bias_data.as_slice();
        blob.as_mut_slice()
            .par_chunks_mut(size)
            .zip(bias.par_iter())
            .for_each(|(channel, &b)| channel.iter_mut().for_each(|v| *v += b));
        Ok(())
    }
}
