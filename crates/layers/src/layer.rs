// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The operator contract.
//!
//! Every operator implements [`Layer`]. The trait supplies defaults for
//! every operation, so an operator overrides only what it actually does:
//!
//! - lifecycle (`load_param`, `load_model`, `create_pipeline`,
//!   `destroy_pipeline`, `upload_model`) succeeds without doing anything;
//! - `forward` clones its input and runs `forward_inplace` on the copy,
//!   `forward_multi` does the same with `forward_inplace_multi`, and
//!   `forward_gpu` records a device copy before `forward_inplace_gpu`;
//! - entry points an operator does not implement return
//!   [`LayerError::Unsupported`].
//!
//! Which entry point runs is decided by the caller from [`LayerCaps`].

use crate::{LayerError, RunOptions};
use gpu_compute::{CommandStream, DeviceTensor, TransferStream};
use model_io::{ModelBin, ParamDict};
use tensor_core::Tensor;

/// Fixed capabilities of a layer kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerCaps {
    /// Can overwrite its input blob with its output.
    pub supports_inplace: bool,
    /// Takes or produces more than one blob.
    pub supports_multi_input: bool,
    /// Has GPU entry points.
    pub supports_gpu: bool,
}

/// An operator instance.
pub trait Layer: Send + Sync {
    /// The kind tag, as written in parameter streams (e.g. `"BatchNorm"`).
    fn kind(&self) -> &'static str;

    fn caps(&self) -> LayerCaps {
        LayerCaps::default()
    }

    fn load_param(&mut self, _pd: &ParamDict) -> Result<(), LayerError> {
        Ok(())
    }

    fn load_model(&mut self, _mb: &mut ModelBin<'_>) -> Result<(), LayerError> {
        Ok(())
    }

    fn create_pipeline(&mut self, _opt: &RunOptions) -> Result<(), LayerError> {
        Ok(())
    }

    fn destroy_pipeline(&mut self, _opt: &RunOptions) -> Result<(), LayerError> {
        Ok(())
    }

    /// Stages device copies of the weights on `transfer`.
    fn upload_model(
        &mut self,
        _transfer: &mut TransferStream,
        _opt: &RunOptions,
    ) -> Result<(), LayerError> {
        Ok(())
    }

    fn forward(&self, bottom: &Tensor, opt: &RunOptions) -> Result<Tensor, LayerError> {
        let mut top = bottom.clone();
        self.forward_inplace(&mut top, opt)?;
        Ok(top)
    }

    fn forward_inplace(&self, _blob: &mut Tensor, _opt: &RunOptions) -> Result<(), LayerError> {
        Err(LayerError::Unsupported {
            op: "forward_inplace",
            kind: self.kind(),
        })
    }

    /// Multi-blob forward producing `num_tops` outputs.
    fn forward_multi(
        &self,
        bottoms: &[Tensor],
        num_tops: usize,
        opt: &RunOptions,
    ) -> Result<Vec<Tensor>, LayerError> {
        if num_tops != bottoms.len() {
            return Err(LayerError::Unsupported {
                op: "forward_multi",
                kind: self.kind(),
            });
        }
        let mut tops = bottoms.to_vec();
        self.forward_inplace_multi(&mut tops, opt)?;
        Ok(tops)
    }

    fn forward_inplace_multi(
        &self,
        _blobs: &mut [Tensor],
        _opt: &RunOptions,
    ) -> Result<(), LayerError> {
        Err(LayerError::Unsupported {
            op: "forward_inplace_multi",
            kind: self.kind(),
        })
    }

    /// Records the forward pass of `bottom` on `cmd`.
    fn forward_gpu(
        &self,
        bottom: &DeviceTensor,
        cmd: &mut CommandStream,
        opt: &RunOptions,
    ) -> Result<DeviceTensor, LayerError> {
        if !self.caps().supports_gpu {
            return Err(LayerError::Unsupported {
                op: "forward_gpu",
                kind: self.kind(),
            });
        }
        let mut top = cmd.record_copy(bottom)?;
        self.forward_inplace_gpu(&mut top, cmd, opt)?;
        Ok(top)
    }

    fn forward_inplace_gpu(
        &self,
        _blob: &mut DeviceTensor,
        _cmd: &mut CommandStream,
        _opt: &RunOptions,
    ) -> Result<(), LayerError> {
        Err(LayerError::Unsupported {
            op: "forward_inplace_gpu",
            kind: self.kind(),
        })
    }
}
