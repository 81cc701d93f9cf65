// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned compute pipelines.

use crate::{ComputeDevice, GpuError, PipelineId, ShaderModule};
use std::fmt;
use std::sync::Arc;

/// A compiled shader on a device, destroyed when dropped.
pub struct Pipeline {
    device: Arc<dyn ComputeDevice>,
    id: PipelineId,
    name: &'static str,
}

impl Pipeline {
    pub fn new(device: &Arc<dyn ComputeDevice>, shader: &ShaderModule) -> Result<Self, GpuError> {
        let id = device.create_pipeline(shader)?;
        Ok(Self {
            device: Arc::clone(device),
            id,
            name: shader.name,
        })
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_pipeline(self.id) {
            tracing::warn!("failed to destroy pipeline '{}': {e}", self.name);
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
