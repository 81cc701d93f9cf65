// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned device buffers and device-resident tensors.
//!
//! [`DeviceBuffer`] frees its storage on drop. [`DeviceTensor`] pairs a
//! shared buffer with a shape; clones share the buffer, and the storage is
//! freed when the last clone goes away.

use crate::{BufferId, ComputeDevice, GpuError};
use std::fmt;
use std::sync::Arc;
use tensor_core::{Shape, Tensor};

/// An allocation on a compute device, freed when dropped.
pub struct DeviceBuffer {
    device: Arc<dyn ComputeDevice>,
    id: BufferId,
    len: usize,
}

impl DeviceBuffer {
    /// Allocates a zero-filled buffer of `len` elements.
    pub fn new(device: &Arc<dyn ComputeDevice>, len: usize) -> Result<Self, GpuError> {
        let id = device.alloc(len)?;
        Ok(Self {
            device: Arc::clone(device),
            id,
            len,
        })
    }

    /// Allocates a buffer and fills it with `data`.
    pub fn from_slice(device: &Arc<dyn ComputeDevice>, data: &[f32]) -> Result<Self, GpuError> {
        let buffer = Self::new(device, data.len())?;
        buffer.write(data)?;
        Ok(buffer)
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    pub fn write(&self, data: &[f32]) -> Result<(), GpuError> {
        self.device.write(self.id, data)
    }

    pub fn read_to_vec(&self) -> Result<Vec<f32>, GpuError> {
        let mut out = vec![0.0; self.len];
        self.device.read(self.id, &mut out)?;
        Ok(out)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.free(self.id) {
            tracing::warn!("failed to free device buffer: {e}");
        }
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("device", &self.device.name())
            .finish()
    }
}

/// A tensor resident on a compute device.
#[derive(Clone)]
pub struct DeviceTensor {
    buffer: Arc<DeviceBuffer>,
    shape: Shape,
}

impl DeviceTensor {
    /// Wraps a buffer whose length matches `shape`.
    pub fn new(buffer: Arc<DeviceBuffer>, shape: Shape) -> Result<Self, GpuError> {
        if buffer.len() != shape.num_elements() {
            return Err(GpuError::SizeMismatch {
                expected: shape.num_elements(),
                actual: buffer.len(),
            });
        }
        Ok(Self { buffer, shape })
    }

    /// Allocates a zero-filled device tensor.
    pub fn zeros(device: &Arc<dyn ComputeDevice>, shape: Shape) -> Result<Self, GpuError> {
        let buffer = DeviceBuffer::new(device, shape.num_elements())?;
        Ok(Self {
            buffer: Arc::new(buffer),
            shape,
        })
    }

    /// Allocates and fills a device tensor from a host tensor.
    pub fn from_host(device: &Arc<dyn ComputeDevice>, host: &Tensor) -> Result<Self, GpuError> {
        let buffer = DeviceBuffer::from_slice(device, host.as_slice())?;
        Ok(Self {
            buffer: Arc::new(buffer),
            shape: host.shape().clone(),
        })
    }

    /// Copies the contents back into a host tensor.
    pub fn to_host(&self) -> Result<Tensor, GpuError> {
        let data = self.buffer.read_to_vec()?;
        Tensor::from_vec(self.shape.clone(), data).map_err(|e| GpuError::KernelError {
            kernel: "download".into(),
            detail: e.to_string(),
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn buffer(&self) -> &Arc<DeviceBuffer> {
        &self.buffer
    }

    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn num_elements(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if both tensors use the same device buffer.
    pub fn shares_buffer(&self, other: &DeviceTensor) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl fmt::Debug for DeviceTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTensor")
            .field("buffer", &self.buffer.id())
            .field("shape", &self.shape)
            .finish()
    }
}
