// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compute-device trait and the host-side device.
//!
//! A device owns buffers and pipelines addressed by integer ids. Callers
//! normally go through the RAII wrappers ([`DeviceBuffer`](crate::DeviceBuffer),
//! [`Pipeline`](crate::Pipeline)) rather than these raw calls.

use crate::GpuError;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Handle to a compiled pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u64);

/// A compute kernel: reads and writes its bound buffers in binding order,
/// parameterized by push constants.
///
/// Push constants are raw 32-bit words. Counts and sizes are passed as
/// integers; a float constant travels as its bit pattern (`f32::to_bits`).
pub type KernelFn = fn(bindings: &mut [Vec<f32>], push: &[u32]) -> Result<(), GpuError>;

/// A compute shader: a named kernel with a fixed number of bindings.
#[derive(Clone, Copy)]
pub struct ShaderModule {
    pub name: &'static str,
    pub bindings: usize,
    pub entry: KernelFn,
}

impl fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderModule")
            .field("name", &self.name)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// A device that can hold `f32` buffers and run compute pipelines on them.
pub trait ComputeDevice: Send + Sync {
    fn name(&self) -> &str;

    fn create_pipeline(&self, shader: &ShaderModule) -> Result<PipelineId, GpuError>;

    fn destroy_pipeline(&self, pipeline: PipelineId) -> Result<(), GpuError>;

    /// Allocates a zero-filled buffer of `len` elements.
    fn alloc(&self, len: usize) -> Result<BufferId, GpuError>;

    fn free(&self, buffer: BufferId) -> Result<(), GpuError>;

    /// Element count of a live buffer.
    fn buffer_len(&self, buffer: BufferId) -> Result<usize, GpuError>;

    /// Overwrites a buffer; `data` must match its length.
    fn write(&self, buffer: BufferId, data: &[f32]) -> Result<(), GpuError>;

    /// Copies a buffer out; `out` must match its length.
    fn read(&self, buffer: BufferId, out: &mut [f32]) -> Result<(), GpuError>;

    /// Runs `pipeline` over `bindings` and blocks until it completes.
    fn dispatch(
        &self,
        pipeline: PipelineId,
        bindings: &[BufferId],
        push: &[u32],
    ) -> Result<(), GpuError>;

    fn live_pipelines(&self) -> usize;

    fn live_buffers(&self) -> usize;
}

/// Runs kernels on the calling host thread.
///
/// Stands in for a GPU on machines without one and in tests; resource
/// accounting matches what a real device would track.
pub struct HostDevice {
    name: String,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<u64, Vec<f32>>>,
    pipelines: Mutex<HashMap<u64, ShaderModule>>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self {
            name: "host".to_string(),
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// A process-wide host device.
    pub fn shared() -> Arc<dyn ComputeDevice> {
        static DEVICE: OnceCell<Arc<HostDevice>> = OnceCell::new();
        DEVICE.get_or_init(|| Arc::new(HostDevice::new())).clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDevice")
            .field("live_buffers", &self.live_buffers())
            .field("live_pipelines", &self.live_pipelines())
            .finish()
    }
}

impl ComputeDevice for HostDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_pipeline(&self, shader: &ShaderModule) -> Result<PipelineId, GpuError> {
        let id = self.next_id();
        self.pipelines.lock().insert(id, *shader);
        tracing::debug!("{}: pipeline #{id} '{}'", self.name, shader.name);
        Ok(PipelineId(id))
    }

    fn destroy_pipeline(&self, pipeline: PipelineId) -> Result<(), GpuError> {
        self.pipelines
            .lock()
            .remove(&pipeline.0)
            .map(|_| ())
            .ok_or(GpuError::InvalidPipeline(pipeline.0))
    }

    fn alloc(&self, len: usize) -> Result<BufferId, GpuError> {
        let id = self.next_id();
        self.buffers.lock().insert(id, vec![0.0; len]);
        Ok(BufferId(id))
    }

    fn free(&self, buffer: BufferId) -> Result<(), GpuError> {
        self.buffers
            .lock()
            .remove(&buffer.0)
            .map(|_| ())
            .ok_or(GpuError::InvalidBuffer(buffer.0))
    }

    fn buffer_len(&self, buffer: BufferId) -> Result<usize, GpuError> {
        self.buffers
            .lock()
            .get(&buffer.0)
            .map(Vec::len)
            .ok_or(GpuError::InvalidBuffer(buffer.0))
    }

    fn write(&self, buffer: BufferId, data: &[f32]) -> Result<(), GpuError> {
        let mut buffers = self.buffers.lock();
        let dst = buffers
            .get_mut(&buffer.0)
            .ok_or(GpuError::InvalidBuffer(buffer.0))?;
        if dst.len() != data.len() {
            return Err(GpuError::SizeMismatch {
                expected: dst.len(),
                actual: data.len(),
            });
        }
        dst.copy_from_slice(data);
        Ok(())
    }

    fn read(&self, buffer: BufferId, out: &mut [f32]) -> Result<(), GpuError> {
        let buffers = self.buffers.lock();
        let src = buffers
            .get(&buffer.0)
            .ok_or(GpuError::InvalidBuffer(buffer.0))?;
        if src.len() != out.len() {
            return Err(GpuError::SizeMismatch {
                expected: src.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(src);
        Ok(())
    }

    fn dispatch(
        &self,
        pipeline: PipelineId,
        bindings: &[BufferId],
        push: &[u32],
    ) -> Result<(), GpuError> {
        let shader = *self
            .pipelines
            .lock()
            .get(&pipeline.0)
            .ok_or(GpuError::InvalidPipeline(pipeline.0))?;
        if bindings.len() != shader.bindings {
            return Err(GpuError::SizeMismatch {
                expected: shader.bindings,
                actual: bindings.len(),
            });
        }

        let mut seen = HashSet::with_capacity(bindings.len());
        for b in bindings {
            if !seen.insert(b.0) {
                return Err(GpuError::BindingConflict { buffer: b.0 });
            }
        }

        let mut buffers = self.buffers.lock();
        if let Some(missing) = bindings.iter().find(|b| !buffers.contains_key(&b.0)) {
            return Err(GpuError::InvalidBuffer(missing.0));
        }
        let mut bound: Vec<Vec<f32>> = bindings
            .iter()
            .map(|b| buffers.remove(&b.0).unwrap_or_default())
            .collect();

        let result = (shader.entry)(&mut bound, push);

        for (b, data) in bindings.iter().zip(bound) {
            buffers.insert(b.0, data);
        }
        result
    }

    fn live_pipelines(&self) -> usize {
        self.pipelines.lock().len()
    }

    fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }
}
