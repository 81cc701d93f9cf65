// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Recorded device work.
//!
//! A [`CommandStream`] records uploads, dispatches and downloads and runs
//! them in recording order on [`submit_and_wait`](CommandStream::submit_and_wait),
//! which returns only after all of them completed. Downloaded data becomes
//! available through the [`DownloadSlot`] returned at record time.
//!
//! A [`TransferStream`] batches weight uploads for many operators into one
//! flush at model-load time.

use crate::{ComputeDevice, DeviceTensor, GpuError, Pipeline, PipelineId};
use half::f16;
use parking_lot::Mutex;
use std::sync::Arc;
use tensor_core::{DType, Shape, Tensor};

enum Command {
    Upload {
        dst: DeviceTensor,
        data: Tensor,
    },
    Dispatch {
        pipeline: PipelineId,
        name: &'static str,
        bindings: Vec<DeviceTensor>,
        push: Vec<u32>,
    },
    Copy {
        src: DeviceTensor,
        dst: DeviceTensor,
    },
    Download {
        src: DeviceTensor,
        slot: Arc<Mutex<Option<Tensor>>>,
    },
}

/// Receives the contents of a recorded download after submission.
#[derive(Debug, Clone)]
pub struct DownloadSlot {
    shape: Shape,
    cell: Arc<Mutex<Option<Tensor>>>,
}

impl DownloadSlot {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns `true` once the stream was submitted.
    pub fn is_ready(&self) -> bool {
        self.cell.lock().is_some()
    }

    /// Takes the downloaded tensor, or `None` if the stream was not
    /// submitted yet.
    pub fn take(&self) -> Option<Tensor> {
        self.cell.lock().take()
    }
}

/// An ordered list of device commands.
pub struct CommandStream {
    device: Arc<dyn ComputeDevice>,
    commands: Vec<Command>,
}

impl CommandStream {
    pub fn new(device: Arc<dyn ComputeDevice>) -> Self {
        Self {
            device,
            commands: Vec::new(),
        }
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    /// Number of commands recorded and not yet submitted.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Allocates a device tensor now and records copying `host` into it.
    pub fn record_upload(&mut self, host: &Tensor) -> Result<DeviceTensor, GpuError> {
        let dst = DeviceTensor::zeros(&self.device, host.shape().clone())?;
        self.commands.push(Command::Upload {
            dst: dst.clone(),
            data: host.clone(),
        });
        Ok(dst)
    }

    /// Records a pipeline dispatch over `bindings`.
    pub fn record_dispatch(&mut self, pipeline: &Pipeline, bindings: &[&DeviceTensor], push: &[u32]) {
        self.commands.push(Command::Dispatch {
            pipeline: pipeline.id(),
            name: pipeline.name(),
            bindings: bindings.iter().map(|&t| t.clone()).collect(),
            push: push.to_vec(),
        });
    }

    /// Allocates a device tensor now and records a device-side copy of `src`
    /// into it.
    pub fn record_copy(&mut self, src: &DeviceTensor) -> Result<DeviceTensor, GpuError> {
        let dst = DeviceTensor::zeros(&self.device, src.shape().clone())?;
        self.commands.push(Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
        });
        Ok(dst)
    }

    /// Records copying `src` back to the host.
    pub fn record_download(&mut self, src: &DeviceTensor) -> DownloadSlot {
        let cell = Arc::new(Mutex::new(None));
        self.commands.push(Command::Download {
            src: src.clone(),
            slot: Arc::clone(&cell),
        });
        DownloadSlot {
            shape: src.shape().clone(),
            cell,
        }
    }

    /// Runs every recorded command in order and waits for completion.
    ///
    /// The stream is empty afterwards, also when a command failed.
    pub fn submit_and_wait(&mut self) -> Result<(), GpuError> {
        let commands = std::mem::take(&mut self.commands);
        tracing::debug!("{}: submitting {} commands", self.device.name(), commands.len());
        for command in commands {
            match command {
                Command::Upload { dst, data } => dst.buffer().write(data.as_slice())?,
                Command::Dispatch {
                    pipeline,
                    name,
                    bindings,
                    push,
                } => {
                    let ids: Vec<_> = bindings.iter().map(DeviceTensor::id).collect();
                    self.device.dispatch(pipeline, &ids, &push).map_err(|e| {
                        tracing::debug!("dispatch '{name}' failed: {e}");
                        e
                    })?;
                }
                Command::Copy { src, dst } => {
                    let data = src.buffer().read_to_vec()?;
                    dst.buffer().write(&data)?;
                }
                Command::Download { src, slot } => {
                    let host = src.to_host()?;
                    *slot.lock() = Some(host);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStream")
            .field("device", &self.device.name())
            .field("pending", &self.commands.len())
            .finish()
    }
}

/// Batches host-to-device weight uploads.
///
/// With `F16` precision the staged values are rounded through half
/// precision, matching what a half-precision device would store.
pub struct TransferStream {
    device: Arc<dyn ComputeDevice>,
    precision: DType,
    pending: Vec<(DeviceTensor, Vec<f32>)>,
    staged_bytes: usize,
}

impl TransferStream {
    pub fn new(device: Arc<dyn ComputeDevice>, precision: DType) -> Self {
        Self {
            device,
            precision,
            pending: Vec::new(),
            staged_bytes: 0,
        }
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    pub fn precision(&self) -> DType {
        self.precision
    }

    /// Allocates the device copy of `host` and stages its contents.
    ///
    /// The device tensor holds zeros until [`flush`](Self::flush).
    pub fn upload(&mut self, host: &Tensor) -> Result<DeviceTensor, GpuError> {
        let dst = DeviceTensor::zeros(&self.device, host.shape().clone())?;
        let data = match self.precision {
            DType::F32 => host.as_slice().to_vec(),
            DType::F16 => host
                .as_slice()
                .iter()
                .map(|&v| f16::from_f32(v).to_f32())
                .collect(),
        };
        self.staged_bytes += data.len() * self.precision.size_bytes();
        self.pending.push((dst.clone(), data));
        Ok(dst)
    }

    /// Number of uploads waiting for a flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Bytes staged so far at the stream's precision.
    pub fn staged_bytes(&self) -> usize {
        self.staged_bytes
    }

    /// Writes every staged upload to the device. Returns how many were written.
    pub fn flush(&mut self) -> Result<usize, GpuError> {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (dst, data) in pending {
            dst.buffer().write(&data)?;
        }
        tracing::debug!(
            "{}: flushed {count} weight uploads ({} bytes)",
            self.device.name(),
            self.staged_bytes
        );
        Ok(count)
    }
}

impl Drop for TransferStream {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!("transfer stream dropped with {} unflushed uploads", self.pending.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostDevice, ShaderModule};

    fn add(bindings: &mut [Vec<f32>], _push: &[u32]) -> Result<(), GpuError> {
        let (lhs, rest) = bindings.split_at_mut(1);
        let (rhs, out) = rest.split_at_mut(1);
        for ((o, a), b) in out[0].iter_mut().zip(&lhs[0]).zip(&rhs[0]) {
            *o = a + b;
        }
        Ok(())
    }

    const ADD: ShaderModule = ShaderModule {
        name: "add",
        bindings: 3,
        entry: add,
    };

    fn device() -> Arc<dyn ComputeDevice> {
        Arc::new(HostDevice::new())
    }

    #[test]
    fn test_record_and_submit_in_order() {
        let dev = device();
        let pipeline = Pipeline::new(&dev, &ADD).unwrap();
        let a = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_f32(Shape::vector(3), &[10.0, 20.0, 30.0]).unwrap();

        let mut cmd = CommandStream::new(Arc::clone(&dev));
        let da = cmd.record_upload(&a).unwrap();
        let db = cmd.record_upload(&b).unwrap();
        let out = DeviceTensor::zeros(&dev, Shape::vector(3)).unwrap();
        cmd.record_dispatch(&pipeline, &[&da, &db, &out], &[]);
        let slot = cmd.record_download(&out);
        assert_eq!(cmd.len(), 4);
        assert!(!slot.is_ready());

        cmd.submit_and_wait().unwrap();
        assert!(cmd.is_empty());
        let result = slot.take().unwrap();
        assert_eq!(result.as_slice(), &[11.0, 22.0, 33.0]);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_record_copy_is_independent() {
        let dev = device();
        let src = DeviceTensor::from_host(
            &dev,
            &Tensor::from_f32(Shape::vector(2), &[4.0, 5.0]).unwrap(),
        )
        .unwrap();
        let mut cmd = CommandStream::new(Arc::clone(&dev));
        let copy = cmd.record_copy(&src).unwrap();
        cmd.submit_and_wait().unwrap();
        assert!(!copy.shares_buffer(&src));
        assert_eq!(copy.to_host().unwrap().as_slice(), &[4.0, 5.0]);
    }

    #[test]
    fn test_failed_submit_clears_stream() {
        let dev = device();
        let pipeline = Pipeline::new(&dev, &ADD).unwrap();
        let a = DeviceTensor::zeros(&dev, Shape::vector(2)).unwrap();
        let mut cmd = CommandStream::new(Arc::clone(&dev));
        cmd.record_dispatch(&pipeline, &[&a, &a, &a], &[]);
        assert!(matches!(
            cmd.submit_and_wait(),
            Err(GpuError::BindingConflict { .. })
        ));
        assert!(cmd.is_empty());
    }

    #[test]
    fn test_transfer_stream_batches() {
        let dev = device();
        let w = Tensor::from_f32(Shape::vector(2), &[0.5, 1.5]).unwrap();
        let mut transfer = TransferStream::new(Arc::clone(&dev), DType::F32);
        let dw = transfer.upload(&w).unwrap();
        assert_eq!(transfer.pending(), 1);
        assert_eq!(dw.to_host().unwrap().as_slice(), &[0.0, 0.0]);

        assert_eq!(transfer.flush().unwrap(), 1);
        assert_eq!(transfer.pending(), 0);
        assert_eq!(dw.to_host().unwrap().as_slice(), &[0.5, 1.5]);
        assert_eq!(transfer.staged_bytes(), 8);
    }

    #[test]
    fn test_transfer_stream_f16_rounding() {
        let dev = device();
        let w = Tensor::from_f32(Shape::vector(2), &[0.1, 1.0]).unwrap();
        let mut transfer = TransferStream::new(Arc::clone(&dev), DType::F16);
        let dw = transfer.upload(&w).unwrap();
        transfer.flush().unwrap();
        let got = dw.to_host().unwrap();
        assert_eq!(got.as_slice()[0], f16::from_f32(0.1).to_f32());
        assert_eq!(got.as_slice()[1], 1.0);
        assert_eq!(transfer.staged_bytes(), 4);
    }
}
