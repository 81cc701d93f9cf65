// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # gpu-compute
//!
//! The compute-device side of operator execution.
//!
//! - [`ComputeDevice`] — buffers, pipelines and dispatch behind one trait.
//!   [`HostDevice`] runs kernels on the host and is what the runtime uses
//!   when no other device is supplied.
//! - [`Pipeline`], [`DeviceBuffer`] — RAII handles released on drop.
//!   [`DeviceTensor`] is a shared device buffer plus a shape.
//! - [`CommandStream`] — records uploads, dispatches and downloads;
//!   `submit_and_wait` is the join point with the host.
//! - [`TransferStream`] — batches weight uploads at model-load time.
//!
//! # Example
//! ```
//! use gpu_compute::{CommandStream, HostDevice};
//! use tensor_core::{Shape, Tensor};
//!
//! let device = HostDevice::shared();
//! let mut cmd = CommandStream::new(device);
//! let host = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
//! let on_device = cmd.record_upload(&host).unwrap();
//! let slot = cmd.record_download(&on_device);
//! cmd.submit_and_wait().unwrap();
//! assert_eq!(slot.take().unwrap().as_slice(), &[1.0, 2.0]);
//! ```

mod buffer;
mod command;
mod device;
mod error;
mod pipeline;

pub use buffer::{DeviceBuffer, DeviceTensor};
pub use command::{CommandStream, DownloadSlot, TransferStream};
pub use device::{BufferId, ComputeDevice, HostDevice, KernelFn, PipelineId, ShaderModule};
pub use error::GpuError;
pub use pipeline::Pipeline;
