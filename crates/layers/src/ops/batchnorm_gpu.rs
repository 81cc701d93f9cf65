// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device variant of [`BatchNorm`].
//!
//! Parameter and weight loading as well as the CPU entry points delegate
//! to the wrapped [`BatchNorm`]. The GPU entry points need a pipeline from
//! `create_pipeline` and weights from `upload_model`; without either they
//! return [`LayerError::NotReady`].

use super::BatchNorm;
use crate::{Layer, LayerCaps, LayerError, RunOptions};
use gpu_compute::{
    CommandStream, ComputeDevice, DeviceTensor, GpuError, Pipeline, ShaderModule, TransferStream,
};
use model_io::{ModelBin, ParamDict};
use std::fmt;
use std::sync::Arc;
use tensor_core::Tensor;

/// Bindings: `[blob, a, b]`. Push constants: `[channels, channel_size]`.
fn batchnorm_kernel(bindings: &mut [Vec<f32>], push: &[u32]) -> Result<(), GpuError> {
    let fail = |detail: String| GpuError::KernelError {
        kernel: "batchnorm".into(),
        detail,
    };
    let [channels, size] = push else {
        return Err(fail(format!("expected 2 push constants, got {}", push.len())));
    };
    let (channels, size) = (*channels as usize, *size as usize);

    let (blob, coeffs) = bindings.split_at_mut(1);
    let (a, b) = (&coeffs[0], &coeffs[1]);
    if a.len() < channels || b.len() < channels || blob[0].len() != channels * size {
        return Err(fail(format!(
            "bindings do not fit {channels} channels of {size} elements"
        )));
    }
    if size == 0 {
        return Ok(());
    }
    for (q, channel) in blob[0].chunks_mut(size).enumerate() {
        channel.iter_mut().for_each(|v| *v = b[q] * *v + a[q]);
    }
    Ok(())
}

fn push_word(value: usize) -> Result<u32, LayerError> {
    u32::try_from(value).map_err(|_| LayerError::ShapeMismatch {
        kind: "BatchNorm",
        detail: format!("{value} does not fit a 32-bit push constant"),
    })
}

const BATCHNORM: ShaderModule = ShaderModule {
    name: "batchnorm",
    bindings: 3,
    entry: batchnorm_kernel,
};

pub struct BatchNormGpu {
    inner: BatchNorm,
    device: Arc<dyn ComputeDevice>,
    pipeline: Option<Pipeline>,
    a_gpu: Option<DeviceTensor>,
    b_gpu: Option<DeviceTensor>,
}

impl BatchNormGpu {
    pub fn new(device: Arc<dyn ComputeDevice>) -> Self {
        Self {
            inner: BatchNorm::new(),
            device,
            pipeline: None,
            a_gpu: None,
            b_gpu: None,
        }
    }

    pub fn inner(&self) -> &BatchNorm {
        &self.inner
    }

    /// Returns `true` once a pipeline exists.
    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }
}

impl Layer for BatchNormGpu {
    fn kind(&self) -> &'static str {
        "BatchNorm"
    }

    fn caps(&self) -> LayerCaps {
        LayerCaps {
            supports_gpu: true,
            ..self.inner.caps()
        }
    }

    fn load_param(&mut self, pd: &ParamDict) -> Result<(), LayerError> {
        self.inner.load_param(pd)
    }

    fn load_model(&mut self, mb: &mut ModelBin<'_>) -> Result<(), LayerError> {
        self.inner.load_model(mb)
    }

    fn create_pipeline(&mut self, _opt: &RunOptions) -> Result<(), LayerError> {
        self.pipeline = Some(Pipeline::new(&self.device, &BATCHNORM)?);
        Ok(())
    }

    fn destroy_pipeline(&mut self, _opt: &RunOptions) -> Result<(), LayerError> {
        self.pipeline = None;
        self.a_gpu = None;
        self.b_gpu = None;
        Ok(())
    }

    fn upload_model(
        &mut self,
        transfer: &mut TransferStream,
        _opt: &RunOptions,
    ) -> Result<(), LayerError> {
        self.a_gpu = Some(transfer.upload(self.inner.a_data())?);
        self.b_gpu = Some(transfer.upload(self.inner.b_data())?);
        Ok(())
    }

    fn forward(&self, bottom: &Tensor, opt: &RunOptions) -> Result<Tensor, LayerError> {
        self.inner.forward(bottom, opt)
    }

    fn forward_inplace(&self, blob: &mut Tensor, opt: &RunOptions) -> Result<(), LayerError> {
        self.inner.forward_inplace(blob, opt)
    }

    fn forward_inplace_gpu(
        &self,
        blob: &mut DeviceTensor,
        cmd: &mut CommandStream,
        _opt: &RunOptions,
    ) -> Result<(), LayerError> {
        let (Some(pipeline), Some(a), Some(b)) = (&self.pipeline, &self.a_gpu, &self.b_gpu) else {
            return Err(LayerError::NotReady { kind: self.kind() });
        };
        self.inner.check_channels(blob.shape())?;
        let push = [
            push_word(blob.shape().channels())?,
            push_word(blob.shape().channel_size())?,
        ];
        cmd.record_dispatch(pipeline, &[&*blob, a, b], &push);
        Ok(())
    }
}

impl fmt::Debug for BatchNormGpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchNormGpu")
            .field("channels", &self.inner.channels)
            .field("device", &self.device.name())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::batchnorm::tests::{params, weight_bytes};
    use crate::Backend;
    use gpu_compute::HostDevice;
    use model_io::MemoryReader;
    use tensor_core::Shape;

    fn gpu_opt() -> RunOptions {
        RunOptions {
            backend: Backend::Gpu,
            ..Default::default()
        }
    }

    fn loaded(device: &Arc<dyn ComputeDevice>) -> BatchNormGpu {
        let mut layer = BatchNormGpu::new(Arc::clone(device));
        layer.load_param(&params(2, 0.0)).unwrap();
        let bytes = weight_bytes(&[1.0, 2.0], &[0.0, 1.0], &[1.0, 1.0], &[0.0, 0.5]);
        let mut reader = MemoryReader::new(bytes);
        let mut mb = ModelBin::new(&mut reader);
        layer.load_model(&mut mb).unwrap();
        layer
    }

    #[test]
    fn test_not_ready_before_create_pipeline() {
        let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
        let layer = loaded(&device);
        let input = DeviceTensor::zeros(&device, Shape::chw(2, 1, 2)).unwrap();
        let mut cmd = CommandStream::new(Arc::clone(&device));
        assert!(matches!(
            layer.forward_gpu(&input, &mut cmd, &gpu_opt()),
            Err(LayerError::NotReady { kind: "BatchNorm" })
        ));
    }

    #[test]
    fn test_gpu_matches_cpu() {
        let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
        let opt = gpu_opt();
        let mut layer = loaded(&device);
        layer.create_pipeline(&opt).unwrap();
        let mut transfer = TransferStream::new(Arc::clone(&device), opt.precision);
        layer.upload_model(&mut transfer, &opt).unwrap();
        transfer.flush().unwrap();

        let host = Tensor::from_f32(Shape::chw(2, 1, 2), &[1.0, 2.0, 1.0, 3.0]).unwrap();
        let expected = layer.forward(&host, &opt).unwrap();

        let mut cmd = CommandStream::new(Arc::clone(&device));
        let input = cmd.record_upload(&host).unwrap();
        let output = layer.forward_gpu(&input, &mut cmd, &opt).unwrap();
        let slot = cmd.record_download(&output);
        cmd.submit_and_wait().unwrap();

        assert_eq!(slot.take().unwrap().as_slice(), expected.as_slice());
        assert!(!output.shares_buffer(&input));
    }

    #[test]
    fn test_gpu_channel_wider_than_f32_mantissa() {
        let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
        let opt = gpu_opt();
        let mut layer = BatchNormGpu::new(Arc::clone(&device));
        layer.load_param(&params(1, 0.0)).unwrap();
        let mut reader = MemoryReader::new(weight_bytes(&[2.0], &[0.0], &[1.0], &[1.0]));
        layer.load_model(&mut ModelBin::new(&mut reader)).unwrap();
        layer.create_pipeline(&opt).unwrap();
        let mut transfer = TransferStream::new(Arc::clone(&device), opt.precision);
        layer.upload_model(&mut transfer, &opt).unwrap();
        transfer.flush().unwrap();

        // 2^24 + 1 is the first size an f32 cannot represent.
        let len = (1usize << 24) + 1;
        let host = Tensor::filled(Shape::chw(1, 1, len), 1.0);
        let expected = layer.forward(&host, &opt).unwrap();

        let mut cmd = CommandStream::new(Arc::clone(&device));
        let input = cmd.record_upload(&host).unwrap();
        let output = layer.forward_gpu(&input, &mut cmd, &opt).unwrap();
        let slot = cmd.record_download(&output);
        cmd.submit_and_wait().unwrap();

        let got = slot.take().unwrap();
        assert_eq!(got.num_elements(), len);
        assert_eq!(got.as_slice()[len - 1], 3.0);
        assert_eq!(got.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_destroy_releases_device_resources() {
        let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
        let opt = gpu_opt();
        let mut layer = loaded(&device);
        layer.create_pipeline(&opt).unwrap();
        let mut transfer = TransferStream::new(Arc::clone(&device), opt.precision);
        layer.upload_model(&mut transfer, &opt).unwrap();
        transfer.flush().unwrap();
        assert_eq!(device.live_pipelines(), 1);
        assert_eq!(device.live_buffers(), 2);

        layer.destroy_pipeline(&opt).unwrap();
        assert!(!layer.has_pipeline());
        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_caps() {
        let layer = BatchNormGpu::new(Arc::new(HostDevice::new()));
        let caps = layer.caps();
        assert!(caps.supports_gpu && caps.supports_inplace);
        assert!(!caps.supports_multi_input);
    }
}
