// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: parameter stream → weights → dispatch → forward.
//!
//! Probe layers count which entry point the network calls, proving the
//! dispatcher never takes an in-place path for a layer without one and
//! that GPU layers are driven through their pipelines.

use gpu_compute::{CommandStream, ComputeDevice, DeviceTensor, HostDevice, TransferStream};
use layers::{Backend, Layer, LayerCaps, LayerError, LayerRegistry, RunOptions};
use model_io::{MemoryReader, ModelBin, ParamDict, ParamValue};
use runtime::{EntryPoint, Net, Ready, RuntimeConfig, RuntimeError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tensor_core::{Shape, Tensor};

// ── Probe layers ───────────────────────────────────────────────

static COPY_FORWARD: AtomicUsize = AtomicUsize::new(0);
static COPY_INPLACE: AtomicUsize = AtomicUsize::new(0);
static INPLACE_FORWARD: AtomicUsize = AtomicUsize::new(0);
static INPLACE_INPLACE: AtomicUsize = AtomicUsize::new(0);

/// Adds one; has no in-place entry point.
struct CopyProbe;

impl Layer for CopyProbe {
    fn kind(&self) -> &'static str {
        "CopyProbe"
    }

    fn forward(&self, bottom: &Tensor, _opt: &RunOptions) -> Result<Tensor, LayerError> {
        COPY_FORWARD.fetch_add(1, Ordering::SeqCst);
        let data = bottom.as_slice().iter().map(|v| v + 1.0).collect();
        Ok(Tensor::from_vec(bottom.shape().clone(), data)?)
    }

    fn forward_inplace(&self, _blob: &mut Tensor, _opt: &RunOptions) -> Result<(), LayerError> {
        COPY_INPLACE.fetch_add(1, Ordering::SeqCst);
        Err(LayerError::Unsupported {
            op: "forward_inplace",
            kind: self.kind(),
        })
    }
}

/// Doubles in place.
struct InplaceProbe;

impl Layer for InplaceProbe {
    fn kind(&self) -> &'static str {
        "InplaceProbe"
    }

    fn caps(&self) -> LayerCaps {
        LayerCaps {
            supports_inplace: true,
            ..Default::default()
        }
    }

    fn forward(&self, bottom: &Tensor, _opt: &RunOptions) -> Result<Tensor, LayerError> {
        INPLACE_FORWARD.fetch_add(1, Ordering::SeqCst);
        let data = bottom.as_slice().iter().map(|v| v * 2.0).collect();
        Ok(Tensor::from_vec(bottom.shape().clone(), data)?)
    }

    fn forward_inplace(&self, blob: &mut Tensor, _opt: &RunOptions) -> Result<(), LayerError> {
        INPLACE_INPLACE.fetch_add(1, Ordering::SeqCst);
        blob.as_mut_slice().iter_mut().for_each(|v| *v *= 2.0);
        Ok(())
    }
}

fn probe_registry() -> LayerRegistry {
    let mut registry = LayerRegistry::builtin();
    registry
        .register("CopyProbe", || Box::new(CopyProbe), None)
        .register("InplaceProbe", || Box::new(InplaceProbe), None);
    registry
}

// ── Helpers ────────────────────────────────────────────────────

fn load(param: &str, weights: Vec<u8>, opt: RunOptions) -> Result<Net<Ready>, RuntimeError> {
    Net::new(opt)
        .with_registry(probe_registry())
        .with_profiling(true)
        .load_param(&mut MemoryReader::new(param.as_bytes()))?
        .load_model(&mut MemoryReader::new(weights))
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn vector(values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::vector(values.len()), values).unwrap()
}

// ── Dispatch ───────────────────────────────────────────────────

#[test]
fn test_dispatch_never_inplace_for_copy_layers() {
    let param = "7767517
3 4
CopyProbe c0 1 1 data x
InplaceProbe i0 1 1 x y
CopyProbe c1 1 1 y out
";
    let net = load(param, Vec::new(), RunOptions::default()).unwrap();

    let out = net.forward(&[("data", vector(&[1.0, 2.0]))], &["out"]).unwrap();
    assert_eq!(out.tensors[0].as_slice(), &[5.0, 7.0]);
    assert!(COPY_FORWARD.load(Ordering::SeqCst) >= 2);
    assert_eq!(COPY_INPLACE.load(Ordering::SeqCst), 0);

    let entries: Vec<_> = out.metrics.unwrap().layer_metrics.iter().map(|m| m.entry).collect();
    assert_eq!(
        entries,
        [EntryPoint::Forward, EntryPoint::ForwardInplace, EntryPoint::Forward]
    );
    assert!(INPLACE_INPLACE.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_lightmode_off_uses_copying_entry() {
    let param = "7767517 1 2 InplaceProbe i0 1 1 data out";
    let opt = RunOptions {
        lightmode: false,
        ..Default::default()
    };
    let net = load(param, Vec::new(), opt).unwrap();
    let before = INPLACE_FORWARD.load(Ordering::SeqCst);
    let data = vector(&[3.0]);
    let out = net.forward(&[("data", data.clone())], &["out"]).unwrap();
    assert_eq!(out.tensors[0].as_slice(), &[6.0]);
    assert_eq!(data.as_slice(), &[3.0]);
    assert!(INPLACE_FORWARD.load(Ordering::SeqCst) > before);
}

#[test]
fn test_inplace_does_not_clobber_shared_blob() {
    // x0, x1 and x2 share storage until the in-place layer writes x1.
    let param = "7767517
3 5
CopyProbe c0 1 1 data x0
Split s 1 2 x0 x1 x2
InplaceProbe i0 1 1 x1 doubled
";
    let net = load(param, Vec::new(), RunOptions::default()).unwrap();
    let out = net
        .forward(&[("data", vector(&[1.0, 2.0]))], &["doubled", "x2", "x0"])
        .unwrap();
    assert_eq!(out.tensors[0].as_slice(), &[4.0, 6.0]);
    assert_eq!(out.tensors[1].as_slice(), &[2.0, 3.0]);
    assert_eq!(out.tensors[2].as_slice(), &[2.0, 3.0]);
}

// ── GPU ────────────────────────────────────────────────────────

const BN_PARAM: &str = "7767517
2 3
BatchNorm bn 1 1 data bn_out 0=2 1=0.0
BatchNorm bn2 1 1 bn_out out 0=2 1=0.0
";

/// Two BatchNorm layers: `2x + 1` then identity, on both channels.
fn bn_weights() -> Vec<u8> {
    let mut bytes = f32_bytes(&[2.0, 2.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    bytes.extend(f32_bytes(&[1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]));
    bytes
}

fn gpu_opt() -> RunOptions {
    RunOptions {
        backend: Backend::Gpu,
        ..Default::default()
    }
}

#[test]
fn test_gpu_forward_before_create_pipeline_is_not_ready() {
    let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
    let registry = LayerRegistry::builtin();
    let pd = ParamDict::new()
        .with(0, ParamValue::Int(2))
        .with(1, ParamValue::Float(0.0));
    let mut layer = registry
        .instantiate("BatchNorm", Backend::Gpu, Some(&device), &pd)
        .unwrap();
    let bytes = bn_weights();
    let mut reader = MemoryReader::new(&bytes[..32]);
    layer.load_model(&mut ModelBin::new(&mut reader)).unwrap();

    let mut cmd = CommandStream::new(Arc::clone(&device));
    let input = DeviceTensor::zeros(&device, Shape::chw(2, 1, 1)).unwrap();
    assert!(matches!(
        layer.forward_gpu(&input, &mut cmd, &gpu_opt()),
        Err(LayerError::NotReady { kind: "BatchNorm" })
    ));

    // Weights alone are not enough.
    let mut transfer = TransferStream::new(Arc::clone(&device), gpu_opt().precision);
    layer.upload_model(&mut transfer, &gpu_opt()).unwrap();
    transfer.flush().unwrap();
    assert!(matches!(
        layer.forward_gpu(&input, &mut cmd, &gpu_opt()),
        Err(LayerError::NotReady { .. })
    ));

    layer.create_pipeline(&gpu_opt()).unwrap();
    assert!(layer.forward_gpu(&input, &mut cmd, &gpu_opt()).is_ok());
    cmd.submit_and_wait().unwrap();
    layer.destroy_pipeline(&gpu_opt()).unwrap();
}

#[test]
fn test_gpu_net_end_to_end() {
    let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
    let net = Net::new(gpu_opt())
        .with_device(Arc::clone(&device))
        .with_profiling(true)
        .load_param(&mut MemoryReader::new(BN_PARAM.as_bytes()))
        .unwrap()
        .load_model(&mut MemoryReader::new(bn_weights()))
        .unwrap();
    assert_eq!(device.live_pipelines(), 2);
    // a and b per layer
    assert_eq!(device.live_buffers(), 4);

    let input = Tensor::from_f32(Shape::chw(2, 1, 2), &[0.0, 1.0, 2.0, 3.0]).unwrap();
    let out = net.forward(&[("data", input.clone())], &["out"]).unwrap();
    assert_eq!(out.tensors[0].as_slice(), &[1.0, 3.0, 5.0, 7.0]);
    assert!(out
        .metrics
        .unwrap()
        .layer_metrics
        .iter()
        .all(|m| m.entry == EntryPoint::ForwardInplaceGpu));

    // The intermediate blob can be requested too; it is downloaded.
    let out = net.forward(&[("data", input)], &["bn_out", "out"]).unwrap();
    assert_eq!(out.tensors[0].as_slice(), out.tensors[1].as_slice());
    assert_eq!(device.live_buffers(), 4);

    drop(net);
    assert_eq!(device.live_pipelines(), 0);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_gpu_f16_precision() {
    let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
    let opt = RunOptions {
        precision: tensor_core::DType::F16,
        ..gpu_opt()
    };
    let net = Net::new(opt)
        .with_device(device)
        .load_param(&mut MemoryReader::new(BN_PARAM.as_bytes()))
        .unwrap()
        .load_model(&mut MemoryReader::new(bn_weights()))
        .unwrap();
    let input = Tensor::from_f32(Shape::chw(2, 1, 1), &[0.5, 1.5]).unwrap();
    let out = net.forward(&[("data", input)], &["out"]).unwrap();
    // 2 and 1 are exact in half precision
    assert_eq!(out.tensors[0].as_slice(), &[2.0, 4.0]);
}

// ── Configuration ──────────────────────────────────────────────

#[test]
fn test_net_from_config() {
    let config = RuntimeConfig::from_toml(
        r#"
num_threads = 2
lightmode = false
enable_profiling = true
"#,
    )
    .unwrap();
    let net = Net::from_config(&config)
        .load_param(&mut MemoryReader::new(BN_PARAM.as_bytes()))
        .unwrap()
        .load_model(&mut MemoryReader::new(bn_weights()))
        .unwrap();
    assert_eq!(net.options().num_threads, 2);
    assert!(!net.options().lightmode);

    let input = Tensor::from_f32(Shape::chw(2, 1, 1), &[1.0, 2.0]).unwrap();
    let out = net.forward(&[("data", input)], &["out"]).unwrap();
    assert_eq!(out.tensors[0].as_slice(), &[3.0, 5.0]);
    assert_eq!(out.metrics.unwrap().layer_metrics[0].entry, EntryPoint::Forward);
}

#[test]
fn test_apply_startup_config() {
    let config = RuntimeConfig {
        num_threads: Some(2),
        ..Default::default()
    };
    let opt = Net::apply_startup_config(&config).unwrap();
    assert_eq!(opt.num_threads, 2);
    assert_eq!(
        cpu_topology::ThreadController::global().unwrap().pool_size(),
        2
    );
}
