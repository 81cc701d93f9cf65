// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The network container with a type-state–enforced load sequence.
//!
//! ```text
//! Net<Empty>
//!     │  .load_param()   parameter stream → layers + blob graph
//!     ▼
//! Net<Parsed>
//!     │  .load_model()   weights, pipelines, device uploads
//!     ▼
//! Net<Ready>
//!     │  .forward()
//!     ▼
//!   NetOutput
//! ```
//!
//! # Parameter stream
//! Whitespace-separated tokens:
//! ```text
//! 7767517
//! <layer_count> <blob_count>
//! <type> <name> <n_in> <n_out> <in..> <out..> <id=value..>
//! ...
//! ```
//! Layers appear in dependency order: a blob is produced by at most one
//! layer, and that layer comes before every consumer. Blobs no layer
//! produces are network inputs.

use crate::{select_entry, EntryPoint, ForwardMetrics, RuntimeConfig, RuntimeError};
use cpu_topology::ThreadController;
use gpu_compute::{CommandStream, ComputeDevice, DeviceTensor, GpuError, HostDevice, TransferStream};
use layers::{Layer, LayerError, LayerRegistry, RunOptions};
use model_io::{DataReader, MemoryReader, ModelBin, ModelError, ParamDict, ParamTokens, StreamReader};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tensor_core::Tensor;

/// First token of every parameter stream.
pub const PARAM_MAGIC: &str = "7767517";

// ── Type-state markers ─────────────────────────────────────────

/// No layers loaded yet.
#[derive(Debug)]
pub struct Empty;

/// Layers and blob graph are known; weights are not loaded.
#[derive(Debug)]
pub struct Parsed;

/// Weights loaded and pipelines created.
#[derive(Debug)]
pub struct Ready;

pub trait NetState: fmt::Debug {}
impl NetState for Empty {}
impl NetState for Parsed {}
impl NetState for Ready {}

// ── Graph bookkeeping ──────────────────────────────────────────

struct LayerSlot {
    name: String,
    layer: Box<dyn Layer>,
    bottoms: Vec<usize>,
    tops: Vec<usize>,
}

#[derive(Debug)]
struct BlobInfo {
    name: String,
    producer: Option<usize>,
    consumers: Vec<usize>,
}

#[derive(Debug, Default)]
struct BlobTable {
    blobs: Vec<BlobInfo>,
    index: HashMap<String, usize>,
}

impl BlobTable {
    fn len(&self) -> usize {
        self.blobs.len()
    }

    fn info(&self, id: usize) -> &BlobInfo {
        &self.blobs[id]
    }

    fn require(&self, name: &str) -> Result<usize, RuntimeError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::UnknownBlob(name.to_string()))
    }

    fn consume(&mut self, name: &str, layer: usize) -> usize {
        let id = match self.index.get(name) {
            Some(&id) => id,
            None => self.insert(name),
        };
        self.blobs[id].consumers.push(layer);
        id
    }

    fn produce(&mut self, name: &str, layer: usize, layer_name: &str) -> Result<usize, RuntimeError> {
        if let Some(&id) = self.index.get(name) {
            let detail = match self.blobs[id].producer {
                Some(_) => format!("blob '{name}' is produced twice (again by '{layer_name}')"),
                None => format!("blob '{name}' is consumed before '{layer_name}' produces it"),
            };
            return Err(RuntimeError::InvalidGraph(detail));
        }
        let id = self.insert(name);
        self.blobs[id].producer = Some(layer);
        Ok(id)
    }

    fn insert(&mut self, name: &str) -> usize {
        let id = self.blobs.len();
        self.blobs.push(BlobInfo {
            name: name.to_string(),
            producer: None,
            consumers: Vec::new(),
        });
        self.index.insert(name.to_string(), id);
        id
    }
}

/// The layers together with the lifetime of their pipelines.
///
/// `destroy_pipeline` runs once per layer, on [`release`](Self::release)
/// or on drop, and only if pipeline creation was started.
struct LayerTable {
    slots: Vec<LayerSlot>,
    opt: RunOptions,
    pipelines_live: bool,
}

impl LayerTable {
    fn release(&mut self) -> Result<(), RuntimeError> {
        if !std::mem::take(&mut self.pipelines_live) {
            return Ok(());
        }
        let mut first_err = None;
        for slot in &mut self.slots {
            if let Err(e) = slot.layer.destroy_pipeline(&self.opt) {
                tracing::warn!("layer '{}': destroy_pipeline failed: {e}", slot.name);
                first_err.get_or_insert(RuntimeError::layer(&slot.name, e));
            }
        }
        tracing::debug!("released pipelines of {} layers", self.slots.len());
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for LayerTable {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ── Net ────────────────────────────────────────────────────────

/// The result of a forward call.
#[derive(Debug)]
pub struct NetOutput {
    /// One tensor per requested output, in request order.
    pub tensors: Vec<Tensor>,
    /// Per-layer timings, when profiling is enabled.
    pub metrics: Option<ForwardMetrics>,
}

/// A network of layers connected by named blobs.
///
/// `S` is a type-state marker that enforces the load sequence at compile
/// time: `forward` exists only on `Net<Ready>`.
///
/// # Example
/// ```
/// use model_io::MemoryReader;
/// use runtime::Net;
/// use layers::RunOptions;
/// use tensor_core::{Shape, Tensor};
///
/// let param = "7767517\n1 2\nArgMax top 1 1 data prob 1=2\n";
/// let net = Net::new(RunOptions::default())
///     .load_param(&mut MemoryReader::new(param.as_bytes()))?
///     .load_model(&mut MemoryReader::new(Vec::<u8>::new()))?;
///
/// let input = Tensor::from_f32(Shape::vector(3), &[0.1, 0.7, 0.2])?;
/// let out = net.forward(&[("data", input)], &["prob"])?;
/// assert_eq!(out.tensors[0].as_slice(), &[1.0, 2.0]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Net<S: NetState = Empty> {
    registry: LayerRegistry,
    device: Option<Arc<dyn ComputeDevice>>,
    profiling: bool,
    table: LayerTable,
    blobs: BlobTable,
    _state: PhantomData<S>,
}

impl<S: NetState> Net<S> {
    pub fn options(&self) -> &RunOptions {
        &self.table.opt
    }

    /// The compute device GPU layers run on, if any.
    pub fn device(&self) -> Option<&Arc<dyn ComputeDevice>> {
        self.device.as_ref()
    }

    pub fn layer_count(&self) -> usize {
        self.table.slots.len()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Layer names in file order.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.table.slots.iter().map(|s| s.name.as_str())
    }

    pub fn layer(&self, name: &str) -> Option<&dyn Layer> {
        self.table
            .slots
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.layer.as_ref())
    }

    /// Blobs no layer produces.
    pub fn input_names(&self) -> Vec<&str> {
        self.blobs
            .blobs
            .iter()
            .filter(|b| b.producer.is_none())
            .map(|b| b.name.as_str())
            .collect()
    }

    /// Blobs no layer consumes.
    pub fn output_names(&self) -> Vec<&str> {
        self.blobs
            .blobs
            .iter()
            .filter(|b| b.consumers.is_empty())
            .map(|b| b.name.as_str())
            .collect()
    }

    fn into_state<T: NetState>(self) -> Net<T> {
        Net {
            registry: self.registry,
            device: self.device,
            profiling: self.profiling,
            table: self.table,
            blobs: self.blobs,
            _state: PhantomData,
        }
    }
}

// ── Empty → Parsed ─────────────────────────────────────────────

impl Net<Empty> {
    /// Creates an empty network using the built-in layer registry.
    pub fn new(opt: RunOptions) -> Self {
        tracing::info!(
            "net created: backend {}, {} threads, lightmode {}",
            opt.backend,
            opt.num_threads,
            opt.lightmode
        );
        Self {
            registry: LayerRegistry::builtin(),
            device: None,
            profiling: false,
            table: LayerTable {
                slots: Vec::new(),
                opt,
                pipelines_live: false,
            },
            blobs: BlobTable::default(),
            _state: PhantomData,
        }
    }

    /// Creates an empty network with the options and profiling flag of
    /// `config`.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.run_options()).with_profiling(config.enable_profiling)
    }

    /// Replaces the layer registry.
    pub fn with_registry(mut self, registry: LayerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the compute device for the GPU backend. Without one, the
    /// process-wide host device is used.
    pub fn with_device(mut self, device: Arc<dyn ComputeDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Seeds the global worker pool from `config`.
    ///
    /// The power mode is applied first; if pinning fails the failure is
    /// logged and the previous mode stays in effect. The pool is then
    /// sized to the configured thread count. Returns the options networks
    /// should be created with.
    pub fn apply_startup_config(config: &RuntimeConfig) -> Result<RunOptions, RuntimeError> {
        let mode = config.power_mode.mode();
        if let Err(e) = cpu_topology::set_power_mode(mode.as_i32()) {
            tracing::warn!(
                "cannot apply power mode '{mode}': {e}; staying in '{}'",
                cpu_topology::power_mode()
            );
        }

        let opt = config.run_options();
        ThreadController::global()?.set_pool_size(opt.num_threads)?;
        tracing::info!("startup: power mode '{}', {} threads", cpu_topology::power_mode(), opt.num_threads);
        Ok(opt)
    }

    /// Reads the parameter stream and instantiates every layer.
    ///
    /// Any error aborts the whole load.
    pub fn load_param(mut self, reader: &mut dyn DataReader) -> Result<Net<Parsed>, RuntimeError> {
        if self.table.opt.use_gpu() && self.device.is_none() {
            self.device = Some(HostDevice::shared());
        }

        let mut tokens = ParamTokens::new(reader);
        let magic = tokens
            .next_token()
            .ok_or_else(|| ModelError::MalformedStream("empty parameter stream".into()))?;
        if magic != PARAM_MAGIC {
            return Err(ModelError::BadMagic(magic).into());
        }
        let layer_count: usize = tokens.expect("layer count")?;
        let blob_count: usize = tokens.expect("blob count")?;
        if layer_count == 0 {
            return Err(RuntimeError::InvalidGraph("network has no layers".into()));
        }

        for index in 0..layer_count {
            let kind: String = tokens.expect("layer type")?;
            let name: String = tokens.expect("layer name")?;
            let n_in: usize = tokens.expect("input count")?;
            let n_out: usize = tokens.expect("output count")?;
            let bottom_names = (0..n_in)
                .map(|_| tokens.expect::<String>("input blob name"))
                .collect::<Result<Vec<_>, _>>()?;
            let top_names = (0..n_out)
                .map(|_| tokens.expect::<String>("output blob name"))
                .collect::<Result<Vec<_>, _>>()?;
            let pd = ParamDict::load(&mut tokens)?;

            let layer = self
                .registry
                .instantiate(&kind, self.table.opt.backend, self.device.as_ref(), &pd)
                .map_err(|e| RuntimeError::layer(&name, e))?;
            if !layer.caps().supports_multi_input && (n_in != 1 || n_out != 1) {
                return Err(RuntimeError::InvalidGraph(format!(
                    "layer '{name}' ({kind}) takes one input and one output, got {n_in} and {n_out}"
                )));
            }

            let bottoms: Vec<usize> = bottom_names
                .iter()
                .map(|b| self.blobs.consume(b, index))
                .collect();
            let tops = top_names
                .iter()
                .map(|t| self.blobs.produce(t, index, &name))
                .collect::<Result<Vec<_>, _>>()?;

            tracing::debug!("layer {index} '{name}' ({kind}): {bottom_names:?} -> {top_names:?}");
            self.table.slots.push(LayerSlot {
                name,
                layer,
                bottoms,
                tops,
            });
        }

        if self.blobs.len() != blob_count {
            return Err(RuntimeError::InvalidGraph(format!(
                "header declares {blob_count} blobs, layers use {}",
                self.blobs.len()
            )));
        }

        tracing::info!("parsed {} layers, {} blobs", layer_count, blob_count);
        Ok(self.into_state())
    }

    /// [`load_param`](Self::load_param) from a text file.
    pub fn load_param_file(self, path: &Path) -> Result<Net<Parsed>, RuntimeError> {
        let mut reader = StreamReader::open(path)?;
        self.load_param(&mut reader)
    }
}

// ── Parsed → Ready ─────────────────────────────────────────────

impl Net<Parsed> {
    /// Reads every layer's weights in layer order, creates pipelines and,
    /// on the GPU backend, uploads device weights in one batch.
    pub fn load_model(mut self, reader: &mut dyn DataReader) -> Result<Net<Ready>, RuntimeError> {
        let mut mb = ModelBin::new(reader);
        for slot in &mut self.table.slots {
            slot.layer
                .load_model(&mut mb)
                .map_err(|e| RuntimeError::layer(&slot.name, e))?;
        }
        tracing::debug!("read {} weight bytes", mb.bytes_read());

        let opt = self.table.opt.clone();
        self.table.pipelines_live = true;
        for slot in &mut self.table.slots {
            slot.layer
                .create_pipeline(&opt)
                .map_err(|e| RuntimeError::layer(&slot.name, e))?;
        }

        if let (true, Some(device)) = (opt.use_gpu(), &self.device) {
            let mut transfer = TransferStream::new(Arc::clone(device), opt.precision);
            for slot in &mut self.table.slots {
                slot.layer
                    .upload_model(&mut transfer, &opt)
                    .map_err(|e| RuntimeError::layer(&slot.name, e))?;
            }
            let uploads = transfer.flush()?;
            tracing::info!(
                "uploaded {uploads} weight tensors to '{}' ({} bytes, {})",
                device.name(),
                transfer.staged_bytes(),
                opt.precision.as_str()
            );
        }

        tracing::info!("net ready: {} layers", self.table.slots.len());
        Ok(self.into_state())
    }

    /// [`load_model`](Self::load_model) from a memory-mapped file.
    pub fn load_model_file(self, path: &Path) -> Result<Net<Ready>, RuntimeError> {
        let mut reader = MemoryReader::map_file(path)?;
        self.load_model(&mut reader)
    }
}

// ── Ready: forward ─────────────────────────────────────────────

impl Net<Ready> {
    /// Computes `outputs` from `inputs`.
    ///
    /// Only the layers the requested outputs depend on run, in file
    /// order, inside the global worker pool.
    pub fn forward(
        &self,
        inputs: &[(&str, Tensor)],
        outputs: &[&str],
    ) -> Result<NetOutput, RuntimeError> {
        let controller = ThreadController::global()?;
        controller.install(|| self.run(inputs, outputs))
    }

    /// Destroys every layer's pipelines now instead of on drop.
    pub fn release(mut self) -> Result<(), RuntimeError> {
        self.table.release()
    }

    fn run(&self, inputs: &[(&str, Tensor)], outputs: &[&str]) -> Result<NetOutput, RuntimeError> {
        let started = Instant::now();
        let output_ids = outputs
            .iter()
            .map(|name| self.blobs.require(name))
            .collect::<Result<Vec<_>, _>>()?;
        let needed = self.needed_layers(&output_ids);

        let mut exec = Execution::new(
            &self.blobs,
            self.table.opt.lightmode,
            self.device.clone().map(CommandStream::new),
        );
        for (name, tensor) in inputs {
            let id = self.blobs.require(name)?;
            if self.blobs.info(id).producer.is_some() {
                return Err(RuntimeError::InvalidGraph(format!(
                    "blob '{name}' is produced by a layer and cannot be fed"
                )));
            }
            exec.store[id] = Some(Blob::Host(tensor.clone()));
        }

        let reads = self
            .scheduled(&needed)
            .flat_map(|slot| slot.bottoms.iter().copied())
            .chain(output_ids.iter().copied());
        for blob in reads {
            exec.uses[blob] += 1;
            if self.blobs.info(blob).producer.is_none() && exec.store[blob].is_none() {
                return Err(RuntimeError::MissingInput(self.blobs.info(blob).name.clone()));
            }
        }

        let mut metrics = self.profiling.then(ForwardMetrics::new);
        for slot in self.scheduled(&needed) {
            let layer_start = Instant::now();
            let entry = self.run_layer(slot, &mut exec)?;
            if let Some(m) = metrics.as_mut() {
                m.record_layer(&slot.name, slot.layer.kind(), entry, layer_start.elapsed());
            }
        }

        let tensors = output_ids
            .iter()
            .map(|&id| exec.host(id))
            .collect::<Result<Vec<_>, _>>()?;
        exec.finish()?;

        if let Some(m) = metrics.as_mut() {
            m.finalise(started.elapsed(), needed.iter().filter(|&&n| !n).count());
            tracing::debug!("{}", m.summary());
        }
        Ok(NetOutput { tensors, metrics })
    }

    /// Marks the layers `outputs` depend on.
    fn needed_layers(&self, outputs: &[usize]) -> Vec<bool> {
        let mut needed = vec![false; self.table.slots.len()];
        let mut pending = outputs.to_vec();
        while let Some(blob) = pending.pop() {
            if let Some(producer) = self.blobs.info(blob).producer {
                if !needed[producer] {
                    needed[producer] = true;
                    pending.extend(&self.table.slots[producer].bottoms);
                }
            }
        }
        needed
    }

    fn scheduled<'a>(&'a self, needed: &'a [bool]) -> impl Iterator<Item = &'a LayerSlot> + 'a {
        self.table
            .slots
            .iter()
            .zip(needed)
            .filter_map(|(slot, &n)| n.then_some(slot))
    }

    fn run_layer(&self, slot: &LayerSlot, exec: &mut Execution<'_>) -> Result<EntryPoint, RuntimeError> {
        let opt = &self.table.opt;
        let layer = slot.layer.as_ref();
        let entry = select_entry(layer.caps(), opt);
        let wrap = |e: LayerError| RuntimeError::layer(&slot.name, e);
        tracing::debug!("'{}' ({}) via {entry}", slot.name, layer.kind());

        match entry {
            EntryPoint::Forward => {
                let bottom = exec.host(slot.bottoms[0])?;
                let top = layer.forward(&bottom, opt).map_err(wrap)?;
                exec.put(slot.tops[0], Blob::Host(top));
            }
            EntryPoint::ForwardInplace => {
                let mut blob = exec.host(slot.bottoms[0])?;
                layer.forward_inplace(&mut blob, opt).map_err(wrap)?;
                exec.put(slot.tops[0], Blob::Host(blob));
            }
            EntryPoint::ForwardMulti | EntryPoint::ForwardInplaceMulti => {
                let mut bottoms = slot
                    .bottoms
                    .iter()
                    .map(|&b| exec.host(b))
                    .collect::<Result<Vec<_>, _>>()?;
                let tops = if entry == EntryPoint::ForwardInplaceMulti && slot.tops.len() == bottoms.len() {
                    layer.forward_inplace_multi(&mut bottoms, opt).map_err(wrap)?;
                    bottoms
                } else {
                    layer.forward_multi(&bottoms, slot.tops.len(), opt).map_err(wrap)?
                };
                if tops.len() != slot.tops.len() {
                    return Err(RuntimeError::InvalidGraph(format!(
                        "layer '{}' produced {} outputs, expected {}",
                        slot.name,
                        tops.len(),
                        slot.tops.len()
                    )));
                }
                for (&id, top) in slot.tops.iter().zip(tops) {
                    exec.put(id, Blob::Host(top));
                }
            }
            EntryPoint::ForwardGpu => {
                let bottom = exec.device(slot.bottoms[0], false)?;
                let top = layer.forward_gpu(&bottom, exec.stream()?, opt).map_err(wrap)?;
                exec.put(slot.tops[0], Blob::Device(top));
            }
            EntryPoint::ForwardInplaceGpu => {
                let mut blob = exec.device(slot.bottoms[0], true)?;
                layer
                    .forward_inplace_gpu(&mut blob, exec.stream()?, opt)
                    .map_err(wrap)?;
                exec.put(slot.tops[0], Blob::Device(blob));
            }
        }
        Ok(entry)
    }
}

impl<S: NetState> fmt::Debug for Net<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("state", &std::any::type_name::<S>())
            .field("backend", &self.table.opt.backend)
            .field("layers", &self.table.slots.len())
            .field("blobs", &self.blobs.len())
            .field("device", &self.device.as_ref().map(|d| d.name().to_string()))
            .finish()
    }
}

// ── Per-call execution state ───────────────────────────────────

#[derive(Clone)]
enum Blob {
    Host(Tensor),
    Device(DeviceTensor),
}

struct Execution<'n> {
    blobs: &'n BlobTable,
    store: Vec<Option<Blob>>,
    /// Reads of each blob still to come.
    uses: Vec<usize>,
    cmd: Option<CommandStream>,
    lightmode: bool,
}

impl<'n> Execution<'n> {
    fn new(blobs: &'n BlobTable, lightmode: bool, cmd: Option<CommandStream>) -> Self {
        Self {
            blobs,
            store: vec![None; blobs.len()],
            uses: vec![0; blobs.len()],
            cmd,
            lightmode,
        }
    }

    /// Takes one read of `blob`. The stored value is moved out on its last
    /// read in lightmode and cloned otherwise. Returns whether the caller
    /// holds the only handle.
    fn claim(&mut self, blob: usize) -> Result<(Blob, bool), RuntimeError> {
        self.uses[blob] = self.uses[blob].saturating_sub(1);
        let exclusive = self.lightmode && self.uses[blob] == 0;
        let value = if exclusive {
            self.store[blob].take()
        } else {
            self.store[blob].clone()
        };
        let value = value.ok_or_else(|| RuntimeError::MissingInput(self.blobs.info(blob).name.clone()))?;
        Ok((value, exclusive))
    }

    /// `blob` as a host tensor, downloading it if it lives on the device.
    fn host(&mut self, blob: usize) -> Result<Tensor, RuntimeError> {
        match self.claim(blob)? {
            (Blob::Host(tensor), _) => Ok(tensor),
            (Blob::Device(on_device), exclusive) => {
                let tensor = self.download(&on_device)?;
                if !exclusive {
                    self.store[blob] = Some(Blob::Host(tensor.clone()));
                }
                Ok(tensor)
            }
        }
    }

    /// `blob` as a device tensor. With `writable`, the result shares its
    /// buffer with no other blob.
    fn device(&mut self, blob: usize, writable: bool) -> Result<DeviceTensor, RuntimeError> {
        let (value, exclusive) = self.claim(blob)?;
        let cmd = self.stream()?;
        let tensor = match value {
            Blob::Host(tensor) => cmd.record_upload(&tensor)?,
            Blob::Device(on_device) if writable && !exclusive => cmd.record_copy(&on_device)?,
            Blob::Device(on_device) => on_device,
        };
        Ok(tensor)
    }

    fn put(&mut self, blob: usize, value: Blob) {
        if self.uses[blob] > 0 {
            self.store[blob] = Some(value);
        }
    }

    fn stream(&mut self) -> Result<&mut CommandStream, RuntimeError> {
        self.cmd
            .as_mut()
            .ok_or_else(|| RuntimeError::ConfigError("GPU entry point without a compute device".into()))
    }

    /// Records a download and joins on the stream.
    fn download(&mut self, on_device: &DeviceTensor) -> Result<Tensor, RuntimeError> {
        let cmd = self.stream()?;
        let slot = cmd.record_download(on_device);
        cmd.submit_and_wait()?;
        slot.take().ok_or_else(|| {
            GpuError::KernelError {
                kernel: "download".into(),
                detail: "no data after submit".into(),
            }
            .into()
        })
    }

    /// Submits work nobody downloaded.
    fn finish(mut self) -> Result<(), RuntimeError> {
        if let Some(cmd) = self.cmd.as_mut().filter(|c| !c.is_empty()) {
            cmd.submit_and_wait()?;
        }
        Ok(())
    }
}
