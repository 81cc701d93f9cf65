// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer factories keyed by kind.
//!
//! A kind has a CPU factory and optionally a GPU factory. Creating a layer
//! for [`Backend::Gpu`] uses the GPU factory when the kind has one and a
//! device is supplied, and falls back to the CPU factory otherwise.

use crate::ops::{ArgMax, BatchNorm, BatchNormGpu, Bias, Split};
use crate::{Backend, Layer, LayerError};
use gpu_compute::ComputeDevice;
use model_io::ParamDict;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type CpuFactory = fn() -> Box<dyn Layer>;
pub type GpuFactory = fn(Arc<dyn ComputeDevice>) -> Box<dyn Layer>;

fn batchnorm_gpu(device: Arc<dyn ComputeDevice>) -> Box<dyn Layer> {
    Box::new(BatchNormGpu::new(device))
}

#[derive(Clone, Copy)]
struct Entry {
    cpu: CpuFactory,
    gpu: Option<GpuFactory>,
}

#[derive(Clone, Default)]
pub struct LayerRegistry {
    entries: BTreeMap<String, Entry>,
}

impl LayerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in operators.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("ArgMax", || Box::new(ArgMax::new()), None);
        registry.register("Bias", || Box::new(Bias::new()), None);
        registry.register("Split", || Box::new(Split::new()), None);
        registry.register(
            "BatchNorm",
            || Box::new(BatchNorm::new()),
            Some(batchnorm_gpu as GpuFactory),
        );
        registry
    }

    /// Registers `kind`, replacing any previous registration.
    pub fn register(&mut self, kind: &str, cpu: CpuFactory, gpu: Option<GpuFactory>) -> &mut Self {
        if self
            .entries
            .insert(kind.to_string(), Entry { cpu, gpu })
            .is_some()
        {
            tracing::debug!("layer kind '{kind}' re-registered");
        }
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Creates an unconfigured layer of `kind` for `backend`.
    pub fn create(
        &self,
        kind: &str,
        backend: Backend,
        device: Option<&Arc<dyn ComputeDevice>>,
    ) -> Result<Box<dyn Layer>, LayerError> {
        let entry = self
            .entries
            .get(kind)
            .ok_or_else(|| LayerError::UnknownKind(kind.to_string()))?;

        match (backend, entry.gpu, device) {
            (Backend::Gpu, Some(gpu), Some(device)) => Ok(gpu(Arc::clone(device))),
            (Backend::Gpu, Some(_), None) => {
                tracing::warn!("no compute device for '{kind}', using the CPU variant");
                Ok((entry.cpu)())
            }
            _ => Ok((entry.cpu)()),
        }
    }

    /// Creates a layer and loads its parameters.
    pub fn instantiate(
        &self,
        kind: &str,
        backend: Backend,
        device: Option<&Arc<dyn ComputeDevice>>,
        pd: &ParamDict,
    ) -> Result<Box<dyn Layer>, LayerError> {
        let mut layer = self.create(kind, backend, device)?;
        layer.load_param(pd)?;
        Ok(layer)
    }
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
