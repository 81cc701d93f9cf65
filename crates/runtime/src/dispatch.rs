// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Entry-point selection.
//!
//! A layer runs on the GPU when the backend asks for it and the layer has
//! single-blob GPU entry points. It runs in place only when lightmode is on
//! and the layer supports it. The network then decides whether the input
//! blob can be handed over or must be copied first.

use layers::{LayerCaps, RunOptions};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Forward,
    ForwardInplace,
    ForwardMulti,
    ForwardInplaceMulti,
    ForwardGpu,
    ForwardInplaceGpu,
}

impl EntryPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryPoint::Forward => "forward",
            EntryPoint::ForwardInplace => "forward_inplace",
            EntryPoint::ForwardMulti => "forward_multi",
            EntryPoint::ForwardInplaceMulti => "forward_inplace_multi",
            EntryPoint::ForwardGpu => "forward_gpu",
            EntryPoint::ForwardInplaceGpu => "forward_inplace_gpu",
        }
    }

    pub fn is_inplace(self) -> bool {
        matches!(
            self,
            EntryPoint::ForwardInplace
                | EntryPoint::ForwardInplaceMulti
                | EntryPoint::ForwardInplaceGpu
        )
    }

    pub fn is_gpu(self) -> bool {
        matches!(self, EntryPoint::ForwardGpu | EntryPoint::ForwardInplaceGpu)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the entry point a layer with `caps` runs through under `opt`.
pub fn select_entry(caps: LayerCaps, opt: &RunOptions) -> EntryPoint {
    let gpu = opt.use_gpu() && caps.supports_gpu && !caps.supports_multi_input;
    let inplace = opt.lightmode && caps.supports_inplace;

    match (gpu, caps.supports_multi_input, inplace) {
        (true, _, true) => EntryPoint::ForwardInplaceGpu,
        (true, _, false) => EntryPoint::ForwardGpu,
        (false, true, true) => EntryPoint::ForwardInplaceMulti,
        (false, true, false) => EntryPoint::ForwardMulti,
        (false, false, true) => EntryPoint::ForwardInplace,
        (false, false, false) => EntryPoint::Forward,
    }
}
