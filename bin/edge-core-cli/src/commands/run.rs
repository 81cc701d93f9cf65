// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `edge-core run` command: load a network and run one forward pass.
//!
//! Walks the full type-state pipeline:
//! ```text
//! Net<Empty> → load_param → Net<Parsed> → load_model → Net<Ready> → forward
//! ```

use anyhow::Context;
use layers::Backend;
use runtime::{Net, RuntimeConfig};
use std::path::Path;
use tensor_core::{Shape, Tensor};

pub fn execute(
    mut config: RuntimeConfig,
    param: &Path,
    model: &Path,
    inputs: &[String],
    outputs: &[String],
    fill: f32,
    gpu: bool,
) -> anyhow::Result<()> {
    if gpu {
        config.backend = Backend::Gpu;
    }
    let feeds = inputs
        .iter()
        .map(|spec| parse_input(spec))
        .collect::<anyhow::Result<Vec<_>>>()?;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              edge-core · Network Runner             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Startup ────────────────────────────────────────────────
    let opt = Net::apply_startup_config(&config)?;
    println!("  Config:");
    println!("   Backend:    {}", opt.backend);
    println!("   Threads:    {}", opt.num_threads);
    println!("   Power mode: {}", cpu_topology::power_mode());
    println!("   Lightmode:  {}", opt.lightmode);
    println!();

    // ── Type-State Pipeline ────────────────────────────────────
    println!("  [1/3] Parsing {}...", param.display());
    let parsed = Net::new(opt)
        .with_profiling(true)
        .load_param_file(param)
        .with_context(|| format!("loading {}", param.display()))?;
    println!(
        "        {} layers, {} blobs",
        parsed.layer_count(),
        parsed.blob_count()
    );

    println!("  [2/3] Loading weights from {}...", model.display());
    let net = parsed
        .load_model_file(model)
        .with_context(|| format!("loading {}", model.display()))?;

    println!("  [3/3] Running forward pass...");
    let tensors: Vec<(&str, Tensor)> = feeds
        .iter()
        .map(|(name, shape)| (name.as_str(), Tensor::filled(shape.clone(), fill)))
        .collect();
    let wanted: Vec<&str> = outputs.iter().map(String::as_str).collect();
    let result = net.forward(&tensors, &wanted)?;
    println!();

    // ── Results ────────────────────────────────────────────────
    println!("  Outputs");
    for (name, tensor) in wanted.iter().zip(&result.tensors) {
        println!("   {name:<12} {}  {}", tensor.shape(), preview(tensor.as_slice()));
    }
    if let Some(metrics) = &result.metrics {
        println!();
        println!("  {}", metrics.summary());
        if let Some(slowest) = metrics.slowest() {
            println!(
                "  Slowest:     {} ({}, {}) {:.3}ms",
                slowest.layer_name,
                slowest.kind,
                slowest.entry,
                slowest.duration.as_secs_f64() * 1000.0
            );
        }
    }

    net.release()?;
    Ok(())
}

/// Parses `name=CxHxW` (1 to 4 dimensions) into a blob name and shape.
fn parse_input(spec: &str) -> anyhow::Result<(String, Shape)> {
    let (name, dims) = spec
        .split_once('=')
        .with_context(|| format!("input '{spec}' is not of the form name=CxHxW"))?;
    if name.is_empty() {
        anyhow::bail!("input '{spec}' has an empty blob name");
    }
    let dims = dims
        .split('x')
        .map(|d| {
            d.parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .with_context(|| format!("invalid dimension '{d}' in input '{spec}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if dims.len() > 4 {
        anyhow::bail!("input '{spec}' has more than 4 dimensions");
    }
    Ok((name.to_string(), Shape::new(dims)))
}

fn preview(values: &[f32]) -> String {
    let head: Vec<String> = values.iter().take(6).map(|v| format!("{v:.4}")).collect();
    if values.len() > 6 {
        format!("[{}, ...]", head.join(", "))
    } else {
        format!("[{}]", head.join(", "))
    }
}
