// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for network loading and forward execution.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use layers::{Backend, RunOptions};
use model_io::MemoryReader;
use runtime::{Net, Ready};
use tensor_core::{Shape, Tensor};

const CHANNELS: usize = 32;

/// A chain of `depth` BatchNorm layers ending in a top-5 ArgMax.
fn chain(depth: usize) -> (String, Vec<u8>) {
    let mut param = format!("7767517\n{} {}\n", depth + 1, depth + 2);
    for i in 0..depth {
        param.push_str(&format!("BatchNorm bn{i} 1 1 b{i} b{} 0={CHANNELS} 1=0.00001\n", i + 1));
    }
    param.push_str(&format!("ArgMax top 1 1 b{depth} prob 1=5\n"));

    let weights: Vec<f32> = (0..depth)
        .flat_map(|_| {
            [1.0f32, 0.0, 1.0, 0.1]
                .into_iter()
                .flat_map(|w| std::iter::repeat(w).take(CHANNELS))
        })
        .collect();
    let bytes = weights.iter().flat_map(|v| v.to_le_bytes()).collect();
    (param, bytes)
}

fn load(depth: usize, opt: RunOptions) -> Net<Ready> {
    let (param, weights) = chain(depth);
    Net::new(opt)
        .load_param(&mut MemoryReader::new(param.as_bytes()))
        .unwrap()
        .load_model(&mut MemoryReader::new(weights))
        .unwrap()
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("net_load");
    for depth in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| load(depth, RunOptions::default()))
        });
    }
    group.finish();
}

fn bench_forward(c: &mut Criterion) {
    let input = Tensor::filled(Shape::chw(CHANNELS, 28, 28), 0.5);
    let mut group = c.benchmark_group("net_forward");
    for backend in [Backend::Cpu, Backend::Gpu] {
        let opt = RunOptions {
            backend,
            ..Default::default()
        };
        let net = load(8, opt);
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| net.forward(&[("b0", input.clone())], &["prob"]).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_load, bench_forward);
criterion_main!(benches);
