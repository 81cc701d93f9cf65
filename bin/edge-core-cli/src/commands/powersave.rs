// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `edge-core powersave` command: pin the worker pool to one tier.

pub fn execute(mode: i32) -> anyhow::Result<()> {
    let mask = cpu_topology::thread_affinity_mask(mode);
    cpu_topology::set_power_mode(mode)?;

    println!("  Power mode:   {}", cpu_topology::power_mode());
    println!("  Affinity:     {mask}  ({} cpus)", mask.count());
    Ok(())
}
