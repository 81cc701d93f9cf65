// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `edge-core status` command: display the probed CPU layout.
//!
//! On machines without cpufreq or auxv data (containers, most x86 laptops)
//! the tiers collapse into one big tier and the capability bits read zero.

use cpu_topology::{CpuTopology, PowerMode};
use runtime::RuntimeConfig;

pub fn execute(config: &RuntimeConfig, json: bool) -> anyhow::Result<()> {
    let topology = CpuTopology::global();

    if json {
        println!("{}", serde_json::to_string_pretty(topology)?);
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              edge-core · CPU Topology               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Cores ──────────────────────────────────────────────────
    println!("  Cores");
    println!("   Logical CPUs: {}", topology.cpu_count());
    for (core, freq) in topology.max_freqs_khz().iter().enumerate() {
        match freq {
            Some(khz) => println!("   cpu{core:<3}       {} MHz", khz / 1000),
            None => println!("   cpu{core:<3}       unknown"),
        }
    }
    println!();

    // ── Capabilities ───────────────────────────────────────────
    let caps = topology.hwcaps();
    println!("  Capabilities");
    println!("   NEON:         {}", yes_no(caps.has_neon()));
    println!("   VFPv4:        {}", yes_no(caps.has_vfpv4()));
    println!("   ASIMD-HP:     {}", yes_no(caps.has_asimdhp()));
    println!();

    // ── Tiers ──────────────────────────────────────────────────
    let tiers = topology.tiers();
    println!("  Tiers");
    if !tiers.is_tiered() {
        println!("   Single tier (frequencies unknown or identical)");
    }
    for mode in [PowerMode::All, PowerMode::Little, PowerMode::Big] {
        let mask = tiers.mask_for(mode);
        println!("   {:<7}       {mask}  ({} cpus)", mode.as_str(), mask.count());
    }
    println!();

    // ── Runtime ────────────────────────────────────────────────
    println!("  Runtime");
    println!("   Power mode:   {}", cpu_topology::power_mode());
    println!("   Configured:   {}", config.power_mode.mode());
    println!("   Threads:      {}", config.resolve_threads());
    println!("   Backend:      {}", config.backend);

    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
