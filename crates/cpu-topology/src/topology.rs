// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The probed CPU topology of the machine.

use crate::probe::{detect_cpu_count, detect_cpu_count_in, max_freq_khz_in};
use crate::{CpuMask, HwCaps, SysfsRoot, TierMasks};
use once_cell::sync::OnceCell;

/// CPU count, hardware capabilities, per-core maximum frequencies and the
/// derived tier masks.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CpuTopology {
    cpu_count: usize,
    hwcaps: HwCaps,
    max_freqs_khz: Vec<Option<u32>>,
    tiers: TierMasks,
}

impl CpuTopology {
    /// The process-wide topology, probed on first use and never refreshed.
    pub fn global() -> &'static CpuTopology {
        static TOPOLOGY: OnceCell<CpuTopology> = OnceCell::new();
        TOPOLOGY.get_or_init(CpuTopology::probe)
    }

    /// Probes the live system.
    pub fn probe() -> Self {
        Self::from_parts(detect_cpu_count(), HwCaps::detect(), &SysfsRoot::system())
    }

    /// Probes a fixture tree.
    pub fn probe_in(root: &SysfsRoot) -> Self {
        let cpu_count = detect_cpu_count_in(root);
        Self::from_parts(cpu_count, HwCaps::detect_in(root), root)
    }

    fn from_parts(cpu_count: usize, hwcaps: HwCaps, root: &SysfsRoot) -> Self {
        let max_freqs_khz: Vec<Option<u32>> = (0..cpu_count.min(CpuMask::CAPACITY))
            .map(|core| max_freq_khz_in(root, core))
            .collect();
        let tiers = TierMasks::classify(cpu_count, &max_freqs_khz);
        tracing::info!(
            "cpu topology: {cpu_count} cpus, hwcap={:#x} hwcap2={:#x}, tiered={}",
            hwcaps.hwcap,
            hwcaps.hwcap2,
            tiers.is_tiered()
        );
        Self {
            cpu_count,
            hwcaps,
            max_freqs_khz,
            tiers,
        }
    }

    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    pub fn hwcaps(&self) -> &HwCaps {
        &self.hwcaps
    }

    /// Maximum frequency of each core in kHz, `None` where unknown.
    pub fn max_freqs_khz(&self) -> &[Option<u32>] {
        &self.max_freqs_khz
    }

    pub fn tiers(&self) -> &TierMasks {
        &self.tiers
    }
}
