// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # cpu-topology
//!
//! Probes the CPU layout of the machine and places the worker pool on it.
//!
//! - **Probe** — logical CPU count from `/proc/cpuinfo`, instruction-set
//!   capability bits from `/proc/self/auxv`, per-core maximum frequency
//!   from cpufreq sysfs.
//! - **Tiers** — cores slower than the midpoint of the frequency range form
//!   the *little* tier, the rest the *big* tier.
//! - **Power mode** — `0` (all), `1` (little) or `2` (big) selects the mask
//!   the worker pool is pinned to.
//! - **Thread control** — a `rayon` pool that is resized and pinned on
//!   request.
//!
//! # Graceful Degradation
//! Nothing here fails because a system file is missing. The CPU count falls
//! back to the pool width, capability bits default to zero, and a machine
//! whose core frequencies are unknown or identical is treated as a single
//! big tier.
//!
//! # Example
//! ```no_run
//! use cpu_topology::{power_mode, set_power_mode, thread_affinity_mask, PowerMode};
//!
//! println!("little cores: {}", thread_affinity_mask(1));
//! if set_power_mode(2).is_ok() {
//!     assert_eq!(power_mode(), PowerMode::Big);
//! }
//! ```

mod affinity;
mod error;
mod hwcap;
mod mask;
pub mod probe;
mod sysfs;
mod thread;
mod topology;

pub use affinity::{AffinityPlanner, ApplyAffinity, PowerMode, TierMasks};
pub use error::TopologyError;
pub use hwcap::{HwCaps, TargetArch, AT_HWCAP, AT_HWCAP2, AT_NULL};
pub use mask::CpuMask;
pub use probe::{detect_cpu_count, max_freq_khz};
pub use sysfs::SysfsRoot;
pub use thread::{current_thread_index, ThreadController};
pub use topology::CpuTopology;

use once_cell::sync::OnceCell;

/// The process-wide planner driving the global [`ThreadController`].
pub fn planner() -> Result<&'static AffinityPlanner<&'static ThreadController>, TopologyError> {
    static PLANNER: OnceCell<AffinityPlanner<&'static ThreadController>> = OnceCell::new();
    PLANNER.get_or_try_init(|| {
        let controller = ThreadController::global()?;
        Ok(AffinityPlanner::new(
            CpuTopology::global().tiers().clone(),
            controller,
        ))
    })
}

/// Number of logical CPUs, detected once per process.
pub fn cpu_count() -> usize {
    CpuTopology::global().cpu_count()
}

/// The current power mode (`All` until a mode was applied successfully).
pub fn power_mode() -> PowerMode {
    planner().map(|p| p.mode()).unwrap_or_default()
}

/// Switches the worker pool to the CPUs of `mode` (`0`, `1` or `2`).
///
/// Values outside `0..=2` fail with [`TopologyError::InvalidMode`] and
/// change nothing. If pinning fails the previous mode stays in effect.
pub fn set_power_mode(mode: i32) -> Result<(), TopologyError> {
    let mode = PowerMode::try_from(mode)?;
    planner()?.set_mode(mode).map(|_| ())
}

/// The CPU mask `mode` selects. Unknown modes select every CPU.
pub fn thread_affinity_mask(mode: i32) -> CpuMask {
    CpuTopology::global().tiers().mask_for_raw(mode)
}
