// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Logical CPU count and per-core maximum frequency.
//!
//! Reads:
//! - `/proc/cpuinfo` — one `processor` line per logical CPU.
//! - `/sys/devices/system/cpu/...` — per-core maximum frequency, from the
//!   first source that yields a nonzero value:
//!   1. `cpufreq/stats/cpuN/time_in_state`
//!   2. `cpuN/cpufreq/stats/time_in_state`
//!   3. `cpuN/cpufreq/cpuinfo_max_freq`
//!
//! Missing or unreadable files never fail the probe. They degrade to the
//! pool width (for the CPU count) or to "no frequency data" for a core.

use crate::sysfs::{read_sysfs_file, SysfsRoot};
use crate::{CpuMask, TopologyError};
use std::path::Path;

/// Counts `processor` entries in the text of `/proc/cpuinfo`.
pub fn count_processors(cpuinfo: &str) -> usize {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count()
}

/// Detects the number of logical CPUs on the live system.
///
/// Never returns less than 1. See [`crate::cpu_count`] for the cached value.
pub fn detect_cpu_count() -> usize {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        detect_cpu_count_in(&SysfsRoot::system())
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        fallback_cpu_count()
    }
}

/// Detects the number of logical CPUs from `<root>/proc/cpuinfo`.
pub fn detect_cpu_count_in(root: &SysfsRoot) -> usize {
    let path = root.cpuinfo();
    let count = match read_sysfs_file(&path) {
        Ok(content) => count_processors(&content),
        Err(e) => {
            tracing::debug!("cpu count: {e}");
            0
        }
    };

    let count = if count == 0 {
        let fallback = fallback_cpu_count();
        tracing::warn!(
            "no processor entries in {}, assuming {fallback} CPUs",
            path.display()
        );
        fallback
    } else {
        count
    };

    if count > CpuMask::CAPACITY {
        tracing::warn!(
            "{count} CPUs detected, affinity masks cover only the first {}",
            CpuMask::CAPACITY
        );
    }
    count
}

fn fallback_cpu_count() -> usize {
    rayon::current_num_threads().max(1)
}

/// Maximum frequency of `core` in kHz on the live system.
pub fn max_freq_khz(core: usize) -> Option<u32> {
    max_freq_khz_in(&SysfsRoot::system(), core)
}

/// Maximum frequency of `core` in kHz below `root`.
///
/// Returns `None` if no source has usable data.
pub fn max_freq_khz_in(root: &SysfsRoot, core: usize) -> Option<u32> {
    let cpu_dir = root.cpu_dir();
    let stats_global = cpu_dir.join(format!("cpufreq/stats/cpu{core}/time_in_state"));
    let stats_per_core = cpu_dir.join(format!("cpu{core}/cpufreq/stats/time_in_state"));
    let max_freq = cpu_dir.join(format!("cpu{core}/cpufreq/cpuinfo_max_freq"));

    let found = [stats_global, stats_per_core]
        .iter()
        .find_map(|path| nonzero(read_time_in_state(path)))
        .or_else(|| nonzero(read_khz(&max_freq)));

    if found.is_none() {
        tracing::debug!("cpu{core}: no frequency data");
    }
    found
}

fn nonzero(result: Result<u32, TopologyError>) -> Option<u32> {
    match result {
        Ok(0) => None,
        Ok(khz) => Some(khz),
        Err(e) => {
            tracing::trace!("frequency source skipped: {e}");
            None
        }
    }
}

/// Largest frequency listed in a `time_in_state` table.
fn read_time_in_state(path: &Path) -> Result<u32, TopologyError> {
    let content = read_sysfs_file(path)?;
    Ok(parse_time_in_state(&content))
}

/// Parses `"<freq_khz> <time>"` lines and returns the largest frequency.
///
/// Lines whose first column is not a number are ignored.
pub fn parse_time_in_state(content: &str) -> u32 {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|freq| freq.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

fn read_khz(path: &Path) -> Result<u32, TopologyError> {
    let content = read_sysfs_file(path)?;
    content.parse::<u32>().map_err(|_| TopologyError::ParseError {
        path: path.display().to_string(),
        detail: format!("expected integer kHz value, got '{content}'"),
    })
}
