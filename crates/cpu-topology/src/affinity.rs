// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Power modes and the CPU masks they map to.
//!
//! Cores are split into a *little* and a *big* tier by their maximum
//! frequency. A power mode selects which tier the worker pool runs on:
//!
//! | mode | value | mask                               |
//! |------|-------|------------------------------------|
//! | All  | 0     | every CPU                          |
//! | Little | 1   | little tier (all if not tiered)    |
//! | Big  | 2     | big tier (all if not tiered)       |
//!
//! On homogeneous machines, or when any core reports no frequency, the
//! classification degrades to an empty little tier and a big tier equal to
//! all CPUs.

use crate::{CpuMask, TopologyError};
use parking_lot::Mutex;
use std::fmt;

/// Which CPU tier the worker pool should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    #[default]
    All = 0,
    Little = 1,
    Big = 2,
}

impl PowerMode {
    pub const ALL_MODES: [PowerMode; 3] = [PowerMode::All, PowerMode::Little, PowerMode::Big];

    /// The numeric value (`0`, `1` or `2`).
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PowerMode::All => "all",
            PowerMode::Little => "little",
            PowerMode::Big => "big",
        }
    }
}

impl TryFrom<i32> for PowerMode {
    type Error = TopologyError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PowerMode::All),
            1 => Ok(PowerMode::Little),
            2 => Ok(PowerMode::Big),
            other => Err(TopologyError::InvalidMode(other)),
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The all / little / big CPU masks of one machine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TierMasks {
    all: CpuMask,
    little: CpuMask,
    big: CpuMask,
}

impl TierMasks {
    /// Classifies `cpu_count` cores by their maximum frequency in kHz.
    ///
    /// `freqs[i]` is the maximum of core `i`, `None` when unknown. Missing
    /// trailing entries count as unknown.
    pub fn classify(cpu_count: usize, freqs: &[Option<u32>]) -> Self {
        let usable = cpu_count.clamp(1, CpuMask::CAPACITY);
        let all = CpuMask::first_n(usable);

        let mut known = Vec::with_capacity(usable);
        for core in 0..usable {
            match freqs.get(core).copied().flatten() {
                Some(khz) => known.push(khz),
                None => {
                    tracing::warn!("cpu{core} has no frequency data, treating all cores as one tier");
                    return Self::untiered(all);
                }
            }
        }

        let fmin = known.iter().copied().min().unwrap_or(0);
        let fmax = known.iter().copied().max().unwrap_or(0);
        if fmin == fmax {
            tracing::debug!("all cores at {fmax} kHz, no little/big split");
            return Self::untiered(all);
        }

        let threshold = (u64::from(fmin) + u64::from(fmax)) / 2;
        let little: CpuMask = known
            .iter()
            .enumerate()
            .filter(|&(_, &khz)| u64::from(khz) < threshold)
            .map(|(core, _)| core)
            .collect();
        let big = all.difference(&little);

        tracing::info!(
            "cpu tiers: little={little} big={big} (threshold {threshold} kHz)"
        );
        Self { all, little, big }
    }

    /// A degraded classification: every core is big.
    pub fn untiered(all: CpuMask) -> Self {
        Self {
            all,
            little: CpuMask::empty(),
            big: all,
        }
    }

    pub fn all(&self) -> CpuMask {
        self.all
    }

    pub fn little(&self) -> CpuMask {
        self.little
    }

    pub fn big(&self) -> CpuMask {
        self.big
    }

    /// Returns `true` if the machine was split into two tiers.
    pub fn is_tiered(&self) -> bool {
        !self.little.is_empty()
    }

    /// The mask a power mode selects.
    pub fn mask_for(&self, mode: PowerMode) -> CpuMask {
        if !self.is_tiered() {
            return self.all;
        }
        match mode {
            PowerMode::All => self.all,
            PowerMode::Little => self.little,
            PowerMode::Big => self.big,
        }
    }

    /// Like [`mask_for`](Self::mask_for) for a raw mode value; unknown
    /// values select every CPU.
    pub fn mask_for_raw(&self, mode: i32) -> CpuMask {
        match PowerMode::try_from(mode) {
            Ok(mode) => self.mask_for(mode),
            Err(e) => {
                tracing::warn!("{e}, using all CPUs");
                self.all
            }
        }
    }
}

/// Something that can restrict the worker pool to a CPU mask.
pub trait ApplyAffinity {
    fn apply_affinity(&self, mask: &CpuMask) -> Result<(), TopologyError>;
}

impl<A: ApplyAffinity + ?Sized> ApplyAffinity for &A {
    fn apply_affinity(&self, mask: &CpuMask) -> Result<(), TopologyError> {
        (**self).apply_affinity(mask)
    }
}

/// Owns the current power mode and applies mode changes.
///
/// A mode is committed only after its mask was applied successfully, so
/// [`mode`](Self::mode) always describes the affinity actually in effect.
pub struct AffinityPlanner<A: ApplyAffinity> {
    tiers: TierMasks,
    applier: A,
    mode: Mutex<PowerMode>,
}

impl<A: ApplyAffinity> AffinityPlanner<A> {
    /// Creates a planner in [`PowerMode::All`] without applying anything.
    pub fn new(tiers: TierMasks, applier: A) -> Self {
        Self {
            tiers,
            applier,
            mode: Mutex::new(PowerMode::default()),
        }
    }

    pub fn tiers(&self) -> &TierMasks {
        &self.tiers
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    /// The last successfully applied mode.
    pub fn mode(&self) -> PowerMode {
        *self.mode.lock()
    }

    /// Applies the mask for `mode` and commits it. Returns the applied mask.
    ///
    /// On failure the previous mode stays in effect.
    pub fn set_mode(&self, mode: PowerMode) -> Result<CpuMask, TopologyError> {
        let mut current = self.mode.lock();
        let mask = self.tiers.mask_for(mode);
        if let Err(e) = self.applier.apply_affinity(&mask) {
            tracing::warn!("power mode {mode} not applied, staying in {}: {e}", *current);
            return Err(e);
        }
        *current = mode;
        tracing::info!("power mode {mode}: workers on {mask}");
        Ok(mask)
    }

    /// Validates a raw mode value, then calls [`set_mode`](Self::set_mode).
    pub fn set_mode_raw(&self, mode: i32) -> Result<CpuMask, TopologyError> {
        let mode = PowerMode::try_from(mode)?;
        self.set_mode(mode)
    }
}

impl<A: ApplyAffinity> fmt::Debug for AffinityPlanner<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffinityPlanner")
            .field("tiers", &self.tiers)
            .field("mode", &self.mode())
            .finish()
    }
}
