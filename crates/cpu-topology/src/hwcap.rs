// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! ELF hardware capability bits from the auxiliary vector.
//!
//! The kernel hands every process an auxiliary vector of native-word
//! `(tag, value)` pairs, readable at `/proc/self/auxv`. `AT_HWCAP` and
//! `AT_HWCAP2` carry per-architecture instruction-set feature bits.

use crate::sysfs::{read_sysfs_bytes, SysfsRoot};
use std::mem::size_of;
use std::path::Path;

pub const AT_NULL: usize = 0;
pub const AT_HWCAP: usize = 16;
pub const AT_HWCAP2: usize = 26;

// aarch64 AT_HWCAP bits
const HWCAP_ASIMD: u64 = 1 << 1;
const HWCAP_ASIMDHP: u64 = 1 << 10;

// arm AT_HWCAP bits
const HWCAP_NEON: u64 = 1 << 12;
const HWCAP_VFPV4: u64 = 1 << 16;

/// Architecture the capability bits are interpreted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetArch {
    Aarch64,
    Arm,
    Other,
}

impl TargetArch {
    /// The architecture this crate was compiled for.
    pub const fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            TargetArch::Aarch64
        } else if cfg!(target_arch = "arm") {
            TargetArch::Arm
        } else {
            TargetArch::Other
        }
    }
}

/// The `AT_HWCAP` / `AT_HWCAP2` values of the running process.
///
/// Both are zero when the auxiliary vector is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct HwCaps {
    pub hwcap: u64,
    pub hwcap2: u64,
}

impl HwCaps {
    /// Reads the capabilities of the current process.
    pub fn detect() -> Self {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            Self::detect_in(&SysfsRoot::system())
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            Self::default()
        }
    }

    /// Reads `<root>/proc/self/auxv`.
    pub fn detect_in(root: &SysfsRoot) -> Self {
        Self::read_from(&root.auxv())
    }

    /// Reads an auxiliary-vector file. Missing or unreadable files yield empty caps.
    pub fn read_from(path: &Path) -> Self {
        match read_sysfs_bytes(path) {
            Ok(bytes) => Self::parse_auxv(&bytes),
            Err(e) => {
                tracing::debug!("hwcaps unavailable: {e}");
                Self::default()
            }
        }
    }

    /// Parses native-endian, native-word `(tag, value)` pairs up to `AT_NULL`.
    pub fn parse_auxv(bytes: &[u8]) -> Self {
        const WORD: usize = size_of::<usize>();
        let mut caps = Self::default();
        for pair in bytes.chunks_exact(2 * WORD) {
            let tag = read_word(&pair[..WORD]);
            let value = read_word(&pair[WORD..]) as u64;
            match tag {
                AT_NULL => break,
                AT_HWCAP => caps.hwcap = value,
                AT_HWCAP2 => caps.hwcap2 = value,
                _ => {}
            }
        }
        caps
    }

    /// Returns `true` if no capability bit is set.
    pub fn is_empty(&self) -> bool {
        self.hwcap == 0 && self.hwcap2 == 0
    }

    /// NEON / Advanced SIMD on the compile target.
    pub fn has_neon(&self) -> bool {
        self.has_neon_on(TargetArch::current())
    }

    /// VFPv4 on the compile target.
    pub fn has_vfpv4(&self) -> bool {
        self.has_vfpv4_on(TargetArch::current())
    }

    /// Half-precision Advanced SIMD arithmetic on the compile target.
    pub fn has_asimdhp(&self) -> bool {
        self.has_asimdhp_on(TargetArch::current())
    }

    pub fn has_neon_on(&self, arch: TargetArch) -> bool {
        match arch {
            TargetArch::Aarch64 => self.hwcap & HWCAP_ASIMD != 0,
            TargetArch::Arm => self.hwcap & HWCAP_NEON != 0,
            TargetArch::Other => false,
        }
    }

    // On aarch64 VFPv4 is part of the base ISA whenever ASIMD is present.
    pub fn has_vfpv4_on(&self, arch: TargetArch) -> bool {
        match arch {
            TargetArch::Aarch64 => self.hwcap & HWCAP_ASIMD != 0,
            TargetArch::Arm => self.hwcap & HWCAP_VFPV4 != 0,
            TargetArch::Other => false,
        }
    }

    pub fn has_asimdhp_on(&self, arch: TargetArch) -> bool {
        match arch {
            TargetArch::Aarch64 => self.hwcap & HWCAP_ASIMDHP != 0,
            TargetArch::Arm | TargetArch::Other => false,
        }
    }
}

fn read_word(bytes: &[u8]) -> usize {
    let mut buf = [0u8; size_of::<usize>()];
    buf.copy_from_slice(bytes);
    usize::from_ne_bytes(buf)
}
