// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fixed-width CPU bitset.

use std::fmt;
use std::ops::{BitAnd, BitOr};

const WORDS: usize = 16;
const WORD_BITS: usize = 64;

/// A set of logical CPU indices in `0..CpuMask::CAPACITY`.
///
/// Bit `i` set means CPU `i` is a member. CPUs at or beyond
/// [`CAPACITY`](Self::CAPACITY) cannot be represented and are ignored.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuMask {
    words: [u64; WORDS],
}

impl CpuMask {
    /// Number of CPUs a mask can hold (matches the kernel's `CPU_SETSIZE`).
    pub const CAPACITY: usize = WORDS * WORD_BITS;

    /// The empty mask.
    pub const fn empty() -> Self {
        Self { words: [0; WORDS] }
    }

    /// A mask holding CPUs `0..n` (clamped to the capacity).
    pub fn first_n(n: usize) -> Self {
        let n = n.min(Self::CAPACITY);
        let mut mask = Self::empty();
        for (i, word) in mask.words.iter_mut().enumerate() {
            let lo = i * WORD_BITS;
            if n >= lo + WORD_BITS {
                *word = u64::MAX;
            } else if n > lo {
                *word = (1u64 << (n - lo)) - 1;
            }
        }
        mask
    }

    /// Adds `cpu`. Returns `false` if it is beyond the capacity.
    pub fn set(&mut self, cpu: usize) -> bool {
        if cpu >= Self::CAPACITY {
            return false;
        }
        self.words[cpu / WORD_BITS] |= 1u64 << (cpu % WORD_BITS);
        true
    }

    /// Removes `cpu`.
    pub fn clear(&mut self, cpu: usize) {
        if cpu < Self::CAPACITY {
            self.words[cpu / WORD_BITS] &= !(1u64 << (cpu % WORD_BITS));
        }
    }

    /// Returns `true` if `cpu` is a member.
    pub fn contains(&self, cpu: usize) -> bool {
        cpu < Self::CAPACITY && self.words[cpu / WORD_BITS] & (1u64 << (cpu % WORD_BITS)) != 0
    }

    /// Number of member CPUs.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no CPU is a member.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(&self, other: &CpuMask) -> CpuMask {
        let mut out = *self;
        for (w, o) in out.words.iter_mut().zip(other.words.iter()) {
            *w &= !o;
        }
        out
    }

    /// Returns `true` if the two masks share no CPU.
    pub fn is_disjoint(&self, other: &CpuMask) -> bool {
        (*self & *other).is_empty()
    }

    /// Member CPUs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::CAPACITY).filter(move |&cpu| self.contains(cpu))
    }

    /// The low 64 bits, for display on machines with few cores.
    pub fn low_word(&self) -> u64 {
        self.words[0]
    }
}

impl BitOr for CpuMask {
    type Output = CpuMask;

    fn bitor(mut self, rhs: CpuMask) -> CpuMask {
        for (w, r) in self.words.iter_mut().zip(rhs.words.iter()) {
            *w |= r;
        }
        self
    }
}

impl BitAnd for CpuMask {
    type Output = CpuMask;

    fn bitand(mut self, rhs: CpuMask) -> CpuMask {
        for (w, r) in self.words.iter_mut().zip(rhs.words.iter()) {
            *w &= r;
        }
        self
    }
}

impl FromIterator<usize> for CpuMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = CpuMask::empty();
        for cpu in iter {
            mask.set(cpu);
        }
        mask
    }
}

/// Hexadecimal, most significant word first: `0xff`, `0x1` + 16 hex digits, ...
impl fmt::Display for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let top = self.words.iter().rposition(|&w| w != 0).unwrap_or(0);
        write!(f, "0x{:x}", self.words[top])?;
        for word in self.words[..top].iter().rev() {
            write!(f, "{word:016x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuMask({self})")
    }
}

impl serde::Serialize for CpuMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
