// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Locations of the procfs and sysfs files the probes read.
//!
//! Every probe takes a [`SysfsRoot`] so tests can point it at a fixture
//! tree instead of the live system.

use crate::TopologyError;
use std::path::{Path, PathBuf};

/// Root directory under which `proc/` and `sys/` are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl SysfsRoot {
    /// The live system (`/`).
    pub fn system() -> Self {
        Self::new("/")
    }

    /// A fixture tree rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/proc/cpuinfo`
    pub fn cpuinfo(&self) -> PathBuf {
        self.root.join("proc/cpuinfo")
    }

    /// `<root>/proc/self/auxv`
    pub fn auxv(&self) -> PathBuf {
        self.root.join("proc/self/auxv")
    }

    /// `<root>/sys/devices/system/cpu`
    pub fn cpu_dir(&self) -> PathBuf {
        self.root.join("sys/devices/system/cpu")
    }
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self::system()
    }
}

/// Reads a sysfs/procfs file and returns its trimmed content.
pub(crate) fn read_sysfs_file(path: &Path) -> Result<String, TopologyError> {
    if !path.exists() {
        return Err(TopologyError::NotAvailable {
            path: path.display().to_string(),
        });
    }
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| TopologyError::ReadError {
            path: path.display().to_string(),
            source: e,
        })
}

/// Reads a binary procfs file such as `auxv`.
pub(crate) fn read_sysfs_bytes(path: &Path) -> Result<Vec<u8>, TopologyError> {
    if !path.exists() {
        return Err(TopologyError::NotAvailable {
            path: path.display().to_string(),
        });
    }
    std::fs::read(path).map_err(|e| TopologyError::ReadError {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_paths() {
        let root = SysfsRoot::new("/tmp/fixture");
        assert_eq!(root.cpuinfo(), Path::new("/tmp/fixture/proc/cpuinfo"));
        assert_eq!(root.auxv(), Path::new("/tmp/fixture/proc/self/auxv"));
        assert_eq!(
            root.cpu_dir(),
            Path::new("/tmp/fixture/sys/devices/system/cpu")
        );
        assert_eq!(SysfsRoot::default(), SysfsRoot::system());
    }

    #[test]
    fn test_read_trimmed() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "  1800000\n").unwrap();
        assert_eq!(read_sysfs_file(f.path()).unwrap(), "1800000");
    }

    #[test]
    fn test_missing_file() {
        let result = read_sysfs_file(Path::new("/nonexistent/cpufreq/cpuinfo_max_freq"));
        assert!(matches!(result, Err(TopologyError::NotAvailable { .. })));
        let result = read_sysfs_bytes(Path::new("/nonexistent/auxv"));
        assert!(matches!(result, Err(TopologyError::NotAvailable { .. })));
    }
}
