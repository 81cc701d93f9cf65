// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The fork-join worker pool and its CPU placement.
//!
//! [`ThreadController`] owns a `rayon` pool. Changing affinity rebuilds the
//! pool with one worker per CPU in the mask and then has every worker pin
//! itself; changing the pool size rebuilds it and re-pins new workers to
//! the last mask applied.

use crate::{ApplyAffinity, CpuMask, TopologyError};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

struct PoolState {
    pool: Arc<ThreadPool>,
    size: usize,
    mask: Option<CpuMask>,
}

/// Worker pool sized and pinned on request.
pub struct ThreadController {
    state: RwLock<PoolState>,
}

impl ThreadController {
    /// The process-wide controller, sized to the detected CPU count.
    pub fn global() -> Result<&'static ThreadController, TopologyError> {
        static CONTROLLER: OnceCell<ThreadController> = OnceCell::new();
        CONTROLLER.get_or_try_init(|| ThreadController::new(crate::cpu_count()))
    }

    /// Creates a controller with `size` unpinned workers (at least one).
    pub fn new(size: usize) -> Result<Self, TopologyError> {
        let size = size.max(1);
        let pool = build_pool(size, None)?;
        tracing::debug!("worker pool: {size} threads");
        Ok(Self {
            state: RwLock::new(PoolState {
                pool: Arc::new(pool),
                size,
                mask: None,
            }),
        })
    }

    /// Number of workers.
    pub fn pool_size(&self) -> usize {
        self.state.read().size
    }

    /// The last mask successfully applied, if any.
    pub fn applied_mask(&self) -> Option<CpuMask> {
        self.state.read().mask
    }

    /// Resizes the pool to `n` workers (clamped to at least one).
    ///
    /// Does not change the affinity mask; new workers adopt the last mask
    /// applied.
    pub fn set_pool_size(&self, n: usize) -> Result<(), TopologyError> {
        let n = n.max(1);
        let mut state = self.state.write();
        if state.size == n {
            return Ok(());
        }
        let pool = build_pool(n, state.mask)?;
        state.pool = Arc::new(pool);
        state.size = n;
        tracing::info!("worker pool resized to {n} threads");
        Ok(())
    }

    /// Runs `op` inside the pool; parallel iterators in `op` use its workers.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        let pool = Arc::clone(&self.state.read().pool);
        pool.install(op)
    }

    /// Rebuilds the pool with one worker per CPU in `mask` and pins every
    /// worker to `mask`.
    ///
    /// The replacement pool is installed only once all of its workers are
    /// pinned. On failure the first worker error is returned and the
    /// current pool, size and mask stay in place.
    pub fn apply(&self, mask: &CpuMask) -> Result<(), TopologyError> {
        if mask.is_empty() {
            return Err(TopologyError::EmptyMask);
        }
        if !cfg!(any(target_os = "linux", target_os = "android")) {
            return Err(TopologyError::AffinityUnsupported);
        }

        let mut state = self.state.write();
        let size = mask.count();
        let pool = build_pool(size, None)?;

        let mask = *mask;
        let results = pool.broadcast(|ctx| pin_current_thread(&mask).map_err(|e| (ctx.index(), e)));
        if let Some((worker, source)) = results.into_iter().find_map(Result::err) {
            tracing::warn!("worker {worker} could not pin to {mask}: {source}; keeping current pool");
            return Err(TopologyError::AffinityFailed { worker, source });
        }

        state.pool = Arc::new(pool);
        state.size = size;
        state.mask = Some(mask);
        tracing::debug!("{size} workers pinned to {mask}");
        Ok(())
    }
}

impl ApplyAffinity for ThreadController {
    fn apply_affinity(&self, mask: &CpuMask) -> Result<(), TopologyError> {
        self.apply(mask)
    }
}

impl std::fmt::Debug for ThreadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ThreadController")
            .field("size", &state.size)
            .field("mask", &state.mask)
            .finish()
    }
}

/// Index of the calling worker in its pool, or 0 outside any pool.
pub fn current_thread_index() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}

fn build_pool(size: usize, mask: Option<CpuMask>) -> Result<ThreadPool, TopologyError> {
    let mut builder = ThreadPoolBuilder::new()
        .num_threads(size)
        .thread_name(|i| format!("edge-worker-{i}"));
    if let Some(mask) = mask {
        builder = builder.start_handler(move |index| {
            if let Err(e) = pin_current_thread(&mask) {
                tracing::warn!("worker {index} could not re-pin to {mask}: {e}");
            }
        });
    }
    builder
        .build()
        .map_err(|e| TopologyError::PoolBuildError(e.to_string()))
}

/// Restricts the calling thread to the CPUs in `mask`.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn pin_current_thread(mask: &CpuMask) -> std::io::Result<()> {
    let set_size = std::mem::size_of::<libc::cpu_set_t>();
    let width = set_size * 8;
    // SAFETY: cpu_set_t is plain data and zero is a valid empty set.
    // CPU_SET is only called for indices below the set's bit width, and pid
    // 0 addresses the calling thread.
    let ret = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in mask.iter().take_while(|&cpu| cpu < width) {
            libc::CPU_SET(cpu, &mut set);
        }
        libc::sched_setaffinity(0, set_size, &set)
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn pin_current_thread(_mask: &CpuMask) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "thread affinity is not supported on this platform",
    ))
}
