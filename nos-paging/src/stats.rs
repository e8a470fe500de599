//! Per-process paging state, statistics and diagnostics

extern crate alloc;

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use log::info;
use nos_api::ProcessId;
use spin::Mutex;

use crate::engine::SwapManager;
use crate::error::SwapResult;
use crate::swap_list::{SwapList, SwapRecord};
use crate::tracker::ResidentPage;

/// Paging counters of one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageStats {
    /// Page faults routed to the subsystem
    pub faults: u64,
    /// Pages brought back from the backing store
    pub swap_ins: u64,
    /// Pages written out to the backing store
    pub swap_outs: u64,
}

/// Paging state the subsystem keeps for each live process
pub(crate) struct ProcessPaging {
    faults: AtomicU64,
    swap_ins: AtomicU64,
    swap_outs: AtomicU64,
    /// Swap metadata; this lock stands in for the per-process lock
    pub(crate) swapped: Mutex<SwapList>,
}

impl ProcessPaging {
    pub(crate) const fn new() -> Self {
        Self {
            faults: AtomicU64::new(0),
            swap_ins: AtomicU64::new(0),
            swap_outs: AtomicU64::new(0),
            swapped: Mutex::new(SwapList::new()),
        }
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_swap_in(&self) {
        self.swap_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_swap_out(&self) {
        self.swap_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PageStats {
        PageStats {
            faults: self.faults.load(Ordering::Relaxed),
            swap_ins: self.swap_ins.load(Ordering::Relaxed),
            swap_outs: self.swap_outs.load(Ordering::Relaxed),
        }
    }
}

/// Default number of entries printed by [`SwapManager::log_resident_list`]
pub const DUMP_LIMIT: usize = 20;

impl SwapManager {
    /// Counters for `pid`
    pub fn get_stats(&self, pid: ProcessId) -> SwapResult<PageStats> {
        Ok(self.process(pid)?.snapshot())
    }

    /// Copy of the resident list, most recent first
    ///
    /// Debugging aid only; the list may change as soon as this returns.
    pub fn dump_resident_list(&self) -> Vec<ResidentPage> {
        self.tracker.lock().snapshot()
    }

    /// Logs the resident list at info level, at most `limit` entries
    pub fn log_resident_list(&self, limit: usize) {
        let tracker = self.tracker.lock();
        info!("resident list (most recent first) [count={}]:", tracker.len());
        for page in tracker.iter().take(limit) {
            info!("  [pid={}, va={:#x}]", page.pid, page.va.as_usize());
        }
        if tracker.len() > limit {
            info!("  ... ({} more pages)", tracker.len() - limit);
        }
    }

    /// Snapshot of the swap metadata of `pid`
    pub fn swapped_pages(&self, pid: ProcessId) -> SwapResult<Vec<SwapRecord>> {
        let process = self.process(pid)?;
        let list = process.swapped.lock();
        Ok(list.iter().copied().collect())
    }

    /// Number of processes registered with the subsystem
    pub fn process_count(&self) -> usize {
        self.processes.lock().len()
    }

    /// Returns true if `pid` is registered
    pub fn is_registered(&self, pid: ProcessId) -> bool {
        self.processes.lock().contains_key(&pid)
    }
}
