//! Swap-out / swap-in engine
//!
//! Moves pages between physical frames and the backing store and keeps the
//! page-table entry, the swap metadata and the residency tracker in step.
//!
//! Lock discipline: the tracker lock and the store lock are each taken in
//! their own short scope and released before the other is acquired. The
//! per-process swap-list lock and the process-table lock never wrap either
//! of them. The page-table lock is the caller's.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use log::{debug, error, warn};
use nos_api::memory::{FrameAllocator, PageTableEntry, PageTableOps, PhysAddr, SwapSlot, VirtAddr};
use nos_api::ProcessId;
use spin::Mutex;

use crate::config::SwapConfig;
use crate::error::{SwapError, SwapResult};
use crate::stats::ProcessPaging;
use crate::store::{BackingStore, PartitionUsage};
use crate::swap_list::SwapRecord;
use crate::sync::{DomainLock, LockDomain};
use crate::tracker::{ResidencyTracker, ResidentPage, Touch};

/// The demand-paging subsystem
pub struct SwapManager {
    pub(crate) config: SwapConfig,
    pub(crate) frames: Arc<dyn FrameAllocator>,
    pub(crate) tables: Arc<dyn PageTableOps>,
    pub(crate) tracker: DomainLock<ResidencyTracker>,
    pub(crate) store: DomainLock<BackingStore>,
    pub(crate) processes: Mutex<HashMap<ProcessId, Arc<ProcessPaging>>>,
}

impl SwapManager {
    /// Creates the subsystem on top of the kernel's frame allocator and page tables
    pub fn new(
        config: SwapConfig,
        frames: Arc<dyn FrameAllocator>,
        tables: Arc<dyn PageTableOps>,
    ) -> nos_api::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            frames,
            tables,
            tracker: DomainLock::new(
                LockDomain::Tracker,
                ResidencyTracker::new(config.resident_budget),
            ),
            store: DomainLock::new(
                LockDomain::Store,
                BackingStore::new(config.max_swap_pages, config.slot_policy),
            ),
            processes: Mutex::new(HashMap::new()),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    /// Global resident budget
    pub fn budget(&self) -> usize {
        self.config.resident_budget
    }

    /// Number of tracked resident pages
    pub fn resident_count(&self) -> usize {
        self.tracker.lock().len()
    }

    /// Occupancy of the backing-store partition of `pid`
    pub fn partition_usage(&self, pid: ProcessId) -> Option<PartitionUsage> {
        self.store.lock().usage(pid)
    }

    pub(crate) fn process(&self, pid: ProcessId) -> SwapResult<Arc<ProcessPaging>> {
        self.processes
            .lock()
            .get(&pid)
            .cloned()
            .ok_or(SwapError::ProcessNotFound)
    }

    /// Writes a resident user page out to the backing store
    ///
    /// On success the entry is Swapped, the frame is back with the
    /// allocator and the page has a swap record. The residency tracker is
    /// left alone: callers that evict through the tracker have already
    /// detached the page, and anyone else has to [`remove`](Self::remove) it.
    pub fn swap_out(&self, pid: ProcessId, va: VirtAddr) -> SwapResult<SwapSlot> {
        let va = va.page_round_down();
        let process = self.process(pid)?;

        let (frame, perms) = match self.tables.read_entry(pid, va) {
            PageTableEntry::Resident { frame, perms } if perms.is_user() => (frame, perms),
            _ => return Err(SwapError::NotSwappable),
        };

        let slot = {
            let mut store = self.store.lock();
            let slot = store.reserve(pid).inspect_err(|err| {
                warn!("swap: cannot swap out {:?} {:?}: {}", pid, va, err);
            })?;
            self.frames.copy_from_frame(frame, store.slot_mut(pid, slot)?);
            slot
        };

        // The record exists before the entry says Swapped.
        process.swapped.lock().attach(SwapRecord::new(va, slot));
        self.tables.write_entry(pid, va, PageTableEntry::swapped(slot, perms));
        self.tables.invalidate(pid, va);
        self.frames.free_frame(frame);

        process.record_swap_out();
        debug!("swap: {:?} {:?} out to slot {}", pid, va, slot.0);
        Ok(slot)
    }

    /// Brings a swapped page back into a fresh frame
    ///
    /// Makes room under the resident budget first, which may swap out a
    /// page of another process. On `OutOfMemory` the entry and the swap
    /// record are left exactly as they were.
    pub fn swap_in(&self, pid: ProcessId, va: VirtAddr) -> SwapResult<PhysAddr> {
        let va = va.page_round_down();
        let process = self.process(pid)?;

        let (entry_slot, perms) = match self.tables.read_entry(pid, va) {
            PageTableEntry::Swapped { slot, perms } => (slot, perms),
            _ => return Err(SwapError::NotSwapped),
        };

        let record = process.swapped.lock().detach(va).ok_or_else(|| {
            error!("swap: {:?} {:?} is marked swapped but has no swap record", pid, va);
            SwapError::CorruptSwapState
        })?;
        let reattach = |record: SwapRecord| process.swapped.lock().attach(record);

        if record.slot() != entry_slot {
            error!(
                "swap: {:?} {:?} entry names slot {} but record holds slot {}",
                pid,
                va,
                entry_slot.0,
                record.slot().0
            );
            reattach(record);
            return Err(SwapError::CorruptSwapState);
        }

        if let Err(err) = self.ensure_capacity() {
            reattach(record);
            return Err(err);
        }

        let Some(frame) = self.alloc_frame_or_reclaim() else {
            warn!("swap: no frame for {:?} {:?}", pid, va);
            reattach(record);
            return Err(SwapError::OutOfMemory);
        };

        let copied = {
            let mut store = self.store.lock();
            store
                .slot(pid, record.slot())
                .map(|bytes| self.frames.copy_to_frame(frame, bytes))
                .and_then(|()| store.release(pid, record.slot()))
        };
        if let Err(err) = copied {
            self.frames.free_frame(frame);
            reattach(record);
            return Err(err);
        }

        self.tables.write_entry(pid, va, PageTableEntry::resident(frame, perms));
        process.record_swap_in();
        self.track_new_resident(ResidentPage::new(pid, va));
        self.tables.invalidate(pid, va);
        debug!("swap: {:?} {:?} in from slot {}", pid, va, record.slot().0);
        Ok(frame)
    }

    /// Evicts until the tracker has at least one free slot
    ///
    /// Every victim is swapped out. A victim that cannot be written (its
    /// partition is full) is set aside and put back at the least-recent end
    /// once room has been made; a victim that is no longer resident is
    /// dropped from the tracker.
    pub fn ensure_capacity(&self) -> SwapResult<()> {
        self.evict_until(|tracker, set_aside, _| tracker.len() + set_aside < tracker.budget())
    }

    /// Marks a resident user page as just used
    ///
    /// A page not yet tracked is inserted, evicting first if the budget is
    /// reached.
    pub fn touch(&self, pid: ProcessId, va: VirtAddr) -> SwapResult<Touch> {
        let va = va.page_round_down();
        self.process(pid)?;
        match self.tables.read_entry(pid, va) {
            PageTableEntry::Resident { perms, .. } if perms.is_user() => {}
            _ => return Err(SwapError::NotSwappable),
        }
        self.track(ResidentPage::new(pid, va))
    }

    /// Forgets a tracked page; a no-op if it is not tracked
    pub fn remove(&self, pid: ProcessId, va: VirtAddr) -> bool {
        let page = ResidentPage::new(pid, va.page_round_down());
        self.tracker.lock().remove(&page)
    }

    pub(crate) fn track(&self, page: ResidentPage) -> SwapResult<Touch> {
        loop {
            let touched = self.tracker.lock().touch(page);
            match touched {
                Err(SwapError::BudgetExceeded) => self.ensure_capacity()?,
                other => return other,
            }
        }
    }

    /// Registers a page that was just made resident
    ///
    /// The page is valid either way; failing to track it only costs
    /// accounting, so it is logged rather than unwound.
    pub(crate) fn track_new_resident(&self, page: ResidentPage) {
        if let Err(err) = self.track(page) {
            warn!("swap: {:?} {:?} resident but untracked: {}", page.pid, page.va, err);
        }
    }

    pub(crate) fn alloc_frame_or_reclaim(&self) -> Option<PhysAddr> {
        if let Some(frame) = self.frames.alloc_frame() {
            return Some(frame);
        }
        self.evict_until(|_, _, freed| freed > 0).ok()?;
        self.frames.alloc_frame()
    }

    /// Evicts and swaps out victims until `done(tracker, set_aside, freed)` holds
    ///
    /// Set-aside victims go back into the tracker under the same guard that
    /// decided the loop is over, so no other thread can take their slots in
    /// between.
    fn evict_until<F>(&self, mut done: F) -> SwapResult<()>
    where
        F: FnMut(&ResidencyTracker, usize, usize) -> bool,
    {
        let mut set_aside: Vec<ResidentPage> = Vec::new();
        let mut freed = 0;
        let mut last_err = None;

        let result = loop {
            let mut tracker = self.tracker.lock();
            if done(&*tracker, set_aside.len(), freed) {
                restore_set_aside(&mut tracker, &mut set_aside);
                break Ok(());
            }
            let Some(victim) = tracker.evict() else {
                restore_set_aside(&mut tracker, &mut set_aside);
                break Err(last_err.unwrap_or(SwapError::EvictionStalled));
            };
            drop(tracker);

            match self.swap_out(victim.pid, victim.va) {
                Ok(_) => freed += 1,
                Err(SwapError::NotSwappable | SwapError::ProcessNotFound) => {
                    warn!("swap: dropping stale resident record {:?} {:?}", victim.pid, victim.va);
                }
                Err(err) if err.is_recoverable() => {
                    set_aside.push(victim);
                    last_err = Some(err);
                }
                Err(err) => {
                    set_aside.push(victim);
                    restore_set_aside(&mut self.tracker.lock(), &mut set_aside);
                    break Err(err);
                }
            }
        };

        if let Err(err) = result {
            if err.is_fatal() {
                error!("swap: eviction failed: {}", err);
            } else {
                warn!("swap: eviction failed: {}", err);
            }
        }
        result
    }
}

/// Returns set-aside victims to the least-recent end, as far as the budget allows
///
/// A victim that no longer fits stays resident but untracked.
fn restore_set_aside(tracker: &mut ResidencyTracker, set_aside: &mut Vec<ResidentPage>) {
    for page in set_aside.drain(..) {
        if tracker.reinsert_least_recent(page).is_err() {
            warn!("swap: {:?} {:?} resident but untracked: budget taken", page.pid, page.va);
        }
    }
}
