//! Page fault entry points
//!
//! The VM layer decides that a fault belongs to the paging subsystem and
//! calls [`SwapManager::handle_fault`]. Handlers that already know what kind
//! of fault they are looking at can call [`SwapManager::swap_in`] or
//! [`SwapManager::fault_in_zeroed`] directly after [`SwapManager::record_fault`].

use log::{debug, error, trace};
use nos_api::memory::{PageTableEntry, PhysAddr, PtePerms, VirtAddr};
use nos_api::ProcessId;

use crate::engine::SwapManager;
use crate::error::{SwapError, SwapResult};
use crate::tracker::ResidentPage;

/// How a fault was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The page was read back from the backing store
    SwappedIn(PhysAddr),
    /// A fresh zeroed frame was installed
    ZeroFilled(PhysAddr),
    /// The page was already resident; it was only touched
    AlreadyResident,
}

impl SwapManager {
    /// Counts one fault against `pid`
    pub fn record_fault(&self, pid: ProcessId) -> SwapResult<()> {
        self.process(pid)?.record_fault();
        Ok(())
    }

    /// Resolves a fault on `va`
    ///
    /// `lazy` carries the permissions of a lazily allocated mapping; with
    /// `None` an unmapped page is not ours to fix and fails with
    /// [`SwapError::NotSwapped`].
    pub fn handle_fault(
        &self,
        pid: ProcessId,
        va: VirtAddr,
        lazy: Option<PtePerms>,
    ) -> SwapResult<FaultOutcome> {
        let va = va.page_round_down();
        self.record_fault(pid)?;
        trace!("fault: {:?} {:?}", pid, va);

        let outcome = match self.tables.read_entry(pid, va) {
            PageTableEntry::Swapped { .. } => self.swap_in(pid, va).map(FaultOutcome::SwappedIn),
            PageTableEntry::Resident { .. } => {
                self.touch(pid, va).map(|_| FaultOutcome::AlreadyResident)
            }
            PageTableEntry::Unmapped => match lazy {
                Some(perms) => self
                    .fault_in_zeroed(pid, va, perms)
                    .map(FaultOutcome::ZeroFilled),
                None => Err(SwapError::NotSwapped),
            },
        };

        if let Err(SwapError::CorruptSwapState) = outcome {
            error!("fault: {:?} {:?} has inconsistent swap state", pid, va);
        }
        outcome
    }

    /// Backs an unmapped user page with a zeroed frame
    pub fn fault_in_zeroed(
        &self,
        pid: ProcessId,
        va: VirtAddr,
        perms: PtePerms,
    ) -> SwapResult<PhysAddr> {
        let va = va.page_round_down();
        self.process(pid)?;
        if !perms.is_user() || self.tables.read_entry(pid, va) != PageTableEntry::Unmapped {
            return Err(SwapError::NotSwappable);
        }

        self.ensure_capacity()?;
        let frame = self.alloc_frame_or_reclaim().ok_or(SwapError::OutOfMemory)?;

        self.tables.write_entry(pid, va, PageTableEntry::resident(frame, perms));
        self.tables.invalidate(pid, va);
        self.track_new_resident(ResidentPage::new(pid, va));
        debug!("fault: {:?} {:?} zero-filled at {:?}", pid, va, frame);
        Ok(frame)
    }

    /// Tears down the mapping of `va`, whatever state it is in
    ///
    /// Returns the entry as it was before.
    pub fn unmap_page(&self, pid: ProcessId, va: VirtAddr) -> SwapResult<PageTableEntry> {
        let va = va.page_round_down();
        let process = self.process(pid)?;
        self.remove(pid, va);

        let old = self.tables.read_entry(pid, va);
        match old {
            PageTableEntry::Unmapped => return Ok(old),
            PageTableEntry::Resident { frame, .. } => {
                self.tables.write_entry(pid, va, PageTableEntry::Unmapped);
                self.tables.invalidate(pid, va);
                self.frames.free_frame(frame);
            }
            PageTableEntry::Swapped { slot, .. } => {
                let mut swapped = process.swapped.lock();
                match swapped.detach(va) {
                    Some(record) if record.slot() == slot => {}
                    other => {
                        // The slot may belong to another page; leave it and the entry alone.
                        if let Some(record) = other {
                            swapped.attach(record);
                        }
                        error!("unmap: {:?} {:?} swap record does not match entry", pid, va);
                        return Err(SwapError::CorruptSwapState);
                    }
                }
                drop(swapped);
                self.store.lock().release(pid, slot)?;
                self.tables.write_entry(pid, va, PageTableEntry::Unmapped);
                self.tables.invalidate(pid, va);
            }
        }
        debug!("unmap: {:?} {:?}", pid, va);
        Ok(old)
    }
}
