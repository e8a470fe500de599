//! Memory management interface
//!
//! Narrow contracts the paging subsystem consumes from the rest of the
//! kernel. Implementations synchronize internally, so every method takes
//! `&self` and the traits require `Send + Sync`.

use super::types::{PageTableEntry, PhysAddr, VirtAddr};
use crate::process::ProcessId;

/// Trait for the physical frame allocator
pub trait FrameAllocator: Send + Sync {
    /// Allocates one zeroed, page-sized frame
    ///
    /// Returns `None` when physical memory is exhausted.
    fn alloc_frame(&self) -> Option<PhysAddr>;

    /// Returns a frame to the allocator
    fn free_frame(&self, frame: PhysAddr);

    /// Copies the full contents of `frame` into `dst`
    ///
    /// `dst` is exactly one page long.
    fn copy_from_frame(&self, frame: PhysAddr, dst: &mut [u8]);

    /// Overwrites the full contents of `frame` with `src`
    ///
    /// `src` is exactly one page long.
    fn copy_to_frame(&self, frame: PhysAddr, src: &[u8]);
}

/// Trait for the page-table layer
///
/// Callers hold whatever page-table lock the kernel requires; the lock must
/// allow rewriting another process's entry, since eviction can pick a
/// victim outside the faulting address space.
pub trait PageTableOps: Send + Sync {
    /// Reads the entry for the page containing `va`
    fn read_entry(&self, pid: ProcessId, va: VirtAddr) -> PageTableEntry;

    /// Replaces the entry for the page containing `va`
    fn write_entry(&self, pid: ProcessId, va: VirtAddr, entry: PageTableEntry);

    /// Drops any cached translation for `va`
    fn invalidate(&self, pid: ProcessId, va: VirtAddr);
}
