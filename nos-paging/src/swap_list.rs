//! Per-process swap metadata
//!
//! One record per swapped-out page: which virtual page it was and where its
//! bytes sit in the owning process's partition. The list is an unordered
//! set; detaching swaps the last record into the hole.

extern crate alloc;

use alloc::vec::Vec;

use nos_api::memory::{SwapSlot, VirtAddr};

/// Where one evicted page lives in the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRecord {
    /// Page-aligned virtual address
    pub va: VirtAddr,
    /// Byte offset into the owning process's partition
    pub offset: usize,
}

impl SwapRecord {
    /// Record for `va` stored at `slot`
    pub const fn new(va: VirtAddr, slot: SwapSlot) -> Self {
        Self {
            va,
            offset: slot.byte_offset(),
        }
    }

    /// Slot index of this record
    pub const fn slot(&self) -> SwapSlot {
        SwapSlot::from_byte_offset(self.offset)
    }
}

/// Swap records owned by one process
#[derive(Debug, Default)]
pub struct SwapList {
    records: Vec<SwapRecord>,
}

impl SwapList {
    /// Creates an empty list
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Adds a record
    pub fn attach(&mut self, record: SwapRecord) {
        self.records.push(record);
    }

    /// Removes and returns the record for `va`
    pub fn detach(&mut self, va: VirtAddr) -> Option<SwapRecord> {
        let pos = self.records.iter().position(|r| r.va == va)?;
        Some(self.records.swap_remove(pos))
    }

    /// Looks up the record for `va`
    pub fn find(&self, va: VirtAddr) -> Option<&SwapRecord> {
        self.records.iter().find(|r| r.va == va)
    }

    /// Number of swapped-out pages
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is swapped out
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in attachment order, as long as nothing was detached since
    pub fn iter(&self) -> impl Iterator<Item = &SwapRecord> {
        self.records.iter()
    }

    /// Drops every record, returning them
    pub fn drain(&mut self) -> Vec<SwapRecord> {
        core::mem::take(&mut self.records)
    }
}
