//! Backing store
//!
//! A volatile, memory-resident area holding the bytes of evicted pages. Each
//! live process owns one fixed-capacity partition, created when the process
//! registers and dropped at teardown. All access goes through the engine's
//! store lock; nothing here synchronizes on its own.

extern crate alloc;

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;
use core::cmp::Reverse;

use hashbrown::HashMap;
use nos_api::memory::{SwapSlot, PAGE_SIZE};
use nos_api::ProcessId;

use crate::config::SlotPolicy;
use crate::error::{SwapError, SwapResult};

/// Occupancy of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionUsage {
    /// Slots currently holding a swapped page
    pub in_use: usize,
    /// Slots ever handed out (the next fresh slot index)
    pub high_water: usize,
    /// Total slots in the partition
    pub capacity: usize,
}

/// One process's region of the backing store
struct Partition {
    /// Page bytes, grown on demand up to `capacity` pages
    bytes: Vec<u8>,
    next_slot: usize,
    free: BinaryHeap<Reverse<usize>>,
    in_use: usize,
    capacity: usize,
    policy: SlotPolicy,
}

impl Partition {
    fn new(capacity: usize, policy: SlotPolicy) -> Self {
        Self {
            bytes: Vec::new(),
            next_slot: 0,
            free: BinaryHeap::new(),
            in_use: 0,
            capacity,
            policy,
        }
    }

    fn reserve(&mut self) -> SwapResult<SwapSlot> {
        let slot = match self.free.pop() {
            Some(Reverse(slot)) => slot,
            None if self.next_slot < self.capacity => {
                self.next_slot += 1;
                self.next_slot - 1
            }
            None => return Err(SwapError::BackingStoreExhausted),
        };
        self.in_use += 1;
        Ok(SwapSlot(slot))
    }

    fn release(&mut self, slot: SwapSlot) {
        self.in_use = self.in_use.saturating_sub(1);
        if self.policy == SlotPolicy::Reclaim {
            self.free.push(Reverse(slot.0));
        }
    }

    fn range(&self, slot: SwapSlot) -> SwapResult<core::ops::Range<usize>> {
        if slot.0 >= self.next_slot {
            return Err(SwapError::CorruptSwapState);
        }
        let start = slot.byte_offset();
        Ok(start..start + PAGE_SIZE)
    }

    fn slot_mut(&mut self, slot: SwapSlot) -> SwapResult<&mut [u8]> {
        let range = self.range(slot)?;
        if self.bytes.len() < range.end {
            self.bytes.resize(range.end, 0);
        }
        Ok(&mut self.bytes[range])
    }

    fn slot(&self, slot: SwapSlot) -> SwapResult<&[u8]> {
        let range = self.range(slot)?;
        self.bytes.get(range).ok_or(SwapError::CorruptSwapState)
    }
}

/// Per-process partitioned page store
pub struct BackingStore {
    partitions: HashMap<ProcessId, Partition>,
    capacity: usize,
    policy: SlotPolicy,
}

impl BackingStore {
    /// Creates an empty store whose partitions hold `capacity` pages each
    pub fn new(capacity: usize, policy: SlotPolicy) -> Self {
        Self {
            partitions: HashMap::new(),
            capacity,
            policy,
        }
    }

    /// Creates the partition for a new process, replacing any leftover one
    pub fn create_partition(&mut self, pid: ProcessId) {
        self.partitions.insert(pid, Partition::new(self.capacity, self.policy));
    }

    /// Drops a process's partition and everything in it
    pub fn destroy_partition(&mut self, pid: ProcessId) -> bool {
        self.partitions.remove(&pid).is_some()
    }

    /// Returns true if the process has a partition
    pub fn has_partition(&self, pid: ProcessId) -> bool {
        self.partitions.contains_key(&pid)
    }

    fn partition_mut(&mut self, pid: ProcessId) -> SwapResult<&mut Partition> {
        self.partitions.get_mut(&pid).ok_or(SwapError::ProcessNotFound)
    }

    /// Claims a free slot in the process's partition
    pub fn reserve(&mut self, pid: ProcessId) -> SwapResult<SwapSlot> {
        self.partition_mut(pid)?.reserve()
    }

    /// Gives a slot back
    ///
    /// Under [`SlotPolicy::Monotonic`] the slot is only uncounted, never
    /// handed out again.
    pub fn release(&mut self, pid: ProcessId, slot: SwapSlot) -> SwapResult<()> {
        self.partition_mut(pid)?.release(slot);
        Ok(())
    }

    /// Mutable view of one reserved slot, exactly one page long
    pub fn slot_mut(&mut self, pid: ProcessId, slot: SwapSlot) -> SwapResult<&mut [u8]> {
        self.partition_mut(pid)?.slot_mut(slot)
    }

    /// Copies one page into a reserved slot
    ///
    /// `src` must hold at least a page; only the first page is stored.
    pub fn write(&mut self, pid: ProcessId, slot: SwapSlot, src: &[u8]) -> SwapResult<()> {
        let page = src.get(..PAGE_SIZE).ok_or(SwapError::CorruptSwapState)?;
        self.slot_mut(pid, slot)?.copy_from_slice(page);
        Ok(())
    }

    /// Read-only view of one slot
    pub fn slot(&self, pid: ProcessId, slot: SwapSlot) -> SwapResult<&[u8]> {
        self.partitions
            .get(&pid)
            .ok_or(SwapError::ProcessNotFound)?
            .slot(slot)
    }

    /// Copies one page out of a slot
    pub fn read(&self, pid: ProcessId, slot: SwapSlot, dst: &mut [u8]) -> SwapResult<()> {
        let bytes = self.slot(pid, slot)?;
        dst.get_mut(..PAGE_SIZE)
            .ok_or(SwapError::CorruptSwapState)?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Occupancy of a process's partition
    pub fn usage(&self, pid: ProcessId) -> Option<PartitionUsage> {
        self.partitions.get(&pid).map(|p| PartitionUsage {
            in_use: p.in_use,
            high_water: p.next_slot,
            capacity: p.capacity,
        })
    }
}
