//! Host-side simulation backend
//!
//! In-memory implementations of the frame allocator and page-table traits,
//! used to drive the subsystem outside a kernel (tests, benches, tooling).
//! Page-table entries are kept as encoded hardware words so the encoding is
//! exercised on every transition.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use hashbrown::HashMap;
use log::warn;
use nos_api::memory::{FrameAllocator, PageTableEntry, PageTableOps, PhysAddr, PtePerms, VirtAddr};
use nos_api::{ProcessId, PAGE_SIZE};
use spin::Mutex;

use crate::config::SwapConfig;
use crate::engine::SwapManager;

/// First frame number handed out by [`SimulatedFrames`]
pub const SIM_FIRST_PFN: usize = 0x80000;

struct FrameState {
    frames: HashMap<usize, Vec<u8>>,
    free: Vec<usize>,
    next_pfn: usize,
    limit: Option<usize>,
}

/// Physical memory made of heap pages
pub struct SimulatedFrames {
    state: Mutex<FrameState>,
}

impl SimulatedFrames {
    /// Unbounded physical memory
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Physical memory that refuses allocation once `limit` frames are live
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            state: Mutex::new(FrameState {
                frames: HashMap::new(),
                free: Vec::new(),
                next_pfn: SIM_FIRST_PFN,
                limit,
            }),
        }
    }

    /// Changes the live-frame limit; existing frames are kept
    pub fn set_limit(&self, limit: Option<usize>) {
        self.state.lock().limit = limit;
    }

    /// Number of live frames
    pub fn allocated(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Copy of a live frame's contents
    pub fn contents(&self, frame: PhysAddr) -> Option<Vec<u8>> {
        self.state.lock().frames.get(&frame.frame_number()).cloned()
    }

    /// Sets one byte of a live frame; returns false if the frame is not live
    pub fn write_byte(&self, frame: PhysAddr, offset: usize, value: u8) -> bool {
        let mut state = self.state.lock();
        match state
            .frames
            .get_mut(&frame.frame_number())
            .and_then(|page| page.get_mut(offset))
        {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }

    fn alloc_unbounded(&self) -> PhysAddr {
        let mut state = self.state.lock();
        let pfn = match state.free.pop() {
            Some(pfn) => pfn,
            None => {
                state.next_pfn += 1;
                state.next_pfn - 1
            }
        };
        state.frames.insert(pfn, vec![0; PAGE_SIZE]);
        PhysAddr::from_frame_number(pfn)
    }
}

impl Default for SimulatedFrames {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAllocator for SimulatedFrames {
    fn alloc_frame(&self) -> Option<PhysAddr> {
        {
            let state = self.state.lock();
            if state.limit.is_some_and(|limit| state.frames.len() >= limit) {
                return None;
            }
        }
        Some(self.alloc_unbounded())
    }

    fn free_frame(&self, frame: PhysAddr) {
        let mut state = self.state.lock();
        let pfn = frame.frame_number();
        if state.frames.remove(&pfn).is_some() {
            state.free.push(pfn);
        } else {
            warn!("sim: free of unallocated frame {:?}", frame);
        }
    }

    fn copy_from_frame(&self, frame: PhysAddr, dst: &mut [u8]) {
        let state = self.state.lock();
        match state.frames.get(&frame.frame_number()) {
            Some(page) => dst.copy_from_slice(&page[..dst.len()]),
            None => {
                warn!("sim: read of unallocated frame {:?}", frame);
                dst.fill(0);
            }
        }
    }

    fn copy_to_frame(&self, frame: PhysAddr, src: &[u8]) {
        let mut state = self.state.lock();
        match state.frames.get_mut(&frame.frame_number()) {
            Some(page) => page[..src.len()].copy_from_slice(src),
            None => warn!("sim: write to unallocated frame {:?}", frame),
        }
    }
}

/// Page tables for any number of address spaces
#[derive(Default)]
pub struct SimulatedPageTables {
    words: Mutex<HashMap<(ProcessId, usize), u64>>,
    invalidated: Mutex<Vec<(ProcessId, VirtAddr)>>,
}

impl SimulatedPageTables {
    /// Empty page tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw hardware word for `va`
    pub fn raw_entry(&self, pid: ProcessId, va: VirtAddr) -> u64 {
        let key = (pid, va.page_round_down().as_usize());
        self.words.lock().get(&key).copied().unwrap_or(0)
    }

    /// Number of translation invalidations issued so far
    pub fn invalidations(&self) -> usize {
        self.invalidated.lock().len()
    }

    /// Drains the pages invalidated so far, oldest first
    pub fn take_invalidated(&self) -> Vec<(ProcessId, VirtAddr)> {
        core::mem::take(&mut *self.invalidated.lock())
    }
}

impl PageTableOps for SimulatedPageTables {
    fn read_entry(&self, pid: ProcessId, va: VirtAddr) -> PageTableEntry {
        let word = self.raw_entry(pid, va);
        PageTableEntry::decode(word).unwrap_or_else(|err| {
            warn!("sim: bad entry {:#x} for {:?} {:?}: {}", word, pid, va, err);
            PageTableEntry::Unmapped
        })
    }

    fn write_entry(&self, pid: ProcessId, va: VirtAddr, entry: PageTableEntry) {
        let key = (pid, va.page_round_down().as_usize());
        let mut words = self.words.lock();
        match entry {
            PageTableEntry::Unmapped => {
                words.remove(&key);
            }
            _ => {
                words.insert(key, entry.encode());
            }
        }
    }

    fn invalidate(&self, pid: ProcessId, va: VirtAddr) {
        self.invalidated.lock().push((pid, va));
    }
}

/// A simulated frame allocator and page tables wired together
#[derive(Clone)]
pub struct SimulatedMachine {
    /// Physical memory
    pub frames: Arc<SimulatedFrames>,
    /// Page tables
    pub tables: Arc<SimulatedPageTables>,
}

impl SimulatedMachine {
    /// Unbounded memory, empty page tables
    pub fn new() -> Self {
        Self {
            frames: Arc::new(SimulatedFrames::new()),
            tables: Arc::new(SimulatedPageTables::new()),
        }
    }

    /// Paging subsystem running on this machine
    pub fn manager(&self, config: SwapConfig) -> nos_api::Result<SwapManager> {
        SwapManager::new(config, self.frames.clone(), self.tables.clone())
    }

    /// Maps `va` to a new frame filled with `fill`, ignoring the frame limit
    ///
    /// The page is not registered with any residency tracker.
    pub fn map_page(&self, pid: ProcessId, va: VirtAddr, perms: PtePerms, fill: u8) -> PhysAddr {
        let frame = self.frames.alloc_unbounded();
        self.frames.copy_to_frame(frame, &[fill; PAGE_SIZE]);
        self.tables.write_entry(pid, va, PageTableEntry::resident(frame, perms));
        frame
    }

    /// Current entry for `va`
    pub fn entry(&self, pid: ProcessId, va: VirtAddr) -> PageTableEntry {
        self.tables.read_entry(pid, va)
    }

    /// Contents of `va` if it is resident
    pub fn read_page(&self, pid: ProcessId, va: VirtAddr) -> Option<Vec<u8>> {
        match self.entry(pid, va) {
            PageTableEntry::Resident { frame, .. } => self.frames.contents(frame),
            _ => None,
        }
    }

    /// Stores one byte into a resident page; returns false if not resident
    pub fn write_byte(&self, pid: ProcessId, va: VirtAddr, offset: usize, value: u8) -> bool {
        match self.entry(pid, va) {
            PageTableEntry::Resident { frame, .. } => self.frames.write_byte(frame, offset, value),
            _ => false,
        }
    }
}

impl Default for SimulatedMachine {
    fn default() -> Self {
        Self::new()
    }
}
