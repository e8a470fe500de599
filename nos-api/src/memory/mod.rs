//! Memory management module

pub mod interface;
pub mod types;

// Re-export commonly used items
pub use interface::{FrameAllocator, PageTableOps};
pub use types::{
    page_round_down, page_round_up, pte_bits, PageTableEntry, PhysAddr, PtePerms, SwapSlot,
    VirtAddr, PAGE_SHIFT, PAGE_SIZE,
};
