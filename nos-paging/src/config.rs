//! Paging subsystem configuration

use nos_api::error::{self, Result};

/// Default global resident budget (pages)
pub const DEFAULT_RESIDENT_BUDGET: usize = 32;
/// Default backing-store partition size per process (pages)
pub const DEFAULT_MAX_SWAP_PAGES: usize = 64;

/// How a backing-store partition hands out slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPolicy {
    /// Slots are handed out in increasing order and never reused
    Monotonic,
    /// Released slots go back to the partition, lowest slot first
    #[default]
    Reclaim,
}

/// Paging subsystem configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapConfig {
    /// Maximum number of tracked resident user pages across all processes
    pub resident_budget: usize,
    /// Number of page-sized slots in each process's partition
    pub max_swap_pages: usize,
    /// Slot reuse policy
    pub slot_policy: SlotPolicy,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            resident_budget: DEFAULT_RESIDENT_BUDGET,
            max_swap_pages: DEFAULT_MAX_SWAP_PAGES,
            slot_policy: SlotPolicy::default(),
        }
    }
}

impl SwapConfig {
    /// Sets the global resident budget
    pub const fn with_resident_budget(mut self, pages: usize) -> Self {
        self.resident_budget = pages;
        self
    }

    /// Sets the per-process partition size
    pub const fn with_max_swap_pages(mut self, pages: usize) -> Self {
        self.max_swap_pages = pages;
        self
    }

    /// Sets the slot reuse policy
    pub const fn with_slot_policy(mut self, policy: SlotPolicy) -> Self {
        self.slot_policy = policy;
        self
    }

    /// Checks the configuration
    pub fn validate(&self) -> Result<()> {
        if self.resident_budget == 0 {
            return Err(error::config_error("resident budget must be non-zero"));
        }
        if self.max_swap_pages == 0 {
            return Err(error::config_error("swap partition must hold at least one page"));
        }
        Ok(())
    }
}
