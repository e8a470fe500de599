//! Paging error definitions

use core::fmt;

/// Errors surfaced by the paging subsystem
///
/// Nothing here is retried internally; retry and termination policy belongs
/// to the fault handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// The process's backing-store partition has no free slot
    BackingStoreExhausted,
    /// No physical frame could be allocated, even after evicting
    OutOfMemory,
    /// Swap-out asked for a page that is not a resident user page
    NotSwappable,
    /// Swap-in asked for a page that is not swapped out
    NotSwapped,
    /// The page table says swapped but no swap record exists
    CorruptSwapState,
    /// The tracker is at budget but has nothing left to evict
    EvictionStalled,
    /// The process was never registered or is already torn down
    ProcessNotFound,
    /// A new page was inserted into a tracker that is already at budget
    BudgetExceeded,
}

impl SwapError {
    /// Returns true if the caller may retry or pick another victim
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::BackingStoreExhausted | Self::OutOfMemory | Self::BudgetExceeded)
    }

    /// Returns true if the faulting process should be considered lost
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::CorruptSwapState | Self::EvictionStalled)
    }
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::BackingStoreExhausted => "backing store partition exhausted",
            Self::OutOfMemory => "out of physical frames",
            Self::NotSwappable => "page is not a resident user page",
            Self::NotSwapped => "page is not swapped out",
            Self::CorruptSwapState => "page table and swap metadata disagree",
            Self::EvictionStalled => "eviction found no victim while over budget",
            Self::ProcessNotFound => "process not registered with the paging subsystem",
            Self::BudgetExceeded => "resident budget exceeded",
        };
        f.write_str(msg)
    }
}

impl From<SwapError> for nos_api::Error {
    fn from(err: SwapError) -> Self {
        use nos_api::error;
        match err {
            SwapError::OutOfMemory => error::out_of_memory(),
            SwapError::ProcessNotFound => error::not_found("process not registered for paging"),
            SwapError::NotSwappable | SwapError::NotSwapped => {
                error::invalid_argument("wrong paging operation for page state")
            }
            SwapError::BackingStoreExhausted | SwapError::BudgetExceeded => {
                error::busy("paging capacity exhausted")
            }
            SwapError::CorruptSwapState | SwapError::EvictionStalled => {
                error::memory_error("paging state inconsistent")
            }
        }
    }
}

/// Result type for paging operations
pub type SwapResult<T> = core::result::Result<T, SwapError>;
