//! NOS Paging - Demand paging and page replacement
//!
//! This crate decides which resident user pages may be evicted, keeps the
//! bytes of evicted pages in a per-process backing store, and brings them
//! back when the owning process faults on them again.
//!
//! # Architecture
//!
//! - **Backing store** ([`store`]): per-process partitions of page-sized slots
//! - **Swap metadata** ([`swap_list`]): which virtual page sits in which slot
//! - **Residency tracker** ([`tracker`]): global, budget-bounded MRU list of
//!   resident user pages
//! - **Engine** ([`engine`]): swap-out, swap-in and capacity management
//! - **Faults** ([`fault`]): fault dispatch, demand-zero pages and unmapping
//! - **Stats & lifecycle** ([`stats`], [`lifecycle`]): per-process counters,
//!   diagnostics and process create/destroy hooks
//!
//! The kernel supplies physical memory and page tables through the
//! [`nos_api::FrameAllocator`] and [`nos_api::PageTableOps`] traits;
//! [`sim`] provides in-memory versions of both.
//!
//! # Usage
//!
//! ```rust
//! use nos_api::memory::{PtePerms, VirtAddr};
//! use nos_api::ProcessId;
//! use nos_paging::sim::SimulatedMachine;
//! use nos_paging::{FaultOutcome, SwapConfig};
//!
//! let machine = SimulatedMachine::new();
//! let paging = machine.manager(SwapConfig::default()).unwrap();
//! let pid = ProcessId::new(1);
//! paging.on_process_created(pid);
//!
//! let va = VirtAddr::new(0x1000);
//! let outcome = paging.handle_fault(pid, va, Some(PtePerms::user_rw())).unwrap();
//! assert!(matches!(outcome, FaultOutcome::ZeroFilled(_)));
//!
//! paging.remove(pid, va);
//! paging.swap_out(pid, va).unwrap();
//! paging.swap_in(pid, va).unwrap();
//! assert_eq!(paging.get_stats(pid).unwrap().swap_ins, 1);
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod fault;
pub mod lifecycle;
pub mod sim;
pub mod stats;
pub mod store;
pub mod swap_list;
pub mod sync;
pub mod tracker;

use alloc::sync::Arc;

use nos_api::memory::{FrameAllocator, PageTableOps};
use spin::Once;
use static_assertions::assert_impl_all;

pub use config::{SlotPolicy, SwapConfig};
pub use engine::SwapManager;
pub use error::{SwapError, SwapResult};
pub use fault::FaultOutcome;
pub use lifecycle::TeardownSummary;
pub use stats::{PageStats, DUMP_LIMIT};
pub use swap_list::SwapRecord;
pub use tracker::{ResidentPage, Touch};

assert_impl_all!(SwapManager: Send, Sync);

static GLOBAL_PAGING: Once<SwapManager> = Once::new();

/// Initializes the global paging subsystem
///
/// Only the first call installs a subsystem; later calls fail with
/// `InvalidState` and leave it untouched.
pub fn init_paging(
    config: SwapConfig,
    frames: Arc<dyn FrameAllocator>,
    tables: Arc<dyn PageTableOps>,
) -> nos_api::Result<&'static SwapManager> {
    if GLOBAL_PAGING.is_completed() {
        return Err(nos_api::error::invalid_state("paging already initialized"));
    }
    let manager = SwapManager::new(config, frames, tables)?;
    log::info!(
        "paging: initialized, budget {} pages, {} swap pages per process, {:?} slots",
        config.resident_budget,
        config.max_swap_pages,
        config.slot_policy
    );
    Ok(GLOBAL_PAGING.call_once(|| manager))
}

/// The global paging subsystem, if initialized
pub fn paging() -> Option<&'static SwapManager> {
    GLOBAL_PAGING.get()
}

/// Returns true once [`init_paging`] has succeeded
pub fn is_initialized() -> bool {
    GLOBAL_PAGING.is_completed()
}
