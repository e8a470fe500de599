//! NOS API - Shared kernel interfaces and types
//!
//! This crate provides the vocabulary shared between the NOS virtual-memory
//! layer and the demand-paging subsystem. It carries no policy of its own:
//! everything here is either a plain data type or a narrow collaborator
//! trait that the kernel implements and the paging code consumes.
//!
//! # Architecture
//!
//! - **Error**: Common error type and constructor helpers
//! - **Memory**: Address newtypes, page-table-entry variants and their
//!   hardware encoding, and the frame-allocator / page-table traits
//! - **Process**: Process identifiers
//!
//! # Usage
//!
//! ```rust
//! use nos_api::memory::{PageTableEntry, PhysAddr, PtePerms};
//!
//! let entry = PageTableEntry::resident(PhysAddr::new(0x8000_1000), PtePerms::user_rw());
//! assert!(entry.is_resident());
//! assert_eq!(PageTableEntry::decode(entry.encode()).unwrap(), entry);
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod memory;
pub mod process;

// Re-export commonly used types
pub use crate::error::{Error, Result};
pub use crate::memory::{
    FrameAllocator, PageTableEntry, PageTableOps, PhysAddr, PtePerms, VirtAddr, PAGE_SHIFT,
    PAGE_SIZE,
};
pub use crate::process::ProcessId;
