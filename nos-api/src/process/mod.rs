//! Process management module

pub mod types;

// Re-export commonly used items
pub use types::*;
