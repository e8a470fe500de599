//! Error handling module for NOS operating system

use core::fmt;
#[cfg(feature = "alloc")]
use alloc::string::{String, ToString};

/// Owned error message when `alloc` is available, static text otherwise
#[cfg(feature = "alloc")]
pub type Message = String;
/// Owned error message when `alloc` is available, static text otherwise
#[cfg(not(feature = "alloc"))]
pub type Message = &'static str;

/// Common error type used throughout NOS operating system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    InvalidArgument(Message),
    /// Invalid state
    InvalidState(Message),
    /// Resource not found
    NotFound(Message),
    /// Resource busy
    Busy(Message),
    /// Out of memory
    OutOfMemory,
    /// Configuration error
    ConfigError(Message),
    /// Memory management error
    MemoryError(Message),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Busy(msg) => write!(f, "Resource busy: {}", msg),
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::MemoryError(msg) => write!(f, "Memory error: {}", msg),
        }
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(feature = "alloc")]
fn message(msg: &str) -> Message {
    msg.to_string()
}

#[cfg(not(feature = "alloc"))]
fn message(msg: &'static str) -> Message {
    msg
}

/// Creates a new invalid argument error
pub fn invalid_argument(msg: &'static str) -> Error {
    Error::InvalidArgument(message(msg))
}

/// Creates a new invalid state error
pub fn invalid_state(msg: &'static str) -> Error {
    Error::InvalidState(message(msg))
}

/// Creates a new not found error
pub fn not_found(msg: &'static str) -> Error {
    Error::NotFound(message(msg))
}

/// Creates a new busy error
pub fn busy(msg: &'static str) -> Error {
    Error::Busy(message(msg))
}

/// Creates a new out of memory error
pub fn out_of_memory() -> Error {
    Error::OutOfMemory
}

/// Creates a new config error
pub fn config_error(msg: &'static str) -> Error {
    Error::ConfigError(message(msg))
}

/// Creates a new memory management error
pub fn memory_error(msg: &'static str) -> Error {
    Error::MemoryError(message(msg))
}
