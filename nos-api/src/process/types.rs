//! Process management types

use core::fmt;

/// Process ID type
pub type Pid = u32;

/// Stable identity of a process
///
/// Never reused while the process is alive; state keyed by it is created at
/// process creation and erased at teardown.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ProcessId(pub Pid);

impl ProcessId {
    /// Creates a process identifier
    pub const fn new(pid: Pid) -> Self {
        Self(pid)
    }

    /// Returns the raw pid
    pub const fn as_raw(self) -> Pid {
        self.0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Pid> for ProcessId {
    fn from(pid: Pid) -> Self {
        Self(pid)
    }
}
