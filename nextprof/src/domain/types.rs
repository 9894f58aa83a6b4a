//! Newtype wrappers for identifiers that cross the platform boundary.

use std::fmt;

/// Thread identifier assigned by the target's kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Process identifier reported in the attach-process debug event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Address in the target's 32-bit address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u32);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Exclusive handle to an attached debuggee process.
///
/// Not `Clone`: the session that holds it is the
/// only owner, and giving it back to [`crate::platform::Platform::close_process`]
/// consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ProcessHandle(u32);

impl ProcessHandle {
    /// Wrap a raw handle value produced by a platform implementation.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle:0x{:08X}", self.0)
    }
}
