//! # Platform Services
//!
//! The profiler drives the target through a small set of black-box platform
//! primitives: multi-wait, notifications, the debug API, and the performance
//! counter. [`Platform`] is the seam for all of them; every call reports
//! success or a [`PlatformError`] and nothing more.
//!
//! ## Implementations
//!
//! - [`sim::SimPlatform`] - Deterministic in-process device model used by the
//!   tests and by the binary's synthetic run
//!
//! A device backend implements the same trait on top of the real kernel calls.

pub mod sim;

use std::fmt;
use std::time::Duration;

use crate::domain::{Address, PlatformError, ProcessHandle, ProcessId, ThreadId};

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Notification posted when termination of the profiler is requested.
pub const NOTIFICATION_TERMINATE: u32 = 0x100;

/// Notification posted when an application launch was intercepted for debugging.
pub const NOTIFICATION_DEBUG_NEXT_APPLICATION: u32 = 0x1000;

// ============================================================================
// Wait Sources
// ============================================================================

/// Something the main loop can block on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitSource {
    /// Service notifications (termination, next application).
    Notification,
    /// The performance counter's overflow event.
    CounterOverflow,
    /// Debug events of the attached process, keyed by raw handle.
    Debuggee(u32),
}

impl fmt::Display for WaitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notification => f.write_str("notification"),
            Self::CounterOverflow => f.write_str("counter overflow"),
            Self::Debuggee(raw) => write!(f, "debuggee 0x{raw:08X}"),
        }
    }
}

// ============================================================================
// Debug Events
// ============================================================================

/// Register subset the sampler needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadContext {
    pub pc: u32,
    pub lr: u32,
    pub sp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExitReason {
    Exit,
    Terminate,
    DebugTerminate,
    Unknown(u32),
}

impl fmt::Display for ProcessExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit => f.write_str("exit"),
            Self::Terminate => f.write_str("terminate"),
            Self::DebugTerminate => f.write_str("debug terminate"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadExitReason {
    Exit,
    Terminate,
    ProcessExit,
    ProcessTerminate,
    Unknown(u32),
}

impl fmt::Display for ThreadExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit => f.write_str("exit"),
            Self::Terminate => f.write_str("terminate"),
            Self::ProcessExit => f.write_str("process exit"),
            Self::ProcessTerminate => f.write_str("process terminate"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// First break after the debugger attached.
    AttachBreak,
    /// Break requested through [`Platform::break_process`].
    DebuggerBreak,
    Other(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEventKind {
    AttachProcess {
        process_id: ProcessId,
        program_id: u64,
        name: [u8; 8],
    },
    AttachThread { creator: ThreadId, tls: Address },
    ExitThread(ThreadExitReason),
    ExitProcess(ProcessExitReason),
    Exception(ExceptionKind),
    OutputString { address: Address, size: u32 },
    /// Event types the profiler does not act on (syscalls, mappings, scheduling).
    Other(u32),
}

/// One event read from the debuggee's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEvent {
    pub thread_id: ThreadId,
    /// The debuggee stays suspended until [`Platform::continue_debug_event`].
    pub needs_continue: bool,
    pub kind: DebugEventKind,
}

/// Which event classes the debuggee keeps reporting after a continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContinueFlags {
    pub schedule_events: bool,
    pub syscall_events: bool,
    pub map_events: bool,
}

impl ContinueFlags {
    pub const ALL_SIGNALS: Self = Self {
        schedule_events: true,
        syscall_events: true,
        map_events: true,
    };
}

// ============================================================================
// Performance Counter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    CoreCycleCount,
}

/// Raw performance-counter control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOp {
    /// Take exclusive control of the counter hardware.
    Enable,
    Disable,
    SetVirtualCounter(bool),
    /// Stop and zero the counter, clearing any overflow flag.
    Reset,
    /// Load the counter; overflow fires when it wraps past zero.
    SetValue(u64),
    SetEvent(CounterEvent),
}

// ============================================================================
// Platform Trait
// ============================================================================

pub trait Platform {
    /// Block until one of `sources` is signaled and return its index.
    ///
    /// `None` waits forever. Signals on sources not in the list stay pending.
    ///
    /// # Errors
    /// [`PlatformError::Timeout`] when the timeout elapses, otherwise the
    /// platform's failure code
    fn wait_any(&mut self, sources: &[WaitSource], timeout: Option<Duration>)
        -> PlatformResult<usize>;

    /// # Errors
    /// Platform failure code
    fn subscribe_notification(&mut self, id: u32) -> PlatformResult<()>;

    /// # Errors
    /// Platform failure code
    fn unsubscribe_notification(&mut self, id: u32) -> PlatformResult<()>;

    /// Read the notification that signaled [`WaitSource::Notification`].
    ///
    /// # Errors
    /// Platform failure code
    fn receive_notification(&mut self) -> PlatformResult<u32>;

    /// Ask the process manager to intercept the next application launch.
    ///
    /// # Errors
    /// Platform failure code
    fn debug_next_application(&mut self, enable: bool) -> PlatformResult<()>;

    /// Start the intercepted application under the debugger.
    ///
    /// # Errors
    /// Platform failure code
    fn run_queued_process(&mut self) -> PlatformResult<ProcessHandle>;

    fn close_process(&mut self, process: ProcessHandle);

    /// # Errors
    /// Platform failure code
    fn next_debug_event(&mut self, process: &ProcessHandle) -> PlatformResult<DebugEvent>;

    /// # Errors
    /// Platform failure code
    fn thread_context(
        &mut self,
        process: &ProcessHandle,
        thread: ThreadId,
    ) -> PlatformResult<ThreadContext>;

    /// Fill `buf` from the target's memory at `address`.
    ///
    /// # Errors
    /// Platform failure code
    fn read_memory(
        &mut self,
        process: &ProcessHandle,
        address: Address,
        buf: &mut [u8],
    ) -> PlatformResult<()>;

    /// # Errors
    /// Platform failure code
    fn continue_debug_event(
        &mut self,
        process: &ProcessHandle,
        flags: ContinueFlags,
    ) -> PlatformResult<()>;

    /// Request a debugger-break exception in the target.
    ///
    /// # Errors
    /// Platform failure code
    fn break_process(&mut self, process: &ProcessHandle) -> PlatformResult<()>;

    /// # Errors
    /// Platform failure code
    fn control_counter(&mut self, op: CounterOp) -> PlatformResult<()>;

    /// # Errors
    /// Platform failure code
    fn bind_overflow_interrupt(&mut self) -> PlatformResult<()>;

    /// # Errors
    /// Platform failure code
    fn unbind_overflow_interrupt(&mut self) -> PlatformResult<()>;

    /// # Errors
    /// Platform failure code
    fn clear_overflow_event(&mut self) -> PlatformResult<()>;
}
