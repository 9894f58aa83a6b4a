//! Domain model for nextprof
//!
//! Core identifier types and the structured errors shared by the profiling
//! and recording layers.

pub mod errors;
pub mod types;

pub use types::{Address, ProcessHandle, ProcessId, ThreadId};

pub use errors::{ConfigError, PlatformError, PlatformResultExt, ProfilerError, SinkError};
