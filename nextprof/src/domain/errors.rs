//! Structured error types for nextprof
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! [`ProfilerError`] is the fatal class: anything that reaches `main` as one of
//! these ends the process. Recoverable failures are logged where they happen
//! and never become errors.

use thiserror::Error;

/// Failure reported by a platform primitive.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    #[error("wait timed out")]
    Timeout,

    #[error("result code 0x{0:08X}")]
    Failed(u32),

    #[error("wait returned unknown source index {0}")]
    UnknownSource(usize),
}

#[derive(Error, Debug)]
pub enum ProfilerError {
    /// A platform call whose failure leaves the debug session unrecoverable.
    #[error("{operation} failed: {source}")]
    Platform {
        operation: &'static str,
        source: PlatformError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("record sink failed: {0}")]
    Sink(#[from] SinkError),
}

/// Attach an operation name to a platform failure, promoting it to fatal.
pub trait PlatformResultExt<T> {
    /// # Errors
    /// Returns [`ProfilerError::Platform`] if the platform call failed
    fn fatal(self, operation: &'static str) -> Result<T, ProfilerError>;
}

impl<T> PlatformResultExt<T> for Result<T, PlatformError> {
    fn fatal(self, operation: &'static str) -> Result<T, ProfilerError> {
        self.map_err(|source| ProfilerError::Platform { operation, source })
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("record of {size} bytes does not fit in a {capacity}-byte flush region")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("record writer thread exited unexpectedly")]
    WriterGone,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
