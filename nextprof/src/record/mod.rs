//! # Record Stream Output
//!
//! Everything between the sampler and the bytes on disk or on the wire.
//!
//! - [`buffer`]: fixed-size arena with a write cursor
//! - [`outputs`]: file and socket destinations with independent failure
//! - [`writer`]: background writer thread and its buffer handoff
//! - [`sink`]: the producer-facing [`RecordSink`]
//!
//! The wire format itself lives in `nextprof-common`.

pub mod buffer;
pub mod outputs;
pub mod sink;
pub mod writer;

pub use buffer::RecordBuffer;
pub use outputs::{Output, Outputs};
pub use sink::RecordSink;
pub use writer::RecordWriter;
