//! Profiling core
//!
//! - [`event_channel`]: indexed multi-wait over the active wait sources
//! - [`profiler`]: attach state machine and main loop
//! - [`threads`]: fixed-capacity table of sampled threads
//! - [`counter`]: performance counter arming
//! - [`sampler`]: per-tick register and stack capture

pub mod counter;
pub mod event_channel;
pub mod profiler;
pub mod sampler;
pub mod stats;
pub mod threads;

// Re-export common types
pub use counter::CounterController;
pub use event_channel::EventChannel;
pub use profiler::{Profiler, State};
pub use sampler::{stack_slice_len, Sampler, STACK_SCRATCH_SIZE};
pub use stats::SessionStats;
pub use threads::{AttachedThread, ThreadTable};
