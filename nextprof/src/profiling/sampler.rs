//! # Sampler
//!
//! Runs while the debuggee is stopped at a debugger break. For every
//! attached thread it reads the registers, copies the top of the stack into
//! a scratch buffer and encodes one sample record into the sink.
//!
//! The scratch buffer is allocated once; sampling itself does not allocate.

use log::{trace, warn};
use nextprof_common::{SampleRecord, SAMPLE_HEADER};

use super::stats::SessionStats;
use super::threads::ThreadTable;
use crate::domain::{Address, PlatformResultExt, ProcessHandle, ProfilerError, SinkError};
use crate::platform::Platform;
use crate::record::RecordSink;

/// Size of the stack scratch buffer, the hard cap on any stack slice.
pub const STACK_SCRATCH_SIZE: usize = 0x10000;

/// Number of stack bytes to capture for a thread.
///
/// The distance from `sp` up to `stack_top`, capped by the scratch size and
/// the configured limit, rounded down to whole words. A stack pointer above
/// the recorded top yields zero.
#[must_use]
pub fn stack_slice_len(stack_top: u32, sp: u32, scratch: usize, limit: usize) -> usize {
    let available = stack_top.saturating_sub(sp) as usize;
    available.min(scratch).min(limit) & !3
}

/// Append one sample record. Space must have been reserved.
pub fn encode_sample(sink: &mut RecordSink, record: &SampleRecord<'_>) {
    sink.append_u32(SAMPLE_HEADER);
    sink.append_u32(record.thread_id);
    sink.append_u32(record.pc);
    sink.append_u32(record.lr);
    sink.append_u32(record.stack_size());
    sink.append_bytes(record.stack);
}

pub struct Sampler {
    scratch: Box<[u8]>,
    stack_limit: usize,
}

impl Sampler {
    #[must_use]
    pub fn new(stack_limit: usize) -> Self {
        Self {
            scratch: vec![0; STACK_SCRATCH_SIZE].into_boxed_slice(),
            stack_limit,
        }
    }

    #[must_use]
    pub fn stack_limit(&self) -> usize {
        self.stack_limit
    }

    /// Record every attached thread of the stopped process.
    ///
    /// A failed stack read still emits the record, with an empty stack.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] if a thread's registers cannot be read,
    /// [`ProfilerError::Sink`] if the background writer has died
    pub fn sample_threads<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        process: &ProcessHandle,
        threads: &ThreadTable,
        sink: &mut RecordSink,
        stats: &mut SessionStats,
    ) -> Result<(), ProfilerError> {
        for thread in threads.iter() {
            let context = platform
                .thread_context(process, thread.id)
                .fatal("Getting debug thread context")?;
            trace!(
                "{} - pc: {}, lr: {}, sp: {}",
                thread.id,
                Address(context.pc),
                Address(context.lr),
                Address(context.sp)
            );

            let mut size = stack_slice_len(
                thread.stack_top.0,
                context.sp,
                self.scratch.len(),
                self.stack_limit,
            );
            if size > 0 {
                if let Err(e) =
                    platform.read_memory(process, Address(context.sp), &mut self.scratch[..size])
                {
                    warn!("Reading stack of {} failed: {e}", thread.id);
                    stats.stack_read_failures += 1;
                    size = 0;
                }
            }

            let record = SampleRecord {
                thread_id: thread.id.0,
                pc: context.pc,
                lr: context.lr,
                stack: &self.scratch[..size],
            };
            match sink.ensure_space(record.encoded_len()) {
                Ok(()) => {}
                Err(e @ SinkError::RecordTooLarge { .. }) => {
                    warn!("Dropping sample of {}: {e}", thread.id);
                    stats.dropped_records += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            encode_sample(sink, &record);
            stats.records_written += 1;
            stats.stack_bytes += size as u64;
        }
        Ok(())
    }
}
