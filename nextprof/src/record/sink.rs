//! # Record Sink
//!
//! Producer-side view of the record stream. The sampler reserves room with
//! [`RecordSink::ensure_space`], then encodes fields with the `append_*`
//! calls, which never check bounds themselves.
//!
//! ## Modes
//!
//! - **Inline**: [`RecordSink::flush`] writes the whole buffer to the outputs
//!   and rewinds it before returning.
//! - **Threaded**: the buffer is split in two halves. A flush swaps the
//!   producer onto the free half and hands the full one to the writer thread.
//!   The swap waits for the previous flush to finish, which is the only point
//!   where slow I/O can hold up sampling.

use std::mem;

use log::{debug, error};

use super::buffer::RecordBuffer;
use super::outputs::Outputs;
use super::writer::RecordWriter;
use crate::config::Config;
use crate::domain::SinkError;

enum Mode {
    Inline(Outputs),
    Threaded(RecordWriter),
    Closed,
}

pub struct RecordSink {
    active: RecordBuffer,
    mode: Mode,
}

macro_rules! forward_append {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self, value: $ty) {
                self.active.$name(value);
            }
        )*
    };
}

impl RecordSink {
    /// Sink flushing inline, with one buffer of `capacity` bytes.
    #[must_use]
    pub fn inline(outputs: Outputs, capacity: usize) -> Self {
        Self {
            active: RecordBuffer::new(capacity),
            mode: Mode::Inline(outputs),
        }
    }

    /// Sink flushing from a writer thread, with two halves of `capacity / 2`.
    ///
    /// # Errors
    /// Returns an error if the writer thread cannot be started
    pub fn threaded(outputs: Outputs, capacity: usize) -> Result<Self, SinkError> {
        let half = capacity / 2;
        let writer = RecordWriter::spawn(outputs, RecordBuffer::new(half))?;
        Ok(Self {
            active: RecordBuffer::new(half),
            mode: Mode::Threaded(writer),
        })
    }

    /// Open the configured outputs for a new run.
    ///
    /// # Errors
    /// Returns an error if the writer thread cannot be started
    pub fn open(config: &Config) -> Result<Self, SinkError> {
        let outputs = Outputs::open(&config.record, &config.network);
        if config.record.threaded {
            Self::threaded(outputs, config.record.buffer_size)
        } else {
            Ok(Self::inline(outputs, config.record.buffer_size))
        }
    }

    /// Bytes available between two flushes.
    #[must_use]
    pub fn region_capacity(&self) -> usize {
        self.active.capacity()
    }

    /// Bytes waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.mode, Mode::Closed)
    }

    /// Make sure `size` more bytes fit before the next flush, flushing first
    /// if they don't.
    ///
    /// # Errors
    /// [`SinkError::RecordTooLarge`] if `size` exceeds the whole flush region,
    /// or the flush error
    pub fn ensure_space(&mut self, size: usize) -> Result<(), SinkError> {
        let capacity = self.active.capacity();
        if size > capacity {
            return Err(SinkError::RecordTooLarge { size, capacity });
        }
        if self.active.remaining() < size {
            self.flush()?;
        }
        Ok(())
    }

    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.active.append_bytes(bytes);
    }

    forward_append!(
        append_u8: u8,
        append_u16: u16,
        append_u32: u32,
        append_u64: u64,
        append_i8: i8,
        append_i16: i16,
        append_i32: i32,
        append_i64: i64,
        append_f32: f32,
        append_f64: f64,
    );

    /// Hand everything written so far to the outputs. Does nothing when the
    /// buffer is empty.
    ///
    /// # Errors
    /// [`SinkError::WriterGone`] if the writer thread has exited
    pub fn flush(&mut self) -> Result<(), SinkError> {
        if self.active.is_empty() {
            return Ok(());
        }
        match self.mode {
            Mode::Inline(ref mut outputs) => {
                outputs.write(self.active.filled());
                debug!("Flushed {} bytes of recorded data", self.active.len());
                self.active.reset();
            }
            Mode::Threaded(ref writer) => {
                let free = writer.take_free()?;
                let full = mem::replace(&mut self.active, free);
                writer.submit(full)?;
            }
            Mode::Closed => self.active.reset(),
        }
        Ok(())
    }

    /// Flush, wait for the writer and close every output.
    ///
    /// # Errors
    /// [`SinkError::WriterGone`] if the writer thread exited early
    pub fn close(&mut self) -> Result<(), SinkError> {
        self.flush()?;
        match mem::replace(&mut self.mode, Mode::Closed) {
            Mode::Threaded(writer) => drop(writer.shutdown()?),
            Mode::Inline(outputs) => drop(outputs),
            Mode::Closed => {}
        }
        Ok(())
    }
}

impl Drop for RecordSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close record sink: {e}");
        }
    }
}
