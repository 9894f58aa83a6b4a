//! Background record writer
//!
//! Two buffers circulate between the producer and one writer thread over a
//! pair of depth-1 channels: full buffers travel on the request channel,
//! drained buffers come back on the done channel. The done channel starts out
//! holding the spare buffer, so the first flush never waits, and every later
//! flush waits for the previous one. At most one flush is in flight and only
//! the writer thread touches the outputs.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, trace};

use super::buffer::RecordBuffer;
use super::outputs::Outputs;
use crate::domain::SinkError;

enum WriterRequest {
    Flush(RecordBuffer),
    Exit,
}

/// Handle to the writer thread.
pub struct RecordWriter {
    request_tx: Sender<WriterRequest>,
    done_rx: Receiver<RecordBuffer>,
    handle: Option<JoinHandle<Outputs>>,
}

impl RecordWriter {
    /// Start the writer thread with `spare` as the initially free buffer.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(outputs: Outputs, spare: RecordBuffer) -> io::Result<Self> {
        let (request_tx, request_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        // Capacity 1 and empty: cannot fail
        let _ = done_tx.send(spare);

        let handle = thread::Builder::new()
            .name("nextprof-writer".into())
            .spawn(move || run(outputs, &request_rx, &done_tx))?;

        Ok(Self {
            request_tx,
            done_rx,
            handle: Some(handle),
        })
    }

    /// Block until the previous flush is done and take back its buffer.
    ///
    /// # Errors
    /// [`SinkError::WriterGone`] if the writer thread has exited
    pub fn take_free(&self) -> Result<RecordBuffer, SinkError> {
        self.done_rx.recv().map_err(|_| SinkError::WriterGone)
    }

    /// Hand a filled buffer to the writer.
    ///
    /// # Errors
    /// [`SinkError::WriterGone`] if the writer thread has exited
    pub fn submit(&self, buffer: RecordBuffer) -> Result<(), SinkError> {
        self.request_tx
            .send(WriterRequest::Flush(buffer))
            .map_err(|_| SinkError::WriterGone)
    }

    /// Wait for the in-flight flush, stop the thread and return the outputs.
    ///
    /// # Errors
    /// [`SinkError::WriterGone`] if the writer thread exited early or panicked
    pub fn shutdown(mut self) -> Result<Outputs, SinkError> {
        self.take_free()?;
        self.request_tx
            .send(WriterRequest::Exit)
            .map_err(|_| SinkError::WriterGone)?;
        let handle = self.handle.take().ok_or(SinkError::WriterGone)?;
        handle.join().map_err(|_| SinkError::WriterGone)
    }
}

fn run(
    mut outputs: Outputs,
    request_rx: &Receiver<WriterRequest>,
    done_tx: &Sender<RecordBuffer>,
) -> Outputs {
    trace!("record writer started");
    while let Ok(WriterRequest::Flush(mut buffer)) = request_rx.recv() {
        outputs.write(buffer.filled());
        debug!("Flushed {} bytes of recorded data", buffer.len());
        buffer.reset();
        if done_tx.send(buffer).is_err() {
            break;
        }
    }
    trace!("record writer stopped");
    outputs
}
