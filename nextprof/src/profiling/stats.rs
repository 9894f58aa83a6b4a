use std::fmt;

/// Counters for one debug session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Debugger breaks that were sampled
    pub ticks: u64,
    pub records_written: u64,
    pub stack_bytes: u64,
    pub break_failures: u64,
    pub stack_read_failures: u64,
    /// Threads not tracked because the thread table was full
    pub dropped_threads: u64,
    /// Samples that did not fit in a flush region
    pub dropped_records: u64,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ticks={} records={} stack_bytes={} break_failures={} stack_read_failures={} \
             dropped_threads={} dropped_records={}",
            self.ticks,
            self.records_written,
            self.stack_bytes,
            self.break_failures,
            self.stack_read_failures,
            self.dropped_threads,
            self.dropped_records,
        )
    }
}
