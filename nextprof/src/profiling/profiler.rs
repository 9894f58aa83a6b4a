//! # Attach State Machine
//!
//! Owns the debug session and reacts to one wake-up of the event channel at a
//! time. Everything here runs on the main loop thread; the record sink's
//! writer thread is the only other execution context.
//!
//! ## States
//!
//! ```text
//!   Idle ──next-app──▶ Launching ──attach break──▶ Attached ◀──sampled──┐
//!    ▲                                              │                   │
//!    │                                              └──overflow──▶ Broken
//!    └──────────────── process exit (any state) ◀─────────────────────────
//! ```
//!
//! ## Wait Sources
//!
//! - Notification: termination request or "next application launched"
//! - Counter overflow: request a debugger break, if attached
//! - Debuggee: debug events of the session's process, registered only while
//!   a session exists
//!
//! Platform failures while handling a transition are fatal and propagate as
//! [`ProfilerError`]; everything else is logged and counted in
//! [`SessionStats`].

use log::{debug, error, info, trace, warn};

use super::counter::CounterController;
use super::event_channel::EventChannel;
use super::sampler::Sampler;
use super::stats::SessionStats;
use super::threads::{AttachedThread, ThreadTable};
use crate::config::Config;
use crate::domain::{Address, PlatformResultExt, ProcessHandle, ProfilerError, ThreadId};
use crate::platform::{
    ContinueFlags, DebugEvent, DebugEventKind, ExceptionKind, Platform, WaitSource,
    NOTIFICATION_DEBUG_NEXT_APPLICATION, NOTIFICATION_TERMINATE,
};
use crate::record::RecordSink;

/// Longest debug output string that is logged.
const MAX_OUTPUT_STRING: usize = 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No debuggee; waiting for the next application launch.
    Idle,
    /// Debuggee started, waiting for its attach break.
    Launching,
    /// Debuggee running and sampled on every counter overflow.
    Attached,
    /// A debugger break was requested and has not been sampled yet.
    Broken,
}

struct Session {
    process: ProcessHandle,
    threads: ThreadTable,
    sink: Option<RecordSink>,
    stats: SessionStats,
}

impl Session {
    fn source(&self) -> WaitSource {
        WaitSource::Debuggee(self.process.raw())
    }
}

/// The profiler's main loop state.
pub struct Profiler<P: Platform> {
    platform: P,
    config: Config,
    channel: EventChannel,
    counter: CounterController,
    sampler: Sampler,
    state: State,
    session: Option<Session>,
    started: bool,
    should_terminate: bool,
    /// Stats of every finished session, oldest first
    pub finished_sessions: Vec<SessionStats>,
}

impl<P: Platform> Profiler<P> {
    #[must_use]
    pub fn new(platform: P, config: Config) -> Self {
        let counter = CounterController::new(config.profile.instruction_interval);
        let sampler = Sampler::new(config.profile.stack_size);
        Self {
            platform,
            config,
            channel: EventChannel::new(&[WaitSource::Notification]),
            counter,
            sampler,
            state: State::Idle,
            session: None,
            started: false,
            should_terminate: false,
            finished_sessions: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn should_terminate(&self) -> bool {
        self.should_terminate
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    #[must_use]
    pub fn wait_sources(&self) -> &[WaitSource] {
        self.channel.sources()
    }

    /// Threads sampled in the current session.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.threads.len())
    }

    /// Stats of the live session, if any.
    #[must_use]
    pub fn session_stats(&self) -> Option<&SessionStats> {
        self.session.as_ref().map(|s| &s.stats)
    }

    /// Subscribe to launch notifications, take the counter and ask for the
    /// next application to be debugged.
    ///
    /// # Errors
    /// [`ProfilerError::Config`] for an invalid configuration,
    /// [`ProfilerError::Platform`] if any of the platform calls fail
    pub fn start(&mut self) -> Result<(), ProfilerError> {
        if self.started {
            return Ok(());
        }
        self.config.validate()?;
        self.platform
            .subscribe_notification(NOTIFICATION_DEBUG_NEXT_APPLICATION)
            .fatal("Subscribing to notification 0x1000")?;
        self.counter.acquire(&mut self.platform)?;
        self.channel.add(WaitSource::CounterOverflow);
        self.platform
            .debug_next_application(true)
            .fatal("Enabling debug of next application")?;
        self.started = true;

        info!("Started, waiting for debuggee application...");
        info!("Stack size limit: {} bytes", self.sampler.stack_limit());
        Ok(())
    }

    /// Run until termination is requested, then shut down.
    ///
    /// # Errors
    /// The first fatal [`ProfilerError`]
    pub fn run(&mut self) -> Result<(), ProfilerError> {
        self.start()?;
        while !self.should_terminate {
            self.step()?;
        }
        info!("Termination requested, exiting...");
        self.shutdown()
    }

    /// Wait for one wake-up and handle it.
    ///
    /// # Errors
    /// The first fatal [`ProfilerError`]
    pub fn step(&mut self) -> Result<(), ProfilerError> {
        trace!("Waiting for synchronization event...");
        let source = self
            .channel
            .wait_next(&mut self.platform, None)
            .fatal("Waiting for synchronization")?;
        match source {
            WaitSource::Notification => self.handle_notification(),
            WaitSource::CounterOverflow => self.handle_counter_overflow(),
            WaitSource::Debuggee(_) => self.handle_debuggee_event(),
        }
    }

    /// End any live session and release the counter and notifications.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] if the counter cannot be released
    pub fn shutdown(&mut self) -> Result<(), ProfilerError> {
        self.end_session();
        if !self.started {
            return Ok(());
        }
        self.counter.release(&mut self.platform)?;
        self.channel.remove(WaitSource::CounterOverflow);
        if let Err(e) = self
            .platform
            .unsubscribe_notification(NOTIFICATION_DEBUG_NEXT_APPLICATION)
        {
            error!("Unsubscribing from notification 0x1000 failed: {e}");
        }
        self.started = false;
        Ok(())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn handle_notification(&mut self) -> Result<(), ProfilerError> {
        let id = self
            .platform
            .receive_notification()
            .fatal("Receiving notification")?;
        trace!("Received notification 0x{id:08X}");
        match id {
            NOTIFICATION_TERMINATE => self.should_terminate = true,
            NOTIFICATION_DEBUG_NEXT_APPLICATION => self.handle_next_application()?,
            _ => error!("Unknown notification ID 0x{id:08X}"),
        }
        Ok(())
    }

    fn handle_next_application(&mut self) -> Result<(), ProfilerError> {
        info!("Debuggee application launched");
        if self.session.is_some() {
            warn!("Previous debuggee session still open, closing it");
            self.end_session();
        }

        let process = self
            .platform
            .run_queued_process()
            .fatal("Running queued debuggee process")?;
        let session = Session {
            process,
            threads: ThreadTable::new(self.config.profile.max_threads),
            sink: None,
            stats: SessionStats::default(),
        };
        self.channel.add(session.source());
        self.session = Some(session);
        self.state = State::Launching;
        Ok(())
    }

    // ========================================================================
    // Counter Overflow
    // ========================================================================

    fn handle_counter_overflow(&mut self) -> Result<(), ProfilerError> {
        trace!("Perf counter overflow event received");
        self.counter.on_overflow(&mut self.platform)?;

        if self.state != State::Attached {
            return Ok(());
        }
        let Some(ref mut session) = self.session else {
            return Ok(());
        };
        match self.platform.break_process(&session.process) {
            Ok(()) => self.state = State::Broken,
            Err(e) => {
                warn!("Breaking debuggee process failed: {e}");
                session.stats.break_failures += 1;
                self.counter.reset_and_rearm(&mut self.platform)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Debug Events
    // ========================================================================

    fn handle_debuggee_event(&mut self) -> Result<(), ProfilerError> {
        trace!("Debuggee process event received");
        let Some(ref session) = self.session else {
            error!("Debuggee event without a session");
            return Ok(());
        };
        let event = self
            .platform
            .next_debug_event(&session.process)
            .fatal("Getting debug event")?;

        match event.kind {
            DebugEventKind::ExitProcess(reason) => {
                info!("Debuggee process exited (reason: {reason})");
                self.end_session();
                self.platform
                    .debug_next_application(true)
                    .fatal("Enabling debug of next application")?;
                info!("Detached, waiting for debuggee application...");
                // The process is gone, nothing to continue
                return Ok(());
            }
            DebugEventKind::AttachProcess {
                process_id,
                program_id,
                ref name,
            } => {
                let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
                info!("Debuggee process attached ({process_id})");
                info!(" Program ID: {program_id:016X}");
                info!(" Name: {}", String::from_utf8_lossy(&name[..len]));
            }
            DebugEventKind::AttachThread { creator, tls } => {
                self.attach_thread(&event, creator, tls)?;
            }
            DebugEventKind::ExitThread(reason) => {
                info!(
                    "Debuggee process thread exited ({}, reason: {reason})",
                    event.thread_id
                );
                if let Some(ref mut session) = self.session {
                    session.threads.remove(event.thread_id);
                }
            }
            DebugEventKind::Exception(ExceptionKind::AttachBreak) => self.attach_break()?,
            DebugEventKind::Exception(ExceptionKind::DebuggerBreak) => self.debugger_break()?,
            DebugEventKind::Exception(ExceptionKind::Other(code)) => {
                warn!("Unhandled debuggee process exception (type: {code})");
            }
            DebugEventKind::OutputString { address, size } => self.output_string(address, size),
            DebugEventKind::Other(kind) => debug!("Ignoring debug event type {kind}"),
        }

        if event.needs_continue {
            if let Some(ref session) = self.session {
                if let Err(e) = self
                    .platform
                    .continue_debug_event(&session.process, ContinueFlags::ALL_SIGNALS)
                {
                    warn!("Continuing debug event failed: {e}");
                }
            }
        }
        Ok(())
    }

    fn attach_thread(
        &mut self,
        event: &DebugEvent,
        creator: ThreadId,
        tls: Address,
    ) -> Result<(), ProfilerError> {
        let Some(ref mut session) = self.session else {
            return Ok(());
        };
        info!("Debuggee process thread attached ({})", event.thread_id);
        info!(" Creator thread: {creator}");
        info!(" TLS: {tls}");

        let context = self
            .platform
            .thread_context(&session.process, event.thread_id)
            .fatal("Getting debug thread context")?;
        info!(" Thread pc: {}", Address(context.pc));
        info!(" Thread sp: {}", Address(context.sp));

        let added = session.threads.insert(AttachedThread {
            id: event.thread_id,
            start_address: Address(context.pc),
            stack_top: Address(context.sp),
        });
        if !added {
            session.stats.dropped_threads += 1;
        }
        Ok(())
    }

    fn attach_break(&mut self) -> Result<(), ProfilerError> {
        let Some(ref mut session) = self.session else {
            return Ok(());
        };
        info!("Debuggee process attach break");
        if let Some(mut stale) = session.sink.take() {
            if let Err(e) = stale.close() {
                error!("Failed to close record sink: {e}");
            }
        }
        session.sink = Some(RecordSink::open(&self.config)?);
        self.state = State::Attached;
        self.counter.reset_and_rearm(&mut self.platform)
    }

    fn debugger_break(&mut self) -> Result<(), ProfilerError> {
        let Some(ref mut session) = self.session else {
            return Ok(());
        };
        let Some(ref mut sink) = session.sink else {
            warn!("Debugger break before attach break, ignoring");
            return Ok(());
        };
        session.stats.ticks += 1;
        self.sampler.sample_threads(
            &mut self.platform,
            &session.process,
            &session.threads,
            sink,
            &mut session.stats,
        )?;
        self.state = State::Attached;
        self.counter.reset_and_rearm(&mut self.platform)
    }

    fn output_string(&mut self, address: Address, size: u32) {
        let Some(ref session) = self.session else {
            return;
        };
        let mut buf = [0u8; MAX_OUTPUT_STRING];
        let len = (size as usize).min(MAX_OUTPUT_STRING);
        match self
            .platform
            .read_memory(&session.process, address, &mut buf[..len])
        {
            Ok(()) => {
                let text = &buf[..len];
                let end = text.iter().position(|&b| b == 0).unwrap_or(len);
                info!("Debug output: {}", String::from_utf8_lossy(&text[..end]));
            }
            Err(e) => warn!("Reading debug output string failed: {e}"),
        }
    }

    /// Release the process, close the sink and forget the threads.
    fn end_session(&mut self) {
        self.state = State::Idle;
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.channel.remove(session.source());
        if let Some(mut sink) = session.sink.take() {
            if let Err(e) = sink.close() {
                error!("Failed to close record sink: {e}");
            }
        }
        session.threads.clear();
        self.platform.close_process(session.process);
        info!("Session finished: {}", session.stats);
        self.finished_sessions.push(session.stats);
    }
}
