//! Simulated device
//!
//! A deterministic, single-process model of the platform services. Time only
//! advances inside [`SimPlatform::wait_any`]: when no registered source is
//! signaled and the performance counter is armed, the counter overflows.
//! Notifications posted from other threads (for example a Ctrl+C handler) go
//! through the sender returned by [`SimPlatform::notifier`].

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{trace, warn};

use super::{
    ContinueFlags, CounterEvent, CounterOp, DebugEvent, DebugEventKind, ExceptionKind, Platform,
    PlatformResult, ProcessExitReason, ThreadContext, ThreadExitReason, WaitSource,
    NOTIFICATION_DEBUG_NEXT_APPLICATION, NOTIFICATION_TERMINATE,
};
use crate::domain::{Address, PlatformError, ProcessHandle, ProcessId, ThreadId};

pub const ERR_INVALID_HANDLE: u32 = 0xD8E0_07F7;
pub const ERR_INVALID_ADDRESS: u32 = 0xE0E0_1BF5;
pub const ERR_NOT_FOUND: u32 = 0xD8A0_5C0A;
pub const ERR_NO_EVENT: u32 = 0xD8A0_1BFD;
pub const ERR_NOT_PERMITTED: u32 = 0xD8E0_07F4;
/// Returned by an infinite wait that nothing could ever satisfy.
pub const ERR_NOTHING_TO_WAIT_ON: u32 = 0xD8A0_1FFE;
/// Returned by calls the test harness asked to fail.
pub const ERR_INJECTED: u32 = 0xC8A0_1800;

const FIRST_HANDLE: u32 = 0x100;
const OUTPUT_STRING_BASE: u32 = 0x0800_0000;
const TLS_BASE: u32 = 0x1FF8_2000;
const DEFAULT_STACK_BYTES: usize = 0x400;

// ============================================================================
// Scripted Target
// ============================================================================

/// A thread of a simulated application.
#[derive(Debug, Clone)]
pub struct SimThread {
    id: ThreadId,
    start_pc: u32,
    stack_top: u32,
    contexts: Vec<ThreadContext>,
    /// Memory backing `[stack_top - stack.len(), stack_top)`.
    stack: Vec<u8>,
}

impl SimThread {
    /// Thread starting at `start_pc` with its stack growing down from `stack_top`.
    ///
    /// The stack memory is filled with ascending code-like words.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(id: u32, start_pc: u32, stack_top: u32) -> Self {
        let stack = (0..DEFAULT_STACK_BYTES / 4)
            .flat_map(|word| (0x0010_0000u32 + word as u32 * 4).to_le_bytes())
            .collect();
        Self {
            id: ThreadId(id),
            start_pc,
            stack_top,
            contexts: Vec::new(),
            stack,
        }
    }

    /// Replace the stack memory below `stack_top`.
    #[must_use]
    pub fn with_stack(mut self, stack: Vec<u8>) -> Self {
        self.stack = stack;
        self
    }

    /// Add a register snapshot; snapshots are replayed in order, one per break.
    #[must_use]
    pub fn with_context(mut self, pc: u32, lr: u32, sp: u32) -> Self {
        self.contexts.push(ThreadContext { pc, lr, sp });
        self
    }

    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    fn context(&self, breaks: usize) -> ThreadContext {
        if breaks == 0 || self.contexts.is_empty() {
            return ThreadContext {
                pc: self.start_pc,
                lr: 0,
                sp: self.stack_top,
            };
        }
        self.contexts[(breaks - 1) % self.contexts.len()]
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read(&self, address: u32, buf: &mut [u8]) -> bool {
        let base = self.stack_top.wrapping_sub(self.stack.len() as u32);
        let Some(end) = u64::from(address).checked_add(buf.len() as u64) else {
            return false;
        };
        if address < base || end > u64::from(self.stack_top) {
            return false;
        }
        let offset = (address - base) as usize;
        buf.copy_from_slice(&self.stack[offset..offset + buf.len()]);
        true
    }
}

/// An application that can be launched on the simulated device.
#[derive(Debug, Clone)]
pub struct SimApplication {
    process_id: ProcessId,
    program_id: u64,
    name: [u8; 8],
    threads: Vec<SimThread>,
    exit_after: Option<usize>,
    output: Option<Vec<u8>>,
}

impl SimApplication {
    /// Application with no threads; the name is truncated to 8 bytes.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut short = [0u8; 8];
        let bytes = name.as_bytes();
        let len = bytes.len().min(8);
        short[..len].copy_from_slice(&bytes[..len]);
        Self {
            process_id: ProcessId(0x30),
            program_id: 0x0004_0000_0012_3400,
            name: short,
            threads: Vec::new(),
            exit_after: None,
            output: None,
        }
    }

    #[must_use]
    pub fn with_thread(mut self, thread: SimThread) -> Self {
        self.threads.push(thread);
        self
    }

    /// Exit on its own after `breaks` debugger breaks.
    #[must_use]
    pub fn exit_after(mut self, breaks: usize) -> Self {
        self.exit_after = Some(breaks);
        self
    }

    /// Print `text` through the debug output channel right after attaching.
    #[must_use]
    pub fn with_output(mut self, text: &str) -> Self {
        self.output = Some(text.as_bytes().to_vec());
        self
    }

    /// Application with `threads` threads, each walking through a few call
    /// sites, that exits after `ticks` breaks.
    #[must_use]
    pub fn synthetic(threads: u32, ticks: usize) -> Self {
        let app = (0..threads).fold(Self::new("synth"), |app, index| {
            let entry = 0x0010_0000 + index * 0x1000;
            let stack_top = 0x1000_0000 - index * 0x1_0000;
            let thread = (0..4u32).fold(
                SimThread::new(0x20 + index, entry, stack_top),
                |t, depth| {
                    let offset = 0x40 * (depth + 1);
                    t.with_context(entry + offset, entry + 0x200, stack_top - offset)
                },
            );
            app.with_thread(thread)
        });
        app.exit_after(ticks).with_output("synthetic target running")
    }

    fn main_thread(&self) -> ThreadId {
        self.threads.first().map_or(ThreadId(0), SimThread::id)
    }
}

#[derive(Debug)]
struct SimProcess {
    handle: u32,
    app: SimApplication,
    events: VecDeque<DebugEvent>,
    breaks: usize,
    exit_queued: bool,
    continues: usize,
}

impl SimProcess {
    fn event(thread_id: ThreadId, kind: DebugEventKind) -> DebugEvent {
        DebugEvent {
            thread_id,
            needs_continue: true,
            kind,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn launch(handle: u32, app: SimApplication) -> Self {
        let main = app.main_thread();
        let mut events = VecDeque::new();
        events.push_back(Self::event(
            main,
            DebugEventKind::AttachProcess {
                process_id: app.process_id,
                program_id: app.program_id,
                name: app.name,
            },
        ));
        for (index, thread) in app.threads.iter().enumerate() {
            events.push_back(Self::event(
                thread.id,
                DebugEventKind::AttachThread {
                    creator: main,
                    tls: Address(TLS_BASE + index as u32 * 0x200),
                },
            ));
        }
        if let Some(ref text) = app.output {
            events.push_back(Self::event(
                main,
                DebugEventKind::OutputString {
                    address: Address(OUTPUT_STRING_BASE),
                    size: text.len() as u32,
                },
            ));
        }
        let attach_break = DebugEventKind::Exception(ExceptionKind::AttachBreak);
        events.push_back(Self::event(main, attach_break));
        Self {
            handle,
            app,
            events,
            breaks: 0,
            exit_queued: false,
            continues: 0,
        }
    }

    fn queue_exit(&mut self) {
        let main = self.app.main_thread();
        for thread in &self.app.threads {
            self.events.push_back(Self::event(
                thread.id,
                DebugEventKind::ExitThread(ThreadExitReason::ProcessExit),
            ));
        }
        self.events.push_back(DebugEvent {
            thread_id: main,
            needs_continue: false,
            kind: DebugEventKind::ExitProcess(ProcessExitReason::Exit),
        });
        self.exit_queued = true;
    }

    fn read(&self, address: u32, buf: &mut [u8]) -> bool {
        if let Some(ref text) = self.app.output {
            if address >= OUTPUT_STRING_BASE {
                let offset = (address - OUTPUT_STRING_BASE) as usize;
                if let Some(src) = text.get(offset..offset + buf.len()) {
                    buf.copy_from_slice(src);
                    return true;
                }
            }
        }
        self.app
            .threads
            .iter()
            .any(|thread| thread.read(address, buf))
    }
}

#[derive(Debug, Default)]
struct SimCounter {
    enabled: bool,
    bound: bool,
    event: Option<CounterEvent>,
    loaded: bool,
    overflow_signaled: bool,
    overflows: usize,
    log: Vec<CounterOp>,
}

impl SimCounter {
    fn armed(&self) -> bool {
        self.enabled && self.bound && self.event.is_some() && self.loaded
    }
}

// ============================================================================
// Platform
// ============================================================================

/// In-process model of the device's platform services.
pub struct SimPlatform {
    notify_tx: Sender<u32>,
    notify_rx: Receiver<u32>,
    notifications: VecDeque<u32>,
    subscriptions: HashSet<u32>,
    debug_next: bool,
    auto_terminate: bool,
    queued: VecDeque<SimApplication>,
    pending_launches: VecDeque<SimApplication>,
    process: Option<SimProcess>,
    next_handle: u32,
    counter: SimCounter,
    failing_breaks: usize,
    fail_memory_reads: bool,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    #[must_use]
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = unbounded();
        Self {
            notify_tx,
            notify_rx,
            notifications: VecDeque::new(),
            subscriptions: HashSet::new(),
            debug_next: false,
            auto_terminate: false,
            queued: VecDeque::new(),
            pending_launches: VecDeque::new(),
            process: None,
            next_handle: FIRST_HANDLE,
            counter: SimCounter::default(),
            failing_breaks: 0,
            fail_memory_reads: false,
        }
    }

    /// Post a termination request once the device has nothing left to do.
    #[must_use]
    pub fn with_auto_terminate(mut self) -> Self {
        self.auto_terminate = true;
        self
    }

    /// Sender for notifications posted from other threads.
    #[must_use]
    pub fn notifier(&self) -> Sender<u32> {
        self.notify_tx.clone()
    }

    pub fn post_notification(&mut self, id: u32) {
        self.notifications.push_back(id);
    }

    /// Launch an application. It is intercepted if forced debugging is on;
    /// otherwise it waits until the profiler asks for the next launch.
    pub fn launch(&mut self, app: SimApplication) {
        if self.debug_next {
            self.intercept(app);
        } else {
            self.pending_launches.push_back(app);
        }
    }

    fn intercept(&mut self, app: SimApplication) {
        self.debug_next = false;
        self.queued.push_back(app);
        if self.subscriptions.contains(&NOTIFICATION_DEBUG_NEXT_APPLICATION) {
            self.notifications.push_back(NOTIFICATION_DEBUG_NEXT_APPLICATION);
        }
    }

    /// Start a new thread in the running process.
    pub fn spawn_thread(&mut self, thread: SimThread) {
        if let Some(ref mut process) = self.process {
            let main = process.app.main_thread();
            process.events.push_back(SimProcess::event(
                thread.id,
                DebugEventKind::AttachThread {
                    creator: main,
                    tls: Address(TLS_BASE),
                },
            ));
            process.app.threads.push(thread);
        }
    }

    /// End a thread of the running process.
    pub fn exit_thread(&mut self, id: ThreadId) {
        if let Some(ref mut process) = self.process {
            process.app.threads.retain(|thread| thread.id != id);
            let kind = DebugEventKind::ExitThread(ThreadExitReason::Exit);
            process.events.push_back(SimProcess::event(id, kind));
        }
    }

    /// Queue an arbitrary debug event on the running process.
    pub fn inject_event(&mut self, event: DebugEvent) {
        if let Some(ref mut process) = self.process {
            process.events.push_back(event);
        }
    }

    /// Make the next `count` break requests fail.
    pub fn fail_breaks(&mut self, count: usize) {
        self.failing_breaks = count;
    }

    pub fn fail_memory_reads(&mut self, fail: bool) {
        self.fail_memory_reads = fail;
    }

    /// Every counter operation issued so far.
    #[must_use]
    pub fn counter_log(&self) -> &[CounterOp] {
        &self.counter.log
    }

    /// Number of times the counter was loaded with a fresh period.
    #[must_use]
    pub fn rearm_count(&self) -> usize {
        self.counter
            .log
            .iter()
            .filter(|op| matches!(op, CounterOp::SetValue(_)))
            .count()
    }

    #[must_use]
    pub fn overflow_count(&self) -> usize {
        self.counter.overflows
    }

    #[must_use]
    pub fn counter_armed(&self) -> bool {
        self.counter.armed()
    }

    #[must_use]
    pub fn counter_enabled(&self) -> bool {
        self.counter.enabled
    }

    #[must_use]
    pub fn interrupt_bound(&self) -> bool {
        self.counter.bound
    }

    #[must_use]
    pub fn debug_next_enabled(&self) -> bool {
        self.debug_next
    }

    #[must_use]
    pub fn is_subscribed(&self, id: u32) -> bool {
        self.subscriptions.contains(&id)
    }

    #[must_use]
    pub fn process_open(&self) -> bool {
        self.process.is_some()
    }

    #[must_use]
    pub fn continue_count(&self) -> usize {
        self.process.as_ref().map_or(0, |process| process.continues)
    }

    fn process_mut(&mut self, handle: &ProcessHandle) -> PlatformResult<&mut SimProcess> {
        match self.process {
            Some(ref mut process) if process.handle == handle.raw() => Ok(process),
            _ => Err(PlatformError::Failed(ERR_INVALID_HANDLE)),
        }
    }

    fn is_signaled(&self, source: WaitSource) -> bool {
        match source {
            WaitSource::Notification => !self.notifications.is_empty(),
            WaitSource::CounterOverflow => self.counter.overflow_signaled,
            WaitSource::Debuggee(raw) => {
                self.process
                    .as_ref()
                    .is_some_and(|p| p.handle == raw && !p.events.is_empty())
            }
        }
    }

    fn first_signaled(&self, sources: &[WaitSource]) -> Option<usize> {
        sources.iter().position(|&source| self.is_signaled(source))
    }

    fn idle(&self) -> bool {
        self.process.is_none() && self.queued.is_empty() && self.notifications.is_empty()
    }
}

impl Platform for SimPlatform {
    fn wait_any(
        &mut self,
        sources: &[WaitSource],
        timeout: Option<Duration>,
    ) -> PlatformResult<usize> {
        self.notifications.extend(self.notify_rx.try_iter());
        if let Some(index) = self.first_signaled(sources) {
            return Ok(index);
        }

        // Nothing pending: let a sampling period elapse
        if self.counter.armed() {
            self.counter.loaded = false;
            self.counter.overflow_signaled = true;
            self.counter.overflows += 1;
            trace!("sim: counter overflow #{}", self.counter.overflows);
            if let Some(index) = self.first_signaled(sources) {
                return Ok(index);
            }
        }

        let Some(notification_index) = sources
            .iter()
            .position(|&source| source == WaitSource::Notification)
        else {
            return Err(match timeout {
                Some(_) => PlatformError::Timeout,
                None => PlatformError::Failed(ERR_NOTHING_TO_WAIT_ON),
            });
        };

        if self.auto_terminate && self.idle() {
            self.notifications.push_back(NOTIFICATION_TERMINATE);
            return Ok(notification_index);
        }

        let received = match timeout {
            None => {
                self.notify_rx
                    .recv()
                    .map_err(|_| PlatformError::Failed(ERR_NOTHING_TO_WAIT_ON))
            }
            Some(limit) => self.notify_rx.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => PlatformError::Timeout,
                RecvTimeoutError::Disconnected => PlatformError::Failed(ERR_NOTHING_TO_WAIT_ON),
            }),
        }?;
        self.notifications.push_back(received);
        Ok(notification_index)
    }

    fn subscribe_notification(&mut self, id: u32) -> PlatformResult<()> {
        self.subscriptions.insert(id);
        Ok(())
    }

    fn unsubscribe_notification(&mut self, id: u32) -> PlatformResult<()> {
        if self.subscriptions.remove(&id) {
            Ok(())
        } else {
            Err(PlatformError::Failed(ERR_NOT_FOUND))
        }
    }

    fn receive_notification(&mut self) -> PlatformResult<u32> {
        self.notifications
            .pop_front()
            .ok_or(PlatformError::Failed(ERR_NO_EVENT))
    }

    fn debug_next_application(&mut self, enable: bool) -> PlatformResult<()> {
        self.debug_next = enable;
        if enable {
            if let Some(app) = self.pending_launches.pop_front() {
                self.intercept(app);
            }
        }
        Ok(())
    }

    fn run_queued_process(&mut self) -> PlatformResult<ProcessHandle> {
        if self.process.is_some() {
            return Err(PlatformError::Failed(ERR_NOT_PERMITTED));
        }
        let app = self
            .queued
            .pop_front()
            .ok_or(PlatformError::Failed(ERR_NOT_FOUND))?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.process = Some(SimProcess::launch(handle, app));
        Ok(ProcessHandle::from_raw(handle))
    }

    fn close_process(&mut self, process: ProcessHandle) {
        if self
            .process
            .as_ref()
            .is_some_and(|p| p.handle == process.raw())
        {
            self.process = None;
        } else {
            warn!("sim: closing unknown {process}");
        }
    }

    fn next_debug_event(&mut self, process: &ProcessHandle) -> PlatformResult<DebugEvent> {
        self
            .process_mut(process)?
            .events
            .pop_front()
            .ok_or(PlatformError::Failed(ERR_NO_EVENT))
    }

    fn thread_context(
        &mut self,
        process: &ProcessHandle,
        thread: ThreadId,
    ) -> PlatformResult<ThreadContext> {
        let process = self.process_mut(process)?;
        let breaks = process.breaks;
        process
            .app
            .threads
            .iter()
            .find(|t| t.id == thread)
            .map(|t| t.context(breaks))
            .ok_or(PlatformError::Failed(ERR_NOT_FOUND))
    }

    fn read_memory(
        &mut self,
        process: &ProcessHandle,
        address: Address,
        buf: &mut [u8],
    ) -> PlatformResult<()> {
        let fail = self.fail_memory_reads;
        let process = self.process_mut(process)?;
        if fail {
            return Err(PlatformError::Failed(ERR_INJECTED));
        }
        if process.read(address.0, buf) {
            Ok(())
        } else {
            Err(PlatformError::Failed(ERR_INVALID_ADDRESS))
        }
    }

    fn continue_debug_event(
        &mut self,
        process: &ProcessHandle,
        _flags: ContinueFlags,
    ) -> PlatformResult<()> {
        self.process_mut(process)?.continues += 1;
        Ok(())
    }

    fn break_process(&mut self, process: &ProcessHandle) -> PlatformResult<()> {
        let inject_failure = self.failing_breaks > 0;
        let process = self.process_mut(process)?;
        if inject_failure {
            self.failing_breaks -= 1;
            return Err(PlatformError::Failed(ERR_INJECTED));
        }
        if process.exit_queued {
            return Err(PlatformError::Failed(ERR_NOT_PERMITTED));
        }
        process.breaks += 1;
        let main = process.app.main_thread();
        let kind = DebugEventKind::Exception(ExceptionKind::DebuggerBreak);
        process.events.push_back(SimProcess::event(main, kind));
        if process.app.exit_after.is_some_and(|limit| process.breaks >= limit) {
            process.queue_exit();
        }
        Ok(())
    }

    fn control_counter(&mut self, op: CounterOp) -> PlatformResult<()> {
        let counter = &mut self.counter;
        if !counter.enabled && !matches!(op, CounterOp::Enable) {
            return Err(PlatformError::Failed(ERR_NOT_PERMITTED));
        }
        counter.log.push(op);
        match op {
            CounterOp::Enable => counter.enabled = true,
            CounterOp::Disable => {
                counter.enabled = false;
                counter.loaded = false;
            }
            CounterOp::Reset => counter.loaded = false,
            CounterOp::SetValue(_) => counter.loaded = true,
            CounterOp::SetEvent(event) => counter.event = Some(event),
            CounterOp::SetVirtualCounter(_) => {}
        }
        Ok(())
    }

    fn bind_overflow_interrupt(&mut self) -> PlatformResult<()> {
        if self.counter.bound {
            return Err(PlatformError::Failed(ERR_NOT_PERMITTED));
        }
        self.counter.bound = true;
        Ok(())
    }

    fn unbind_overflow_interrupt(&mut self) -> PlatformResult<()> {
        if !self.counter.bound {
            return Err(PlatformError::Failed(ERR_NOT_FOUND));
        }
        self.counter.bound = false;
        Ok(())
    }

    fn clear_overflow_event(&mut self) -> PlatformResult<()> {
        self.counter.overflow_signaled = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm(sim: &mut SimPlatform) {
        sim.control_counter(CounterOp::Enable).unwrap();
        sim.bind_overflow_interrupt().unwrap();
        sim.control_counter(CounterOp::SetEvent(CounterEvent::CoreCycleCount))
            .unwrap();
        sim.control_counter(CounterOp::SetValue(0)).unwrap();
    }

    #[test]
    fn test_launch_waits_for_debug_next() {
        let mut sim = SimPlatform::new();
        sim.subscribe_notification(NOTIFICATION_DEBUG_NEXT_APPLICATION)
            .unwrap();
        sim.launch(SimApplication::new("game"));
        assert!(sim.run_queued_process().is_err());

        sim.debug_next_application(true).unwrap();
        assert!(!sim.debug_next_enabled(), "interception is one-shot");
        assert_eq!(
            sim.receive_notification(),
            Ok(NOTIFICATION_DEBUG_NEXT_APPLICATION)
        );
        assert!(sim.run_queued_process().is_ok());
    }

    #[test]
    fn test_counter_overflows_only_when_armed() {
        let mut sim = SimPlatform::new();
        let sources = [WaitSource::CounterOverflow];
        assert_eq!(
            sim.wait_any(&sources, None),
            Err(PlatformError::Failed(ERR_NOTHING_TO_WAIT_ON))
        );

        arm(&mut sim);
        assert_eq!(sim.wait_any(&sources, None), Ok(0));
        assert_eq!(sim.overflow_count(), 1);

        // Still signaled until cleared, and not reloaded
        sim.clear_overflow_event().unwrap();
        assert_eq!(
            sim.wait_any(&sources, Some(Duration::ZERO)),
            Err(PlatformError::Timeout)
        );
    }

    #[test]
    fn test_pending_notification_wins_over_counter() {
        let mut sim = SimPlatform::new();
        arm(&mut sim);
        sim.post_notification(0x42);

        assert_eq!(sim.wait_any(&[WaitSource::Notification], None), Ok(0));
        assert_eq!(sim.receive_notification(), Ok(0x42));
        sim.post_notification(0x43);
        let both = [WaitSource::Notification, WaitSource::CounterOverflow];
        assert_eq!(sim.wait_any(&both, None), Ok(0));
        sim.receive_notification().unwrap();
        assert_eq!(sim.wait_any(&both, None), Ok(1));
    }

    #[test]
    fn test_thread_stack_read_bounds() {
        let thread = SimThread::new(1, 0x0010_0000, 0x1000_0000).with_stack(vec![0xAB; 16]);
        let mut buf = [0u8; 8];
        assert!(thread.read(0x1000_0000 - 16, &mut buf));
        assert_eq!(buf, [0xAB; 8]);
        assert!(!thread.read(0x1000_0000 - 4, &mut buf));
        assert!(!thread.read(0x0FFF_0000, &mut buf));
    }

    #[test]
    fn test_synthetic_application() {
        let app = SimApplication::synthetic(3, 10);
        assert_eq!(app.threads.len(), 3);
        assert_eq!(app.exit_after, Some(10));
        let context = app.threads[1].context(2);
        assert_eq!(context.sp, 0x1000_0000 - 0x1_0000 - 0x80);
        assert!(app.threads[1].read(context.sp, &mut [0u8; 0x80]));
    }

    #[test]
    fn test_break_schedules_exit() {
        let mut sim = SimPlatform::new();
        sim.debug_next_application(true).unwrap();
        sim.launch(
            SimApplication::new("app")
                .with_thread(SimThread::new(5, 0x0010_0000, 0x1000_0000))
                .exit_after(1),
        );
        let handle = sim.run_queued_process().unwrap();
        while sim.next_debug_event(&handle).is_ok() {}

        sim.break_process(&handle).unwrap();
        let kinds: Vec<_> = std::iter::from_fn(|| sim.next_debug_event(&handle).ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                DebugEventKind::Exception(ExceptionKind::DebuggerBreak),
                DebugEventKind::ExitThread(ThreadExitReason::ProcessExit),
                DebugEventKind::ExitProcess(ProcessExitReason::Exit),
            ]
        );
    }
}
