use std::fs;
use std::path::Path;

use nextprof::config::Config;
use nextprof::domain::ThreadId;
use nextprof::platform::sim::{SimApplication, SimPlatform, SimThread};
use nextprof::platform::{DebugEvent, DebugEventKind, ProcessExitReason, WaitSource};
use nextprof::profiling::{Profiler, State};
use nextprof_common::{Record, RecordReader};

fn running_app(name: &str, threads: u32) -> SimApplication {
    (0..threads).fold(SimApplication::new(name), |app, i| {
        let top = 0x1000_0000 - i * 0x1_0000;
        let thread = SimThread::new(0x40 + i, 0x0010_0000, top);
        app.with_thread(thread.with_context(0x0010_0080, 0x0010_0200, top - 0x10))
    })
}

fn app(name: &str, threads: u32, ticks: usize) -> SimApplication {
    running_app(name, threads).exit_after(ticks)
}

fn config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.record.tcp = false;
    config.record.directory = dir.to_path_buf();
    config
}

fn step_until(
    profiler: &mut Profiler<SimPlatform>,
    done: impl Fn(&Profiler<SimPlatform>) -> bool,
) {
    for _ in 0..256 {
        if done(profiler) {
            return;
        }
        profiler.step().unwrap();
    }
    panic!("condition never reached, state {:?}", profiler.state());
}

#[test]
fn test_process_exit_with_three_threads() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = SimPlatform::new();
    sim.launch(app("first", 3, 2));
    let mut profiler = Profiler::new(sim, config(dir.path()));
    profiler.start().unwrap();

    step_until(&mut profiler, |p| p.state() == State::Attached);
    assert_eq!(profiler.thread_count(), 3);

    step_until(&mut profiler, |p| !p.finished_sessions.is_empty());
    assert_eq!(profiler.state(), State::Idle);
    assert_eq!(profiler.thread_count(), 0);
    assert!(profiler.session_stats().is_none());
    assert!(!profiler.platform().process_open());
    assert!(profiler.platform().debug_next_enabled());
    assert_eq!(
        profiler.wait_sources(),
        &[WaitSource::Notification, WaitSource::CounterOverflow]
    );

    let stats = profiler.finished_sessions[0];
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.records_written, 6);

    // The sink was flushed and closed when the process exited
    let files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let bytes = fs::read(&files[0]).unwrap();
    assert_eq!(RecordReader::new(&bytes).filter(Result::is_ok).count(), 6);
}

#[test]
fn test_process_exit_while_threads_tracked() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = SimPlatform::new();
    sim.launch(running_app("abrupt", 3));
    let mut profiler = Profiler::new(sim, config(dir.path()));
    profiler.start().unwrap();

    step_until(&mut profiler, |p| {
        p.state() == State::Attached && p.session_stats().is_some_and(|s| s.ticks == 2)
    });
    assert_eq!(profiler.thread_count(), 3);

    // No thread-exit events first: the whole table goes with the process
    profiler.platform_mut().inject_event(DebugEvent {
        thread_id: ThreadId(0x40),
        needs_continue: false,
        kind: DebugEventKind::ExitProcess(ProcessExitReason::Terminate),
    });
    profiler.step().unwrap();

    assert_eq!(profiler.state(), State::Idle);
    assert_eq!(profiler.thread_count(), 0);
    assert_eq!(profiler.finished_sessions.len(), 1);
    assert_eq!(profiler.finished_sessions[0].records_written, 6);
    assert!(!profiler.platform().process_open());
    assert_eq!(
        profiler.wait_sources(),
        &[WaitSource::Notification, WaitSource::CounterOverflow]
    );

    let files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let bytes = fs::read(&files[0]).unwrap();
    let threads: Vec<u32> = RecordReader::new(&bytes)
        .map(|record| match record.unwrap() {
            Record::Sample(sample) => sample.thread_id,
            Record::Unknown { kind, .. } => panic!("unexpected kind {kind}"),
        })
        .collect();
    assert_eq!(threads, vec![0x40, 0x41, 0x42, 0x40, 0x41, 0x42]);

    profiler.platform_mut().launch(app("next", 1, 1));
    step_until(&mut profiler, |p| p.state() == State::Launching);
    assert_eq!(profiler.thread_count(), 0);
    step_until(&mut profiler, |p| p.state() == State::Attached);
    assert_eq!(profiler.thread_count(), 1);
}

#[test]
fn test_fresh_session_after_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = SimPlatform::new();
    sim.launch(app("first", 3, 1));
    let mut profiler = Profiler::new(sim, config(dir.path()));
    profiler.start().unwrap();
    step_until(&mut profiler, |p| p.finished_sessions.len() == 1);

    profiler.platform_mut().launch(app("second", 1, 3));
    step_until(&mut profiler, |p| p.state() == State::Launching);
    assert_eq!(profiler.thread_count(), 0);

    step_until(&mut profiler, |p| p.state() == State::Attached);
    assert_eq!(profiler.thread_count(), 1);

    step_until(&mut profiler, |p| p.finished_sessions.len() == 2);
    let second = profiler.finished_sessions[1];
    assert_eq!(second.ticks, 3);
    assert_eq!(second.records_written, 3);
    assert_eq!(second.dropped_threads, 0);

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);

    profiler.shutdown().unwrap();
    assert!(!profiler.platform().interrupt_bound());
}

#[test]
fn test_unknown_notification_is_ignored() {
    let mut sim = SimPlatform::new();
    sim.post_notification(0x2000);
    let mut profiler = Profiler::new(sim, config(Path::new("unused")));
    profiler.start().unwrap();

    profiler.step().unwrap();
    assert_eq!(profiler.state(), State::Idle);
    assert!(!profiler.should_terminate());
}

#[test]
fn test_auto_terminated_run_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = SimPlatform::new().with_auto_terminate();
    sim.launch(app("whole", 2, 4));
    let mut profiler = Profiler::new(sim, config(dir.path()));
    profiler.run().unwrap();

    assert!(profiler.should_terminate());
    assert_eq!(profiler.finished_sessions.len(), 1);
    assert!(!profiler.platform().counter_enabled());
    assert!(!profiler.platform().process_open());
}
