//! # nextprof - Main Entry Point
//!
//! Loads the configuration, then drives the profiler against the simulated
//! device: a synthetic application with `--threads` threads is launched and
//! sampled for `--ticks` ticks, and its records go to the configured file
//! and socket. Ctrl+C requests termination through a notification.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

use nextprof::cli::Args;
use nextprof::config::Config;
use nextprof::domain::ConfigError;
use nextprof::platform::sim::{SimApplication, SimPlatform};
use nextprof::platform::NOTIFICATION_TERMINATE;
use nextprof::profiling::{Profiler, SessionStats};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    let args = Args::parse();
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::Builder::from_env(env).init();

    std::process::exit(match run(args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{e:#}");
            exit_code_for(&e)
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some()) {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    match config.to_toml() {
        Ok(text) => debug!("Effective configuration:\n{text}"),
        Err(e) => debug!("Effective configuration not printable: {e}"),
    }
    Ok(config)
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let quiet = args.quiet;

    let mut platform = SimPlatform::new().with_auto_terminate();
    platform.launch(SimApplication::synthetic(args.threads, args.ticks));
    let notifier = platform.notifier();

    info!("nextprof v{}", env!("CARGO_PKG_VERSION"));
    let mut profiler = Profiler::new(platform, config);
    let mut worker = tokio::task::spawn_blocking(move || {
        profiler.run().map(|()| profiler.finished_sessions)
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let joined = tokio::select! {
        joined = &mut worker => joined,
        _ = &mut ctrl_c => {
            info!("Interrupted, stopping");
            // The profiler only exits after seeing this
            notifier.send(NOTIFICATION_TERMINATE).ok();
            worker.await
        }
    };
    let sessions = joined.context("Profiler thread panicked")??;

    if !quiet {
        print_summary(&sessions);
    }
    Ok(())
}

fn print_summary(sessions: &[SessionStats]) {
    for (index, stats) in sessions.iter().enumerate() {
        eprintln!("session {}: {stats}", index + 1);
    }
    if sessions.is_empty() {
        eprintln!("no debuggee session completed");
    }
}
