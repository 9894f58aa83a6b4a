//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "nextprof",
    about = "Sampling profiler that records thread snapshots of a debugged application",
    after_help = "\
EXAMPLES:
    nextprof                                   Record to ./nextprof/<timestamp>.bin
    nextprof --config nextprof.toml            Load settings from a TOML file
    nextprof --host 192.168.1.20 --no-file     Stream records over TCP only
    nextprof --threaded --stack-size 2048      Background writer, larger stack slices"
)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for record files
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Host receiving the record stream
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port of the record stream receiver
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Do not write a record file
    #[arg(long)]
    pub no_file: bool,

    /// Do not stream records over TCP
    #[arg(long)]
    pub no_socket: bool,

    /// Flush records from a background writer thread
    #[arg(long)]
    pub threaded: bool,

    /// Per-thread cap on captured stack bytes
    #[arg(long, value_name = "BYTES")]
    pub stack_size: Option<usize>,

    /// Core cycles between two samples
    #[arg(long, value_name = "CYCLES")]
    pub interval: Option<u64>,

    /// Threads in the simulated application
    #[arg(long, default_value = "3")]
    pub threads: u32,

    /// Sampling ticks before the simulated application exits
    #[arg(long, default_value = "100")]
    pub ticks: usize,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Default log filter for `env_logger` when `RUST_LOG` is unset.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref dir) = self.output_dir {
            config.record.directory.clone_from(dir);
        }
        if let Some(ref host) = self.host {
            config.network.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.network.port_tcp = port;
        }
        if self.no_file {
            config.record.file = false;
        }
        if self.no_socket {
            config.record.tcp = false;
        }
        if self.threaded {
            config.record.threaded = true;
        }
        if let Some(stack_size) = self.stack_size {
            config.profile.stack_size = stack_size;
        }
        if let Some(interval) = self.interval {
            config.profile.instruction_interval = interval;
        }
    }
}
