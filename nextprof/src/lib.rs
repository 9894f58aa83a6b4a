//! # nextprof - Sampling Profiler Engine
//!
//! nextprof attaches to a freshly launched application as its debugger and
//! samples every thread at a fixed cycle cadence. On each sampling tick the
//! target is stopped just long enough to read each thread's registers and the
//! top of its stack; the snapshots are streamed to a file and/or a TCP socket
//! as a compact binary record stream (see `nextprof-common`).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Platform Services                            │
//! │  • Notifications (terminate, next application launched)         │
//! │  • Performance counter + overflow interrupt                     │
//! │  • Debug API (events, break, thread context, memory read)       │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ wait sources
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   nextprof (This Crate)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │    Event     │──▶│   Profiler   │──▶│   Sampler    │         │
//! │  │   Channel    │   │ (attach FSM) │   │ (regs+stack) │         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │                            │                  │ records         │
//! │                            ▼                  ▼                 │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │   Counter    │   │ Record Sink  │──▶ file │
//! │                     │  Controller  │   │ (+ writer)   │──▶ tcp  │
//! │                     └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`platform`]: the [`platform::Platform`] trait over the device services,
//!   the debug event model, and a simulated device
//! - [`profiling`]: event channel, attach state machine, thread table,
//!   performance counter control and sampling
//! - [`record`]: record buffer, file/socket outputs, background writer and
//!   the [`record::RecordSink`]
//! - [`config`]: TOML configuration with defaults
//! - [`cli`]: command-line arguments
//! - [`domain`]: newtypes and error types
//!
//! ## Threads
//!
//! The main loop is single-threaded: it blocks only in the event channel and
//! handles each wake-up to completion. With `record.threaded` a second thread
//! writes full buffers while sampling continues into the other half.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Record to ./nextprof/<timestamp>.bin
//! nextprof
//!
//! # Stream to a host and use a background writer
//! nextprof --host 192.168.1.20 --threaded
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod platform;
pub mod profiling;
pub mod record;
