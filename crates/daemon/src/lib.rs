// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! openduckbill-daemon: the backup control plane. Wires the event coalescer,
//! trigger engine, reaper, destination driver and job builder together under
//! a supervisor that owns startup, signal handling and shutdown.

pub mod cli;
pub mod coalescer;
pub mod command;
pub mod destination;
pub mod error;
pub mod exclude;
pub mod job;
pub mod notify_adapter;
pub mod reaper;
pub mod supervisor;
pub mod trigger;
pub mod watcher;

pub use cli::Cli;
pub use supervisor::{Supervisor, SupervisorOutcome};
