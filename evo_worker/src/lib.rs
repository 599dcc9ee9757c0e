//! # EVO Worker Health & Drain Supervisor
//!
//! Embedded in every worker of a multi-worker server. Each worker runs one
//! [`WorkerSupervisor`](supervisor::WorkerSupervisor) that:
//!
//! - limits concurrent work and counts requests and messages ([`admission`])
//! - checks memory and lifetime counters against staggered limits ([`threshold`])
//! - audits one ring neighbor's CPU usage and kills it on sustained overload ([`peer`])
//! - drains gracefully: deny new work, wait for quiescence, exit ([`drain`])
//! - optionally emits a memory metric ([`telemetry`])
//!
//! Everything runs cooperatively on one thread, driven by [`timer`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evo_common::worker::WorkerConfig;
//! use evo_worker::host::WorkerHost;
//! use evo_worker::registry::FsPidRegistry;
//! use evo_worker::supervisor::{Collaborators, WorkerSupervisor};
//! use std::time::Instant;
//!
//! struct Host;
//! impl WorkerHost for Host {
//!     fn deny_new_requests(&mut self, _worker_id: u32) {}
//!     fn terminate_process(&mut self) {}
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = WorkerConfig::with_workers(4).resolve(0)?;
//! let registry = FsPidRegistry::open("/dev/shm/evo_workers")?;
//! let mut supervisor =
//!     WorkerSupervisor::new(settings, std::process::id(), Collaborators::system(Host, registry));
//! supervisor.start(Instant::now())?;
//!
//! if supervisor.try_admit() {
//!     // ... handle request ...
//!     supervisor.release();
//! }
//! supervisor.run_due(Instant::now());
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod cpu;
pub mod drain;
pub mod error;
pub mod host;
pub mod peer;
pub mod procfs;
pub mod registry;
pub mod supervisor;
pub mod telemetry;
pub mod threshold;
pub mod timer;

pub use error::{WorkerError, WorkerResult};
