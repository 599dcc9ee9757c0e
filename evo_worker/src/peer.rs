//! Ring-neighbor CPU watchdog.
//!
//! Worker `i` audits worker `(i + 1) mod n`, so the whole group is covered
//! with no central monitor and O(1) state per worker. A neighbor that stays
//! above the CPU limit for `kill_streak` consecutive samples is killed;
//! restarting its slot is the host's job.
//!
//! A pid reused by an unrelated process after a restart can be misread; the
//! registry is only eventually consistent and this is accepted.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use evo_common::worker::WorkerSettings;

use crate::cpu::{CpuSample, CpuSampler};
use crate::error::{WorkerError, WorkerResult};
use crate::procfs::ProcSource;
use crate::registry::PidRegistry;

/// Forcible termination of a peer process.
pub trait PeerTerminator {
    fn kill(&mut self, pid: u32) -> WorkerResult<()>;
}

/// Sends `SIGKILL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalTerminator;

impl PeerTerminator for SignalTerminator {
    fn kill(&mut self, pid: u32) -> WorkerResult<()> {
        // 0 and values past i32::MAX would address a process group.
        let raw = i32::try_from(pid)
            .ok()
            .filter(|&raw| raw > 0)
            .ok_or(WorkerError::InvalidPid { pid })?;
        kill(Pid::from_raw(raw), Signal::SIGKILL)
            .map_err(|source| WorkerError::Signal { pid, source })
    }
}

/// Outcome of one watchdog tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeerVerdict {
    /// The ring neighbor is this worker itself; nothing is audited.
    Inert,
    /// No pid published for the neighbor yet.
    NoPeer,
    /// Snapshot was malformed and dropped; the streak is unchanged.
    Discarded { pid: u32, streak: u32 },
    /// Neighbor sampled; `streak` is the updated over-limit streak.
    Sampled { pid: u32, usage: f64, streak: u32 },
    /// Neighbor exceeded the limit for the whole streak and was killed.
    Killed { pid: u32, usage: f64 },
}

/// Per-worker peer watchdog state.
#[derive(Debug)]
pub struct PeerWatchdog {
    worker_id: u32,
    peer_index: Option<u32>,
    cpu_limit: f64,
    kill_streak: u32,
    streak: u32,
    watched_pid: Option<u32>,
    sampler: CpuSampler,
}

impl PeerWatchdog {
    pub fn new(settings: &WorkerSettings) -> Self {
        let peer = settings.peer_index();
        let peer_index = if peer == settings.worker_id {
            tracing::info!(
                worker_id = settings.worker_id,
                "single-worker group, peer watchdog disabled"
            );
            None
        } else {
            Some(peer)
        };
        Self {
            worker_id: settings.worker_id,
            peer_index,
            cpu_limit: settings.cpu_limit,
            kill_streak: settings.peer_kill_streak,
            streak: 0,
            watched_pid: None,
            sampler: CpuSampler::new(),
        }
    }

    /// Slot audited by this worker, `None` when the watchdog is inert.
    pub fn peer_index(&self) -> Option<u32> {
        self.peer_index
    }

    /// Consecutive over-limit samples of the watched pid.
    pub fn over_limit_streak(&self) -> u32 {
        self.streak
    }

    pub fn watched_pid(&self) -> Option<u32> {
        self.watched_pid
    }

    /// Run one audit of the ring neighbor.
    pub fn tick(
        &mut self,
        registry: &dyn PidRegistry,
        source: &dyn ProcSource,
        terminator: &mut dyn PeerTerminator,
    ) -> PeerVerdict {
        let Some(peer_index) = self.peer_index else {
            return PeerVerdict::Inert;
        };
        let Some(pid) = registry.lookup(peer_index) else {
            return PeerVerdict::NoPeer;
        };

        if self.watched_pid != Some(pid) {
            if let Some(old) = self.watched_pid.replace(pid) {
                tracing::debug!(peer_index, old, pid, "peer pid changed");
                self.sampler.forget(old);
            }
            self.streak = 0;
        }

        let sample = self.sampler.sample(source, pid);
        if sample == CpuSample::Malformed {
            return PeerVerdict::Discarded {
                pid,
                streak: self.streak,
            };
        }
        let usage = sample.usage();
        if usage > self.cpu_limit {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        if matches!(sample, CpuSample::Usage(_)) {
            tracing::trace!(peer_index, pid, usage, streak = self.streak, "peer cpu sampled");
        }

        if self.streak < self.kill_streak {
            return PeerVerdict::Sampled {
                pid,
                usage,
                streak: self.streak,
            };
        }

        tracing::warn!(
            worker_id = self.worker_id,
            peer_index,
            pid,
            usage,
            streak = self.streak,
            "peer worker over CPU limit, killing"
        );
        if let Err(e) = terminator.kill(pid) {
            tracing::warn!(pid, error = %e, "peer kill failed");
        }
        self.streak = 0;
        self.sampler.forget(pid);
        self.watched_pid = None;
        PeerVerdict::Killed { pid, usage }
    }
}
