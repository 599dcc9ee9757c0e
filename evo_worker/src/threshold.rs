//! Periodic resource limit check.
//!
//! Each tick compares resident memory and the lifetime request and message
//! counters against the resolved (staggered) limits. The optional legacy self
//! CPU check samples the worker's own pid on the same tick and fires after
//! a sustained overload window.

use std::time::Duration;

use evo_common::consts::{SELF_CPU_MIN_STREAK, SELF_CPU_WINDOW_MS};
use evo_common::worker::WorkerSettings;

use crate::cpu::{CpuSample, CpuSampler};
use crate::drain::DrainReason;
use crate::procfs::ProcSource;

/// Lifetime counters read from the admission controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkCounters {
    pub total_requests: u64,
    pub total_messages: u64,
}

#[derive(Debug)]
struct SelfCpuCheck {
    pid: u32,
    limit: f64,
    streak: u32,
    sampler: CpuSampler,
}

/// Memory / request / message limit monitor.
#[derive(Debug)]
pub struct ThresholdMonitor {
    memory_limit: u64,
    request_limit: u64,
    message_limit: u64,
    check_interval: Duration,
    self_cpu: Option<SelfCpuCheck>,
}

impl ThresholdMonitor {
    /// Build from resolved settings; `self_pid` is sampled only when the
    /// self CPU check is enabled.
    pub fn new(settings: &WorkerSettings, self_pid: u32) -> Self {
        let self_cpu = settings.self_cpu_check.then(|| SelfCpuCheck {
            pid: self_pid,
            limit: settings.self_cpu_limit,
            streak: 0,
            sampler: CpuSampler::new(),
        });
        Self {
            memory_limit: settings.memory_limit,
            request_limit: settings.request_limit,
            message_limit: settings.message_limit,
            check_interval: settings.check_interval,
            self_cpu,
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn has_self_cpu_check(&self) -> bool {
        self.self_cpu.is_some()
    }

    /// Consecutive over-limit self CPU samples.
    pub fn self_cpu_streak(&self) -> u32 {
        self.self_cpu.as_ref().map_or(0, |check| check.streak)
    }

    /// Evaluate one tick. Returns the first breached limit, if any.
    pub fn check(&mut self, counters: WorkCounters, source: &dyn ProcSource) -> Option<DrainReason> {
        if let Some(reason) = self.check_self_cpu(source) {
            return Some(reason);
        }

        let used = source.resident_bytes().unwrap_or(0);
        if used > self.memory_limit {
            return Some(DrainReason::MemoryLimit {
                used,
                limit: self.memory_limit,
            });
        }
        if counters.total_requests > self.request_limit {
            return Some(DrainReason::RequestLimit {
                total: counters.total_requests,
                limit: self.request_limit,
            });
        }
        if counters.total_messages > self.message_limit {
            return Some(DrainReason::MessageLimit {
                total: counters.total_messages,
                limit: self.message_limit,
            });
        }
        None
    }

    fn check_self_cpu(&mut self, source: &dyn ProcSource) -> Option<DrainReason> {
        let interval_ms = self.check_interval.as_millis() as u64;
        let check = self.self_cpu.as_mut()?;

        let sample = check.sampler.sample(source, check.pid);
        if sample == CpuSample::Malformed {
            return None;
        }
        let usage = sample.usage();
        if usage > check.limit {
            check.streak += 1;
            tracing::debug!(usage, streak = check.streak, "self cpu over limit");
        } else {
            check.streak = 0;
        }

        let sustained = u64::from(check.streak) * interval_ms >= SELF_CPU_WINDOW_MS;
        if sustained && check.streak >= SELF_CPU_MIN_STREAK {
            let streak = check.streak;
            check.streak = 0;
            return Some(DrainReason::SelfCpuOverload { usage, streak });
        }
        None
    }
}
