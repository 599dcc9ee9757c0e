//! Delta-based CPU utilization from raw kernel counters.
//!
//! `usage% = round((Δprocess / Δsystem) * 100 * cores, 1)`, computed between
//! two snapshots of the same pid. The first snapshot of a pid only stores the
//! baseline and reports 0 so it can never count as an overload. A short or
//! unparsable snapshot is discarded and the previous baseline kept.

use std::collections::HashMap;

use crate::procfs::ProcSource;

/// Aggregate `cpu` line of `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemCpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
}

impl SystemCpuTimes {
    /// Parse `cpu  user nice system idle iowait irq softirq steal guest ...`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        if fields.next()? != "cpu" {
            return None;
        }
        let mut next = || fields.next()?.parse::<u64>().ok();
        Some(Self {
            user: next()?,
            nice: next()?,
            system: next()?,
            idle: next()?,
            iowait: next()?,
            irq: next()?,
            softirq: next()?,
            steal: next()?,
            guest: next()?,
        })
    }

    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
    }
}

/// CPU fields of `/proc/<pid>/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessCpuTimes {
    pub utime: u64,
    pub stime: u64,
    pub cutime: u64,
    pub cstime: u64,
}

impl ProcessCpuTimes {
    /// Parse fields 14–17 of a `/proc/<pid>/stat` line.
    ///
    /// The command name may contain spaces, so fields are counted after the
    /// last `)`; `state` is the first of them and `utime` the twelfth.
    pub fn parse(stat: &str) -> Option<Self> {
        let (_, rest) = stat.rsplit_once(')')?;
        let mut fields = rest.split_whitespace().skip(11);
        let mut next = || fields.next()?.parse::<u64>().ok();
        Some(Self {
            utime: next()?,
            stime: next()?,
            cutime: next()?,
            cstime: next()?,
        })
    }

    pub fn total(&self) -> u64 {
        self.utime + self.stime + self.cutime + self.cstime
    }
}

/// Previous counter totals for one pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuBaseline {
    pub prev_sys_total: u64,
    pub prev_proc_total: u64,
}

/// Outcome of one sampling attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuSample {
    /// Counter files missing; baseline untouched.
    Unavailable,
    /// Counter line short or unparsable; baseline untouched.
    Malformed,
    /// First snapshot for the pid; baseline stored.
    Baseline,
    /// Utilization since the previous snapshot, in percent of one core.
    Usage(f64),
}

impl CpuSample {
    /// Usage in percent, 0 for every non-measurement outcome.
    pub fn usage(self) -> f64 {
        match self {
            Self::Usage(usage) => usage,
            _ => 0.0,
        }
    }
}

/// Compute usage from a baseline and fresh totals.
pub fn compute_usage(baseline: CpuBaseline, sys_total: u64, proc_total: u64, cores: usize) -> f64 {
    let sys_delta = sys_total.saturating_sub(baseline.prev_sys_total);
    if sys_delta == 0 {
        return 0.0;
    }
    let proc_delta = proc_total.saturating_sub(baseline.prev_proc_total);
    let usage = proc_delta as f64 / sys_delta as f64 * 100.0 * cores as f64;
    (usage * 10.0).round() / 10.0
}

/// Per-pid CPU sampler holding one baseline per monitored pid.
#[derive(Debug, Default)]
pub struct CpuSampler {
    baselines: HashMap<u32, CpuBaseline>,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of `pid` and compare it with the stored baseline.
    pub fn sample(&mut self, source: &dyn ProcSource, pid: u32) -> CpuSample {
        let (Some(sys_line), Some(proc_line)) = (source.system_stat(), source.process_stat(pid))
        else {
            return CpuSample::Unavailable;
        };
        let (Some(sys), Some(process)) = (
            SystemCpuTimes::parse(&sys_line),
            ProcessCpuTimes::parse(&proc_line),
        ) else {
            tracing::debug!(pid, "discarding malformed cpu snapshot");
            return CpuSample::Malformed;
        };

        let sys_total = sys.total();
        let proc_total = process.total();
        let previous = self.baselines.insert(
            pid,
            CpuBaseline {
                prev_sys_total: sys_total,
                prev_proc_total: proc_total,
            },
        );

        match previous {
            None => CpuSample::Baseline,
            Some(baseline) => CpuSample::Usage(compute_usage(
                baseline,
                sys_total,
                proc_total,
                source.cpu_count(),
            )),
        }
    }

    pub fn baseline(&self, pid: u32) -> Option<CpuBaseline> {
        self.baselines.get(&pid).copied()
    }

    /// Drop the baseline of a pid that is no longer watched.
    pub fn forget(&mut self, pid: u32) {
        self.baselines.remove(&pid);
    }
}
