//! Shared fixtures for supervisor integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use evo_common::worker::WorkerConfig;
use evo_worker::WorkerResult;
use evo_worker::host::WorkerHost;
use evo_worker::peer::PeerTerminator;
use evo_worker::procfs::ProcSource;
use evo_worker::registry::MemoryPidRegistry;
use evo_worker::supervisor::{Collaborators, WorkerSupervisor};
use evo_worker::telemetry::MetricsSink;
use serde_json::Value;

/// Host primitive calls observed by a test.
#[derive(Debug, Default)]
pub struct HostLog {
    pub denied: Vec<u32>,
    pub terminated: u32,
    /// In-flight count seen by the supervisor at each terminate call.
    pub in_flight_at_terminate: Vec<u32>,
}

#[derive(Clone, Default)]
pub struct RecordingHost {
    pub log: Rc<RefCell<HostLog>>,
    pub in_flight: Rc<Cell<u32>>,
}

impl WorkerHost for RecordingHost {
    fn deny_new_requests(&mut self, worker_id: u32) {
        self.log.borrow_mut().denied.push(worker_id);
    }

    fn terminate_process(&mut self) {
        let mut log = self.log.borrow_mut();
        log.terminated += 1;
        log.in_flight_at_terminate.push(self.in_flight.get());
    }
}

/// Scripted procfs: fixed resident memory, and a peer that burns a settable
/// share of one core between consecutive samples.
#[derive(Clone, Default)]
pub struct FakeProc {
    pub memory: Rc<Cell<Option<u64>>>,
    pub peer_percent: Rc<Cell<u64>>,
    sys_ticks: Rc<Cell<u64>>,
    proc_ticks: Rc<Cell<u64>>,
}

impl ProcSource for FakeProc {
    fn system_stat(&self) -> Option<String> {
        let t = self.sys_ticks.get() + 100;
        self.sys_ticks.set(t);
        self.proc_ticks
            .set(self.proc_ticks.get() + self.peer_percent.get());
        Some(format!("cpu  {t} 0 0 0 0 0 0 0 0 0"))
    }

    fn process_stat(&self, pid: u32) -> Option<String> {
        Some(format!(
            "{pid} (php worker) R 1 1 1 0 -1 0 0 0 0 0 {} 0 0 0 20 0 1 0",
            self.proc_ticks.get()
        ))
    }

    fn resident_bytes(&self) -> Option<u64> {
        self.memory.get()
    }

    fn cpu_count(&self) -> usize {
        1
    }
}

#[derive(Clone, Default)]
pub struct RecordingTerminator {
    pub killed: Rc<RefCell<Vec<u32>>>,
}

impl PeerTerminator for RecordingTerminator {
    fn kill(&mut self, pid: u32) -> WorkerResult<()> {
        self.killed.borrow_mut().push(pid);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub metrics: Rc<RefCell<Vec<(String, Value)>>>,
}

impl MetricsSink for RecordingSink {
    fn emit(&mut self, metric: &str, tags: Value) {
        self.metrics.borrow_mut().push((metric.to_string(), tags));
    }
}

/// A supervisor wired to recording collaborators.
pub struct Harness {
    pub supervisor: WorkerSupervisor,
    pub host: RecordingHost,
    pub proc_source: FakeProc,
    pub registry: MemoryPidRegistry,
    pub terminator: RecordingTerminator,
    pub sink: RecordingSink,
    pub t0: Instant,
}

impl Harness {
    pub fn new(config: WorkerConfig, worker_id: u32) -> Self {
        Self::with_registry(config, worker_id, MemoryPidRegistry::new())
    }

    pub fn with_registry(config: WorkerConfig, worker_id: u32, registry: MemoryPidRegistry) -> Self {
        let settings = config.resolve(worker_id).expect("valid config");
        let host = RecordingHost::default();
        let proc_source = FakeProc::default();
        proc_source.memory.set(Some(0));
        let terminator = RecordingTerminator::default();
        let sink = RecordingSink::default();

        let collab = Collaborators {
            host: Box::new(host.clone()),
            registry: Box::new(registry.clone()),
            terminator: Box::new(terminator.clone()),
            metrics: Box::new(sink.clone()),
            proc_source: Box::new(proc_source.clone()),
        };
        let mut supervisor = WorkerSupervisor::new(settings, 1000 + worker_id, collab);
        let t0 = Instant::now();
        supervisor.start(t0).expect("start");

        Self {
            supervisor,
            host,
            proc_source,
            registry,
            terminator,
            sink,
            t0,
        }
    }

    /// Admit through the supervisor, mirroring in-flight into the host.
    pub fn admit(&mut self) -> bool {
        let admitted = self.supervisor.try_admit();
        self.host.in_flight.set(self.supervisor.in_flight());
        admitted
    }

    pub fn release(&mut self) {
        self.supervisor.release();
        self.host.in_flight.set(self.supervisor.in_flight());
    }

    /// Advance virtual time to `t0 + ms` and deliver due timers.
    pub fn run_until(&mut self, ms: u64) -> usize {
        self.supervisor
            .run_due(self.t0 + std::time::Duration::from_millis(ms))
    }

    /// Step through every millisecond boundary in `[from, to]` at `step` ms.
    pub fn step(&mut self, from: u64, to: u64, step: u64) {
        let mut now = from;
        while now <= to {
            self.run_until(now);
            now += step;
        }
    }

    pub fn denied(&self) -> usize {
        self.host.log.borrow().denied.len()
    }

    pub fn terminated(&self) -> u32 {
        self.host.log.borrow().terminated
    }
}
