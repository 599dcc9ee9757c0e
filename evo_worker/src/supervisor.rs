//! # Worker Supervisor
//!
//! The single per-process instance that owns every monitoring component and
//! drives them from one [`TimerScheduler`]. The host constructs it once at
//! worker startup, calls [`start`](WorkerSupervisor::start), gates work
//! through [`try_admit`](WorkerSupervisor::try_admit) /
//! [`release`](WorkerSupervisor::release), and feeds the loop with
//! [`run_due`](WorkerSupervisor::run_due) until the supervisor reports
//! [`DrainState::Terminated`].
//!
//! ```text
//!  AdmissionController ──counters──► ThresholdMonitor ─┐
//!                                                      ├─► DrainController ──► WorkerHost
//!  PidRegistry ──peer pid──► PeerWatchdog ──kill──►    │     (deny / terminate)
//!                                   MaxLiveTime timer ─┘
//! ```
//!
//! All calls happen on one thread, so no component needs locking.

use std::time::Instant;

use evo_common::worker::WorkerSettings;
use tracing::{debug, info};

use crate::admission::{AdmissionController, CeilingMode};
use crate::drain::{DrainController, DrainReason, DrainState, PollOutcome, TransitionResult};
use crate::error::WorkerResult;
use crate::host::{DrainHooks, WorkerHost};
use crate::peer::{PeerTerminator, PeerVerdict, PeerWatchdog, SignalTerminator};
use crate::procfs::{ProcFs, ProcSource};
use crate::registry::PidRegistry;
use crate::telemetry::{MetricsSink, TelemetryReporter, TracingMetricsSink};
use crate::threshold::{ThresholdMonitor, WorkCounters};
use crate::timer::{TimerHandle, TimerKind, TimerScheduler};

/// Timers owned by the supervisor; each id is also the event it delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorTimer {
    /// Repeating threshold check.
    ThresholdCheck,
    /// Repeating ring-neighbor audit.
    PeerWatchdog,
    /// One-shot forced drain after the maximum lifetime.
    MaxLiveTime,
    /// One-shot quiescence poll, re-armed while waiting.
    DrainPoll,
    /// Repeating memory metric.
    Telemetry,
}

/// External collaborators of the supervisor.
pub struct Collaborators {
    pub host: Box<dyn WorkerHost>,
    pub registry: Box<dyn PidRegistry>,
    pub terminator: Box<dyn PeerTerminator>,
    pub metrics: Box<dyn MetricsSink>,
    pub proc_source: Box<dyn ProcSource>,
}

impl Collaborators {
    /// Host procfs, `SIGKILL` peer termination and log-backed metrics.
    pub fn system(host: impl WorkerHost + 'static, registry: impl PidRegistry + 'static) -> Self {
        Self {
            host: Box::new(host),
            registry: Box::new(registry),
            terminator: Box::new(SignalTerminator),
            metrics: Box::new(TracingMetricsSink),
            proc_source: Box::new(ProcFs::new()),
        }
    }
}

/// Health and drain supervisor for one worker process.
pub struct WorkerSupervisor {
    settings: WorkerSettings,
    pid: u32,
    admission: AdmissionController,
    threshold: ThresholdMonitor,
    peer: PeerWatchdog,
    drain: DrainController,
    telemetry: TelemetryReporter,
    hooks: DrainHooks,
    timers: TimerScheduler<SupervisorTimer>,
    threshold_timer: Option<TimerHandle<SupervisorTimer>>,
    live_timer: Option<TimerHandle<SupervisorTimer>>,
    collab: Collaborators,
}

impl WorkerSupervisor {
    /// Build the supervisor for this process (`pid`) from resolved settings.
    /// Nothing is scheduled or published until [`start`](Self::start).
    pub fn new(settings: WorkerSettings, pid: u32, collab: Collaborators) -> Self {
        let mode = if settings.strict_concurrency {
            CeilingMode::Inclusive
        } else {
            CeilingMode::Legacy
        };
        Self {
            admission: AdmissionController::with_mode(settings.max_concurrency, mode),
            threshold: ThresholdMonitor::new(&settings, pid),
            peer: PeerWatchdog::new(&settings),
            drain: DrainController::new(settings.worker_id),
            telemetry: TelemetryReporter::new(&settings),
            hooks: DrainHooks::default(),
            timers: TimerScheduler::new(),
            threshold_timer: None,
            live_timer: None,
            settings,
            pid,
            collab,
        }
    }

    /// Publish this worker's pid and arm the periodic components.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Registry` if the pid cannot be published.
    pub fn start(&mut self, now: Instant) -> WorkerResult<()> {
        let worker_id = self.settings.worker_id;
        self.collab.registry.publish(worker_id, self.pid)?;

        self.live_timer = Some(self.timers.schedule(
            SupervisorTimer::MaxLiveTime,
            self.settings.max_live_time,
            TimerKind::OneShot,
            now,
        ));
        self.threshold_timer = Some(self.timers.schedule(
            SupervisorTimer::ThresholdCheck,
            self.threshold.check_interval(),
            TimerKind::Repeating,
            now,
        ));
        if self.peer.peer_index().is_some() {
            self.timers.schedule(
                SupervisorTimer::PeerWatchdog,
                self.settings.peer_check_interval,
                TimerKind::Repeating,
                now,
            );
        }
        if let Some(interval) = self.telemetry.interval() {
            self.timers
                .schedule(SupervisorTimer::Telemetry, interval, TimerKind::Repeating, now);
        }

        info!(
            worker_id,
            pid = self.pid,
            peer = ?self.peer.peer_index(),
            max_live_time_ms = self.settings.max_live_time.as_millis() as u64,
            "worker supervisor started"
        );
        Ok(())
    }

    // ─── Admission ──────────────────────────────────────────────────

    /// Admit one unit of work; `false` when over the concurrency ceiling.
    pub fn try_admit(&mut self) -> bool {
        self.admission.try_admit()
    }

    /// Release one admitted unit.
    pub fn release(&mut self) {
        self.admission.release();
    }

    /// Count one inbound protocol message.
    pub fn count_message(&mut self) {
        self.admission.count_message();
    }

    // ─── Hooks ──────────────────────────────────────────────────────

    /// Register the callback run once when drain begins.
    pub fn set_pre_close_hook(&mut self, hook: impl FnMut() + 'static) {
        self.hooks.set_pre_close(hook);
    }

    /// Register the predicate consulted before the final exit.
    pub fn set_readiness_predicate(&mut self, predicate: impl FnMut() -> bool + 'static) {
        self.hooks.set_readiness(predicate);
    }

    // ─── Drain ──────────────────────────────────────────────────────

    /// Begin the drain sequence. Only the first call takes effect.
    pub fn begin_drain(&mut self, reason: DrainReason, now: Instant) -> TransitionResult {
        let result = self
            .drain
            .begin_drain(reason, self.collab.host.as_mut(), &mut self.hooks);
        if !matches!(result, TransitionResult::Ok(_)) {
            return result;
        }
        self.output("ClosePre");

        if let Some(handle) = self.threshold_timer.take() {
            self.timers.cancel(handle);
        }
        if let Some(handle) = self.live_timer.take() {
            self.timers.cancel(handle);
        }

        self.poll_quiescence(now);
        result
    }

    fn poll_quiescence(&mut self, now: Instant) {
        self.output("CloseCheck");
        let outcome = self.drain.poll(
            self.admission.in_flight(),
            self.collab.host.as_mut(),
            &mut self.hooks,
        );
        match outcome {
            PollOutcome::Waiting => {
                self.timers.schedule(
                    SupervisorTimer::DrainPoll,
                    self.settings.drain_poll_interval,
                    TimerKind::OneShot,
                    now,
                );
            }
            PollOutcome::Terminated => {
                self.output("Close");
                info!(worker_id = self.settings.worker_id, "close");
                self.timers = TimerScheduler::new();
            }
            PollOutcome::Idle => {}
        }
    }

    // ─── Event loop ─────────────────────────────────────────────────

    /// Earliest pending timer deadline; `None` once terminated.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Deliver every timer due at `now`. Returns the number delivered.
    pub fn run_due(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(id) = self.timers.pop_due(now) {
            self.on_timer(id, now);
            fired += 1;
        }
        fired
    }

    /// Handle one fired timer.
    pub fn on_timer(&mut self, id: SupervisorTimer, now: Instant) {
        match id {
            SupervisorTimer::ThresholdCheck => self.threshold_tick(now),
            SupervisorTimer::PeerWatchdog => self.peer_tick(),
            SupervisorTimer::MaxLiveTime => {
                self.live_timer = None;
                self.begin_drain(DrainReason::MaxLiveTime, now);
            }
            SupervisorTimer::DrainPoll => self.poll_quiescence(now),
            SupervisorTimer::Telemetry => self
                .telemetry
                .report(self.collab.proc_source.as_ref(), self.collab.metrics.as_mut()),
        }
    }

    fn threshold_tick(&mut self, now: Instant) {
        self.output("check");
        let counters = WorkCounters {
            total_requests: self.admission.total_requests(),
            total_messages: self.admission.total_messages(),
        };
        if let Some(reason) = self
            .threshold
            .check(counters, self.collab.proc_source.as_ref())
        {
            self.begin_drain(reason, now);
        }
    }

    fn peer_tick(&mut self) {
        let verdict = self.peer.tick(
            self.collab.registry.as_ref(),
            self.collab.proc_source.as_ref(),
            self.collab.terminator.as_mut(),
        );
        if let PeerVerdict::Killed { pid, usage } = verdict {
            info!(worker_id = self.settings.worker_id, pid, usage, "peer worker terminated");
        }
    }

    fn output(&self, stage: &str) {
        if !self.settings.debug {
            return;
        }
        info!(
            stage,
            worker_id = self.settings.worker_id,
            in_flight = self.admission.in_flight(),
            total_requests = self.admission.total_requests(),
            "worker monitor"
        );
    }

    // ─── Queries ────────────────────────────────────────────────────

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> DrainState {
        self.drain.state()
    }

    pub fn drain_reason(&self) -> Option<DrainReason> {
        self.drain.reason()
    }

    pub fn is_deny_request(&self) -> bool {
        self.drain.is_deny_request()
    }

    pub fn is_terminated(&self) -> bool {
        self.drain.state() == DrainState::Terminated
    }

    pub fn in_flight(&self) -> u32 {
        self.admission.in_flight()
    }

    pub fn total_requests(&self) -> u64 {
        self.admission.total_requests()
    }

    pub fn total_messages(&self) -> u64 {
        self.admission.total_messages()
    }

    /// Over-limit streak of the watched peer.
    pub fn peer_streak(&self) -> u32 {
        self.peer.over_limit_streak()
    }

    /// Quiescence polls performed since drain began.
    pub fn drain_polls(&self) -> u64 {
        self.drain.polls()
    }

    /// Whether `id` currently has a live timer.
    pub fn is_scheduled(&self, id: SupervisorTimer) -> bool {
        self.timers.is_scheduled(id)
    }
}

impl std::fmt::Debug for WorkerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSupervisor")
            .field("worker_id", &self.settings.worker_id)
            .field("pid", &self.pid)
            .field("state", &self.drain.state())
            .field("in_flight", &self.admission.in_flight())
            .finish_non_exhaustive()
    }
}
