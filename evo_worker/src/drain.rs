//! Drain state machine: deny new work → wait for quiescence → exit.
//!
//! `Active → Draining → Quiescing → Terminated`.
//!
//! Entering `Draining` happens at most once per process no matter how many
//! triggers fire; every later trigger is rejected by the transition table.
//! `Quiescing` is left only through a quiescent poll, and a poll is only
//! quiescent when nothing is in flight, so the exit primitive can never run
//! with work outstanding. There is no drain timeout.

use std::fmt;

use crate::host::{DrainHooks, WorkerHost};

/// Why a drain was started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrainReason {
    /// Resident memory above the configured limit.
    MemoryLimit { used: u64, limit: u64 },
    /// Lifetime request count above the staggered limit.
    RequestLimit { total: u64, limit: u64 },
    /// Lifetime message count above the staggered limit.
    MessageLimit { total: u64, limit: u64 },
    /// Sustained self CPU overload.
    SelfCpuOverload { usage: f64, streak: u32 },
    /// Maximum lifetime elapsed.
    MaxLiveTime,
    /// Shutdown signal received by the host process.
    Signal,
    /// Explicit request from the host.
    Requested,
}

impl fmt::Display for DrainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryLimit { used, limit } => write!(f, "memory {used} > {limit} bytes"),
            Self::RequestLimit { total, limit } => write!(f, "requests {total} > {limit}"),
            Self::MessageLimit { total, limit } => write!(f, "messages {total} > {limit}"),
            Self::SelfCpuOverload { usage, streak } => {
                write!(f, "CPU_LIMIT: {usage}% for {streak} checks")
            }
            Self::MaxLiveTime => f.write_str("max live time reached"),
            Self::Signal => f.write_str("shutdown signal"),
            Self::Requested => f.write_str("requested by host"),
        }
    }
}

/// Drain lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Accepting work.
    Active,
    /// Entry actions in progress.
    Draining,
    /// Waiting for in-flight work and readiness.
    Quiescing,
    /// Exit primitive invoked. Terminal.
    Terminated,
}

/// Input to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEvent {
    /// A limit, timer or signal asked for a drain.
    Trigger,
    /// Entry actions finished.
    EntryDone,
    /// Poll found no in-flight work and a ready host.
    Quiescent,
    /// Poll found outstanding work or an unready host.
    NotQuiescent,
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Ok(DrainState),
    Rejected(&'static str),
}

/// Pure transition table.
pub fn transition(state: DrainState, event: DrainEvent) -> TransitionResult {
    use DrainEvent::*;
    use DrainState::*;

    match (state, event) {
        (Active, Trigger) => TransitionResult::Ok(Draining),
        (Draining, EntryDone) => TransitionResult::Ok(Quiescing),
        (Quiescing, NotQuiescent) => TransitionResult::Ok(Quiescing),
        (Quiescing, Quiescent) => TransitionResult::Ok(Terminated),
        (Terminated, _) => TransitionResult::Rejected("worker already terminated"),
        (_, Trigger) => TransitionResult::Rejected("drain already in progress"),
        (Active, _) => TransitionResult::Rejected("worker is not draining"),
        _ => TransitionResult::Rejected("invalid drain transition"),
    }
}

/// Outcome of one quiescence poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not quiescing; nothing was checked.
    Idle,
    /// Still waiting; poll again later.
    Waiting,
    /// Exit primitive invoked.
    Terminated,
}

/// Per-worker drain controller.
#[derive(Debug)]
pub struct DrainController {
    worker_id: u32,
    state: DrainState,
    reason: Option<DrainReason>,
    deny_request: bool,
    polls: u64,
}

impl DrainController {
    pub fn new(worker_id: u32) -> Self {
        Self {
            worker_id,
            state: DrainState::Active,
            reason: None,
            deny_request: false,
            polls: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> DrainState {
        self.state
    }

    /// Reason of the drain that won, if one started.
    pub fn reason(&self) -> Option<DrainReason> {
        self.reason
    }

    /// True from the moment drain begins.
    pub fn is_deny_request(&self) -> bool {
        self.deny_request
    }

    /// Quiescence polls performed so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    fn apply(&mut self, event: DrainEvent) -> TransitionResult {
        let result = transition(self.state, event);
        if let TransitionResult::Ok(next) = result {
            self.state = next;
        }
        result
    }

    /// Start draining: deny new work, tell the host, run the pre-close hook
    /// and move on to `Quiescing`.
    ///
    /// Only the first call has any effect; later calls are rejected and
    /// leave the host untouched. The caller cancels its periodic checks when
    /// this returns `Ok`.
    pub fn begin_drain(
        &mut self,
        reason: DrainReason,
        host: &mut dyn WorkerHost,
        hooks: &mut DrainHooks,
    ) -> TransitionResult {
        if let rejected @ TransitionResult::Rejected(_) = self.apply(DrainEvent::Trigger) {
            tracing::debug!(worker_id = self.worker_id, %reason, "drain trigger ignored");
            return rejected;
        }

        tracing::warn!(worker_id = self.worker_id, %reason, "worker draining");
        self.reason = Some(reason);
        self.deny_request = true;
        host.deny_new_requests(self.worker_id);
        hooks.pre_close();

        self.apply(DrainEvent::EntryDone)
    }

    /// Check for quiescence; on success invoke the exit primitive.
    pub fn poll(
        &mut self,
        in_flight: u32,
        host: &mut dyn WorkerHost,
        hooks: &mut DrainHooks,
    ) -> PollOutcome {
        if self.state != DrainState::Quiescing {
            return PollOutcome::Idle;
        }
        self.polls += 1;

        let ready = hooks.is_ready();
        let event = if ready && in_flight == 0 {
            DrainEvent::Quiescent
        } else {
            DrainEvent::NotQuiescent
        };

        match self.apply(event) {
            TransitionResult::Ok(DrainState::Terminated) => {
                tracing::info!(worker_id = self.worker_id, polls = self.polls, "worker quiescent, exiting");
                host.terminate_process();
                PollOutcome::Terminated
            }
            _ => {
                tracing::debug!(worker_id = self.worker_id, in_flight, ready, "waiting for quiescence");
                PollOutcome::Waiting
            }
        }
    }
}
