//! Concurrency limiter and lifetime work counters.
//!
//! By default the ceiling check is `in_flight > max_concurrency`, so up to
//! `max_concurrency + 1` units can be in flight before rejection starts.
//! [`CeilingMode::Inclusive`] caps in-flight work at exactly
//! `max_concurrency`.

/// How `max_concurrency` bounds in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CeilingMode {
    /// Reject once `in_flight > max_concurrency`.
    #[default]
    Legacy,
    /// Reject once `in_flight >= max_concurrency`.
    Inclusive,
}

/// Admission gate for one worker.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    max_concurrency: u32,
    mode: CeilingMode,
    in_flight: u32,
    total_requests: u64,
    total_messages: u64,
}

impl AdmissionController {
    pub fn new(max_concurrency: u32) -> Self {
        Self::with_mode(max_concurrency, CeilingMode::Legacy)
    }

    pub fn with_mode(max_concurrency: u32, mode: CeilingMode) -> Self {
        Self {
            max_concurrency,
            mode,
            in_flight: 0,
            total_requests: 0,
            total_messages: 0,
        }
    }

    fn at_ceiling(&self) -> bool {
        match self.mode {
            CeilingMode::Legacy => self.in_flight > self.max_concurrency,
            CeilingMode::Inclusive => self.in_flight >= self.max_concurrency,
        }
    }

    /// Admit one unit of work. Returns `false` without changing any counter
    /// when the ceiling has been reached.
    pub fn try_admit(&mut self) -> bool {
        if self.at_ceiling() {
            return false;
        }
        self.in_flight += 1;
        self.total_requests += 1;
        true
    }

    /// Release one admitted unit. Must be paired with a successful
    /// [`try_admit`](Self::try_admit); an unpaired release is ignored.
    pub fn release(&mut self) {
        match self.in_flight.checked_sub(1) {
            Some(n) => self.in_flight = n,
            None => tracing::warn!("release without a matching admission"),
        }
    }

    /// Count one inbound protocol message.
    pub fn count_message(&mut self) {
        self.total_messages += 1;
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }

    pub fn mode(&self) -> CeilingMode {
        self.mode
    }
}
