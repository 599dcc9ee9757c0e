//! Worker supervisor configuration.
//!
//! [`WorkerConfig`] mirrors the TOML file one-to-one: every limit is optional
//! and falls back to the defaults in [`crate::consts`]. [`WorkerConfig::resolve`]
//! validates it once for a given worker slot and produces [`WorkerSettings`],
//! the fully resolved values the supervisor runs with (defaults applied,
//! per-worker staggers added).
//!
//! # TOML Example
//!
//! ```toml
//! worker_num = 8
//! max_concurrency = 200
//! memory_limit = 1073741824
//! debug = false
//!
//! [telemetry]
//! enabled = true
//! interval = 10000
//!
//! [shared]
//! log_level = "info"
//! service_name = "evo-worker-pool"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SharedConfig};
use crate::consts::*;

/// Periodic memory telemetry settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Emit the memory metric at all.
    #[serde(default)]
    pub enabled: bool,
    /// Emission period in milliseconds. Required when enabled.
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Raw worker configuration as loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of workers in the group (ring size).
    pub worker_num: u32,
    /// Admission ceiling.
    #[serde(default)]
    pub max_concurrency: Option<u32>,
    /// Cap in-flight work at exactly `max_concurrency` instead of allowing
    /// one unit past it.
    #[serde(default)]
    pub strict_concurrency: bool,
    /// Forced drain age in milliseconds, before stagger.
    #[serde(default)]
    pub max_live_time: Option<u64>,
    /// Threshold tick period in milliseconds.
    #[serde(default)]
    pub check_interval: Option<u64>,
    /// Resident memory limit in bytes.
    #[serde(default)]
    pub memory_limit: Option<u64>,
    /// Lifetime request limit, before stagger.
    #[serde(default)]
    pub max_request: Option<u64>,
    /// Lifetime message limit, before stagger.
    #[serde(default)]
    pub msg_limit: Option<u64>,
    /// Peer CPU limit in percent.
    #[serde(default)]
    pub cpu_limit: Option<f64>,
    /// Peer watchdog period in milliseconds.
    #[serde(default)]
    pub peer_check_interval: Option<u64>,
    /// Consecutive over-limit peer samples before the peer is killed.
    #[serde(default)]
    pub peer_kill_streak: Option<u32>,
    /// Fold a self CPU check into the threshold tick.
    #[serde(default)]
    pub self_cpu_check: bool,
    /// Self CPU limit in percent.
    #[serde(default)]
    pub self_cpu_limit: Option<f64>,
    /// Quiescence poll period in milliseconds.
    #[serde(default)]
    pub drain_poll_interval: Option<u64>,
    /// Verbose per-stage diagnostics.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub shared: SharedConfig,
}

impl WorkerConfig {
    /// Configuration with every optional key unset.
    pub fn with_workers(worker_num: u32) -> Self {
        Self {
            worker_num,
            max_concurrency: None,
            strict_concurrency: false,
            max_live_time: None,
            check_interval: None,
            memory_limit: None,
            max_request: None,
            msg_limit: None,
            cpu_limit: None,
            peer_check_interval: None,
            peer_kill_streak: None,
            self_cpu_check: false,
            self_cpu_limit: None,
            drain_poll_interval: None,
            debug: false,
            telemetry: TelemetryConfig::default(),
            shared: SharedConfig::default(),
        }
    }

    /// Validate and resolve the configuration for worker slot `worker_id`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `worker_num` is zero or `worker_id` is outside the group
    /// - any interval, limit or streak is zero (or a CPU limit is not positive)
    /// - telemetry is enabled without a positive interval
    pub fn resolve(&self, worker_id: u32) -> Result<WorkerSettings, ConfigError> {
        self.shared.validate()?;

        if self.worker_num == 0 {
            return Err(invalid("worker_num must be at least 1"));
        }
        if worker_id >= self.worker_num {
            return Err(ConfigError::ValidationError(format!(
                "worker_id {worker_id} out of range [0, {})",
                self.worker_num
            )));
        }

        let max_concurrency = positive(
            "max_concurrency",
            self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
        )?;
        let max_live_time = positive(
            "max_live_time",
            self.max_live_time.unwrap_or(DEFAULT_MAX_LIVE_TIME_MS),
        )?;
        let check_interval = positive(
            "check_interval",
            self.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL_MS),
        )?;
        let memory_limit = positive(
            "memory_limit",
            self.memory_limit.unwrap_or(DEFAULT_MEMORY_LIMIT),
        )?;
        let max_request = positive(
            "max_request",
            self.max_request.unwrap_or(DEFAULT_MAX_REQUEST),
        )?;
        let msg_limit = positive("msg_limit", self.msg_limit.unwrap_or(DEFAULT_MSG_LIMIT))?;
        let peer_check_interval = positive(
            "peer_check_interval",
            self.peer_check_interval
                .unwrap_or(DEFAULT_PEER_CHECK_INTERVAL_MS),
        )?;
        let peer_kill_streak = positive(
            "peer_kill_streak",
            self.peer_kill_streak.unwrap_or(DEFAULT_PEER_KILL_STREAK),
        )?;
        let drain_poll_interval = positive(
            "drain_poll_interval",
            self.drain_poll_interval
                .unwrap_or(DEFAULT_DRAIN_POLL_INTERVAL_MS),
        )?;
        let cpu_limit = percent("cpu_limit", self.cpu_limit.unwrap_or(DEFAULT_CPU_LIMIT))?;
        let self_cpu_limit = percent(
            "self_cpu_limit",
            self.self_cpu_limit.unwrap_or(DEFAULT_SELF_CPU_LIMIT),
        )?;

        let telemetry_interval = if self.telemetry.enabled {
            match self.telemetry.interval {
                Some(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                _ => {
                    return Err(invalid(
                        "telemetry.interval must be > 0 when telemetry is enabled",
                    ));
                }
            }
        } else {
            None
        };

        let slot = u64::from(worker_id);
        Ok(WorkerSettings {
            worker_id,
            worker_num: self.worker_num,
            max_concurrency,
            strict_concurrency: self.strict_concurrency,
            memory_limit,
            request_limit: max_request + slot * REQUEST_STAGGER,
            message_limit: msg_limit + slot * MESSAGE_STAGGER,
            cpu_limit,
            peer_kill_streak,
            self_cpu_check: self.self_cpu_check,
            self_cpu_limit,
            check_interval: Duration::from_millis(check_interval),
            peer_check_interval: Duration::from_millis(peer_check_interval),
            drain_poll_interval: Duration::from_millis(drain_poll_interval),
            max_live_time: Duration::from_millis(max_live_time + slot * LIVE_TIME_STAGGER_MS),
            telemetry_interval,
            debug: self.debug,
        })
    }
}

/// Fully resolved, validated settings for one worker slot.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub worker_id: u32,
    pub worker_num: u32,
    pub max_concurrency: u32,
    pub strict_concurrency: bool,
    pub memory_limit: u64,
    /// `max_request` plus the per-worker stagger.
    pub request_limit: u64,
    /// `msg_limit` plus the per-worker stagger.
    pub message_limit: u64,
    pub cpu_limit: f64,
    pub peer_kill_streak: u32,
    pub self_cpu_check: bool,
    pub self_cpu_limit: f64,
    pub check_interval: Duration,
    pub peer_check_interval: Duration,
    pub drain_poll_interval: Duration,
    /// `max_live_time` plus the per-worker stagger.
    pub max_live_time: Duration,
    /// `Some` only when telemetry is enabled.
    pub telemetry_interval: Option<Duration>,
    pub debug: bool,
}

impl WorkerSettings {
    /// Slot index of the ring neighbor this worker audits.
    pub fn peer_index(&self) -> u32 {
        (self.worker_id + 1) % self.worker_num
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

fn positive<T: PartialEq + Default>(key: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::ValidationError(format!(
            "{key} must be greater than 0"
        )));
    }
    Ok(value)
}

fn percent(key: &str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "{key} must be a positive percentage, got {value}"
        )));
    }
    Ok(value)
}
