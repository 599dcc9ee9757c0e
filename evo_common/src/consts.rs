//! System-wide constants for the EVO worker workspace.
//!
//! Single source of truth for every default limit and stagger step.
//! Imported by all crates; do not duplicate these values elsewhere.

/// Default admission ceiling (`max_concurrency`).
pub const DEFAULT_MAX_CONCURRENCY: u32 = 500;

/// Default forced-drain age in milliseconds (`max_live_time`, 30 min).
pub const DEFAULT_MAX_LIVE_TIME_MS: u64 = 1_800_000;

/// Default threshold check period in milliseconds (`check_interval`).
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 5_000;

/// Default resident memory limit in bytes (1.5 GiB).
pub const DEFAULT_MEMORY_LIMIT: u64 = 1024 * 1024 * 1024 * 3 / 2;

/// Default lifetime request limit before stagger (`max_request`).
pub const DEFAULT_MAX_REQUEST: u64 = 100_000;

/// Default lifetime message limit before stagger (`msg_limit`).
pub const DEFAULT_MSG_LIMIT: u64 = 100_000;

/// Default peer CPU limit in percent (`cpu_limit`).
pub const DEFAULT_CPU_LIMIT: f64 = 95.0;

/// Default peer watchdog period in milliseconds.
pub const DEFAULT_PEER_CHECK_INTERVAL_MS: u64 = 1_000;

/// Consecutive over-limit peer samples before the peer is killed.
pub const DEFAULT_PEER_KILL_STREAK: u32 = 10;

/// Default self CPU limit in percent for the legacy self check.
pub const DEFAULT_SELF_CPU_LIMIT: f64 = 90.0;

/// Sustained overload window for the legacy self CPU check.
pub const SELF_CPU_WINDOW_MS: u64 = 60_000;

/// Minimum consecutive over-limit self samples for the legacy self check.
pub const SELF_CPU_MIN_STREAK: u32 = 3;

/// Quiescence poll period in milliseconds while draining.
pub const DEFAULT_DRAIN_POLL_INTERVAL_MS: u64 = 1_000;

/// Per-worker stagger added to `max_live_time` (3 min).
pub const LIVE_TIME_STAGGER_MS: u64 = 180_000;

/// Per-worker stagger added to the request limit.
pub const REQUEST_STAGGER: u64 = 1_500;

/// Per-worker stagger added to the message limit.
pub const MESSAGE_STAGGER: u64 = 5_000;

/// Metric series for worker memory telemetry.
pub const BIZ_WORKER_MEMORY: &str = "biz_worker_memory";

/// Default directory of the shared pid registry.
pub const DEFAULT_REGISTRY_DIR: &str = "/dev/shm/evo_workers";

/// Default worker configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/evo/worker.toml";
