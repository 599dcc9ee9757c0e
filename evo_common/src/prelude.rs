//! Prelude module for common re-exports.
//!
//! ```rust
//! use evo_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::worker::{TelemetryConfig, WorkerConfig, WorkerSettings};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{BIZ_WORKER_MEMORY, DEFAULT_CONFIG_PATH, DEFAULT_REGISTRY_DIR};
