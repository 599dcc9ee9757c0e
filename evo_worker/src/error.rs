//! Error types for worker supervisor operations

use evo_common::config::ConfigError;
use thiserror::Error;

/// Errors that can occur while setting up or running the worker supervisor
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Invalid or missing configuration
    #[error("Configuration error: {source}")]
    Config {
        /// Source config error
        #[from]
        source: ConfigError,
    },

    /// Shared pid registry could not be read or written
    #[error("Pid registry error for worker {index}: {source}")]
    Registry {
        /// Worker slot index
        index: u32,
        /// Source IO error
        source: std::io::Error,
    },

    /// Signal delivery to a peer failed
    #[error("Failed to signal pid {pid}: {source}")]
    Signal {
        /// Target process ID
        pid: u32,
        /// Source nix error
        source: nix::Error,
    },

    /// Pid that cannot name a single process
    #[error("Refusing to signal invalid pid {pid}")]
    InvalidPid {
        /// Offending pid from the registry
        pid: u32,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

/// Result type for worker supervisor operations
pub type WorkerResult<T> = Result<T, WorkerError>;
