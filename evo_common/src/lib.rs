//! EVO Common Library
//!
//! This crate provides shared constants and configuration loading utilities
//! for the EVO worker workspace.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Default limits and stagger steps
//! - [`worker`] - Worker supervisor configuration and its resolution
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! evo = { package = "evo_common", path = "../evo_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use evo_common::config::ConfigLoader;
//! use evo_common::worker::{WorkerConfig, WorkerSettings};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod worker;
