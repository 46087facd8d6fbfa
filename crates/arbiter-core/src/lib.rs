//! # arbiter-core
//!
//! Configuration types shared by the Arbiter crates.

pub mod config;

pub use config::{ArbiterConfig, ConfigError, ConsensusConfig, LoggerConfig, RetentionConfig};
