//! Common types, errors, and configuration for luawasm.
//!
//! This crate provides shared functionality used across the luawasm workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for engines, stores and linkers
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, ExecutionConfig, LinkerConfig, OptLevel, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, ScriptConfig};
pub use error::RuntimeError;
