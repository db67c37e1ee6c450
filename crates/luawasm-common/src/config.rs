//! Configuration structures for luawasm.
//!
//! This module defines configuration options for the collaborators the
//! embedding layer drives:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (allocator, fuel, features)
//! - [`ExecutionConfig`]: Per-store limits (fuel, memory)
//! - [`LinkerConfig`]: Import registry settings (WASI, shadowing)

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// A host namespace is opened with one of these; every engine, store and
/// linker created through that namespace uses it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-store execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Linker configuration.
    #[serde(default)]
    pub linker: LinkerConfig,
}

/// Cranelift optimization level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimizations.
    None,
    /// Optimize for speed.
    #[default]
    Speed,
    /// Optimize for speed and size.
    SpeedAndSize,
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable the pooling allocator.
    ///
    /// Pre-reserves memory for a fixed number of instances. Off by default
    /// since an embedding usually runs a handful of instances.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable fuel metering.
    ///
    /// When enabled, every store starts with `execution.max_fuel` units and
    /// a call that runs out traps.
    #[serde(default)]
    pub fuel_metering: bool,

    /// Enable the threads proposal (required for shared memories).
    #[serde(default = "defaults::wasm_threads")]
    pub wasm_threads: bool,

    /// Cranelift optimization level.
    #[serde(default)]
    pub opt_level: OptLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            fuel_metering: false,
            wasm_threads: defaults::wasm_threads(),
            opt_level: OptLevel::default(),
        }
    }
}

/// Per-store execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel given to each new store.
    ///
    /// Only effective when `engine.fuel_metering` is enabled.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Maximum linear memory per memory, in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            max_memory_mb: defaults::max_memory_mb(),
        }
    }
}

impl ExecutionConfig {
    /// Get the memory limit in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// Linker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkerConfig {
    /// Register WASI preview-1 imports on every new linker.
    #[serde(default)]
    pub wasi: bool,

    /// Let WASI stdout/stderr write to the host process.
    #[serde(default = "defaults::inherit_stdio")]
    pub inherit_stdio: bool,

    /// Allow later definitions to replace earlier ones.
    #[serde(default)]
    pub allow_shadowing: bool,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            wasi: false,
            inherit_stdio: defaults::inherit_stdio(),
            allow_shadowing: false,
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        false
    }

    pub const fn max_instances() -> u32 {
        100
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn wasm_threads() -> bool {
        true
    }

    pub const fn max_fuel() -> u64 {
        10_000_000
    }

    pub const fn max_memory_mb() -> u32 {
        128
    }

    pub const fn inherit_stdio() -> bool {
        true
    }
}
