//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the leaf of the handle graph: modules, linkers and
//! stores are all derived from one. It is configured for synchronous
//! execution; every compile, link and call runs to completion on the
//! caller's thread.

use std::sync::Arc;

use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, PoolingAllocationConfig};

use luawasm_common::{EngineConfig, OptLevel, RuntimeError};

/// Shared compilation and runtime context.
///
/// Cloning is cheap and yields a handle to the same underlying engine.
///
/// # Example
///
/// ```ignore
/// use luawasm_common::EngineConfig;
/// use luawasm_core::WasmEngine;
///
/// let engine = WasmEngine::new(&EngineConfig::default())?;
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EngineCreation`] if the Wasmtime configuration
    /// is rejected (for example, an unsupported pooling setup).
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.consume_fuel(config.fuel_metering);
        wasmtime_config.wasm_threads(config.wasm_threads);
        wasmtime_config.cranelift_opt_level(match config.opt_level {
            OptLevel::None => wasmtime::OptLevel::None,
            OptLevel::Speed => wasmtime::OptLevel::Speed,
            OptLevel::SpeedAndSize => wasmtime::OptLevel::SpeedAndSize,
        });

        if config.pooling_allocator {
            let pooling_config = Self::create_pooling_config(config);

            wasmtime_config
                .allocation_strategy(InstanceAllocationStrategy::Pooling(pooling_config));

            info!(
                max_instances = config.max_instances,
                instance_memory_mb = config.instance_memory_mb,
                "Pooling allocator enabled"
            );
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            warn!(error = %e, "Wasmtime rejected engine configuration");
            RuntimeError::EngineCreation {
                reason: e.to_string(),
            }
        })?;

        info!(
            fuel_metering = config.fuel_metering,
            wasm_threads = config.wasm_threads,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    fn create_pooling_config(config: &EngineConfig) -> PoolingAllocationConfig {
        let mut pooling = PoolingAllocationConfig::default();

        pooling.total_core_instances(config.max_instances);
        pooling.total_memories(config.max_instances);
        pooling.total_tables(config.max_instances);

        let max_memory_bytes = (config.instance_memory_mb as usize) * 1024 * 1024;
        pooling.max_memory_size(max_memory_bytes);

        debug!(max_memory_bytes, "Pooling allocation config built");

        pooling
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Returns `true` if stores created from this engine meter fuel.
    pub fn is_fuel_metered(&self) -> bool {
        self.config.fuel_metering
    }

    /// Returns `true` if both handles refer to the same underlying engine.
    pub fn same(&self, other: &Engine) -> bool {
        Engine::same(&self.engine, other)
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("fuel_metering", &self.config.fuel_metering)
            .field("opt_level", &self.config.opt_level)
            .finish_non_exhaustive()
    }
}
