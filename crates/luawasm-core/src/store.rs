//! Per-instance store data and store creation.
//!
//! This module provides:
//! - [`HostContext`]: the data every [`Store`] carries
//! - [`CallMetrics`]: counters updated by each call
//! - [`create_store`]: store construction with limits and fuel applied

use std::time::Duration;

use tracing::debug;
use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use luawasm_common::{ExecutionConfig, LinkerConfig, RuntimeError};

/// Data attached to each store.
///
/// One store backs exactly one instance, so this doubles as the host-side
/// record of that instance.
pub struct HostContext {
    /// Identifier used in tracing spans.
    pub store_id: String,

    /// Execution metrics.
    pub metrics: CallMetrics,

    /// WASI preview-1 state, used only when the linker registers WASI.
    wasi: WasiP1Ctx,

    /// Memory and instance limits.
    limits: StoreLimits,
}

/// Call counters for one store.
#[derive(Debug, Clone, Default)]
pub struct CallMetrics {
    /// Calls completed successfully.
    pub calls: u64,

    /// Calls that trapped or failed.
    pub failures: u64,

    /// Fuel consumed across all calls.
    pub fuel_consumed: u64,

    /// Duration of the most recent call.
    pub last_duration: Option<Duration>,
}

impl HostContext {
    /// Create store data for a new instance.
    pub fn new(execution: &ExecutionConfig, linker: &LinkerConfig) -> Self {
        let mut builder = WasiCtxBuilder::new();
        if linker.inherit_stdio {
            builder.inherit_stdout().inherit_stderr();
        }

        let limits = StoreLimitsBuilder::new()
            .memory_size(execution.max_memory_bytes())
            .instances(1)
            .build();

        Self {
            store_id: uuid::Uuid::new_v4().to_string(),
            metrics: CallMetrics::default(),
            wasi: builder.build_p1(),
            limits,
        }
    }

    /// WASI state accessor handed to the linker.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("store_id", &self.store_id)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Create a new store bound to `engine`.
///
/// Installs the memory limiter and, when the engine meters fuel, tops the
/// store up with `execution.max_fuel`.
///
/// # Errors
///
/// Returns [`RuntimeError::StoreCreation`] if fuel cannot be set.
pub fn create_store(
    engine: &WasmEngine,
    execution: &ExecutionConfig,
    linker: &LinkerConfig,
) -> Result<Store<HostContext>, RuntimeError> {
    let context = HostContext::new(execution, linker);
    let store_id = context.store_id.clone();
    let mut store = Store::new(engine.inner(), context);

    store.limiter(|ctx| &mut ctx.limits);

    if engine.is_fuel_metered() {
        store
            .set_fuel(execution.max_fuel)
            .map_err(|e| RuntimeError::StoreCreation {
                reason: format!("Failed to set fuel: {e}"),
            })?;
    }

    debug!(store_id = %store_id, "Store created");

    Ok(store)
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<HostContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed since `initial_fuel` was read.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<HostContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
