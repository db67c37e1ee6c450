//! Linked instances: introspection and invocation.
//!
//! A [`LinkedInstance`] owns the store its instance lives in. The pair is
//! created together by [`crate::ModuleLinker::instantiate`] and released
//! together, either explicitly through [`LinkedInstance::release`] or
//! implicitly when a call fails. A released pair answers every further
//! request with [`RuntimeError::StoreReleased`].

use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Extern, Instance, Store, Trap};

use crate::export::ExportDescriptor;
use crate::store::{CallMetrics, HostContext, calculate_fuel_consumed, get_remaining_fuel};
use crate::value::{ValueKind, WasmValue};
use luawasm_common::RuntimeError;

/// Lifecycle state of a [`LinkedInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Store alive; exports can be queried and called.
    Linked,
    /// Store dropped by an explicit release.
    Released,
    /// Store dropped because a call failed.
    CallFailed,
}

/// An instance together with the store it lives in.
pub struct LinkedInstance {
    instance: Instance,
    store: Option<Store<HostContext>>,
    store_id: String,
    state: InstanceState,
    /// Metrics of the store at the moment it was dropped.
    final_metrics: Option<CallMetrics>,
}

impl LinkedInstance {
    pub(crate) fn new(store: Store<HostContext>, instance: Instance) -> Self {
        let store_id = store.data().store_id.clone();
        Self {
            instance,
            store: Some(store),
            store_id,
            state: InstanceState::Linked,
            final_metrics: None,
        }
    }

    /// Identifier of the backing store.
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Returns `true` while the store is alive.
    pub fn is_alive(&self) -> bool {
        self.store.is_some()
    }

    /// Call metrics of the backing store, or of the last call if that call
    /// failed and took the store with it.
    pub fn metrics(&self) -> Option<&CallMetrics> {
        match &self.store {
            Some(store) => Some(&store.data().metrics),
            None => self.final_metrics.as_ref(),
        }
    }

    /// Drop the store. Idempotent.
    pub fn release(&mut self) {
        if self.store.take().is_some() {
            self.state = InstanceState::Released;
            debug!(store_id = %self.store_id, "Store released");
        }
    }

    /// Describe the export called `name`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::StoreReleased`] if the store is gone
    /// - [`RuntimeError::ExportNotFound`] if there is no such export
    /// - [`RuntimeError::UnknownItemType`] for export kinds that cannot be
    ///   described
    pub fn describe_export(&mut self, name: &str) -> Result<ExportDescriptor, RuntimeError> {
        let store = self.store.as_mut().ok_or(RuntimeError::StoreReleased)?;

        let Some(item) = self.instance.get_export(&mut *store, name) else {
            debug!(store_id = %self.store_id, name, "Export not found");
            return Err(RuntimeError::export_not_found(name));
        };

        ExportDescriptor::from_extern_type(name, &item.ty(&*store))
    }

    /// Call the exported function `name`.
    ///
    /// `params` carry their own kind tags; `result_kinds` tell the engine
    /// what each result slot holds. Parameters are not checked against the
    /// declared signature here; the engine rejects mismatches as a call
    /// failure. Result tags are checked after the call returns.
    ///
    /// On success, exactly `result_kinds.len()` values are returned in
    /// order. On a trap or engine error the store is dropped and the pair
    /// moves to [`InstanceState::CallFailed`].
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::StoreReleased`] if the store is gone
    /// - [`RuntimeError::FunctionNotFound`] if `name` is missing or not a
    ///   function (the store is kept)
    /// - [`RuntimeError::Trap`] if execution trapped
    /// - [`RuntimeError::Engine`] for any other call failure
    /// - [`RuntimeError::BadArgument`] if a result tag does not match the
    ///   returned value (the store is kept)
    #[instrument(skip(self, params, result_kinds), fields(store_id = %self.store_id))]
    pub fn invoke(
        &mut self,
        name: &str,
        params: &[WasmValue],
        result_kinds: &[ValueKind],
    ) -> Result<Vec<WasmValue>, RuntimeError> {
        let store = self.store.as_mut().ok_or(RuntimeError::StoreReleased)?;

        let Some(Extern::Func(func)) = self.instance.get_export(&mut *store, name) else {
            return Err(RuntimeError::function_not_found(name));
        };

        let args: Vec<_> = params.iter().map(|value| value.to_val()).collect();
        let mut slots: Vec<_> = result_kinds.iter().map(|kind| kind.zero()).collect();

        let start = Instant::now();
        let initial_fuel = get_remaining_fuel(store).unwrap_or(0);

        let result = func.call(&mut *store, &args, &mut slots);

        let fuel_consumed = calculate_fuel_consumed(initial_fuel, store);
        let duration = start.elapsed();
        let metrics = &mut store.data_mut().metrics;
        metrics.fuel_consumed += fuel_consumed;
        metrics.last_duration = Some(duration);

        if let Err(e) = result {
            metrics.failures += 1;
            let err = classify_call_error(&e);
            self.fail();
            return Err(err);
        }
        metrics.calls += 1;

        debug!(
            duration_us = duration.as_micros(),
            fuel_consumed, "Call completed"
        );

        result_kinds
            .iter()
            .zip(&slots)
            .map(|(kind, slot)| WasmValue::from_val(*kind, slot))
            .collect()
    }

    fn fail(&mut self) {
        self.final_metrics = self.store.take().map(|store| store.data().metrics.clone());
        self.state = InstanceState::CallFailed;
        info!(store_id = %self.store_id, "Store released after failed call");
    }
}

impl std::fmt::Debug for LinkedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedInstance")
            .field("store_id", &self.store_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Split a call failure into the trap and engine-error channels.
fn classify_call_error(error: &wasmtime::Error) -> RuntimeError {
    let (message, code) = extract_trap_info(error);

    match code {
        Some(code) => {
            if is_out_of_fuel(error) {
                warn!(trap_message = %message, "Call terminated: fuel exhausted");
                RuntimeError::fuel_exhausted(message, Some(code))
            } else {
                warn!(trap_message = %message, trap_code = %code, "Call trapped");
                RuntimeError::trap(message, Some(code))
            }
        }
        None => {
            error!(error = %message, "Call failed");
            RuntimeError::engine(message)
        }
    }
}

/// Extract human-readable trap information.
///
/// For traps the message is the trap description alone; the backtrace the
/// engine attaches is left to the debug log.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    match error.downcast_ref::<Trap>() {
        Some(trap) => {
            debug!(detail = %format!("{error:?}"), "Trap detail");
            (trap.to_string(), Some(format!("{trap:?}")))
        }
        None => (format!("{error:#}"), None),
    }
}

/// Check if an error is due to fuel exhaustion.
fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompiledModule, ModuleLinker, WasmEngine};
    use luawasm_common::{EngineConfig, ExecutionConfig, LinkerConfig};

    const ARITH_WAT: &str = r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                (i32.add (local.get 0) (local.get 1)))
            (func (export "boom") unreachable)
            (memory (export "memory") 1)
        )
    "#;

    fn instantiate(wat: &str) -> LinkedInstance {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let linker = ModuleLinker::new(&engine, &LinkerConfig::default()).unwrap();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        linker
            .instantiate(&engine, &module, &ExecutionConfig::default())
            .unwrap()
            .into_result()
            .unwrap()
    }

    #[test]
    fn test_invoke_add() {
        let mut instance = instantiate(ARITH_WAT);

        let results = instance
            .invoke(
                "add",
                &[WasmValue::I32(2), WasmValue::I32(3)],
                &[ValueKind::I32],
            )
            .unwrap();

        assert_eq!(results, vec![WasmValue::I32(5)]);
        assert_eq!(instance.metrics().unwrap().calls, 1);
    }

    #[test]
    fn test_trap_releases_store() {
        let mut instance = instantiate(ARITH_WAT);

        let err = instance.invoke("boom", &[], &[]).unwrap_err();
        assert!(err.is_trap());
        assert!(!err.to_string().is_empty());
        assert_eq!(instance.state(), InstanceState::CallFailed);
        assert!(!instance.is_alive());

        let metrics = instance.metrics().unwrap();
        assert_eq!((metrics.calls, metrics.failures), (0, 1));

        let err = instance.invoke("add", &[], &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::StoreReleased));
    }

    #[test]
    fn test_missing_function_keeps_store() {
        let mut instance = instantiate(ARITH_WAT);

        let err = instance.invoke("nope", &[], &[]).unwrap_err();
        assert_eq!(err.to_string(), "failed to get the exported function");

        let err = instance.invoke("memory", &[], &[]).unwrap_err();
        assert!(err.is_not_found());
        assert!(instance.is_alive());
    }

    #[test]
    fn test_signature_mismatch_is_engine_error() {
        let mut instance = instantiate(ARITH_WAT);

        let err = instance
            .invoke("add", &[WasmValue::I32(1)], &[ValueKind::I32])
            .unwrap_err();

        assert!(matches!(err, RuntimeError::Engine { .. }));
        assert!(!instance.is_alive());
    }

    #[test]
    fn test_describe_export() {
        let mut instance = instantiate(ARITH_WAT);

        let add = instance.describe_export("add").unwrap();
        assert!(add.is_func());

        let err = instance.describe_export("missing").unwrap_err();
        assert_eq!(err.to_string(), "failed to get the exported item");

        let memory = instance.describe_export("memory").unwrap();
        assert_eq!(memory.kind.type_name(), "memory");
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut instance = instantiate(ARITH_WAT);

        instance.release();
        instance.release();

        assert_eq!(instance.state(), InstanceState::Released);
        assert!(instance.metrics().is_none());
        assert!(matches!(
            instance.describe_export("add"),
            Err(RuntimeError::StoreReleased)
        ));
    }

    #[test]
    fn test_out_of_fuel_is_trap() {
        let engine = WasmEngine::new(&EngineConfig {
            fuel_metering: true,
            ..Default::default()
        })
        .unwrap();
        let linker = ModuleLinker::new(&engine, &LinkerConfig::default()).unwrap();
        let module = CompiledModule::from_wat(
            engine.inner(),
            r#"(module (func (export "spin") (loop $forever (br $forever))))"#,
        )
        .unwrap();
        let execution = ExecutionConfig {
            max_fuel: 10_000,
            ..Default::default()
        };
        let mut instance = linker
            .instantiate(&engine, &module, &execution)
            .unwrap()
            .into_result()
            .unwrap();

        let err = instance.invoke("spin", &[], &[]).unwrap_err();
        assert!(err.is_resource_limit());
        assert!(matches!(err, RuntimeError::Trap { out_of_fuel: true, .. }));
    }

    #[test]
    fn test_unreachable_is_not_resource_limit() {
        let mut instance = instantiate(ARITH_WAT);

        let err = instance.invoke("boom", &[], &[]).unwrap_err();
        assert!(err.is_trap());
        assert!(!err.is_resource_limit());
    }

    #[test]
    fn test_mistagged_result_is_bad_argument() {
        let mut instance = instantiate(ARITH_WAT);

        let err = instance
            .invoke(
                "add",
                &[WasmValue::I32(2), WasmValue::I32(3)],
                &[ValueKind::F32],
            )
            .unwrap_err();

        assert!(matches!(err, RuntimeError::BadArgument { .. }), "got: {err:?}");
        // The call itself completed, so the store stays usable.
        assert!(instance.is_alive());
        assert_eq!(instance.metrics().unwrap().calls, 1);
    }
}
