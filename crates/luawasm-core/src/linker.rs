//! Import resolution and instantiation.
//!
//! [`ModuleLinker`] owns an import registry bound to one engine and turns a
//! [`CompiledModule`] into a [`LinkedInstance`]: a fresh store plus the
//! instance living in it. Instantiation can fail in two ways that the engine
//! reports separately, a link error or a trap raised by the start function,
//! and [`InstantiateOutcome`] keeps them apart.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use wasmtime::{Linker, Trap};

use crate::instance::LinkedInstance;
use crate::store::{HostContext, create_store};
use crate::{CompiledModule, WasmEngine};
use luawasm_common::{ExecutionConfig, LinkerConfig, RuntimeError};

/// Result of instantiating a module.
#[derive(Debug)]
pub enum InstantiateOutcome {
    /// The module was linked and its start function (if any) returned.
    Instantiated(LinkedInstance),

    /// Import resolution or linking failed.
    LinkError {
        /// Engine diagnostic.
        message: String,
    },

    /// The start function trapped.
    Trap {
        /// Description of the trap.
        message: String,
    },
}

impl InstantiateOutcome {
    /// Returns `true` if instantiation succeeded.
    pub fn is_instantiated(&self) -> bool {
        matches!(self, Self::Instantiated(_))
    }

    /// Returns `true` if instantiation trapped.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }

    /// Collapse into a `Result`, mapping both failure channels to errors.
    pub fn into_result(self) -> Result<LinkedInstance, RuntimeError> {
        match self {
            Self::Instantiated(instance) => Ok(instance),
            Self::LinkError { message } => Err(RuntimeError::link(message)),
            Self::Trap { message } => Err(RuntimeError::trap(message, None)),
        }
    }
}

/// Import registry bound to one engine; reusable across instantiations.
pub struct ModuleLinker {
    linker: Linker<HostContext>,
    config: LinkerConfig,
}

impl ModuleLinker {
    /// Create a new linker for `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::LinkerCreation`] if WASI imports cannot be
    /// registered.
    pub fn new(engine: &WasmEngine, config: &LinkerConfig) -> Result<Self, RuntimeError> {
        let mut linker = Linker::new(engine.inner());
        linker.allow_shadowing(config.allow_shadowing);

        if config.wasi {
            wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, HostContext::wasi_mut)
                .map_err(|e| RuntimeError::LinkerCreation {
                    reason: e.to_string(),
                })?;
            debug!("WASI preview1 imports registered");
        }

        Ok(Self {
            linker,
            config: config.clone(),
        })
    }

    /// Instantiate `module` in a new store.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::StoreCreation`] if the store cannot be set up.
    /// Link errors and start-function traps are not errors at this level;
    /// they come back as [`InstantiateOutcome`] variants, and the store is
    /// dropped before returning.
    #[instrument(skip_all, fields(module = %module.content_hash()))]
    pub fn instantiate(
        &self,
        engine: &WasmEngine,
        module: &CompiledModule,
        execution: &ExecutionConfig,
    ) -> Result<InstantiateOutcome, RuntimeError> {
        if !engine.same(self.linker.engine()) || !engine.same(module.inner().engine()) {
            return Ok(InstantiateOutcome::LinkError {
                message: "linker, module and engine must share one engine".to_string(),
            });
        }

        let start = Instant::now();
        let mut store = create_store(engine, execution, &self.config)?;

        match self.linker.instantiate(&mut store, module.inner()) {
            Ok(instance) => {
                info!(
                    store_id = %store.data().store_id,
                    duration_ms = start.elapsed().as_millis(),
                    "Module instantiated"
                );
                Ok(InstantiateOutcome::Instantiated(LinkedInstance::new(
                    store, instance,
                )))
            }
            Err(e) => {
                if let Some(trap) = e.downcast_ref::<Trap>() {
                    warn!(trap = %trap, "Start function trapped");
                    Ok(InstantiateOutcome::Trap {
                        message: trap.to_string(),
                    })
                } else {
                    warn!(error = %e, "Instantiation failed");
                    Ok(InstantiateOutcome::LinkError {
                        message: format!("{e:#}"),
                    })
                }
            }
        }
    }
}

impl std::fmt::Debug for ModuleLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLinker")
            .field("wasi", &self.config.wasi)
            .finish_non_exhaustive()
    }
}
