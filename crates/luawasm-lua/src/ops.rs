//! The operations behind the `wasm_core` table.
//!
//! Return conventions follow the Lua idiom for recoverable failures:
//! constructors return the handle, or `nil` plus a message; `instantiate`
//! returns `nil, nil, message`; `get_export` returns `nil, message`.
//! `invoke` raises instead, since a failed call also destroys the store.

use mlua::{AnyUserData, Lua, MultiValue, Table, Value, Variadic};
use tracing::debug;

use luawasm_common::{RuntimeConfig, RuntimeError};
use luawasm_core::{CompiledModule, InstantiateOutcome, ModuleLinker, WasmEngine};

use crate::handles::{
    EngineHandle, HandleRegistry, InstanceHandle, LinkerHandle, ModuleHandle, StoreHandle,
    linked_pair,
};
use crate::marshal::{decode_call_args, descriptor_table, to_lua};

/// State shared by every function of one opened namespace.
pub struct Namespace {
    pub config: RuntimeConfig,
    pub registry: HandleRegistry,
}

impl Namespace {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: HandleRegistry::default(),
        }
    }
}

fn ok(value: Value) -> mlua::Result<MultiValue> {
    Ok(std::iter::once(value).collect())
}

fn failure(lua: &Lua, nils: usize, message: impl ToString) -> mlua::Result<MultiValue> {
    let message = Value::String(lua.create_string(message.to_string())?);
    Ok(std::iter::repeat_n(Value::Nil, nils)
        .chain(std::iter::once(message))
        .collect())
}

fn nothing() -> mlua::Result<MultiValue> {
    Ok(MultiValue::new())
}

fn raise(error: RuntimeError) -> mlua::Error {
    mlua::Error::RuntimeError(error.to_string())
}

pub fn new_engine(lua: &Lua, ns: &Namespace, (): ()) -> mlua::Result<MultiValue> {
    match WasmEngine::new(&ns.config.engine) {
        Ok(engine) => {
            let handle = EngineHandle::new(engine);
            ns.registry.track_engine(&handle);
            ok(Value::UserData(lua.create_userdata(handle)?))
        }
        Err(e) => failure(lua, 1, e),
    }
}

pub fn del_engine(_: &Lua, _: &Namespace, engine: Option<AnyUserData>) -> mlua::Result<MultiValue> {
    if let Some(engine) = engine {
        if engine.borrow::<EngineHandle>()?.0.delete()? {
            debug!("Engine deleted");
        }
    }
    nothing()
}

pub fn new_module(
    lua: &Lua,
    ns: &Namespace,
    (engine, bytes): (AnyUserData, mlua::String),
) -> mlua::Result<MultiValue> {
    let compiled = {
        let engine = engine.borrow::<EngineHandle>()?;
        let engine = engine.0.get()?;
        CompiledModule::from_bytes(engine.inner(), &bytes.as_bytes())
    };

    match compiled {
        Ok(module) => {
            let handle = ModuleHandle::new(module);
            ns.registry.track_module(&handle);
            ok(Value::UserData(lua.create_userdata(handle)?))
        }
        Err(e) => failure(lua, 1, e),
    }
}

pub fn del_module(_: &Lua, _: &Namespace, module: Option<AnyUserData>) -> mlua::Result<MultiValue> {
    if let Some(module) = module {
        if module.borrow::<ModuleHandle>()?.0.delete()? {
            debug!("Module deleted");
        }
    }
    nothing()
}

pub fn new_linker(lua: &Lua, ns: &Namespace, engine: AnyUserData) -> mlua::Result<MultiValue> {
    let linker = {
        let engine = engine.borrow::<EngineHandle>()?;
        let engine = engine.0.get()?;
        ModuleLinker::new(&engine, &ns.config.linker)
    };

    match linker {
        Ok(linker) => {
            let handle = LinkerHandle::new(linker);
            ns.registry.track_linker(&handle);
            ok(Value::UserData(lua.create_userdata(handle)?))
        }
        Err(e) => failure(lua, 1, e),
    }
}

pub fn del_linker(_: &Lua, _: &Namespace, linker: Option<AnyUserData>) -> mlua::Result<MultiValue> {
    if let Some(linker) = linker {
        if linker.borrow::<LinkerHandle>()?.0.delete()? {
            debug!("Linker deleted");
        }
    }
    nothing()
}

pub fn instantiate(
    lua: &Lua,
    ns: &Namespace,
    (linker, engine, module): (AnyUserData, AnyUserData, AnyUserData),
) -> mlua::Result<MultiValue> {
    let outcome = {
        let linker = linker.borrow::<LinkerHandle>()?;
        let engine = engine.borrow::<EngineHandle>()?;
        let module = module.borrow::<ModuleHandle>()?;
        let (linker, engine, module) = (linker.0.get()?, engine.0.get()?, module.0.get()?);
        linker.instantiate(&engine, &module, &ns.config.execution)
    };

    let linked = match outcome {
        Ok(InstantiateOutcome::Instantiated(linked)) => linked,
        Ok(InstantiateOutcome::LinkError { message } | InstantiateOutcome::Trap { message }) => {
            return failure(lua, 2, message);
        }
        Err(e) => return failure(lua, 2, e),
    };

    let (instance, store) = linked_pair(linked);
    ns.registry.track_store(&store);

    let Ok(store) = lua.create_userdata(store) else {
        instance.0.delete()?;
        return failure(lua, 2, RuntimeError::InstanceCreation);
    };
    let Ok(instance) = lua.create_userdata(instance) else {
        store.borrow::<StoreHandle>()?.0.delete()?;
        return failure(lua, 2, RuntimeError::InstanceCreation);
    };

    Ok([Value::UserData(instance), Value::UserData(store)]
        .into_iter()
        .collect())
}

/// Argument order of the earlier binding generation: engine, linker, module.
pub fn create_instance(
    lua: &Lua,
    ns: &Namespace,
    (engine, linker, module): (AnyUserData, AnyUserData, AnyUserData),
) -> mlua::Result<MultiValue> {
    instantiate(lua, ns, (linker, engine, module))
}

pub fn del_store(_: &Lua, _: &Namespace, store: Option<AnyUserData>) -> mlua::Result<MultiValue> {
    if let Some(store) = store {
        if store.borrow::<StoreHandle>()?.0.delete()? {
            debug!("Store deleted");
        }
    }
    nothing()
}

pub fn get_export(
    lua: &Lua,
    _: &Namespace,
    (instance, store, name): (AnyUserData, AnyUserData, String),
) -> mlua::Result<MultiValue> {
    let instance = instance.borrow::<InstanceHandle>()?;
    let store = store.borrow::<StoreHandle>()?;
    if !instance.0.same_slot(&store.0) {
        return failure(
            lua,
            1,
            RuntimeError::bad_argument("instance and store were not created together"),
        );
    }

    let described = store.0.get_mut()?.describe_export(&name);
    match described {
        Ok(descriptor) => ok(Value::Table(descriptor_table(lua, &descriptor)?)),
        Err(e) => failure(lua, 1, e),
    }
}

pub fn invoke(
    _: &Lua,
    _: &Namespace,
    (instance, store, name, param_count, result_count, args): (
        AnyUserData,
        AnyUserData,
        String,
        i64,
        i64,
        Variadic<Value>,
    ),
) -> mlua::Result<MultiValue> {
    let instance = instance.borrow::<InstanceHandle>()?;
    let store = store.borrow::<StoreHandle>()?;
    if !instance.0.same_slot(&store.0) {
        return Err(raise(RuntimeError::bad_argument(
            "instance and store were not created together",
        )));
    }

    let call = decode_call_args(param_count, result_count, &args).map_err(raise)?;
    let results = store
        .0
        .get_mut()?
        .invoke(&name, &call.params, &call.result_kinds)
        .map_err(raise)?;

    Ok(results.into_iter().map(to_lua).collect())
}

/// Call accounting of one store: `{calls, failures, fuel_consumed,
/// last_duration_us}`, or `nil` plus a message once the store is released.
pub fn metrics(
    lua: &Lua,
    _: &Namespace,
    (instance, store): (AnyUserData, AnyUserData),
) -> mlua::Result<MultiValue> {
    let instance = instance.borrow::<InstanceHandle>()?;
    let store = store.borrow::<StoreHandle>()?;
    if !instance.0.same_slot(&store.0) {
        return failure(
            lua,
            1,
            RuntimeError::bad_argument("instance and store were not created together"),
        );
    }

    let linked = store.0.get()?;
    let Some(metrics) = linked.metrics() else {
        return failure(lua, 1, RuntimeError::StoreReleased);
    };

    let table = lua.create_table()?;
    table.set("calls", metrics.calls)?;
    table.set("failures", metrics.failures)?;
    table.set("fuel_consumed", metrics.fuel_consumed)?;
    if let Some(duration) = metrics.last_duration {
        table.set(
            "last_duration_us",
            u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
        )?;
    }
    ok(Value::Table(table))
}

pub fn stats(lua: &Lua, ns: &Namespace, (): ()) -> mlua::Result<MultiValue> {
    let counts = ns.registry.counts();
    let table: Table = lua.create_table()?;
    table.set("engines", counts.engines)?;
    table.set("modules", counts.modules)?;
    table.set("linkers", counts.linkers)?;
    table.set("stores", counts.stores)?;
    ok(Value::Table(table))
}
