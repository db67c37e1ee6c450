//! The `wasm_core` operation table for Lua 5.4.
//!
//! [`open`] builds the table of functions a script uses to drive the
//! embedding: engines, modules, linkers, instances and stores are opaque
//! userdata; exports are described as plain tables; calls take
//! kind-tagged arguments.
//!
//! ```lua
//! local wasm = require("wasm_core")
//! local engine = wasm.new_engine()
//! local module = assert(wasm.new_module(engine, bytes))
//! local linker = wasm.new_linker(engine)
//! local instance, store = wasm.instantiate(linker, engine, module)
//! print(wasm.invoke(instance, store, "add", 2, 1, wasm.I32, 2, wasm.I32, 3, wasm.I32))
//! wasm.del_store(store)
//! ```
//!
//! The earlier binding generation spelled the lifecycle functions
//! `create_*`/`destroy_*`; those names are registered as aliases.

mod handles;
mod marshal;
mod ops;

use std::rc::Rc;

use mlua::{FromLuaMulti, Lua, MultiValue, Table};
use tracing::debug;

use luawasm_common::RuntimeConfig;
use luawasm_core::ValueKind;

use ops::Namespace;

/// Name the table is published under by default.
pub const MODULE_NAME: &str = "wasm_core";

/// Build the operation table.
///
/// Every function in the table shares one configuration and one handle
/// registry; opening the table twice gives two independent registries.
///
/// # Errors
///
/// Returns an error if Lua fails to allocate the table or its functions.
pub fn open(lua: &Lua, config: &RuntimeConfig) -> mlua::Result<Table> {
    let ns = Rc::new(Namespace::new(config.clone()));
    let table = lua.create_table()?;

    register(lua, &table, &ns, &["new_engine", "create_engine"], ops::new_engine)?;
    register(lua, &table, &ns, &["del_engine", "destroy_engine"], ops::del_engine)?;
    register(lua, &table, &ns, &["new_module", "create_module"], ops::new_module)?;
    register(lua, &table, &ns, &["del_module", "destroy_module"], ops::del_module)?;
    register(lua, &table, &ns, &["new_linker", "create_linker"], ops::new_linker)?;
    register(lua, &table, &ns, &["del_linker", "destroy_linker"], ops::del_linker)?;
    register(lua, &table, &ns, &["instantiate"], ops::instantiate)?;
    register(lua, &table, &ns, &["create_instance"], ops::create_instance)?;
    register(lua, &table, &ns, &["del_store", "destroy_instance"], ops::del_store)?;
    register(lua, &table, &ns, &["get_export"], ops::get_export)?;
    register(lua, &table, &ns, &["invoke"], ops::invoke)?;
    register(lua, &table, &ns, &["metrics"], ops::metrics)?;
    register(lua, &table, &ns, &["stats"], ops::stats)?;

    for kind in ValueKind::ALL {
        table.set(kind.symbol().to_uppercase(), kind.tag())?;
    }

    debug!(
        fuel_metering = config.engine.fuel_metering,
        wasi = config.linker.wasi,
        "Opened wasm_core table"
    );

    Ok(table)
}

/// Open the table and publish it in `package.loaded[module_name]`, so
/// `require(module_name)` returns it.
///
/// # Errors
///
/// Returns an error if the table cannot be built or `package` is missing.
pub fn preload(lua: &Lua, config: &RuntimeConfig, module_name: &str) -> mlua::Result<Table> {
    let table = open(lua, config)?;
    let package: Table = lua.globals().get("package")?;
    let loaded: Table = package.get("loaded")?;
    loaded.set(module_name, table.clone())?;
    Ok(table)
}

fn register<A, F>(
    lua: &Lua,
    table: &Table,
    ns: &Rc<Namespace>,
    names: &[&str],
    op: F,
) -> mlua::Result<()>
where
    A: FromLuaMulti,
    F: Fn(&Lua, &Namespace, A) -> mlua::Result<MultiValue> + 'static,
{
    let ns = Rc::clone(ns);
    let function = lua.create_function(move |lua, args: A| op(lua, &ns, args))?;
    for name in names {
        table.set(*name, function.clone())?;
    }
    Ok(())
}

/// Entry point for `require("wasm_core")` from a stock Lua 5.4 interpreter.
#[cfg(feature = "module")]
#[mlua::lua_module]
fn wasm_core(lua: &Lua) -> mlua::Result<Table> {
    open(lua, &RuntimeConfig::default())
}
