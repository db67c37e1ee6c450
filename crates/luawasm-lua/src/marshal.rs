//! Conversion between Lua values and kind-tagged WebAssembly values.
//!
//! Lua 5.4 numbers are either integers or floats. Integer kinds come back as
//! Lua integers and float kinds as Lua floats; on the way in, a number of the
//! other subtype is coerced to the tagged kind.

use mlua::{Lua, Table, Value};

use luawasm_common::RuntimeError;
use luawasm_core::{ExportDescriptor, ExportKind, ValueKind, WasmValue};

/// Arguments of one `invoke`, decoded from the flattened Lua sequence.
#[derive(Debug, PartialEq)]
pub struct CallArgs {
    pub params: Vec<WasmValue>,
    pub result_kinds: Vec<ValueKind>,
}

/// Decode `param_count` (kind, value) pairs followed by `result_count` kind
/// tags.
///
/// # Errors
///
/// Returns [`RuntimeError::BadArgument`] for negative or overflowing counts,
/// missing slots, unknown kind tags, or non-numeric values.
pub fn decode_call_args(
    param_count: i64,
    result_count: i64,
    args: &[Value],
) -> Result<CallArgs, RuntimeError> {
    let param_count = usize::try_from(param_count)
        .map_err(|_| RuntimeError::bad_argument("parameter count out of range"))?;
    let result_count = usize::try_from(result_count)
        .map_err(|_| RuntimeError::bad_argument("result count out of range"))?;

    let param_slots = param_count
        .checked_mul(2)
        .ok_or_else(|| RuntimeError::bad_argument("argument count overflow"))?;
    let expected = param_slots
        .checked_add(result_count)
        .ok_or_else(|| RuntimeError::bad_argument("argument count overflow"))?;
    if args.len() < expected {
        return Err(RuntimeError::bad_argument(format!(
            "expected {expected} tagged slots, got {}",
            args.len()
        )));
    }

    let (param_slots, rest) = args.split_at(param_slots);

    let params = param_slots
        .chunks_exact(2)
        .enumerate()
        .map(|(index, pair)| {
            let kind = ValueKind::from_tag(tag_of(&pair[0], index + 1)?)?;
            to_wasm(kind, &pair[1], index + 1)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let result_kinds = rest[..result_count]
        .iter()
        .enumerate()
        .map(|(index, tag)| ValueKind::from_tag(tag_of(tag, index + 1)?))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CallArgs {
        params,
        result_kinds,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn tag_of(value: &Value, position: usize) -> Result<i64, RuntimeError> {
    match value {
        Value::Integer(tag) => Ok(*tag),
        Value::Number(tag) if tag.fract() == 0.0 => Ok(*tag as i64),
        other => Err(RuntimeError::bad_argument(format!(
            "kind tag {position} must be an integer, got {}",
            other.type_name()
        ))),
    }
}

/// Convert a Lua number to a value of `kind`.
///
/// Integers wrap to 32 bits for `i32`; floats truncate toward zero for
/// integer kinds.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn to_wasm(kind: ValueKind, value: &Value, position: usize) -> Result<WasmValue, RuntimeError> {
    let converted = match (kind, value) {
        (ValueKind::I32, Value::Integer(v)) => WasmValue::I32(*v as i32),
        (ValueKind::I64, Value::Integer(v)) => WasmValue::I64(*v),
        (ValueKind::F32, Value::Integer(v)) => WasmValue::F32(*v as f32),
        (ValueKind::F64, Value::Integer(v)) => WasmValue::F64(*v as f64),
        (ValueKind::I32, Value::Number(v)) => WasmValue::I32(*v as i32),
        (ValueKind::I64, Value::Number(v)) => WasmValue::I64(*v as i64),
        (ValueKind::F32, Value::Number(v)) => WasmValue::F32(*v as f32),
        (ValueKind::F64, Value::Number(v)) => WasmValue::F64(*v),
        (kind, other) => {
            return Err(RuntimeError::bad_argument(format!(
                "parameter {position} ({kind}) must be a number, got {}",
                other.type_name()
            )));
        }
    };
    Ok(converted)
}

/// Convert a WebAssembly value to its Lua representation.
pub fn to_lua(value: WasmValue) -> Value {
    match value {
        WasmValue::I32(v) => Value::Integer(i64::from(v)),
        WasmValue::I64(v) => Value::Integer(v),
        WasmValue::F32(v) => Value::Number(f64::from(v)),
        WasmValue::F64(v) => Value::Number(v),
    }
}

/// Build the Lua descriptor record for an export.
pub fn descriptor_table(lua: &Lua, descriptor: &ExportDescriptor) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("name", descriptor.name.as_str())?;
    table.set("type", descriptor.kind.type_name())?;

    match &descriptor.kind {
        ExportKind::Func { params, results } => {
            table.set("params", kinds_table(lua, params)?)?;
            table.set("results", kinds_table(lua, results)?)?;
        }
        ExportKind::Memory { min, max } => {
            table.set("min", *min)?;
            if let Some(max) = max {
                table.set("max", *max)?;
            }
        }
        ExportKind::Global | ExportKind::Table | ExportKind::SharedMemory => {}
    }

    Ok(table)
}

fn kinds_table(lua: &Lua, kinds: &[ValueKind]) -> mlua::Result<Table> {
    lua.create_sequence_from(kinds.iter().map(|kind| kind.symbol()))
}
