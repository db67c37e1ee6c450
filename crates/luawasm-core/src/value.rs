//! Kind-tagged numeric values.
//!
//! Values cross the host boundary as a closed sum over the four numeric
//! kinds. The kind is always carried explicitly: a host number does not say
//! whether it is an `f32`, an `f64` or an integer in the safe range, so the
//! caller has to.

use std::fmt;

use serde::Serialize;
use wasmtime::{Val, ValType};

use luawasm_common::RuntimeError;

/// Numeric kind of a value or of a function parameter/result.
///
/// Discriminants match the engine's value-kind enumeration
/// (`WASMTIME_I32` .. `WASMTIME_F64`), and are what hosts pass as tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ValueKind {
    /// 32-bit integer.
    I32 = 0,
    /// 64-bit integer.
    I64 = 1,
    /// 32-bit float.
    F32 = 2,
    /// 64-bit float.
    F64 = 3,
}

impl ValueKind {
    /// All kinds, in discriminant order.
    pub const ALL: [ValueKind; 4] = [Self::I32, Self::I64, Self::F32, Self::F64];

    /// Canonical symbol for this kind.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Numeric tag exposed to hosts.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Look up a kind by its numeric tag.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::BadArgument`] for tags outside `0..=3`.
    pub fn from_tag(tag: i64) -> Result<Self, RuntimeError> {
        match tag {
            0 => Ok(Self::I32),
            1 => Ok(Self::I64),
            2 => Ok(Self::F32),
            3 => Ok(Self::F64),
            other => Err(RuntimeError::bad_argument(format!(
                "unknown value kind {other}"
            ))),
        }
    }

    /// Map an engine value type onto one of the four kinds.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnsupportedValueType`] for vector and
    /// reference types.
    pub fn from_val_type(ty: &ValType) -> Result<Self, RuntimeError> {
        match ty {
            ValType::I32 => Ok(Self::I32),
            ValType::I64 => Ok(Self::I64),
            ValType::F32 => Ok(Self::F32),
            ValType::F64 => Ok(Self::F64),
            other => Err(RuntimeError::UnsupportedValueType {
                ty: other.to_string(),
            }),
        }
    }

    /// A zeroed engine value of this kind, used to pre-tag result slots.
    pub fn zero(self) -> Val {
        match self {
            Self::I32 => Val::I32(0),
            Self::I64 => Val::I64(0),
            Self::F32 => Val::F32(0),
            Self::F64 => Val::F64(0),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A kind-tagged numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WasmValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl WasmValue {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::I32(_) => ValueKind::I32,
            Self::I64(_) => ValueKind::I64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
        }
    }

    /// Convert into the engine representation.
    pub fn to_val(self) -> Val {
        match self {
            Self::I32(v) => Val::I32(v),
            Self::I64(v) => Val::I64(v),
            Self::F32(v) => Val::F32(v.to_bits()),
            Self::F64(v) => Val::F64(v.to_bits()),
        }
    }

    /// Decode an engine value according to the kind the slot was tagged with.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::BadArgument`] if the caller tagged the slot
    /// with a kind other than the one the function returned.
    pub fn from_val(kind: ValueKind, val: &Val) -> Result<Self, RuntimeError> {
        match (kind, val) {
            (ValueKind::I32, Val::I32(v)) => Ok(Self::I32(*v)),
            (ValueKind::I64, Val::I64(v)) => Ok(Self::I64(*v)),
            (ValueKind::F32, Val::F32(bits)) => Ok(Self::F32(f32::from_bits(*bits))),
            (ValueKind::F64, Val::F64(bits)) => Ok(Self::F64(f64::from_bits(*bits))),
            (kind, other) => Err(RuntimeError::bad_argument(format!(
                "result slot tagged {kind} holds {other:?}"
            ))),
        }
    }
}

impl fmt::Display for WasmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}:i32"),
            Self::I64(v) => write!(f, "{v}:i64"),
            Self::F32(v) => write!(f, "{v}:f32"),
            Self::F64(v) => write!(f, "{v}:f64"),
        }
    }
}
