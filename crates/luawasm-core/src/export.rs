//! Export type introspection.
//!
//! An [`ExportDescriptor`] is a plain-data description of one named export.
//! Descriptors never hold engine handles, so nothing native outlives the
//! lookup that produced them.

use serde::Serialize;
use wasmtime::{ExternType, FuncType, MemoryType};

use crate::value::ValueKind;
use luawasm_common::RuntimeError;

/// Kind-specific detail of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportKind {
    /// A function with its ordered parameter and result kinds.
    Func {
        params: Vec<ValueKind>,
        results: Vec<ValueKind>,
    },
    /// A global.
    Global,
    /// A table.
    Table,
    /// A linear memory; `max` is present only when the memory is bounded.
    Memory {
        min: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<u64>,
    },
    /// A shared linear memory.
    SharedMemory,
}

impl ExportKind {
    /// The kind symbol hosts see in the `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Func { .. } => "func",
            Self::Global => "global",
            Self::Table => "table",
            Self::Memory { .. } => "memory",
            Self::SharedMemory => "shared_memory",
        }
    }
}

/// Description of a named export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDescriptor {
    /// Export name.
    pub name: String,

    /// Kind and kind-specific detail.
    #[serde(flatten)]
    pub kind: ExportKind,
}

impl ExportDescriptor {
    /// Build a descriptor from an engine extern type.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownItemType`] for export kinds outside
    /// function/global/table/memory, and
    /// [`RuntimeError::UnsupportedValueType`] for function signatures using
    /// vector or reference types.
    pub fn from_extern_type(name: &str, ty: &ExternType) -> Result<Self, RuntimeError> {
        #[allow(unreachable_patterns)]
        let kind = match ty {
            ExternType::Func(func) => describe_func(func)?,
            ExternType::Global(_) => ExportKind::Global,
            ExternType::Table(_) => ExportKind::Table,
            ExternType::Memory(memory) => describe_memory(memory),
            _ => return Err(RuntimeError::UnknownItemType),
        };

        Ok(Self {
            name: name.to_string(),
            kind,
        })
    }

    /// Returns `true` if this export is a function.
    pub fn is_func(&self) -> bool {
        matches!(self.kind, ExportKind::Func { .. })
    }
}

fn describe_func(func: &FuncType) -> Result<ExportKind, RuntimeError> {
    let params = func
        .params()
        .map(|ty| ValueKind::from_val_type(&ty))
        .collect::<Result<Vec<_>, _>>()?;
    let results = func
        .results()
        .map(|ty| ValueKind::from_val_type(&ty))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExportKind::Func { params, results })
}

fn describe_memory(memory: &MemoryType) -> ExportKind {
    if memory.is_shared() {
        return ExportKind::SharedMemory;
    }

    ExportKind::Memory {
        min: memory.minimum(),
        max: memory.maximum(),
    }
}
