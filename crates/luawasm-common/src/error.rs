//! Error types for luawasm.
//!
//! [`RuntimeError`] covers every failure the embedding layer can report.
//! Failures that originate in this layer carry a fixed message; failures that
//! originate in the engine (compilation, linking, traps) carry the engine's
//! diagnostic text verbatim.

use thiserror::Error;

/// Top-level runtime errors.
///
/// The `Display` output of each variant is the message a host script sees.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The engine could not be created from the configuration.
    #[error("failed to create an engine")]
    EngineCreation {
        /// Engine diagnostic, kept for logging only.
        reason: String,
    },

    /// WebAssembly compilation or validation failed.
    #[error("{reason}")]
    CompilationFailed {
        /// Compiler diagnostic.
        reason: String,
    },

    /// The linker could not be created or configured.
    #[error("failed to create a linker")]
    LinkerCreation {
        /// Engine diagnostic, kept for logging only.
        reason: String,
    },

    /// The store backing a new instance could not be created.
    #[error("failed to create a store")]
    StoreCreation {
        /// Engine diagnostic, kept for logging only.
        reason: String,
    },

    /// The host-side instance record could not be created.
    #[error("failed to create an instance")]
    InstanceCreation,

    /// Import resolution or linking failed.
    #[error("{message}")]
    Link {
        /// Engine diagnostic.
        message: String,
    },

    /// A WebAssembly trap occurred.
    #[error("{message}")]
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if the engine reported one.
        code: Option<String>,
        /// The store ran out of fuel.
        out_of_fuel: bool,
    },

    /// The engine rejected a call for a reason other than a trap.
    #[error("{message}")]
    Engine {
        /// Engine diagnostic.
        message: String,
    },

    /// No export with the requested name exists.
    #[error("failed to get the exported item")]
    ExportNotFound {
        /// The export that was requested.
        name: String,
    },

    /// The export exists but is not a function, or does not exist at all.
    #[error("failed to get the exported function")]
    FunctionNotFound {
        /// The export that was requested.
        name: String,
    },

    /// The export has a kind this layer does not describe.
    #[error("unknown item type")]
    UnknownItemType,

    /// A value type outside i32/i64/f32/f64.
    #[error("unsupported value type: {ty}")]
    UnsupportedValueType {
        /// Engine rendering of the value type.
        ty: String,
    },

    /// The store was released, either explicitly or by a failed call.
    #[error("store has been released")]
    StoreReleased,

    /// Invalid argument passed across the host boundary.
    #[error("bad argument: {reason}")]
    BadArgument {
        /// Description of why the argument was invalid.
        reason: String,
    },
}

impl RuntimeError {
    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `Link` error.
    pub fn link(message: impl Into<String>) -> Self {
        Self::Link {
            message: message.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Trap {
            message: message.into(),
            code,
            out_of_fuel: false,
        }
    }

    /// Create a `Trap` error for a call that exhausted its fuel.
    pub fn fuel_exhausted(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Trap {
            message: message.into(),
            code,
            out_of_fuel: true,
        }
    }

    /// Create a new `Engine` error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Create a new `ExportNotFound` error.
    pub fn export_not_found(name: impl Into<String>) -> Self {
        Self::ExportNotFound { name: name.into() }
    }

    /// Create a new `FunctionNotFound` error.
    pub fn function_not_found(name: impl Into<String>) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }

    /// Create a new `BadArgument` error.
    pub fn bad_argument(reason: impl Into<String>) -> Self {
        Self::BadArgument {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is a WebAssembly trap.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }

    /// Returns `true` if this error indicates a missing export.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExportNotFound { .. } | Self::FunctionNotFound { .. }
        )
    }

    /// Returns `true` if this error indicates a resource limit was hit.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::Trap {
                out_of_fuel: true,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_messages() {
        assert_eq!(
            RuntimeError::export_not_found("nope").to_string(),
            "failed to get the exported item"
        );
        assert_eq!(
            RuntimeError::function_not_found("nope").to_string(),
            "failed to get the exported function"
        );
        assert_eq!(RuntimeError::UnknownItemType.to_string(), "unknown item type");
        assert_eq!(
            RuntimeError::StoreCreation {
                reason: "limits".into()
            }
            .to_string(),
            "failed to create a store"
        );
        assert_eq!(
            RuntimeError::InstanceCreation.to_string(),
            "failed to create an instance"
        );
    }

    #[test]
    fn test_engine_messages_are_verbatim() {
        let err = RuntimeError::compilation_failed("expected `(`");
        assert_eq!(err.to_string(), "expected `(`");

        let err = RuntimeError::trap("wasm `unreachable` instruction executed", None);
        assert_eq!(err.to_string(), "wasm `unreachable` instruction executed");
    }

    #[test]
    fn test_bad_argument() {
        let err = RuntimeError::bad_argument("negative parameter count");
        assert_eq!(err.to_string(), "bad argument: negative parameter count");
    }

    #[test]
    fn test_is_trap() {
        assert!(RuntimeError::trap("boom", None).is_trap());
        assert!(!RuntimeError::engine("boom").is_trap());
    }

    #[test]
    fn test_is_not_found() {
        assert!(RuntimeError::export_not_found("x").is_not_found());
        assert!(RuntimeError::function_not_found("x").is_not_found());
        assert!(!RuntimeError::UnknownItemType.is_not_found());
    }

    #[test]
    fn test_is_resource_limit() {
        let fuel = RuntimeError::fuel_exhausted("all fuel consumed by WebAssembly", None);
        assert!(fuel.is_trap());
        assert!(fuel.is_resource_limit());

        // Only the flag counts, whatever the code says.
        assert!(!RuntimeError::trap("all fuel consumed", Some("OutOfFuel".into())).is_resource_limit());
        assert!(!RuntimeError::trap("unreachable", Some("UnreachableCodeReached".into())).is_resource_limit());
        assert!(!RuntimeError::StoreReleased.is_resource_limit());
    }
}
