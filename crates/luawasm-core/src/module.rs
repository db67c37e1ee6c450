//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's
//! [`Module`] that compiles binary or text payloads and keeps a little
//! metadata for logging.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmtime::{Engine, Module};

use crate::export::ExportDescriptor;
use luawasm_common::RuntimeError;

const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// A compiled, validated WebAssembly module.
///
/// Immutable once created; may be instantiated any number of times, through
/// any linker built on the same engine.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    inner: Module,

    /// Hash of the original payload.
    content_hash: String,

    /// Whether the payload was in the binary format (rather than text).
    binary: bool,
}

impl CompiledModule {
    /// Compile a module from a binary or text payload.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CompilationFailed`] carrying the compiler's
    /// diagnostic if the payload is malformed or fails validation.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();
        let binary = bytes.starts_with(WASM_MAGIC);

        let module = Module::new(engine, bytes).map_err(|e| {
            debug!(binary, error = %e, "Module compilation failed");
            RuntimeError::compilation_failed(format!("{e:#}"))
        })?;

        let content_hash = compute_hash(bytes);
        let duration = start.elapsed();

        info!(
            content_hash = %content_hash,
            binary,
            exports = module.exports().len(),
            duration_ms = duration.as_millis(),
            "Module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            binary,
        })
    }

    /// Compile a module from WAT source.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CompilationFailed`] if the text does not parse
    /// or the module fails validation.
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        Self::from_bytes(engine, wat.as_bytes())
    }

    /// Describe the module's declared exports without instantiating it.
    ///
    /// # Errors
    ///
    /// Fails on the first export that cannot be described.
    pub fn exports(&self) -> Result<Vec<ExportDescriptor>, RuntimeError> {
        self.inner
            .exports()
            .map(|export| ExportDescriptor::from_extern_type(export.name(), &export.ty()))
            .collect()
    }

    /// Number of imports the module declares.
    pub fn import_count(&self) -> usize {
        self.inner.imports().len()
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Get the content hash of the original payload.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Returns `true` if the payload was in the binary format.
    pub fn is_binary(&self) -> bool {
        self.binary
    }

}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use crate::export::ExportKind;
    use crate::value::ValueKind;
    use luawasm_common::EngineConfig;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    fn engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16);
    }

    #[test]
    fn test_binary_compilation() {
        let engine = engine();
        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM).unwrap();

        assert!(module.is_binary());
        assert!(module.exports().unwrap().is_empty());
        assert_eq!(module.import_count(), 0);
    }

    #[test]
    fn test_text_compilation() {
        let engine = engine();
        let module = CompiledModule::from_wat(
            engine.inner(),
            r#"(module (func (export "id") (param f32) (result f32) local.get 0))"#,
        )
        .unwrap();

        assert!(!module.is_binary());
        let exports = module.exports().unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(
            exports[0].kind,
            ExportKind::Func {
                params: vec![ValueKind::F32],
                results: vec![ValueKind::F32],
            }
        );
    }

    #[test]
    fn test_malformed_payload_reports_diagnostic() {
        let engine = engine();

        let err = CompiledModule::from_bytes(engine.inner(), b"definitely not wasm").unwrap_err();
        assert!(matches!(err, RuntimeError::CompilationFailed { .. }));
        assert!(!err.to_string().is_empty());

        let truncated = &MINIMAL_WASM[..6];
        let err = CompiledModule::from_bytes(engine.inner(), truncated).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_validation_failure() {
        let engine = engine();
        let result = CompiledModule::from_wat(
            engine.inner(),
            r#"(module (func (result i32) i64.const 1))"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_module_debug() {
        let engine = engine();
        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM).unwrap();

        let debug_str = format!("{module:?}");
        assert!(debug_str.contains("CompiledModule"));
        assert!(debug_str.contains("content_hash"));
    }
}
