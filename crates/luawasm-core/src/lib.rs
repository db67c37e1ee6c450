//! Wasmtime handle lifecycle and value marshalling for luawasm.
//!
//! This crate is the engine-facing half of the embedding layer:
//! - [`WasmEngine`]: shared compilation/runtime context
//! - [`CompiledModule`]: a validated, compiled module
//! - [`ModuleLinker`]: import registry that drives instantiation
//! - [`LinkedInstance`]: an instance and the store it lives in
//! - [`ExportDescriptor`]: export type introspection
//! - [`WasmValue`] and [`ValueKind`]: the kind-tagged value model
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  WasmEngine  │──────────────┬─────────────────────┐
//! └──────────────┘              │                     │
//!        │                      ▼                     ▼
//!        │              ┌────────────────┐   ┌──────────────┐
//!        │              │ CompiledModule │   │ ModuleLinker │
//!        │              └────────────────┘   └──────────────┘
//!        │                      │ instantiate         │
//!        ▼                      ▼                     ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          LinkedInstance (Store<HostContext> + Instance)  │
//! │  Linked ──release──▶ Released                            │
//! │  Linked ──failed call──▶ CallFailed                      │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod export;
pub mod instance;
pub mod linker;
pub mod module;
pub mod store;
pub mod value;

pub use engine::WasmEngine;
pub use export::{ExportDescriptor, ExportKind};
pub use instance::{InstanceState, LinkedInstance};
pub use linker::{InstantiateOutcome, ModuleLinker};
pub use module::CompiledModule;
pub use store::{CallMetrics, HostContext};
pub use value::{ValueKind, WasmValue};
