//! Integration tests for luawasm-core.
//!
//! These tests walk the whole handle lifecycle:
//! - WAT/binary compilation to module
//! - Linker creation and instantiation
//! - Export introspection
//! - Invocation, traps and store release

use luawasm_common::{EngineConfig, ExecutionConfig, LinkerConfig, RuntimeError};
use luawasm_core::{
    CompiledModule, ExportKind, InstanceState, InstantiateOutcome, LinkedInstance, ModuleLinker,
    ValueKind, WasmEngine, WasmValue,
};

const FIXTURE_WAT: &str = r#"
    (module
        (func (export "add") (param i32 i32) (result i32)
            (i32.add (local.get 0) (local.get 1)))
        (func (export "scale") (param f32) (result f32)
            (f32.mul (local.get 0) (f32.const 2.5)))
        (func (export "wide") (param i64 f64) (result i64 f64)
            (i64.mul (local.get 0) (i64.const 3))
            (f64.neg (local.get 1)))
        (func (export "trap") (result i32)
            unreachable)
        (global $counter (mut i32) (i32.const 0))
        (func (export "bump") (result i32)
            (global.set $counter (i32.add (global.get $counter) (i32.const 1)))
            (global.get $counter))
        (global (export "counter") (mut i32) (i32.const 0))
        (table (export "table") 2 funcref)
        (memory (export "memory") 1 3)
    )
"#;

struct Fixture {
    engine: WasmEngine,
    linker: ModuleLinker,
    module: CompiledModule,
}

fn fixture(wat: &str) -> Fixture {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let linker = ModuleLinker::new(&engine, &LinkerConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    Fixture {
        engine,
        linker,
        module,
    }
}

fn instantiate(fixture: &Fixture) -> LinkedInstance {
    fixture
        .linker
        .instantiate(&fixture.engine, &fixture.module, &ExecutionConfig::default())
        .unwrap()
        .into_result()
        .unwrap()
}

// ============================================================================
// Test: Invocation
// ============================================================================

#[test]
fn test_add_two_i32() {
    let fixture = fixture(FIXTURE_WAT);
    let mut instance = instantiate(&fixture);

    let results = instance
        .invoke(
            "add",
            &[WasmValue::I32(2), WasmValue::I32(3)],
            &[ValueKind::I32],
        )
        .unwrap();

    assert_eq!(results, vec![WasmValue::I32(5)]);
}

#[test]
fn test_float_and_wide_kinds() {
    let fixture = fixture(FIXTURE_WAT);
    let mut instance = instantiate(&fixture);

    let results = instance
        .invoke("scale", &[WasmValue::F32(2.0)], &[ValueKind::F32])
        .unwrap();
    assert_eq!(results, vec![WasmValue::F32(5.0)]);

    let results = instance
        .invoke(
            "wide",
            &[WasmValue::I64(1 << 40), WasmValue::F64(1.25)],
            &[ValueKind::I64, ValueKind::F64],
        )
        .unwrap();
    assert_eq!(
        results,
        vec![WasmValue::I64(3 << 40), WasmValue::F64(-1.25)]
    );
}

// ============================================================================
// Test: Independent instances
// ============================================================================

#[test]
fn test_two_instances_are_independent() {
    let fixture = fixture(FIXTURE_WAT);
    let mut first = instantiate(&fixture);
    let mut second = instantiate(&fixture);

    assert_ne!(first.store_id(), second.store_id());

    assert_eq!(
        first.invoke("bump", &[], &[ValueKind::I32]).unwrap(),
        vec![WasmValue::I32(1)]
    );
    assert_eq!(
        first.invoke("bump", &[], &[ValueKind::I32]).unwrap(),
        vec![WasmValue::I32(2)]
    );

    first.release();
    assert_eq!(first.state(), InstanceState::Released);

    // State is per store, and releasing the first store leaves this one alone.
    assert_eq!(
        second.invoke("bump", &[], &[ValueKind::I32]).unwrap(),
        vec![WasmValue::I32(1)]
    );
}

// ============================================================================
// Test: Introspection
// ============================================================================

#[test]
fn test_describe_function_signature() {
    let fixture = fixture(FIXTURE_WAT);
    let mut instance = instantiate(&fixture);

    let scale = instance.describe_export("scale").unwrap();
    let ExportKind::Func { params, results } = scale.kind else {
        panic!("expected a function");
    };
    assert_eq!(params, vec![ValueKind::F32]);
    assert_eq!(results, vec![ValueKind::F32]);
    assert_ne!(params[0], ValueKind::I32);

    let wide = instance.describe_export("wide").unwrap();
    assert_eq!(
        wide.kind,
        ExportKind::Func {
            params: vec![ValueKind::I64, ValueKind::F64],
            results: vec![ValueKind::I64, ValueKind::F64],
        }
    );
}

#[test]
fn test_describe_other_kinds() {
    let fixture = fixture(FIXTURE_WAT);
    let mut instance = instantiate(&fixture);

    assert_eq!(instance.describe_export("counter").unwrap().kind, ExportKind::Global);
    assert_eq!(instance.describe_export("table").unwrap().kind, ExportKind::Table);
    assert_eq!(
        instance.describe_export("memory").unwrap().kind,
        ExportKind::Memory {
            min: 1,
            max: Some(3)
        }
    );
}

#[test]
fn test_unbounded_memory_has_no_max() {
    let fixture = fixture(r#"(module (memory (export "heap") 2))"#);
    let mut instance = instantiate(&fixture);

    assert_eq!(
        instance.describe_export("heap").unwrap().kind,
        ExportKind::Memory { min: 2, max: None }
    );
}

#[test]
fn test_missing_export_always_fails_the_same_way() {
    let fixture = fixture(FIXTURE_WAT);
    let mut instance = instantiate(&fixture);

    for _ in 0..3 {
        let err = instance.describe_export("does_not_exist").unwrap_err();
        assert_eq!(err.to_string(), "failed to get the exported item");
    }
    assert!(instance.is_alive());
}

// ============================================================================
// Test: Trap Handling
// ============================================================================

#[test]
fn test_trap_unreachable() {
    let fixture = fixture(FIXTURE_WAT);
    let mut instance = instantiate(&fixture);

    let err = instance.invoke("trap", &[], &[ValueKind::I32]).unwrap_err();

    let RuntimeError::Trap {
        message,
        code,
        out_of_fuel,
    } = err
    else {
        panic!("expected a trap");
    };
    assert!(message.contains("unreachable"), "got: {message}");
    assert_eq!(code.as_deref(), Some("UnreachableCodeReached"));
    assert!(!out_of_fuel);
    assert_eq!(instance.state(), InstanceState::CallFailed);
    assert!(matches!(
        instance.invoke("add", &[WasmValue::I32(1), WasmValue::I32(1)], &[ValueKind::I32]),
        Err(RuntimeError::StoreReleased)
    ));
}

#[test]
fn test_memory_limit_applies_to_growth() {
    let fixture = fixture(
        r#"(module
            (memory (export "memory") 1)
            (func (export "grow") (param i32) (result i32)
                (memory.grow (local.get 0))))"#,
    );
    let execution = ExecutionConfig {
        max_memory_mb: 1,
        ..Default::default()
    };
    let mut instance = fixture
        .linker
        .instantiate(&fixture.engine, &fixture.module, &execution)
        .unwrap()
        .into_result()
        .unwrap();

    // 1 MiB is 16 pages; growing past it reports failure as -1.
    let results = instance
        .invoke("grow", &[WasmValue::I32(100)], &[ValueKind::I32])
        .unwrap();
    assert_eq!(results, vec![WasmValue::I32(-1)]);
}

// ============================================================================
// Test: Instantiation failure channels
// ============================================================================

#[test]
fn test_instantiation_channels() {
    let fixture = fixture(r#"(module (import "env" "f" (func)))"#);
    let outcome = fixture
        .linker
        .instantiate(&fixture.engine, &fixture.module, &ExecutionConfig::default())
        .unwrap();
    assert!(matches!(outcome, InstantiateOutcome::LinkError { .. }));

    let fixture = fixture_with_start_trap();
    let outcome = fixture
        .linker
        .instantiate(&fixture.engine, &fixture.module, &ExecutionConfig::default())
        .unwrap();
    assert!(matches!(outcome, InstantiateOutcome::Trap { .. }));
}

fn fixture_with_start_trap() -> Fixture {
    fixture(r#"(module (func $start unreachable) (start $start))"#)
}

// ============================================================================
// Test: Module reuse
// ============================================================================

#[test]
fn test_module_outlives_instances() {
    let fixture = fixture(FIXTURE_WAT);

    for _ in 0..4 {
        let mut instance = instantiate(&fixture);
        instance.release();
    }

    let descriptors = fixture.module.exports().unwrap();
    assert!(descriptors.iter().any(|d| d.name == "add" && d.is_func()));
}
