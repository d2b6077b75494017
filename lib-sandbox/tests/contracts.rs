//! Sandbox integration tests: deployment capture, invocation semantics,
//! resource limits and determinism.

use std::time::Duration;

use lib_sandbox::{
    parse_invocation, DataRecord, DataValue, Limits, MethodSource, Sandbox, SandboxError,
};

fn sandbox() -> Sandbox {
    Sandbox::new(Limits::default())
}

fn env_with(pairs: &[(&str, DataValue)]) -> DataRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn methods(defs: &[(&str, &str)]) -> Vec<MethodSource> {
    defs.iter()
        .map(|(name, source)| MethodSource {
            name: name.to_string(),
            source: source.to_string(),
        })
        .collect()
}

// =============================================================================
// Deployment
// =============================================================================

#[test]
fn deploy_captures_data_and_method_sources() {
    let source = "class A extends Base{ constructor(p){super(); this._data=p; this._contractAddr=contractAddr;} getData(){return this._data;} } exports=new A(10);";
    let env = env_with(&[("contractAddr", DataValue::str("aa00"))]);

    let outcome = sandbox().deploy(source, &env).unwrap();

    assert_eq!(outcome.data.get("_data"), Some(&DataValue::Int(10)));
    assert_eq!(
        outcome.data.get("_contractAddr"),
        Some(&DataValue::str("aa00"))
    );
    assert_eq!(outcome.methods.len(), 1);
    assert_eq!(outcome.methods[0].name, "getData");
    assert_eq!(outcome.methods[0].source, "getData(){return this._data;}");
}

#[test]
fn deploy_without_exports_is_bad_definition() {
    let source = "class A extends Base{ } let a = new A();";
    let err = sandbox().deploy(source, &DataRecord::new()).unwrap_err();
    assert_eq!(err, SandboxError::BadDefinition);
}

#[test]
fn deploy_exporting_non_instance_is_bad_definition() {
    let err = sandbox()
        .deploy("exports = 42;", &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::BadDefinition);
}

#[test]
fn deploy_exporting_base_instance_is_bad_definition() {
    let err = sandbox()
        .deploy("exports = new Base();", &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::BadDefinition);
}

#[test]
fn deploy_class_not_extending_base_is_bad_definition() {
    let source = "class A { getData(){return 1;} } exports = new A();";
    let err = sandbox().deploy(source, &DataRecord::new()).unwrap_err();
    assert_eq!(err, SandboxError::BadDefinition);
}

#[test]
fn deploy_is_deterministic() {
    let source = "class A extends Base{ constructor(){super(); this.x=1; this.y=\"s\"; this.l=[1,2,3];} m(){return this.x;} } exports=new A();";
    let env = env_with(&[("contractTx", DataValue::str("ff"))]);

    let a = sandbox().deploy(source, &env).unwrap();
    let b = sandbox().deploy(source, &env).unwrap();
    assert_eq!(a.data, b.data);
    assert_eq!(a.methods, b.methods);
    assert_eq!(a.fuel_used, b.fuel_used);
}

#[test]
fn deploy_with_inheritance_captures_own_methods_only() {
    let source = "\
class Mid extends Base{ shared(){return 1;} }\n\
class Leaf extends Mid{ constructor(){super();} own(){return 2;} }\n\
exports = new Leaf();";
    let outcome = sandbox().deploy(source, &DataRecord::new()).unwrap();
    let names: Vec<_> = outcome.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["own"]);
}

// =============================================================================
// Invocation
// =============================================================================

#[test]
fn invoke_mutates_data() {
    let contract = methods(&[("add", "add(a){this.value+=a;}")]);
    let data = env_with(&[("value", DataValue::Int(100))]);

    let outcome = sandbox()
        .invoke(&contract, "add", &[DataValue::Int(10)], &data, &DataRecord::new())
        .unwrap();

    assert_eq!(outcome.data.get("value"), Some(&DataValue::Int(110)));
}

#[test]
fn invoke_unknown_method_fails_without_touching_data() {
    let contract = methods(&[("add", "add(a){this.value+=a;}")]);
    let data = env_with(&[("value", DataValue::Int(100))]);

    let err = sandbox()
        .invoke(&contract, "subtract", &[DataValue::Int(10)], &data, &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::UnknownMethod("subtract".to_string()));
}

#[test]
fn invoke_returns_method_result() {
    let contract = methods(&[("get", "get(){return this.value+1;}")]);
    let data = env_with(&[("value", DataValue::Int(41))]);

    let outcome = sandbox()
        .invoke(&contract, "get", &[], &data, &DataRecord::new())
        .unwrap();
    assert_eq!(outcome.result, DataValue::Int(42));
}

#[test]
fn invoke_sees_environment_bindings() {
    let contract = methods(&[("who", "who(){this.addr=contractAddr;}")]);
    let env = env_with(&[("contractAddr", DataValue::str("beef"))]);

    let outcome = sandbox()
        .invoke(&contract, "who", &[], &DataRecord::new(), &env)
        .unwrap();
    assert_eq!(outcome.data.get("addr"), Some(&DataValue::str("beef")));
}

#[test]
fn invoke_rejects_renamed_method_chunk() {
    let contract = vec![MethodSource {
        name: "add".to_string(),
        source: "sub(a){this.value-=a;}".to_string(),
    }];
    let err = sandbox()
        .invoke(&contract, "add", &[], &DataRecord::new(), &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::BadDefinition);
}

#[test]
fn invoke_rejects_chunk_smuggling_extra_methods() {
    let contract = vec![MethodSource {
        name: "add".to_string(),
        source: "add(a){this.value+=a;} stolen(){this.value=0;}".to_string(),
    }];
    let err = sandbox()
        .invoke(&contract, "add", &[], &DataRecord::new(), &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::BadDefinition);
}

#[test]
fn invoke_error_inside_method_reports_runtime() {
    let contract = methods(&[("boom", "boom(){return 1/0;}")]);
    let err = sandbox()
        .invoke(&contract, "boom", &[], &DataRecord::new(), &DataRecord::new())
        .unwrap_err();
    assert!(matches!(err, SandboxError::Runtime(_)));
}

#[test]
fn invoke_is_deterministic() {
    let contract = methods(&[(
        "spin",
        "spin(n){let i=0; while(i<n){ this.acc += i; i += 1; } }",
    )]);
    let data = env_with(&[("acc", DataValue::Int(0))]);

    let a = sandbox()
        .invoke(&contract, "spin", &[DataValue::Int(50)], &data, &DataRecord::new())
        .unwrap();
    let b = sandbox()
        .invoke(&contract, "spin", &[DataValue::Int(50)], &data, &DataRecord::new())
        .unwrap();
    assert_eq!(a.data, b.data);
    assert_eq!(a.fuel_used, b.fuel_used);
}

// =============================================================================
// Limits
// =============================================================================

#[test]
fn infinite_loop_exhausts_fuel() {
    let limits = Limits::new(10_000, 64 * 1024, Duration::from_secs(5));
    let contract = methods(&[("forever", "forever(){while(true){}}")]);

    let err = Sandbox::new(limits)
        .invoke(&contract, "forever", &[], &DataRecord::new(), &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::OutOfFuel);
}

#[test]
fn infinite_loop_hits_wall_clock_backstop() {
    // Fuel effectively unlimited; the wall clock must tear the run down.
    let limits = Limits::new(u64::MAX, 64 * 1024, Duration::from_millis(50));
    let contract = methods(&[("forever", "forever(){while(true){}}")]);

    let err = Sandbox::new(limits)
        .invoke(&contract, "forever", &[], &DataRecord::new(), &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::Timeout);
}

#[test]
fn unbounded_allocation_hits_heap_cap() {
    let limits = Limits::new(u64::MAX, 1_000, Duration::from_secs(5));
    let contract = methods(&[(
        "grow",
        "grow(){this.l=[]; while(true){ this.l.push(\"x\"); } }",
    )]);

    let err = Sandbox::new(limits)
        .invoke(&contract, "grow", &[], &DataRecord::new(), &DataRecord::new())
        .unwrap_err();
    assert_eq!(err, SandboxError::MemoryLimit);
}

// =============================================================================
// Invocation parsing
// =============================================================================

#[test]
fn invocation_parsing_roundtrip() {
    let (method, args) = parse_invocation("transfer(\"ux00\", 250)").unwrap().unwrap();
    assert_eq!(method, "transfer");
    assert_eq!(args, vec![DataValue::str("ux00"), DataValue::Int(250)]);
}

#[test]
fn invocation_rejects_fractional_amounts() {
    assert!(parse_invocation("pay(1.5)").is_err());
}
