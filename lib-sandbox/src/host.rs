//! Host-facing sandbox operations: contract deployment and invocation.
//!
//! The host never hands contract code a capability it did not explicitly
//! bind: there is no I/O, no clock, no randomness. Deployment captures the
//! exported instance's own fields and its class's method sources; invocation
//! splices persisted method sources back into a synthesized class, which is
//! why method names and source chunks are re-validated here before parsing.

use tracing::debug;

use crate::ast::Expr;
use crate::error::{SandboxError, SandboxResult};
use crate::interp::Interp;
use crate::limits::Limits;
use crate::parser;
use crate::value::{DataRecord, DataValue, Value};

/// Frozen prelude prepended to every deployment. Defines the distinguished
/// base class every contract must extend.
pub const PREDEFINED_CLASSES: &str = "class Base { }";

/// Name of the class synthesized around persisted method sources
const SYNTH_CLASS: &str = "__contract";

/// One captured contract method: its name and exact source text
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSource {
    pub name: String,
    pub source: String,
}

/// Result of a successful deployment
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    /// The exported instance's own fields
    pub data: DataRecord,
    /// Method sources in declaration order, constructor excluded
    pub methods: Vec<MethodSource>,
    /// Fuel consumed by the execution
    pub fuel_used: u64,
}

/// Result of a successful invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutcome {
    /// Post-call snapshot of the instance's fields
    pub data: DataRecord,
    /// The method's return value
    pub result: DataValue,
    /// Fuel consumed by the execution
    pub fuel_used: u64,
}

/// Deterministic execution host for contract code
#[derive(Debug, Clone)]
pub struct Sandbox {
    limits: Limits,
}

impl Sandbox {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Execute deployment source and capture the exported contract.
    ///
    /// The combined program is the frozen prelude plus the user source. After
    /// execution the `exports` slot must hold an instance of a user-defined
    /// class extending `Base`; anything else is a `BadDefinition`.
    pub fn deploy(&self, source: &str, env: &DataRecord) -> SandboxResult<DeployOutcome> {
        let combined = format!("{PREDEFINED_CLASSES}\n{source}");
        let program = parser::parse(&combined)?;

        let mut interp = Interp::new(&self.limits);
        interp.bind_globals(env)?;
        interp.run(&program)?;

        let instance = match interp.global("exports") {
            Some(Value::Instance(instance)) => instance.clone(),
            _ => return Err(SandboxError::BadDefinition),
        };
        let class = instance.borrow().class.clone();
        if class == "Base" || !interp.extends_base(&class) {
            return Err(SandboxError::BadDefinition);
        }

        let methods: Vec<MethodSource> = interp
            .own_methods(&class)
            .iter()
            .map(|decl| MethodSource {
                name: decl.name.clone(),
                source: decl.source.clone(),
            })
            .collect();
        for method in &methods {
            if !is_valid_method_name(&method.name) {
                return Err(SandboxError::BadDefinition);
            }
        }

        let data = interp.snapshot_instance(&instance)?;
        debug!(class = %class, methods = methods.len(), "contract deployed");

        Ok(DeployOutcome {
            data,
            methods,
            fuel_used: interp.fuel_used(),
        })
    }

    /// Reconstruct a contract from persisted method sources and call one
    /// method on it.
    ///
    /// The synthesized class is instantiated with no arguments, the persisted
    /// `data` is assigned onto the instance, and the post-call fields are
    /// snapshotted back.
    pub fn invoke(
        &self,
        method_sources: &[MethodSource],
        method: &str,
        args: &[DataValue],
        data: &DataRecord,
        env: &DataRecord,
    ) -> SandboxResult<InvokeOutcome> {
        if !is_valid_method_name(method) {
            return Err(SandboxError::UnknownMethod(method.to_string()));
        }
        for source in method_sources {
            validate_method_source(source)?;
        }

        let body: Vec<&str> = method_sources.iter().map(|m| m.source.as_str()).collect();
        let combined = format!(
            "{PREDEFINED_CLASSES}\nclass {SYNTH_CLASS} extends Base {{\n{}\n}}",
            body.join("\n")
        );
        let program = parser::parse(&combined)?;

        let mut interp = Interp::new(&self.limits);
        interp.bind_globals(env)?;
        interp.run(&program)?;

        // A chunk that smuggled extra members past the per-chunk check would
        // change the method census; reject the definition outright.
        let parsed = interp.own_methods(SYNTH_CLASS);
        if parsed.len() != method_sources.len()
            || parsed
                .iter()
                .zip(method_sources)
                .any(|(decl, chunk)| decl.name != chunk.name)
        {
            return Err(SandboxError::BadDefinition);
        }

        let imported_args: Vec<Value> = args
            .iter()
            .map(|arg| interp.import_data(arg))
            .collect::<SandboxResult<_>>()?;

        let instance = interp.instantiate(SYNTH_CLASS, &[])?;
        interp.assign_fields(&instance, data)?;
        let result = interp.call_method_by_name(&instance, method, &imported_args)?;
        let result = crate::value::snapshot_value(&result, 0)?;
        let data = interp.snapshot_instance(&instance)?;

        Ok(InvokeOutcome {
            data,
            result,
            fuel_used: interp.fuel_used(),
        })
    }
}

/// Parse an invocation string of the form `methodName(arg, ...)`.
///
/// Arguments must be literals: integers, strings, booleans, null, and arrays
/// or records of literals. An empty string yields `None` (default dispatch).
pub fn parse_invocation(text: &str) -> SandboxResult<Option<(String, Vec<DataValue>)>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let expr = parser::parse_expression(trimmed)?;
    let Expr::Call { callee, args } = expr else {
        return Err(SandboxError::Parse(
            "invocation must have the form method(args)".to_string(),
        ));
    };
    let Expr::Ident(name) = *callee else {
        return Err(SandboxError::Parse(
            "invocation must name a method".to_string(),
        ));
    };
    if !is_valid_method_name(&name) {
        return Err(SandboxError::UnknownMethod(name));
    }

    let args = args.iter().map(literal_value).collect::<SandboxResult<_>>()?;
    Ok(Some((name, args)))
}

fn literal_value(expr: &Expr) -> SandboxResult<DataValue> {
    match expr {
        Expr::Int(n) => Ok(DataValue::Int(*n)),
        Expr::Str(s) => Ok(DataValue::Str(s.clone())),
        Expr::Bool(b) => Ok(DataValue::Bool(*b)),
        Expr::Null => Ok(DataValue::Null),
        Expr::Unary {
            op: crate::ast::UnaryOp::Neg,
            expr,
        } => match literal_value(expr)? {
            DataValue::Int(n) => n
                .checked_neg()
                .map(DataValue::Int)
                .ok_or_else(|| SandboxError::Parse("integer literal out of range".to_string())),
            _ => Err(SandboxError::Parse(
                "invocation arguments must be literals".to_string(),
            )),
        },
        Expr::Array(elems) => Ok(DataValue::List(
            elems.iter().map(literal_value).collect::<SandboxResult<_>>()?,
        )),
        Expr::Object(pairs) => {
            let mut record = DataRecord::new();
            for (key, value) in pairs {
                record.insert(key.clone(), literal_value(value)?);
            }
            Ok(DataValue::Record(record))
        }
        _ => Err(SandboxError::Parse(
            "invocation arguments must be literals".to_string(),
        )),
    }
}

/// ASCII identifier check for contract method names
pub fn is_valid_method_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Persisted method chunks are re-checked before being spliced into a class
/// body: the leading identifier must be the recorded name, immediately
/// followed by a parameter list.
fn validate_method_source(method: &MethodSource) -> SandboxResult<()> {
    if !is_valid_method_name(&method.name) {
        return Err(SandboxError::BadDefinition);
    }
    let source = method.source.trim_start();
    let rest = source
        .strip_prefix(method.name.as_str())
        .ok_or(SandboxError::BadDefinition)?;
    if !rest.trim_start().starts_with('(') {
        return Err(SandboxError::BadDefinition);
    }
    Ok(())
}
