//! Embedded JavaScript for script nodes.
//!
//! Each run gets a fresh [`Context`] on a blocking thread, so no state
//! leaks between nodes. The global scope is plain ECMAScript plus
//! `getVal`/`setVal`; there is no module loader and no host I/O. Runtime
//! limits stop runaway loops and recursion even after the caller has
//! stopped waiting.

use std::cell::RefCell;
use std::time::Duration;

use apiflow_core::flow::{BoxFuture, ScriptEngine, ScriptError, VarMap};
use boa_engine::{
    Context, JsNativeError, JsResult, JsValue, NativeFunction, Script, Source, js_string,
};
use serde_json::Value;

const DEFAULT_LOOP_LIMIT: u64 = 50_000_000;
const DEFAULT_RECURSION_LIMIT: usize = 512;

thread_local! {
    static BOUND_VARS: RefCell<Option<VarMap>> = const { RefCell::new(None) };
}

/// Binds a run's variables to the current thread for the native callables.
struct VarsGuard;

impl VarsGuard {
    fn bind(vars: VarMap) -> Self {
        BOUND_VARS.with(|cell| *cell.borrow_mut() = Some(vars));
        VarsGuard
    }
}

impl Drop for VarsGuard {
    fn drop(&mut self) {
        BOUND_VARS.with(|cell| cell.borrow_mut().take());
    }
}

fn bound_vars() -> JsResult<VarMap> {
    BOUND_VARS
        .with(|cell| cell.borrow().clone())
        .ok_or_else(|| JsNativeError::error().with_message("variables are not available").into())
}

fn key_arg(args: &[JsValue], ctx: &mut Context) -> JsResult<String> {
    let key = args.first().cloned().unwrap_or_default();
    if key.is_undefined() || key.is_null() {
        return Err(JsNativeError::typ().with_message("a variable name is required").into());
    }
    Ok(key.to_string(ctx)?.to_std_string_escaped())
}

fn get_val(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let key = key_arg(args, ctx)?;
    match bound_vars()?.get(&key) {
        Some(value) => JsValue::from_json(&value, ctx),
        None => Ok(JsValue::undefined()),
    }
}

/// Only strings, numbers and booleans cross back into the flow.
fn scalar(value: &JsValue) -> Option<Value> {
    if let Some(b) = value.as_boolean() {
        return Some(Value::Bool(b));
    }
    if let Some(s) = value.as_string() {
        return Some(Value::String(s.to_std_string_escaped()));
    }
    let n = value.as_number()?;
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

fn set_val(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let key = key_arg(args, ctx)?;
    let value = args.get(1).cloned().unwrap_or_default();
    let value = scalar(&value).ok_or_else(|| {
        JsNativeError::typ().with_message(format!(
            "setVal('{key}'): only strings, numbers and booleans can be stored"
        ))
    })?;
    bound_vars()?.set(key, value);
    Ok(JsValue::undefined())
}

fn to_json(value: &JsValue, ctx: &mut Context) -> Result<Value, ScriptError> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    value.to_json(ctx).map_err(|e| ScriptError::Runtime(e.to_string()))
}

/// Runs `code` to completion on the current thread.
fn evaluate(code: &str, vars: VarMap, loop_limit: u64) -> Result<Value, ScriptError> {
    let _guard = VarsGuard::bind(vars);
    let mut ctx = Context::default();
    ctx.runtime_limits_mut().set_loop_iteration_limit(loop_limit);
    ctx.runtime_limits_mut().set_recursion_limit(DEFAULT_RECURSION_LIMIT);

    for (name, f) in [
        (js_string!("getVal"), get_val as fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>),
        (js_string!("setVal"), set_val),
    ] {
        ctx.register_global_callable(name, 2, NativeFunction::from_fn_ptr(f))
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;
    }

    let script = Script::parse(Source::from_bytes(code), None, &mut ctx)
        .map_err(|e| ScriptError::Syntax(e.to_string()))?;
    let value = script
        .evaluate(&mut ctx)
        .map_err(|e| ScriptError::Runtime(e.to_string()))?;
    to_json(&value, &mut ctx)
}

/// [`ScriptEngine`] backed by the boa interpreter.
#[derive(Debug, Clone)]
pub struct BoaScriptEngine {
    loop_limit: u64,
}

impl Default for BoaScriptEngine {
    fn default() -> Self {
        Self {
            loop_limit: DEFAULT_LOOP_LIMIT,
        }
    }
}

impl BoaScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loop_limit(loop_limit: u64) -> Self {
        Self { loop_limit }
    }

    async fn run_script(&self, code: &str, vars: VarMap, timeout: Duration) -> Result<Value, ScriptError> {
        let code = code.to_owned();
        let loop_limit = self.loop_limit;
        let task = tokio::task::spawn_blocking(move || evaluate(&code, vars, loop_limit));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ScriptError::Runtime(format!("script task failed: {join}"))),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "script timed out");
                Err(ScriptError::Timeout)
            }
        }
    }
}

impl ScriptEngine for BoaScriptEngine {
    fn run<'a>(&'a self, code: &'a str, vars: VarMap, timeout: Duration) -> BoxFuture<'a, Result<Value, ScriptError>> {
        Box::pin(self.run_script(code, vars, timeout))
    }
}
