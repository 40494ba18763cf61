//! Rhai-backed action registry
//!
//! Each action is a [Rhai](https://rhai.rs) script. The input is bound to the
//! variable `value` and the last expression of the script is the output:
//!
//! ```rhai
//! // read.edge.sensor.temp: 2-byte big-endian tenths of a degree
//! binaryToNumber(value, "big", 16) / 10.0
//! ```
//!
//! Decoded binary payloads arrive as blobs. A script that evaluates to `()`
//! produces no output, and the caller keeps the untransformed value.
//!
//! Bridge functions available to scripts:
//!
//! - `numberToBinary(value, endian?, size?)` returns a blob, or the pair
//!   `[(), message]` when `value` is not a number or numeric string
//! - `binaryToNumber(bytes, endian?, size?)` returns a number
//! - `fromJSON(text)` returns a map/array/scalar, or `[(), message]`
//!
//! Invalid endian or size arguments, and too-short input to
//! `binaryToNumber`, raise a script error.

use super::{ActionError, ActionRegistry};
use bytes::Bytes;
use parking_lot::RwLock;
use ric_edge_shared::bridge::{self, BridgeError, NumberArg};
use ric_edge_shared::{defaults, ActionValue};
use rhai::{Blob, Dynamic, Engine, EvalAltResult, Scope, AST, INT};
use serde_json::Value;
use std::collections::HashMap;

type ScriptResult = Result<Dynamic, Box<EvalAltResult>>;

/// Registry of compiled transform scripts sharing one engine
pub struct ScriptActions {
    engine: Engine,
    scripts: RwLock<HashMap<String, AST>>,
}

impl ScriptActions {
    pub fn new() -> Self {
        Self::with_max_operations(defaults::SCRIPT_MAX_OPERATIONS)
    }

    /// Create a registry whose scripts abort after `max_operations`
    pub fn with_max_operations(max_operations: u64) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(max_operations);
        register_bridge(&mut engine);

        Self {
            engine,
            scripts: RwLock::new(HashMap::new()),
        }
    }

    /// Number of registered actions
    pub fn len(&self) -> usize {
        self.scripts.read().len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.read().contains_key(name)
    }
}

impl Default for ScriptActions {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry for ScriptActions {
    fn add(&self, name: &str, source: &str) -> Result<(), ActionError> {
        let ast = self.engine.compile(source).map_err(|e| ActionError::Compile {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.scripts.write().insert(name.to_string(), ast);
        Ok(())
    }

    fn remove(&self, name: &str) {
        self.scripts.write().remove(name);
    }

    fn execute(&self, name: &str, input: ActionValue) -> Result<Option<ActionValue>, ActionError> {
        let scripts = self.scripts.read();
        let ast = scripts
            .get(name)
            .ok_or_else(|| ActionError::NotFound(name.to_string()))?;

        let value = match input {
            ActionValue::Json(v) => rhai::serde::to_dynamic(&v).map_err(|e| ActionError::Conversion {
                name: name.to_string(),
                reason: e.to_string(),
            })?,
            ActionValue::Bytes(b) => Dynamic::from_blob(b.to_vec()),
        };

        let mut scope = Scope::new();
        scope.push_dynamic("value", value);

        let output = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| ActionError::Runtime {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if output.is_unit() {
            return Ok(None);
        }
        if output.is::<Blob>() {
            return Ok(Some(ActionValue::Bytes(Bytes::from(output.cast::<Blob>()))));
        }

        let json: Value = rhai::serde::from_dynamic(&output).map_err(|e| ActionError::Conversion {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(ActionValue::Json(json)))
    }
}

fn register_bridge(engine: &mut Engine) {
    engine.register_fn("numberToBinary", |v: Dynamic| number_to_binary(v, None, None));
    engine.register_fn("numberToBinary", |v: Dynamic, endian: &str| {
        number_to_binary(v, Some(endian), None)
    });
    engine.register_fn(
        "numberToBinary",
        |v: Dynamic, endian: &str, size: Dynamic| -> ScriptResult {
            number_to_binary(v, Some(endian), size_arg(size)?)
        },
    );

    engine.register_fn("binaryToNumber", |b: Blob| binary_to_number(&b, None, None));
    engine.register_fn("binaryToNumber", |b: Blob, endian: &str| {
        binary_to_number(&b, Some(endian), None)
    });
    engine.register_fn(
        "binaryToNumber",
        |b: Blob, endian: &str, size: Dynamic| -> ScriptResult {
            binary_to_number(&b, Some(endian), size_arg(size)?)
        },
    );
    // raw strings are accepted as byte sequences too
    engine.register_fn("binaryToNumber", |s: &str| binary_to_number(s.as_bytes(), None, None));
    engine.register_fn("binaryToNumber", |s: &str, endian: &str| {
        binary_to_number(s.as_bytes(), Some(endian), None)
    });
    engine.register_fn(
        "binaryToNumber",
        |s: &str, endian: &str, size: Dynamic| -> ScriptResult {
            binary_to_number(s.as_bytes(), Some(endian), size_arg(size)?)
        },
    );

    engine.register_fn("fromJSON", from_json);
}

/// Any number is a size; floats truncate and `()` picks the default
fn size_arg(size: Dynamic) -> Result<Option<INT>, Box<EvalAltResult>> {
    if size.is_unit() {
        return Ok(None);
    }
    if let Ok(i) = size.as_int() {
        return Ok(Some(i));
    }
    if let Ok(f) = size.as_float() {
        return Ok(Some(f as INT));
    }
    Err(format!("size must be a number, got {}", size.type_name()).into())
}

fn number_to_binary(value: Dynamic, endian: Option<&str>, size: Option<INT>) -> ScriptResult {
    let text;
    let arg = if let Ok(i) = value.as_int() {
        NumberArg::Number(i as f64)
    } else if let Ok(f) = value.as_float() {
        NumberArg::Number(f)
    } else if value.is_string() {
        text = value.into_string().unwrap_or_default();
        NumberArg::Text(&text)
    } else {
        NumberArg::Unsupported
    };

    match bridge::number_to_binary(arg, endian, size) {
        Ok(bytes) => Ok(Dynamic::from_blob(bytes.to_vec())),
        Err(e) => soft_or_fatal(e),
    }
}

fn binary_to_number(data: &[u8], endian: Option<&str>, size: Option<INT>) -> ScriptResult {
    match bridge::binary_to_number(data, endian, size) {
        Ok(n) => Ok(match INT::try_from(n) {
            Ok(i) => Dynamic::from_int(i),
            Err(_) => Dynamic::from_float(n as f64),
        }),
        Err(e) => soft_or_fatal(e),
    }
}

fn from_json(text: &str) -> ScriptResult {
    match bridge::from_json(text) {
        Ok(value) => rhai::serde::to_dynamic(&value),
        Err(e) => soft_or_fatal(e),
    }
}

/// Raise fatal bridge errors, hand soft ones back as `[(), message]`
fn soft_or_fatal(err: BridgeError) -> ScriptResult {
    if err.is_fatal() {
        Err(err.to_string().into())
    } else {
        Ok(Dynamic::from_array(vec![Dynamic::UNIT, Dynamic::from(err.to_string())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(source: &str, input: ActionValue) -> Result<Option<ActionValue>, ActionError> {
        let actions = ScriptActions::new();
        actions.add("read.test", source).unwrap();
        actions.execute("read.test", input)
    }

    #[test]
    fn test_json_transform() {
        let out = run("value * 2", json!(21).into()).unwrap();
        assert_eq!(out, Some(ActionValue::Json(json!(42))));
    }

    #[test]
    fn test_map_output() {
        let out = run(r#"#{ temp: value.raw / 10, unit: "C" }"#, json!({"raw": 250}).into()).unwrap();
        assert_eq!(out, Some(ActionValue::Json(json!({"temp": 25, "unit": "C"}))));
    }

    #[test]
    fn test_unit_output_is_none() {
        assert_eq!(run("let x = value;", json!(1).into()).unwrap(), None);
    }

    #[test]
    fn test_blob_input_decoding() {
        let input = ActionValue::Bytes(Bytes::from_static(&[0x03, 0xE8]));
        let out = run(r#"binaryToNumber(value, "big", 16)"#, input).unwrap();
        assert_eq!(out, Some(ActionValue::Json(json!(1000))));
    }

    #[test]
    fn test_blob_output() {
        let out = run(r#"numberToBinary(value, "big", 16)"#, json!(70000).into()).unwrap();
        assert_eq!(out, Some(ActionValue::Bytes(Bytes::from_static(&[0x11, 0x70]))));
    }

    #[test]
    fn test_float_and_unit_sizes() {
        let out = run(r#"numberToBinary(value, "big", 16.0)"#, json!(1000).into()).unwrap();
        assert_eq!(out, Some(ActionValue::Bytes(Bytes::from_static(&[0x03, 0xE8]))));

        let input = ActionValue::Bytes(Bytes::from_static(&[0x03, 0xE8]));
        let out = run(r#"binaryToNumber(value, "big", 16.9)"#, input).unwrap();
        assert_eq!(out, Some(ActionValue::Json(json!(1000))));

        let out = run(r#"numberToBinary(value, "little", ())"#, json!(1).into()).unwrap();
        assert_eq!(out, Some(ActionValue::Bytes(Bytes::from_static(&[1, 0, 0, 0]))));
    }

    #[test]
    fn test_non_numeric_size_raises() {
        let err = run(r#"numberToBinary(value, "big", "16")"#, json!(1).into()).unwrap_err();
        assert!(err.to_string().contains("size must be a number"));

        let err = run(r#"numberToBinary(value, "big", 24.0)"#, json!(1).into()).unwrap_err();
        assert!(err.to_string().contains("16, 32 or 64 size allowed"));
    }

    #[test]
    fn test_number_to_binary_soft_error() {
        let out = run(r#"let r = numberToBinary(value); r[1]"#, json!("abc").into()).unwrap();
        match out {
            Some(ActionValue::Json(Value::String(msg))) => assert!(msg.contains("abc")),
            other => panic!("unexpected output: {:?}", other),
        }

        let out = run(r#"numberToBinary(value)"#, json!([1]).into()).unwrap();
        assert_eq!(out, Some(ActionValue::Json(json!([null, "number or string required"]))));
    }

    #[test]
    fn test_binary_to_number_short_input_raises() {
        let input = ActionValue::Bytes(Bytes::from_static(&[1]));
        let err = run("binaryToNumber(value)", input).unwrap_err();
        assert!(matches!(err, ActionError::Runtime { .. }));
    }

    #[test]
    fn test_invalid_endian_raises() {
        let err = run(r#"numberToBinary(value, "middle")"#, json!(1).into()).unwrap_err();
        assert!(err.to_string().contains("little or big endian allowed"));
    }

    #[test]
    fn test_from_json() {
        let out = run(r#"fromJSON(value).a[1]"#, json!(r#"{"a":[1,7]}"#).into()).unwrap();
        assert_eq!(out, Some(ActionValue::Json(json!(7))));

        let out = run(r#"fromJSON(value)[0]"#, json!("{broken").into()).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn test_missing_and_removed_actions() {
        let actions = ScriptActions::new();
        assert!(matches!(
            actions.execute("read.none", json!(1).into()),
            Err(ActionError::NotFound(_))
        ));

        actions.add("read.x", "value").unwrap();
        assert!(actions.contains("read.x"));
        actions.remove("read.x");
        assert_eq!(actions.len(), 0);
    }

    #[test]
    fn test_compile_error() {
        let actions = ScriptActions::new();
        let err = actions.add("read.bad", "let = ;").unwrap_err();
        assert!(matches!(err, ActionError::Compile { .. }));
    }

    #[test]
    fn test_runaway_script_is_stopped() {
        let actions = ScriptActions::with_max_operations(1_000);
        actions.add("read.loop", "loop { }").unwrap();
        assert!(matches!(
            actions.execute("read.loop", json!(1).into()),
            Err(ActionError::Runtime { .. })
        ));
    }
}
