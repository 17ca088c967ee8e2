//! Rhai evaluation of `Formula` fields.
//!
//! Each metadata key that is a valid identifier is pushed into the scope as a
//! variable; every key is also reachable through the `fields` map, so
//! `fields["unit price"] * qty` works for names with spaces.

use crate::core::frontmatter::Metadata;
use crate::{FileClassError, Result};
use rhai::{Dynamic, Engine, Map, Scope};
use serde_json::{Number, Value};

/// Upper bound on Rhai operations per evaluation, so a runaway formula fails
/// instead of hanging the caller.
const MAX_OPERATIONS: u64 = 100_000;

/// Evaluates formula expressions against a record's metadata.
#[derive(Debug)]
pub struct FormulaEngine {
    engine: Engine,
}

impl FormulaEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(64, 32);
        Self { engine }
    }

    /// Evaluates `expression` with `metadata` in scope.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::Scripting`] if the expression fails to parse
    /// or raises an error while running.
    pub fn evaluate(&self, expression: &str, metadata: &Metadata) -> Result<Value> {
        let mut scope = Scope::new();
        let mut fields = Map::new();
        for (key, value) in metadata {
            let dynamic = value_to_dynamic(value);
            if is_identifier(key) {
                scope.push_dynamic(key.clone(), dynamic.clone());
            }
            fields.insert(key.as_str().into(), dynamic);
        }
        scope.push_constant("fields", fields);

        let result = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, expression)
            .map_err(|e| FileClassError::Scripting(format!("'{expression}': {e}")))?;
        Ok(dynamic_to_value(result))
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && key != "fields"
}

/// Converts a metadata value to a Rhai [`Dynamic`].
///
/// Integers stay `INT`, other numbers become `FLOAT`, null becomes `()`.
pub(crate) fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from(i),
            None => Dynamic::from(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from(items.iter().map(value_to_dynamic).collect::<rhai::Array>()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.as_str().into(), value_to_dynamic(v));
            }
            Dynamic::from(out)
        }
    }
}

/// Converts a Rhai result back to a metadata value.
///
/// Types with no metadata representation (functions, custom types) are
/// rendered through their string form.
pub(crate) fn dynamic_to_value(d: Dynamic) -> Value {
    if d.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = d.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = d.as_int() {
        return Value::Number(Number::from(i));
    }
    if let Ok(f) = d.as_float() {
        return Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null);
    }
    if d.is_string() {
        return Value::String(d.into_string().unwrap_or_default());
    }
    if d.is_array() {
        let items = d.cast::<rhai::Array>();
        return Value::Array(items.into_iter().map(dynamic_to_value).collect());
    }
    if d.is_map() {
        let map = d.cast::<Map>();
        let mut out = serde_json::Map::new();
        for (k, v) in map {
            out.insert(k.to_string(), dynamic_to_value(v));
        }
        return Value::Object(out);
    }
    Value::String(d.to_string())
}
