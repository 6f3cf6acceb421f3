//! Parameter values, declared parameter tables and the overlay merge.
//!
//! A parameter source (a file in the catalog or an inline `values` map) is
//! flattened to dotted keys when loaded:
//!
//! ```yaml
//! controller:
//!   max_speed: 1.5     # -> controller.max_speed = 1.5
//!   frames: [odom, map]
//! ```
//!
//! String values are substitution templates and are rendered in the scope
//! of the layer that applies them. Scalars keep their declared type. A value
//! that is exactly one substitution (`"$(arg n)"`, `"$(eval n)"`) takes the
//! type of what it renders to: `true`/`false`, integer, float or text.

use crate::error::Result;
use crate::expr::{Bindings, Part, Template, Value, evaluate, parse_template, render};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{:.1}", x),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Text(s) => write!(f, "{:?}", s),
            ParamValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Resolved parameter mapping, ordered by key.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// A parameter value as declared; strings are not rendered yet.
#[derive(Debug, Clone, PartialEq)]
enum Declared {
    Scalar(ParamValue),
    Text(Template),
    List(Vec<Declared>),
}

impl Declared {
    fn render<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<ParamValue> {
        Ok(match self {
            Declared::Scalar(v) => v.clone(),
            Declared::Text(t) => match t.parts.as_slice() {
                [Part::Eval(expr)] => {
                    let context = format!("`{}`", t.source);
                    match evaluate(expr, bindings, &context)? {
                        Value::Bool(b) => ParamValue::Bool(b),
                        Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                            ParamValue::Int(n as i64)
                        }
                        Value::Num(n) => ParamValue::Float(n),
                        Value::Str(s) => infer(s),
                    }
                }
                [Part::Arg(_)] => infer(render(t, bindings)?),
                _ => ParamValue::Text(render(t, bindings)?),
            },
            Declared::List(items) => ParamValue::List(
                items
                    .iter()
                    .map(|i| i.render(bindings))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

/// Type of a value produced by a lone substitution.
fn infer(text: String) -> ParamValue {
    match text.as_str() {
        "true" | "True" => return ParamValue::Bool(true),
        "false" | "False" => return ParamValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return ParamValue::Int(i);
    }
    match text.parse::<f64>() {
        Ok(x) if x.is_finite() => ParamValue::Float(x),
        _ => ParamValue::Text(text),
    }
}

/// Flattened parameter table as loaded from a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    entries: BTreeMap<String, Declared>,
}

impl ParamTable {
    /// Flatten a decoded document. Errors are plain messages; the caller
    /// attaches the source path.
    pub fn from_json(doc: &serde_json::Value) -> std::result::Result<Self, String> {
        let mut table = ParamTable::default();
        match doc {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    table.flatten_into(key, value)?;
                }
            }
            serde_json::Value::Null => {}
            other => {
                return Err(format!(
                    "parameter source must be a mapping, found {}",
                    kind_of(other)
                ));
            }
        }
        Ok(table)
    }

    fn flatten_into(
        &mut self,
        prefix: &str,
        value: &serde_json::Value,
    ) -> std::result::Result<(), String> {
        if let serde_json::Value::Object(map) = value {
            for (key, nested) in map {
                self.flatten_into(&format!("{}.{}", prefix, key), nested)?;
            }
            return Ok(());
        }
        let declared = declare(prefix, value)?;
        self.entries.insert(prefix.to_string(), declared);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Render every template value against `bindings`.
    pub fn render<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<ParamMap> {
        let mut out = ParamMap::new();
        for (key, value) in &self.entries {
            out.insert(key.clone(), value.render(bindings)?);
        }
        Ok(out)
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "a mapping",
    }
}

fn declare(key: &str, value: &serde_json::Value) -> std::result::Result<Declared, String> {
    match value {
        serde_json::Value::Bool(b) => Ok(Declared::Scalar(ParamValue::Bool(*b))),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Declared::Scalar(ParamValue::Int(i))),
            None => n
                .as_f64()
                .map(|x| Declared::Scalar(ParamValue::Float(x)))
                .ok_or_else(|| format!("parameter {} has an unrepresentable number {}", key, n)),
        },
        serde_json::Value::String(s) => parse_template(s)
            .map(Declared::Text)
            .map_err(|e| format!("parameter {}: {}", key, e)),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(format!(
                    "parameter {} may only list scalars, found {}",
                    key,
                    kind_of(item)
                )),
                _ => declare(key, item),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Declared::List),
        serde_json::Value::Null => Err(format!("parameter {} has no value", key)),
        serde_json::Value::Object(_) => Err(format!("parameter {} is a nested mapping", key)),
    }
}

/// One parameter source applied within a scope.
///
/// Layers are only recorded when their load condition held, so every layer
/// reaching the merge participates in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamOverlayLayer {
    /// Catalog path of the file, or `inline:<fragment>` for inline values.
    pub source: String,
    /// Segments of the namespace the layer targets.
    pub namespace: Vec<String>,
    pub values: ParamMap,
}

impl ParamOverlayLayer {
    /// True when a process in `namespace` falls under this layer's target.
    pub fn applies_to(&self, namespace: &[String]) -> bool {
        namespace.starts_with(&self.namespace)
    }
}

/// Merge layers in order; a later layer's key replaces an earlier one's.
pub fn resolve_overlay<'a, I>(layers: I) -> ParamMap
where
    I: IntoIterator<Item = &'a ParamOverlayLayer>,
{
    let mut merged = ParamMap::new();
    for layer in layers {
        for (key, value) in &layer.values {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
