//! Composite (multiparameter) attribute assembly.
//!
//! HTML date selects submit one attribute as several keys:
//!
//! ```text
//! born_on(1i) = "1982"   born_on(2i) = "3"   born_on(3i) = "4"
//! ```
//!
//! The number is the 1-based position of the part, and an optional `i` or
//! `f` casts the part to an integer or float before construction. Parts are
//! grouped by attribute name and handed to the attribute's multi-part
//! constructor as a [`Value::Parts`]. A group whose parts are all empty
//! assigns null instead.

use super::value::Value;
use crate::error::{AttributeAssignmentError, MultiparameterAssignmentErrors};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Cast applied to one part before construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartCast {
    Integer,
    Float,
}

/// A parsed `name(position[flag])` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiparameterKey<'a> {
    pub name: &'a str,
    pub position: u32,
    pub cast: Option<PartCast>,
}

/// Parts grouped per attribute name, in first-seen order.
pub type Callstack = IndexMap<String, BTreeMap<u32, Value>>;

pub fn is_multiparameter_key(key: &str) -> bool {
    key.contains('(')
}

pub fn parse_key(key: &str) -> Option<MultiparameterKey<'_>> {
    let (name, rest) = key.split_once('(')?;
    let inner = rest.strip_suffix(')')?;
    let digits_end = inner
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(inner.len());
    let (digits, flag) = inner.split_at(digits_end);

    let cast = match flag {
        "i" => Some(PartCast::Integer),
        "f" => Some(PartCast::Float),
        _ => None,
    };

    Some(MultiparameterKey {
        name,
        position: digits.parse().unwrap_or(0),
        cast,
    })
}

fn is_empty_part(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Str(s) => s.is_empty(),
        _ => false,
    }
}

fn cast_part(value: &Value, cast: Option<PartCast>) -> Value {
    match cast {
        Some(PartCast::Integer) => Value::Int(value.to_integer_lossy()),
        Some(PartCast::Float) => Value::Float(value.to_float_lossy()),
        None => value.clone(),
    }
}

/// Group composite pairs by attribute name.
///
/// Empty parts become null; the first non-null value for a position wins.
/// Keys that don't parse as composite keys are skipped.
pub fn extract_callstack<'a, I>(pairs: I) -> Callstack
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut callstack = Callstack::new();

    for (key, value) in pairs {
        let Some(parsed) = parse_key(key) else {
            continue;
        };
        let group = callstack.entry(parsed.name.to_string()).or_default();
        let part = if is_empty_part(value) {
            Value::Null
        } else {
            cast_part(value, parsed.cast)
        };

        match group.get(&parsed.position) {
            Some(existing) if !existing.is_null() => {}
            _ => {
                group.insert(parsed.position, part);
            }
        }
    }

    callstack
}

/// The value assigned for one group: null when every part is null.
pub fn assemble(parts: &BTreeMap<u32, Value>) -> Value {
    if parts.values().all(Value::is_null) {
        Value::Null
    } else {
        Value::Parts(parts.clone())
    }
}

/// Copy of `parts` with every position up to `arity` that is missing or
/// null set to `default`.
pub fn with_trailing_defaults(
    parts: &BTreeMap<u32, Value>,
    arity: u32,
    default: &Value,
) -> BTreeMap<u32, Value> {
    let mut filled = parts.clone();
    for position in 1..=arity {
        let slot = filled.entry(position).or_insert(Value::Null);
        if slot.is_null() {
            *slot = default.clone();
        }
    }
    filled
}

/// Assemble every composite group in `pairs` and hand it to `assign`.
///
/// Every group is attempted; failures are reported together.
pub fn assign_multiparameter_attributes<'a, I, F>(
    pairs: I,
    mut assign: F,
) -> Result<(), MultiparameterAssignmentErrors>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
    F: FnMut(&str, Value) -> Result<(), String>,
{
    let mut errors = Vec::new();

    for (name, parts) in extract_callstack(pairs) {
        if let Err(message) = assign(&name, assemble(&parts)) {
            errors.push(AttributeAssignmentError {
                attribute: name,
                values: parts.into_values().collect(),
                message,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(MultiparameterAssignmentErrors { errors })
    }
}
