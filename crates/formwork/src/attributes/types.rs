//! Attribute type descriptors.
//!
//! An [`AttributeType`] is the caster for one attribute: it turns raw
//! submitted values into typed ones and supplies a default. Introduced
//! (form-local) attributes, the reference [`Model`](crate::store::Model)
//! fields, and the boolean `_destroy` flag of nested collections all go
//! through it.

use super::multiparameter::with_trailing_defaults;
use super::value::Value;
use crate::error::ConfigurationError;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::str::FromStr;

/// String spellings that cast to `false`.
pub(crate) const FALSE_STRINGS: &[&str] = &[
    "0", "f", "F", "false", "FALSE", "False", "off", "OFF", "Off", "n", "N", "no", "NO",
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// The kind of value an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// No casting at all.
    Value,
    Boolean,
    Integer,
    Float,
    /// Decimal, rounded half away from zero to `scale` places when set.
    Decimal { scale: Option<u32> },
    String,
    Date,
    DateTime,
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Value => "value",
            TypeKind::Boolean => "boolean",
            TypeKind::Integer => "integer",
            TypeKind::Float => "float",
            TypeKind::Decimal { .. } => "decimal",
            TypeKind::String => "string",
            TypeKind::Date => "date",
            TypeKind::DateTime => "datetime",
        }
    }
}

/// Caster plus default value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeType {
    kind: TypeKind,
    default: Value,
}

impl AttributeType {
    pub const fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            default: Value::Null,
        }
    }

    pub const fn value() -> Self {
        Self::new(TypeKind::Value)
    }

    pub const fn boolean() -> Self {
        Self::new(TypeKind::Boolean)
    }

    pub const fn integer() -> Self {
        Self::new(TypeKind::Integer)
    }

    pub const fn float() -> Self {
        Self::new(TypeKind::Float)
    }

    pub const fn decimal(scale: Option<u32>) -> Self {
        Self::new(TypeKind::Decimal { scale })
    }

    pub const fn string() -> Self {
        Self::new(TypeKind::String)
    }

    pub const fn date() -> Self {
        Self::new(TypeKind::Date)
    }

    pub const fn datetime() -> Self {
        Self::new(TypeKind::DateTime)
    }

    /// Set the raw default. It is cast like any other raw value on read.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Look up a type by name (`"integer"`, `"string"`, ...).
    pub fn lookup(name: &str) -> Result<Self, ConfigurationError> {
        let kind = match name {
            "value" | "any" => TypeKind::Value,
            "boolean" | "bool" => TypeKind::Boolean,
            "integer" => TypeKind::Integer,
            "float" => TypeKind::Float,
            "decimal" => TypeKind::Decimal { scale: None },
            "string" | "text" => TypeKind::String,
            "date" => TypeKind::Date,
            "datetime" | "time" => TypeKind::DateTime,
            other => return Err(ConfigurationError::UnknownType(other.to_string())),
        };
        Ok(Self::new(kind))
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// The default after casting.
    pub fn cast_default(&self) -> Value {
        self.cast(&self.default)
    }

    /// Cast a raw value. Unparseable input becomes null rather than an error.
    pub fn cast(&self, raw: &Value) -> Value {
        if let Value::Parts(parts) = raw {
            return self.construct(parts).unwrap_or(Value::Null);
        }
        if matches!(raw, Value::Str(s) if s.trim().is_empty()) && self.kind != TypeKind::String {
            return Value::Null;
        }
        if raw.is_null() {
            return Value::Null;
        }

        match self.kind {
            TypeKind::Value => raw.clone(),
            TypeKind::Boolean => cast_boolean(raw),
            TypeKind::Integer => cast_integer(raw),
            TypeKind::Float => cast_float(raw),
            TypeKind::Decimal { scale } => cast_decimal(raw, scale),
            TypeKind::String => Value::Str(raw.to_string()),
            TypeKind::Date => cast_date(raw),
            TypeKind::DateTime => cast_datetime(raw),
        }
    }

    /// Build a value from positional parts (the multi-part constructor).
    ///
    /// Dates need year, month and day and yield null when any is missing.
    /// Datetimes require year, month and day and default missing trailing
    /// hour, minute and second to zero. Other kinds accept only a single
    /// part at position 1.
    pub fn construct(&self, parts: &BTreeMap<u32, Value>) -> Result<Value, String> {
        match self.kind {
            TypeKind::Date => {
                let (Some(year), Some(month), Some(day)) =
                    (part(parts, 1), part(parts, 2), part(parts, 3))
                else {
                    return Ok(Value::Null);
                };
                ymd(year, month, day)
                    .map(Value::Date)
                    .ok_or_else(|| "invalid date".to_string())
            }
            TypeKind::DateTime => {
                if let Some(missing) = (1..=3).find(|pos| part(parts, *pos).is_none()) {
                    return Err(format!("missing parameter {missing}"));
                }
                let parts = with_trailing_defaults(parts, 6, &Value::Int(0));
                let n = |pos| part(&parts, pos).unwrap_or(0);
                ymd(n(1), n(2), n(3))
                    .and_then(|date| {
                        date.and_hms_opt(
                            u32::try_from(n(4)).ok()?,
                            u32::try_from(n(5)).ok()?,
                            u32::try_from(n(6)).ok()?,
                        )
                    })
                    .map(Value::DateTime)
                    .ok_or_else(|| "invalid datetime".to_string())
            }
            _ => match (parts.len(), parts.get(&1)) {
                (1, Some(single)) => Ok(self.cast(single)),
                _ => Err(format!(
                    "{} attributes cannot be assigned from multiple parameters",
                    self.kind.name()
                )),
            },
        }
    }
}

fn part(parts: &BTreeMap<u32, Value>, pos: u32) -> Option<i64> {
    parts
        .get(&pos)
        .filter(|v| !v.is_null())
        .map(Value::to_integer_lossy)
}

fn ymd(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )
}

fn cast_boolean(raw: &Value) -> Value {
    match raw {
        Value::Bool(b) => Value::Bool(*b),
        Value::Str(s) => Value::Bool(!FALSE_STRINGS.contains(&s.trim())),
        other => Value::Bool(other.is_truthy()),
    }
}

fn cast_integer(raw: &Value) -> Value {
    match raw {
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) | Value::Str(_) => {
            Value::Int(raw.to_integer_lossy())
        }
        _ => Value::Null,
    }
}

fn cast_float(raw: &Value) -> Value {
    match raw {
        Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) | Value::Str(_) => {
            Value::Float(raw.to_float_lossy())
        }
        _ => Value::Null,
    }
}

fn cast_decimal(raw: &Value, scale: Option<u32>) -> Value {
    let decimal = match raw {
        Value::Decimal(d) => Some(*d),
        Value::Int(i) => Some(Decimal::from(*i)),
        Value::Float(f) => Decimal::try_from(*f).ok(),
        Value::Str(s) => Some(Decimal::from_str(s.trim()).unwrap_or(Decimal::ZERO)),
        _ => None,
    };
    match (decimal, scale) {
        (Some(d), Some(scale)) => Value::Decimal(
            d.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
        ),
        (Some(d), None) => Value::Decimal(d),
        (None, _) => Value::Null,
    }
}

fn cast_date(raw: &Value) -> Value {
    match raw {
        Value::Date(d) => Value::Date(*d),
        Value::DateTime(dt) => Value::Date(dt.date()),
        Value::Str(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .or_else(|| parse_datetime(s).map(|dt| dt.date()))
                .map_or(Value::Null, Value::Date)
        }
        _ => Value::Null,
    }
}

fn cast_datetime(raw: &Value) -> Value {
    match raw {
        Value::DateTime(dt) => Value::DateTime(*dt),
        Value::Date(d) => d.and_hms_opt(0, 0, 0).map_or(Value::Null, Value::DateTime),
        Value::Str(s) => {
            let s = s.trim();
            parse_datetime(s)
                .or_else(|| {
                    NaiveDate::parse_from_str(s, DATE_FORMAT)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map_or(Value::Null, Value::DateTime)
        }
        _ => Value::Null,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}
