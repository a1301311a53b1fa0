//! Typed values produced by providers
//!
//! [`Data<T>`] holds one resolved value. [`AnyData`] is its type-erased face,
//! used wherever heterogeneous provider outputs end up in one collection.
//! [`DataType`] is implemented once per value family and carries the
//! canonical coercion from raw JSON into that family.

use ax_core::{EntityKind, EntityReference};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::decoder::AnyBuilder;
use crate::provider::ArcBuilder;

/// The value families a provider can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Integer,
    Number,
    Boolean,
    DateTime,
    Date,
    Time,
    List,
    Object,
    Entity,
}

impl ValueKind {
    pub const ALL: [ValueKind; 10] = [
        ValueKind::Text,
        ValueKind::Integer,
        ValueKind::Number,
        ValueKind::Boolean,
        ValueKind::DateTime,
        ValueKind::Date,
        ValueKind::Time,
        ValueKind::List,
        ValueKind::Object,
        ValueKind::Entity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::DateTime => "dateTime",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::List => "list",
            ValueKind::Object => "object",
            ValueKind::Entity => "entity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the runtime type of a raw JSON value, as shown to automation authors
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// An immutable resolved value
#[derive(Debug, Clone, PartialEq)]
pub struct Data<T> {
    value: T,
}

impl<T> Data<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: DataType> Data<T> {
    /// Erase the payload type
    pub fn into_any(self) -> Arc<dyn AnyData> {
        Arc::new(self)
    }

    /// Re-wrap the payload as raw JSON
    pub fn to_object(&self) -> Data<Value> {
        Data::new(self.value.to_json())
    }
}

impl<T> From<T> for Data<T> {
    fn from(value: T) -> Self {
        Data::new(value)
    }
}

/// Type-erased view of a [`Data<T>`]
pub trait AnyData: fmt::Debug + Send + Sync {
    fn kind(&self) -> ValueKind;
    fn to_json(&self) -> Value;
    fn as_any(&self) -> &dyn Any;
}

impl<T: DataType> AnyData for Data<T> {
    fn kind(&self) -> ValueKind {
        T::KIND
    }

    fn to_json(&self) -> Value {
        self.value.to_json()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn AnyData {
    /// Recover the typed value, if this holds a `T`
    pub fn downcast_ref<T: DataType>(&self) -> Option<&Data<T>> {
        self.as_any().downcast_ref::<Data<T>>()
    }
}

/// A value family with a canonical coercion from raw JSON
pub trait DataType: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: ValueKind;

    /// Convert a non-null raw value, `None` when the shape does not fit
    fn coerce(value: &Value) -> Option<Self>;

    /// Canonical JSON representation
    fn to_json(&self) -> Value;

    /// Accept a bare configuration literal
    fn from_literal(value: &Value) -> Option<Self> {
        Self::coerce(value)
    }

    fn from_any_builder(builder: AnyBuilder) -> Result<ArcBuilder<Self>, AnyBuilder>;

    fn into_any_builder(builder: ArcBuilder<Self>) -> AnyBuilder;
}

macro_rules! any_builder_conversions {
    ($variant:ident) => {
        fn from_any_builder(builder: AnyBuilder) -> Result<ArcBuilder<Self>, AnyBuilder> {
            match builder {
                AnyBuilder::$variant(inner) => Ok(inner),
                other => Err(other),
            }
        }

        fn into_any_builder(builder: ArcBuilder<Self>) -> AnyBuilder {
            AnyBuilder::$variant(builder)
        }
    };
}

/// 2^63 as f64; `i64::MAX as f64` rounds up to this value, so it is the exclusive bound
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

fn numeric_text_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d{1,3}(,\d{3})+|\d+)(\.\d+)?$")
            .expect("numeric text pattern is valid")
    })
}

/// Strip thousands separators from a numeric string, `None` when it is not numeric
fn normalize_numeric_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !numeric_text_regex().is_match(trimmed) {
        return None;
    }
    Some(trimmed.replace(',', ""))
}

impl DataType for String {
    const KIND: ValueKind = ValueKind::Text;

    fn coerce(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }

    any_builder_conversions!(Text);
}

impl DataType for i64 {
    const KIND: ValueKind = ValueKind::Integer;

    fn coerce(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&f) {
                    Some(f as i64)
                } else {
                    None
                }
            }),
            Value::String(s) => {
                let normalized = normalize_numeric_text(s)?;
                let (whole, fraction) = match normalized.split_once('.') {
                    Some((whole, fraction)) => (whole, fraction),
                    None => (normalized.as_str(), ""),
                };
                if !fraction.chars().all(|c| c == '0') {
                    return None;
                }
                whole.parse().ok()
            }
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }

    any_builder_conversions!(Integer);
}

impl DataType for f64 {
    const KIND: ValueKind = ValueKind::Number;

    fn coerce(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => normalize_numeric_text(s)?
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite()),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        serde_json::Number::from_f64(*self)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }

    any_builder_conversions!(Number);
}

impl DataType for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn coerce(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }

    any_builder_conversions!(Boolean);
}

impl DataType for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::DateTime;

    fn coerce(value: &Value) -> Option<Self> {
        let text = value.as_str()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(parsed.with_timezone(&Utc));
        }
        // A local timestamp without an offset is taken as UTC
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    fn to_json(&self) -> Value {
        Value::String(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    any_builder_conversions!(DateTime);
}

impl DataType for NaiveDate {
    const KIND: ValueKind = ValueKind::Date;

    fn coerce(value: &Value) -> Option<Self> {
        let text = value.as_str()?.trim();
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::<Utc>::coerce(value).map(|instant| instant.date_naive()))
    }

    fn to_json(&self) -> Value {
        Value::String(self.format("%Y-%m-%d").to_string())
    }

    any_builder_conversions!(Date);
}

impl DataType for NaiveTime {
    const KIND: ValueKind = ValueKind::Time;

    fn coerce(value: &Value) -> Option<Self> {
        let text = value.as_str()?.trim();
        NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
            .ok()
    }

    fn to_json(&self) -> Value {
        Value::String(self.format("%H:%M:%S%.f").to_string())
    }

    any_builder_conversions!(Time);
}

impl DataType for Vec<Value> {
    const KIND: ValueKind = ValueKind::List;

    fn coerce(value: &Value) -> Option<Self> {
        value.as_array().cloned()
    }

    fn to_json(&self) -> Value {
        Value::Array(self.clone())
    }

    any_builder_conversions!(List);
}

impl DataType for Value {
    const KIND: ValueKind = ValueKind::Object;

    fn coerce(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn to_json(&self) -> Value {
        self.clone()
    }

    /// Every builder can be erased to an object builder
    fn from_any_builder(builder: AnyBuilder) -> Result<ArcBuilder<Self>, AnyBuilder> {
        Ok(builder.into_object())
    }

    fn into_any_builder(builder: ArcBuilder<Self>) -> AnyBuilder {
        AnyBuilder::Object(builder)
    }
}

/// A domain entity as seen by providers: identity plus projected data
#[derive(Debug, Clone, PartialEq)]
pub struct EntityValue {
    pub kind: Option<EntityKind>,
    pub id: String,
    pub data: Value,
}

impl EntityValue {
    pub fn new(kind: Option<EntityKind>, id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            id: id.into(),
            data,
        }
    }

    pub fn reference(&self) -> Option<EntityReference> {
        self.kind
            .map(|kind| EntityReference::new(kind, self.id.clone()))
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.data.get(property)
    }
}

impl DataType for EntityValue {
    const KIND: ValueKind = ValueKind::Entity;

    fn coerce(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let id = match object.get("id")? {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        let kind = object
            .get("entityType")
            .and_then(Value::as_str)
            .and_then(|kind| kind.parse().ok());
        Some(EntityValue::new(kind, id, value.clone()))
    }

    fn to_json(&self) -> Value {
        self.data.clone()
    }

    /// Entities cannot be written inline in configuration
    fn from_literal(_value: &Value) -> Option<Self> {
        None
    }

    any_builder_conversions!(Entity);
}
