//! Polymorphic configuration decoding
//!
//! A provider node is a JSON object with exactly one property whose name is
//! a registered schema key, e.g. `{"textToDateTime": "2024-01-01T00:00:00Z"}`.
//! The [`BuilderRegistry`] maps each key to a factory that decodes the
//! property value, recursing into child nodes through the [`ConfigDecoder`].
//! Any non-object node is promoted to a static builder for the expected type.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::data::{DataType, EntityValue, ValueKind};
use crate::error::{DecodeError, DecodeResult};
use crate::path::PathExpression;
use crate::provider::{ArcBuilder, ObjectBuilderAdapter};
use crate::providers::static_value::StaticBuilder;
use ax_core::roots;

/// A decoded builder of any value family
#[derive(Debug, Clone)]
pub enum AnyBuilder {
    Text(ArcBuilder<String>),
    Integer(ArcBuilder<i64>),
    Number(ArcBuilder<f64>),
    Boolean(ArcBuilder<bool>),
    DateTime(ArcBuilder<DateTime<Utc>>),
    Date(ArcBuilder<NaiveDate>),
    Time(ArcBuilder<NaiveTime>),
    List(ArcBuilder<Vec<Value>>),
    Object(ArcBuilder<Value>),
    Entity(ArcBuilder<EntityValue>),
}

impl AnyBuilder {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            AnyBuilder::Text(_) => ValueKind::Text,
            AnyBuilder::Integer(_) => ValueKind::Integer,
            AnyBuilder::Number(_) => ValueKind::Number,
            AnyBuilder::Boolean(_) => ValueKind::Boolean,
            AnyBuilder::DateTime(_) => ValueKind::DateTime,
            AnyBuilder::Date(_) => ValueKind::Date,
            AnyBuilder::Time(_) => ValueKind::Time,
            AnyBuilder::List(_) => ValueKind::List,
            AnyBuilder::Object(_) => ValueKind::Object,
            AnyBuilder::Entity(_) => ValueKind::Entity,
        }
    }

    /// Erase into a builder producing raw JSON
    pub fn into_object(self) -> ArcBuilder<Value> {
        match self {
            AnyBuilder::Object(builder) => builder,
            AnyBuilder::Text(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::Integer(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::Number(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::Boolean(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::DateTime(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::Date(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::Time(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::List(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
            AnyBuilder::Entity(builder) => Arc::new(ObjectBuilderAdapter::new(builder)),
        }
    }
}

/// Decodes the property value of a node into a builder
pub type BuilderFactory =
    Arc<dyn Fn(&Value, &ConfigDecoder<'_>, &str) -> DecodeResult<AnyBuilder> + Send + Sync>;

/// Schema key to factory table
#[derive(Clone, Default)]
pub struct BuilderRegistry {
    factories: HashMap<&'static str, BuilderFactory>,
}

impl BuilderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in provider
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::providers::register_defaults(&mut registry);
        registry
    }

    /// Register a factory under a schema key, replacing any previous one
    pub fn register<F>(&mut self, key: &'static str, factory: F)
    where
        F: Fn(&Value, &ConfigDecoder<'_>, &str) -> DecodeResult<AnyBuilder> + Send + Sync + 'static,
    {
        self.factories.insert(key, Arc::new(factory));
    }

    /// Register a factory producing builders of one value family
    pub fn register_typed<T, F>(&mut self, key: &'static str, factory: F)
    where
        T: DataType,
        F: Fn(&Value, &ConfigDecoder<'_>, &str) -> DecodeResult<ArcBuilder<T>>
            + Send
            + Sync
            + 'static,
    {
        self.register(key, move |body, decoder, pointer| {
            factory(body, decoder, pointer).map(T::into_any_builder)
        });
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered schema keys, sorted
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.factories.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn get(&self, key: &str) -> Option<&BuilderFactory> {
        self.factories.get(key)
    }
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Append a property name to a JSON pointer
pub fn child_pointer(pointer: &str, key: &str) -> String {
    format!("{}/{}", pointer, key.replace('~', "~0").replace('/', "~1"))
}

/// Context paths referenced by a configuration, gathered while decoding
///
/// Stored relative to the `context` root, e.g. `quote.customer.fullName`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathHints {
    paths: BTreeSet<String>,
}

impl PathHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a static path expression; paths outside the `context` root are ignored
    pub fn record(&mut self, path: &str) {
        let expression = PathExpression::parse(path);
        let segments = expression.segments();
        if segments.len() < 2 || segments[0] != roots::CONTEXT {
            return;
        }
        self.paths.insert(segments[1..].join("."));
    }

    /// Distinct property paths referenced below a context key
    ///
    /// List indices are dropped, and a bare `id` is not reported since
    /// identity never needs loading.
    pub fn sub_paths(&self, key: &str) -> BTreeSet<String> {
        self.paths
            .iter()
            .filter_map(|path| {
                let mut segments = path.split('.');
                if segments.next() != Some(key) {
                    return None;
                }
                let rest: Vec<&str> = segments
                    .filter(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
                    .collect();
                if rest.is_empty() || rest == ["id"] {
                    None
                } else {
                    Some(rest.join("."))
                }
            })
            .collect()
    }

    pub fn merge(&mut self, other: &PathHints) {
        self.paths.extend(other.paths.iter().cloned());
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Decodes JSON configuration into builder trees
pub struct ConfigDecoder<'a> {
    registry: &'a BuilderRegistry,
    hints: RefCell<PathHints>,
}

impl<'a> ConfigDecoder<'a> {
    pub fn new(registry: &'a BuilderRegistry) -> Self {
        Self {
            registry,
            hints: RefCell::new(PathHints::new()),
        }
    }

    /// Decode a node expected to produce a `T`
    pub fn decode<T: DataType>(&self, node: &Value, pointer: &str) -> DecodeResult<ArcBuilder<T>> {
        match node {
            Value::Object(map) => {
                let (key, builder) = self.decode_node(map, pointer)?;
                T::from_any_builder(builder).map_err(|found| DecodeError::KindMismatch {
                    pointer: pointer.to_string(),
                    key: key.to_string(),
                    expected: T::KIND,
                    found: found.value_kind(),
                })
            }
            Value::Null => Ok(Arc::new(StaticBuilder::<T>::null())),
            literal => match T::from_literal(literal) {
                Some(value) => Ok(Arc::new(StaticBuilder::new(value))),
                None => Err(DecodeError::InvalidLiteral {
                    pointer: pointer.to_string(),
                    expected: T::KIND,
                    value: literal.to_string(),
                }),
            },
        }
    }

    /// Decode a node whose value family is not known in advance
    ///
    /// Literals take the family matching their JSON shape.
    pub fn decode_any(&self, node: &Value, pointer: &str) -> DecodeResult<AnyBuilder> {
        match node {
            Value::Object(map) => self.decode_node(map, pointer).map(|(_, builder)| builder),
            Value::String(_) => self.decode::<String>(node, pointer).map(AnyBuilder::Text),
            Value::Bool(_) => self.decode::<bool>(node, pointer).map(AnyBuilder::Boolean),
            Value::Number(n) if n.is_i64() => {
                self.decode::<i64>(node, pointer).map(AnyBuilder::Integer)
            }
            Value::Number(_) => self.decode::<f64>(node, pointer).map(AnyBuilder::Number),
            Value::Array(_) => self
                .decode::<Vec<Value>>(node, pointer)
                .map(AnyBuilder::List),
            Value::Null => self.decode::<Value>(node, pointer).map(AnyBuilder::Object),
        }
    }

    /// Decode a JSON array of nodes
    pub fn decode_list<T: DataType>(
        &self,
        node: &Value,
        pointer: &str,
    ) -> DecodeResult<Vec<ArcBuilder<T>>> {
        let items = node.as_array().ok_or_else(|| DecodeError::InvalidShape {
            pointer: pointer.to_string(),
            expected: "a list of provider nodes".to_string(),
        })?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.decode::<T>(item, &child_pointer(pointer, &index.to_string()))
            })
            .collect()
    }

    /// Decode a mandatory property of a node body
    pub fn required<T: DataType>(
        &self,
        body: &Map<String, Value>,
        property: &str,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<T>> {
        match body.get(property) {
            Some(node) => self.decode(node, &child_pointer(pointer, property)),
            None => Err(DecodeError::MissingProperty {
                pointer: pointer.to_string(),
                property: property.to_string(),
            }),
        }
    }

    /// Decode an optional property of a node body
    pub fn optional<T: DataType>(
        &self,
        body: &Map<String, Value>,
        property: &str,
        pointer: &str,
    ) -> DecodeResult<Option<ArcBuilder<T>>> {
        body.get(property)
            .map(|node| self.decode(node, &child_pointer(pointer, property)))
            .transpose()
    }

    /// Require a node body to be an object holding only `allowed` properties
    pub fn expect_object<'v>(
        &self,
        body: &'v Value,
        pointer: &str,
        allowed: &[&str],
    ) -> DecodeResult<&'v Map<String, Value>> {
        let map = body.as_object().ok_or_else(|| DecodeError::InvalidShape {
            pointer: pointer.to_string(),
            expected: "an object".to_string(),
        })?;
        if let Some(unknown) = map.keys().find(|key| !allowed.contains(&key.as_str())) {
            return Err(DecodeError::UnknownProperty {
                pointer: pointer.to_string(),
                property: unknown.clone(),
            });
        }
        Ok(map)
    }

    /// Remember a static path so hydration can request only what is used
    pub fn record_path(&self, path: &str) {
        self.hints.borrow_mut().record(path);
    }

    /// Paths recorded so far
    pub fn hints(&self) -> PathHints {
        self.hints.borrow().clone()
    }

    pub fn into_hints(self) -> PathHints {
        self.hints.into_inner()
    }

    fn decode_node<'m>(
        &self,
        map: &'m Map<String, Value>,
        pointer: &str,
    ) -> DecodeResult<(&'m str, AnyBuilder)> {
        let mut entries = map.iter();
        let (key, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(DecodeError::InvalidNode {
                    pointer: pointer.to_string(),
                    count: map.len(),
                })
            }
        };
        let factory = self
            .registry
            .get(key)
            .ok_or_else(|| DecodeError::UnknownProvider {
                pointer: pointer.to_string(),
                key: key.clone(),
            })?;
        let builder = factory(body, self, &child_pointer(pointer, key))?;
        Ok((key.as_str(), builder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_hints_sub_paths() {
        let mut hints = PathHints::new();
        hints.record("context.quote.customer.fullName");
        hints.record("/context/quote/id");
        hints.record("context.claims.0.amount");
        hints.record("context.quote");
        hints.record("trigger.payload.total");

        let quote: Vec<_> = hints.sub_paths("quote").into_iter().collect();
        assert_eq!(quote, vec!["customer.fullName".to_string()]);

        let claims: Vec<_> = hints.sub_paths("claims").into_iter().collect();
        assert_eq!(claims, vec!["amount".to_string()]);

        assert_eq!(hints.len(), 4);
    }

    #[test]
    fn test_child_pointer_escapes() {
        assert_eq!(child_pointer("/outputs", "a/b"), "/outputs/a~1b");
        assert_eq!(child_pointer("", "x~y"), "/x~0y");
    }

    #[test]
    fn test_literal_promotion() {
        let registry = BuilderRegistry::new();
        let decoder = ConfigDecoder::new(&registry);

        assert!(decoder.decode::<i64>(&json!(5), "").is_ok());
        assert!(decoder.decode::<i64>(&json!("5"), "").is_ok());
        assert!(decoder.decode::<Value>(&json!([1, 2]), "").is_ok());

        let err = decoder.decode::<i64>(&json!("five"), "/x").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidLiteral { ref pointer, .. } if pointer == "/x"));
    }

    #[test]
    fn test_unknown_key_and_multi_key_nodes() {
        let registry = BuilderRegistry::new();
        let decoder = ConfigDecoder::new(&registry);

        let err = decoder.decode::<i64>(&json!({"nope": 1}), "/a").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownProvider {
                pointer: "/a".into(),
                key: "nope".into()
            }
        );

        let err = decoder.decode::<i64>(&json!({"a": 1, "b": 2}), "/a").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidNode { count: 2, .. }));
    }
}
