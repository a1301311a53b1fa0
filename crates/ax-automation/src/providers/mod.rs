//! Built-in provider families
//!
//! Every family registers its schema keys with [`register_defaults`]. Keys
//! are data: adding a provider means adding a registration here, never a
//! branch in the decoder.

pub mod condition;
pub mod conversion;
pub mod datetime;
pub mod entity;
pub mod integer;
pub mod path_lookup;
pub mod query;
pub mod static_value;
pub mod text;
pub mod unary;

use serde_json::{Map, Value};

use crate::decoder::{child_pointer, BuilderRegistry, ConfigDecoder};
use crate::error::DecodeResult;

/// Register every built-in provider
pub fn register_defaults(registry: &mut BuilderRegistry) {
    static_value::register(registry);
    path_lookup::register(registry);
    conversion::register(registry);
    datetime::register(registry);
    integer::register(registry);
    text::register(registry);
    condition::register(registry);
    entity::register(registry);
    query::register(registry);
}

/// The input of a single-input node
///
/// Nodes accept a shorthand where the body is the input node itself, and a
/// long form where the input sits under `property` next to optional extras.
pub(crate) struct NodeInput<'v> {
    pub node: &'v Value,
    pub pointer: String,
    /// The long form body, when used
    pub body: Option<&'v Map<String, Value>>,
}

pub(crate) fn node_input<'v>(
    decoder: &ConfigDecoder<'_>,
    body: &'v Value,
    pointer: &str,
    property: &str,
    extras: &[&str],
) -> DecodeResult<NodeInput<'v>> {
    let long_form = body
        .as_object()
        .map(|map| map.contains_key(property))
        .unwrap_or(false);
    if !long_form {
        return Ok(NodeInput {
            node: body,
            pointer: pointer.to_string(),
            body: None,
        });
    }

    let mut allowed = vec![property];
    allowed.extend_from_slice(extras);
    let map = decoder.expect_object(body, pointer, &allowed)?;
    Ok(NodeInput {
        node: &map[property],
        pointer: child_pointer(pointer, property),
        body: Some(map),
    })
}
