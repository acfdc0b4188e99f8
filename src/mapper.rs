//! Expanding local configuration into remote payloads and flattening remote
//! state back into local configuration.
//!
//! Mapping is pure: no I/O, no clock, no randomness. Remote payload and state
//! structs model every optional remote field as `Option<T>` with
//! `#[serde(skip_serializing_if = "Option::is_none")]`, so "unset" is never
//! sent as a zero value. The helpers below collapse the presence checks that
//! would otherwise repeat in every resource family.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::id::ResourceId;
use crate::schema::{Schema, Validator};
use crate::types::DesiredConfig;

/// Conversion between a resource's local config and its remote shapes.
pub trait StateMapper {
    /// Typed identity of the resource.
    type Id: ResourceId;
    /// Local configuration; serializes to exactly the schema's keys.
    type Config: Serialize
        + DeserializeOwned
        + Clone
        + PartialEq
        + fmt::Debug
        + Send
        + Sync
        + 'static;
    /// Body of the create request.
    type Payload: Send + Sync;
    /// The remote API's representation of the resource.
    type RemoteState: Send + Sync;

    /// Build the create payload. Server-computed fields are left out, and so
    /// are optional fields the user did not set.
    fn expand(config: &DesiredConfig<Self::Config>) -> Result<Self::Payload>;

    /// Rebuild local configuration from remote state.
    ///
    /// Must produce a value for every schema field; collections default to
    /// empty.
    fn flatten(id: &Self::Id, state: &Self::RemoteState) -> Self::Config;
}

/// One row of a resource's declarative field table.
///
/// The key names both the schema attribute and the config struct field as
/// serde serializes it, so a `#[serde(rename)]` field is listed by its
/// renamed key.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    /// Key in the schema and in serialized config.
    pub schema_key: &'static str,
    /// Validator attached to the schema attribute, if any.
    pub validator: Option<fn() -> Validator>,
}

impl FieldMapping {
    /// A row without a validator.
    pub const fn plain(key: &'static str) -> Self {
        Self {
            schema_key: key,
            validator: None,
        }
    }

    /// A row with a validator.
    pub const fn validated(key: &'static str, validator: fn() -> Validator) -> Self {
        Self {
            schema_key: key,
            validator: Some(validator),
        }
    }
}

/// Attach each mapping's validator to its schema attribute.
pub fn apply_validators(mut schema: Schema, mappings: &[FieldMapping]) -> Schema {
    for mapping in mappings {
        if let (Some(make), Some(attr)) = (
            mapping.validator,
            schema.block.attributes.get_mut(mapping.schema_key),
        ) {
            attr.validator = Some(make());
        }
    }
    schema
}

/// Check that `schema`, `mappings` and the serialized form of `sample`
/// cover exactly the same keys.
///
/// Returns a description of every mismatch.
pub fn verify_field_mappings<C: Serialize>(
    schema: &Schema,
    mappings: &[FieldMapping],
    sample: &C,
) -> std::result::Result<(), String> {
    let schema_keys = schema.top_level_keys();
    let mapped: BTreeSet<&str> = mappings.iter().map(|m| m.schema_key).collect();
    let serialized = serde_json::to_value(sample).map_err(|e| e.to_string())?;
    let struct_keys: BTreeSet<&str> = serialized
        .as_object()
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default();

    let mut problems = Vec::new();
    for key in schema_keys.difference(&mapped) {
        problems.push(format!("schema key {:?} has no field mapping", key));
    }
    for key in mapped.difference(&schema_keys) {
        problems.push(format!("field mapping {:?} is not in the schema", key));
    }
    for mapping in mappings {
        if !struct_keys.contains(mapping.schema_key) {
            problems.push(format!(
                "no config field serializes as {:?}",
                mapping.schema_key
            ));
        }
    }
    for key in struct_keys.difference(&mapped) {
        problems.push(format!("serialized key {:?} has no field mapping", key));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

/// The first element of a `MaxItems: 1` block, or `None` when empty.
pub fn first_block<T>(blocks: &[T]) -> Option<&T> {
    blocks.first()
}

/// Expand a `MaxItems: 1` block; an empty block list expands to `None`.
pub fn expand_single_block<T, P>(blocks: &[T], expand: impl FnOnce(&T) -> P) -> Option<P> {
    first_block(blocks).map(expand)
}

/// Flatten an optional remote object into a zero- or one-element block list.
pub fn flatten_single_block<R, C>(remote: Option<&R>, flatten: impl FnOnce(&R) -> C) -> Vec<C> {
    remote.map(flatten).into_iter().collect()
}

/// Flatten an optional remote list, defaulting to empty.
pub fn flatten_list<T: Clone>(remote: Option<&Vec<T>>) -> Vec<T> {
    remote.cloned().unwrap_or_default()
}

/// Flatten an optional remote map, defaulting to empty.
pub fn flatten_map<V: Clone>(remote: Option<&BTreeMap<String, V>>) -> BTreeMap<String, V> {
    remote.cloned().unwrap_or_default()
}

/// Expand tags; an empty map is sent as absent.
pub fn expand_tags(tags: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!tags.is_empty()).then(|| tags.clone())
}

/// Flatten remote tags, defaulting to empty.
pub fn flatten_tags(remote: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
    flatten_map(remote)
}

/// Expand a list, sending an empty one as absent.
pub fn expand_optional_list<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    (!items.is_empty()).then(|| items.to_vec())
}

/// Flatten an optional remote string, defaulting to empty.
pub fn flatten_string(remote: Option<&String>) -> String {
    remote.cloned().unwrap_or_default()
}
