//! Value types exchanged between the provider layer and lifecycle controllers.
//!
//! [`DesiredConfig`] and [`ChangeSet`] are the configuration source: a typed
//! config struct plus the field names the user wrote, and the field names
//! that differ from prior state. [`diff_values`] derives both from JSON.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if deleting).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
    /// The changed attributes that force replacement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_paths: Vec<String>,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
            replace_paths: Vec::new(),
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        replace_paths: Vec<String>,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace: !replace_paths.is_empty(),
            replace_paths,
        }
    }

    /// Whether applying the plan would change anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata returned by `metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Registered resource type names, sorted.
    pub resources: Vec<String>,
    /// Crate version serving the resources.
    pub version: String,
}

/// A typed configuration plus the set of fields the user explicitly set.
///
/// Read-only for the duration of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredConfig<T> {
    value: T,
    explicitly_set: BTreeSet<String>,
}

impl<T> DesiredConfig<T> {
    /// Wrap a config value with its explicitly-set field names.
    pub fn new<I, S>(value: T, explicitly_set: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            value,
            explicitly_set: explicitly_set.into_iter().map(Into::into).collect(),
        }
    }

    /// The typed configuration.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the wrapper, returning the typed configuration.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Whether `field` was written by the user (as opposed to defaulted).
    pub fn is_set(&self, field: &str) -> bool {
        self.explicitly_set.contains(field)
    }

    /// All explicitly set field names.
    pub fn explicitly_set(&self) -> &BTreeSet<String> {
        &self.explicitly_set
    }
}

impl<T: DeserializeOwned> DesiredConfig<T> {
    /// Deserialize from a JSON object; non-null keys count as explicitly set.
    pub fn from_json(value: &Value) -> Result<Self> {
        let explicitly_set: Vec<String> = value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        let typed = serde_json::from_value(value.clone())?;
        Ok(Self::new(typed, explicitly_set))
    }
}

/// Top-level field names whose desired value differs from prior state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    fields: BTreeSet<String>,
}

impl ChangeSet {
    /// An empty change set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `field` changed.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Changed field names, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Changed fields that also appear in `keys`.
    pub fn intersection(&self, keys: &BTreeSet<&str>) -> Vec<String> {
        self.fields
            .iter()
            .filter(|field| keys.contains(field.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Compare two JSON objects key by key, treating absent and `null` as equal.
///
/// Only top-level keys in `keys` are considered. An empty array or object in
/// one side and an absent key in the other also count as equal, since flatten
/// always emits empty collections.
pub fn diff_values<'a, I>(prior: &Value, proposed: &Value, keys: I) -> Vec<AttributeChange>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut changes = Vec::new();
    for key in keys {
        let before = present(prior.get(key));
        let after = present(proposed.get(key));
        match (before, after) {
            (None, None) => {},
            (None, Some(after)) => changes.push(AttributeChange::added(key, after.clone())),
            (Some(before), None) => changes.push(AttributeChange::removed(key, before.clone())),
            (Some(before), Some(after)) if before != after => {
                changes.push(AttributeChange::modified(key, before.clone(), after.clone()))
            },
            _ => {},
        }
    }
    changes
}

fn present(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(value) => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Registry {
        name: String,
        #[serde(default)]
        sku: Option<String>,
        #[serde(default)]
        admin_enabled: bool,
    }

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("name", json!("test"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("test")));

        let removed = AttributeChange::removed("name", json!("old"));
        assert_eq!(removed.before, Some(json!("old")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("count", json!(1), json!(2));
        assert_eq!(modified.before, Some(json!(1)));
        assert_eq!(modified.after, Some(json!(2)));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "123"}));
        assert!(!no_change.has_changes());
        assert!(!no_change.requires_replace);

        let replace = PlanResult::with_changes(
            json!({"name": "new"}),
            vec![AttributeChange::modified("name", json!("old"), json!("new"))],
            vec!["name".to_string()],
        );
        assert!(replace.has_changes());
        assert!(replace.requires_replace);
    }

    #[test]
    fn test_desired_config_tracks_explicit_fields() {
        let config: DesiredConfig<Registry> =
            DesiredConfig::from_json(&json!({"name": "acr1", "sku": null, "admin_enabled": false}))
                .unwrap();

        assert_eq!(config.value().name, "acr1");
        assert!(config.is_set("name"));
        assert!(config.is_set("admin_enabled"));
        assert!(!config.is_set("sku"));
        assert_eq!(config.explicitly_set().len(), 2);
    }

    #[test]
    fn test_desired_config_rejects_bad_shape() {
        let err = DesiredConfig::<Registry>::from_json(&json!({"sku": "Basic"})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Serialization);
    }

    #[test]
    fn test_change_set() {
        let changes: ChangeSet = ["sku", "tags"].into_iter().collect();
        assert_eq!(changes.len(), 2);
        assert!(changes.contains("sku"));
        assert!(!changes.contains("name"));
        assert_eq!(changes.iter().collect::<Vec<_>>(), vec!["sku", "tags"]);

        let force_new: BTreeSet<&str> = ["name", "tags"].into_iter().collect();
        assert_eq!(changes.intersection(&force_new), vec!["tags".to_string()]);
        assert!(ChangeSet::empty().is_empty());
    }

    #[test]
    fn test_diff_values() {
        let prior = json!({"name": "a", "sku": "Basic", "tags": {}, "ip_rules": []});
        let proposed = json!({"name": "a", "sku": "Premium", "tags": {"env": "dev"}, "ip_rules": null});

        let changes = diff_values(&prior, &proposed, ["name", "sku", "tags", "ip_rules", "missing"]);
        assert_eq!(
            changes,
            vec![
                AttributeChange::modified("sku", json!("Basic"), json!("Premium")),
                AttributeChange::added("tags", json!({"env": "dev"})),
            ]
        );

        let removed = diff_values(&json!({"sku": "Basic"}), &json!({}), ["sku"]);
        assert_eq!(removed, vec![AttributeChange::removed("sku", json!("Basic"))]);
    }
}
