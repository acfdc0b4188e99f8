//! Validation of JSON configuration against a [`Schema`].
//!
//! Configuration arrives at the provider boundary as `serde_json::Value`.
//! Before it is deserialized into a resource's typed config struct it is
//! checked here: attribute types, required attributes, nested block item
//! counts, undeclared keys, and each attribute's own [`Validator`].
//!
//! # Example
//!
//! ```
//! use hemmer_reconcile::schema::{Attribute, Schema};
//! use hemmer_reconcile::validation::validate;
//! use hemmer_reconcile::validators;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute(
//!         "sku",
//!         Attribute::required_string()
//!             .with_validator(validators::string_in_slice(&["Basic", "Standard", "Premium"])),
//!     )
//!     .with_attribute("admin_enabled", Attribute::optional_bool());
//!
//! assert!(validate(&schema, &json!({"sku": "Basic"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"sku": "Gold", "admin_enabled": "yes"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use serde_json::Value;

use crate::error::{ProviderError, Result};
use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema};

/// Validate a JSON value against a schema.
///
/// An empty list means the value is valid. Rules:
///
/// - required attributes must be present and non-null
/// - computed-only attributes are ignored (the remote API sets them)
/// - keys the schema does not declare are rejected
/// - nested blocks are checked recursively, with min/max item counts
/// - attribute validators run only when the value has the declared type
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], returning `Err` with the diagnostics if any were found.
pub fn validate_result(schema: &Schema, value: &Value) -> std::result::Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Like [`validate`], collapsing all diagnostics into one
/// [`ProviderError::Validation`].
pub fn ensure_valid(schema: &Schema, value: &Value) -> Result<()> {
    validate_result(schema, value).map_err(|diagnostics| {
        let summaries: Vec<String> = diagnostics.into_iter().map(describe).collect();
        ProviderError::Validation(summaries.join("; "))
    })
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn describe(diagnostic: Diagnostic) -> String {
    match diagnostic.detail {
        Some(detail) => format!("{}: {}", diagnostic.summary, detail),
        None => diagnostic.summary,
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        // Nothing further to check for an absent block.
        Value::Null => return,
        _ => {
            diagnostics.push(at_path(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
                path,
            ));
            return;
        },
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }

    for key in obj.keys() {
        if !block.attributes.contains_key(key) && !block.blocks.contains_key(key) {
            let key_path = join_path(path, key);
            diagnostics.push(
                Diagnostic::error(format!("Unsupported argument '{}'", key_path))
                    .with_detail("An argument with this name is not expected here")
                    .with_attribute(key_path),
            );
        }
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    let value = match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
            return;
        },
        Some(value) => value,
    };

    let before = diagnostics.len();
    validate_attribute_type(&attr.attr_type, value, path, diagnostics);
    if diagnostics.len() > before {
        return;
    }

    if let Some(validator) = &attr.validator {
        if let Err(message) = validator.check(value) {
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(message)
                    .with_attribute(path),
            );
        }
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String if !value.is_string() => {
            diagnostics.push(type_error(path, "string", value));
        },
        AttributeType::Int64 if !is_int64(value) => {
            diagnostics.push(type_error(path, "int64", value));
        },
        AttributeType::Float64 if !value.is_number() => {
            diagnostics.push(type_error(path, "float64", value));
        },
        AttributeType::Bool if !value.is_boolean() => {
            diagnostics.push(type_error(path, "bool", value));
        },
        // Sets travel as JSON arrays too.
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}.{}", path, i);
                        validate_attribute_type(element_type, item, &item_path, diagnostics);
                    }
                },
                None => {
                    let expected = if matches!(attr_type, AttributeType::Set(_)) {
                        "set"
                    } else {
                        "list"
                    };
                    diagnostics.push(type_error(path, expected, value));
                },
            }
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(obj) => {
                for (key, item) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, item, &key_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
        _ => {},
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items = match value {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(other)))
                    .with_attribute(path),
            );
            return;
        },
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }
    // max_items of 0 means unlimited
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}", path, i);
        validate_block(&nested.block, item, &item_path, diagnostics);
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn at_path(diagnostic: Diagnostic, path: &str) -> Diagnostic {
    if path.is_empty() {
        diagnostic
    } else {
        diagnostic.with_attribute(path)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() => true,
        Value::Number(n) => n
            .as_f64()
            .map(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
            .unwrap_or(false),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{AttributeFlags, NestedBlock, Validator};
    use serde_json::json;

    fn network_rules() -> NestedBlock {
        NestedBlock::single(
            Block::new()
                .with_attribute("default_action", Attribute::required_string())
                .with_attribute(
                    "ip_rules",
                    Attribute::new(
                        AttributeType::list(AttributeType::String),
                        AttributeFlags::optional(),
                    ),
                ),
        )
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "test"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required"));
    }

    #[test]
    fn test_validate_optional_and_computed() {
        let schema = Schema::v0()
            .with_attribute("sku", Attribute::optional_string())
            .with_attribute("login_server", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"sku": null})).is_empty());
        // Computed attributes are not checked even if a prior state carries them.
        assert!(validate(&schema, &json!({"login_server": 42})).is_empty());
    }

    #[test]
    fn test_validate_types() {
        let schema = Schema::v0()
            .with_attribute("count", Attribute::optional_int64())
            .with_attribute("enabled", Attribute::optional_bool())
            .with_attribute("tags", Attribute::optional_string_map());

        assert!(validate(&schema, &json!({"count": 3, "enabled": true, "tags": {"a": "b"}})).is_empty());
        assert!(validate(&schema, &json!({"count": 3.0})).is_empty());

        let diagnostics = validate(&schema, &json!({"count": 1.5, "enabled": "yes", "tags": {"a": 1}}));
        let mut paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["count", "enabled", "tags.a"]);
    }

    #[test]
    fn test_validate_list_elements() {
        let schema = Schema::v0().with_attribute(
            "ips",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );

        assert!(validate(&schema, &json!({"ips": ["10.0.0.1"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"ips": ["10.0.0.1", 7]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("ips.1".to_string()));

        let diagnostics = validate(&schema, &json!({"ips": "10.0.0.1"}));
        assert_eq!(diagnostics[0].detail, Some("Expected set, got string".to_string()));
    }

    #[test]
    fn test_validator_runs_after_type_check() {
        let schema = Schema::v0().with_attribute(
            "name",
            Attribute::required_string().with_validator(Validator::new(|v| match v.as_str() {
                Some(s) if s.len() >= 5 => Ok(()),
                _ => Err("must be at least 5 characters".to_string()),
            })),
        );

        assert!(validate(&schema, &json!({"name": "registry"})).is_empty());

        let diagnostics = validate(&schema, &json!({"name": "acr"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail,
            Some("must be at least 5 characters".to_string())
        );

        // A type error suppresses the validator.
        let diagnostics = validate(&schema, &json!({"name": 12}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_single_block() {
        let schema = Schema::v0().with_block("network_rule_set", network_rules());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"network_rule_set": []})).is_empty());
        assert!(validate(
            &schema,
            &json!({"network_rule_set": [{"default_action": "Deny", "ip_rules": ["1.2.3.4"]}]})
        )
        .is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"network_rule_set": [{"default_action": "Deny"}, {"default_action": "Allow"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));

        let diagnostics = validate(&schema, &json!({"network_rule_set": [{}]}));
        assert_eq!(
            diagnostics[0].attribute,
            Some("network_rule_set.0.default_action".to_string())
        );

        let diagnostics = validate(&schema, &json!({"network_rule_set": {"default_action": "Deny"}}));
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_validate_min_items() {
        let schema =
            Schema::v0().with_block("rule", NestedBlock::list(Block::new()).with_min_items(1));

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));
    }

    #[test]
    fn test_unsupported_argument() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_block("network_rule_set", network_rules());

        let diagnostics = validate(
            &schema,
            &json!({"name": "a", "nmae": "b", "network_rule_set": [{"default_action": "Deny", "extra": 1}]}),
        );
        let mut paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["network_rule_set.0.extra", "nmae"]);
    }

    #[test]
    fn test_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        let diagnostics = validate(&schema, &json!("just a string"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, None);
    }

    #[test]
    fn test_result_helpers() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"name": "x"})));
        assert!(validate_result(&schema, &json!({"name": "x"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);

        let err = ensure_valid(&schema, &json!({"name": 1})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("Expected string, got number"));
    }
}
