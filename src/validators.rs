//! Reusable attribute validators.
//!
//! Each function returns a [`Validator`] to attach with
//! [`Attribute::with_validator`](crate::schema::Attribute::with_validator).
//! Validators see only values that already passed the attribute's type
//! check, but still reject mismatched JSON types rather than panicking.

use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::id::IdFormat;
use crate::schema::Validator;

/// Resource names: letters, digits, hyphens and underscores, up to 90 characters.
pub static RESOURCE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]{0,89}$").expect("resource name pattern compiles")
});

fn as_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected a string, got {}", value))
}

/// The value must be a non-empty string.
pub fn non_empty_string() -> Validator {
    Validator::new(|value| {
        let s = as_str(value)?;
        if s.trim().is_empty() {
            Err("must not be empty".to_string())
        } else {
            Ok(())
        }
    })
}

/// The value must be one of `allowed`, compared case-sensitively.
pub fn string_in_slice(allowed: &'static [&'static str]) -> Validator {
    Validator::new(move |value| {
        let s = as_str(value)?;
        if allowed.contains(&s) {
            Ok(())
        } else {
            Err(format!(
                "expected one of [{}], got {:?}",
                allowed.join(", "),
                s
            ))
        }
    })
}

/// The value must match `pattern`; `message` explains the expected shape.
pub fn string_matches(pattern: &'static Lazy<Regex>, message: &'static str) -> Validator {
    Validator::new(move |value| {
        let s = as_str(value)?;
        if pattern.is_match(s) {
            Ok(())
        } else {
            Err(format!("{:?} {}", s, message))
        }
    })
}

/// The value must be an integer in `min..=max`.
pub fn int_between(min: i64, max: i64) -> Validator {
    Validator::new(move |value| {
        let n = value
            .as_i64()
            .ok_or_else(|| format!("expected an integer, got {}", value))?;
        if (min..=max).contains(&n) {
            Ok(())
        } else {
            Err(format!("expected to be in the range ({} - {}), got {}", min, max, n))
        }
    })
}

/// The value must be a dotted-quad IPv4 address.
pub fn ipv4_address() -> Validator {
    Validator::new(|value| {
        let s = as_str(value)?;
        s.parse::<Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| format!("{:?} is not a valid IPv4 address", s))
    })
}

/// The value must be a resource ID of the given format.
pub fn resource_id(format: IdFormat) -> Validator {
    Validator::new(move |value| format.validate(as_str(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ResourceGroupId, ResourceId};
    use serde_json::json;

    static LOWERCASE: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-z]+$").unwrap());

    #[test]
    fn test_non_empty_string() {
        let v = non_empty_string();
        assert!(v.check(&json!("x")).is_ok());
        assert!(v.check(&json!("")).is_err());
        assert!(v.check(&json!("   ")).is_err());
        assert!(v.check(&json!(1)).is_err());
    }

    #[test]
    fn test_string_in_slice() {
        let v = string_in_slice(&["Allow", "Deny"]);
        assert!(v.check(&json!("Deny")).is_ok());
        let message = v.check(&json!("deny")).unwrap_err();
        assert_eq!(message, "expected one of [Allow, Deny], got \"deny\"");
    }

    #[test]
    fn test_string_matches() {
        let v = string_matches(&LOWERCASE, "must be lowercase letters");
        assert!(v.check(&json!("abc")).is_ok());
        assert_eq!(
            v.check(&json!("aBc")).unwrap_err(),
            "\"aBc\" must be lowercase letters"
        );

        let names = string_matches(&RESOURCE_NAME, "is not a valid name");
        assert!(names.check(&json!("rg-prod_01")).is_ok());
        assert!(names.check(&json!("-leading")).is_err());
    }

    #[test]
    fn test_int_between() {
        let v = int_between(1, 10);
        assert!(v.check(&json!(1)).is_ok());
        assert!(v.check(&json!(10)).is_ok());
        assert!(v.check(&json!(11)).is_err());
        assert!(v.check(&json!("5")).is_err());
    }

    #[test]
    fn test_ipv4_address() {
        let v = ipv4_address();
        assert!(v.check(&json!("10.0.0.1")).is_ok());
        assert!(v.check(&json!("10.0.0")).is_err());
        assert!(v.check(&json!("256.0.0.1")).is_err());
    }

    #[test]
    fn test_resource_id() {
        let v = resource_id(ResourceGroupId::FORMAT);
        assert!(v
            .check(&json!("/subscriptions/s/resourceGroups/g"))
            .is_ok());
        let message = v
            .check(&json!("/subscriptions/s/resourcegroups/g"))
            .unwrap_err();
        assert!(message.contains("case-sensitive"));
    }
}
