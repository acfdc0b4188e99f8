//! Path-style resource identifiers.
//!
//! Every managed resource is keyed by a slash-delimited ID of the shape
//!
//! ```text
//! /subscriptions/{id}/resourceGroups/{name}/providers/{namespace}/{type}/{name}[/{nested-type}/{nested-name}]*
//! ```
//!
//! An [`IdFormat`] declares the exact ordered grammar for one resource family
//! as a list of [`Segment`]s. Literal segments must match exactly, including
//! case; variable segments must be non-empty. Typed IDs implement
//! [`ResourceId`] on top of a format.
//!
//! # Example
//!
//! ```
//! use hemmer_reconcile::id::{IdFormat, Segment};
//!
//! const VAULT: IdFormat = IdFormat::new(&[
//!     Segment::Literal("subscriptions"),
//!     Segment::Variable("subscriptionId"),
//!     Segment::Literal("resourceGroups"),
//!     Segment::Variable("resourceGroupName"),
//!     Segment::Literal("providers"),
//!     Segment::Literal("Microsoft.KeyVault"),
//!     Segment::Literal("vaults"),
//!     Segment::Variable("vaultName"),
//! ]);
//!
//! let raw = "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.KeyVault/vaults/kv1";
//! let parsed = VAULT.parse(raw).unwrap();
//! assert_eq!(parsed.get("vaultName"), Some("kv1"));
//! assert_eq!(VAULT.format(&parsed.values()).unwrap(), raw);
//!
//! assert!(VAULT.parse(&raw.replace("vaults", "Vaults")).is_err());
//! ```

use std::fmt;

use crate::error::{ProviderError, ResourceContext, Result};

/// One segment of an ID grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A fixed marker such as `resourceGroups` or `Microsoft.AVS`.
    Literal(&'static str),
    /// A user-supplied value, identified by name.
    Variable(&'static str),
}

/// The ordered segment grammar for one resource family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdFormat {
    segments: &'static [Segment],
}

impl IdFormat {
    /// Declare a format from its segments.
    pub const fn new(segments: &'static [Segment]) -> Self {
        Self { segments }
    }

    /// The segments of this format, in order.
    pub fn segments(&self) -> &'static [Segment] {
        self.segments
    }

    /// Names of the variable segments, in order.
    pub fn variables(&self) -> impl Iterator<Item = &'static str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable(name) => Some(*name),
            Segment::Literal(_) => None,
        })
    }

    /// A template of this format, e.g. `/subscriptions/{subscriptionId}/...`.
    pub fn example(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(lit) => format!("/{}", lit),
                Segment::Variable(name) => format!("/{{{}}}", name),
            })
            .collect()
    }

    /// Parse `raw` against this format.
    ///
    /// Fails with [`ProviderError::MalformedId`] when the segment count does
    /// not match, a literal differs (casing included), or a variable is empty.
    pub fn parse(&self, raw: &str) -> Result<ParsedId> {
        let malformed = |reason: String| {
            ProviderError::malformed_id(raw, format!("{} (expected {})", reason, self.example()))
        };

        if raw.is_empty() {
            return Err(malformed("ID is empty".to_string()));
        }
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| malformed("ID must start with '/'".to_string()))?;

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != self.segments.len() {
            return Err(malformed(format!(
                "expected {} segments, got {}",
                self.segments.len(),
                parts.len()
            )));
        }

        let mut values = Vec::with_capacity(parts.len());
        for (position, (segment, part)) in self.segments.iter().zip(&parts).enumerate() {
            match segment {
                Segment::Literal(lit) if part == lit => {},
                Segment::Literal(lit) if part.eq_ignore_ascii_case(lit) => {
                    return Err(malformed(format!(
                        "segment {} should be {:?} but was {:?} (segment names are case-sensitive)",
                        position, lit, part
                    )));
                },
                Segment::Literal(lit) => {
                    return Err(malformed(format!(
                        "segment {} should be {:?} but was {:?}",
                        position, lit, part
                    )));
                },
                Segment::Variable(name) if part.is_empty() => {
                    return Err(malformed(format!("value for {} is empty", name)));
                },
                Segment::Variable(name) => values.push((*name, part.to_string())),
            }
        }

        Ok(ParsedId { values })
    }

    /// Build the canonical string for this format from variable values.
    ///
    /// Values are given in the order of [`IdFormat::variables`].
    pub fn format(&self, values: &[&str]) -> Result<String> {
        let expected = self.variables().count();
        if values.len() != expected {
            return Err(ProviderError::malformed_id(
                values.join("/"),
                format!("expected {} values, got {}", expected, values.len()),
            ));
        }

        let mut out = String::new();
        let mut values = values.iter();
        for segment in self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Variable(name) => {
                    // Count was checked above.
                    let value = values.next().copied().unwrap_or_default();
                    if value.is_empty() || value.contains('/') {
                        return Err(ProviderError::malformed_id(
                            out,
                            format!("value for {} must be non-empty and contain no '/'", name),
                        ));
                    }
                    out.push_str(value);
                },
            }
        }
        Ok(out)
    }

    /// Schema-validator form of [`IdFormat::parse`].
    pub fn validate(&self, raw: &str) -> std::result::Result<(), String> {
        self.parse(raw).map(|_| ()).map_err(|err| err.message())
    }
}

impl fmt::Display for IdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.example())
    }
}

/// The variable values extracted by [`IdFormat::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedId {
    values: Vec<(&'static str, String)>,
}

impl ParsedId {
    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Take ownership of a variable, failing if the format does not declare it.
    pub fn take(&mut self, name: &str) -> Result<String> {
        let position = self
            .values
            .iter()
            .position(|(key, _)| *key == name)
            .ok_or_else(|| {
                ProviderError::FailedPrecondition(format!("ID format has no segment {:?}", name))
            })?;
        Ok(self.values.remove(position).1)
    }

    /// All values, in format order.
    pub fn values(&self) -> Vec<&str> {
        self.values.iter().map(|(_, value)| value.as_str()).collect()
    }
}

/// A strongly typed resource ID backed by an [`IdFormat`].
pub trait ResourceId: Sized + Clone + fmt::Debug + PartialEq + Eq + Send + Sync + 'static {
    /// The segment grammar of this ID.
    const FORMAT: IdFormat;

    /// Human-readable resource kind used in error context.
    const KIND: &'static str;

    /// Build the typed ID from parsed variable values.
    fn from_parsed(parsed: ParsedId) -> Result<Self>;

    /// Variable values in format order.
    fn segment_values(&self) -> Vec<&str>;

    /// The resource's own name.
    fn name(&self) -> &str;

    /// The resource group the resource lives in, if any.
    fn resource_group(&self) -> Option<&str>;

    /// Parse a raw ID string.
    fn parse(raw: &str) -> Result<Self> {
        Self::from_parsed(Self::FORMAT.parse(raw)?)
    }

    /// The canonical ID string.
    fn to_id_string(&self) -> String {
        // Typed IDs are only built from validated values.
        Self::FORMAT
            .format(&self.segment_values())
            .unwrap_or_else(|_| self.segment_values().join("/"))
    }

    /// Identity context attached to errors about this resource.
    fn context(&self) -> ResourceContext {
        ResourceContext {
            resource_type: Self::KIND.to_string(),
            name: self.name().to_string(),
            resource_group: self.resource_group().map(str::to_string),
        }
    }
}

/// Implement `Display` and `FromStr` for a [`ResourceId`] type.
macro_rules! id_string_traits {
    ($ty:ty) => {
        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&$crate::id::ResourceId::to_id_string(self))
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::error::ProviderError;

            fn from_str(raw: &str) -> $crate::error::Result<Self> {
                <$ty as $crate::id::ResourceId>::parse(raw)
            }
        }
    };
}
pub(crate) use id_string_traits;

/// Reject empty values when building typed IDs by hand.
pub(crate) fn require_segment(kind: &str, name: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') {
        return Err(ProviderError::Validation(format!(
            "{} {} must be non-empty and contain no '/'",
            kind, name
        )));
    }
    Ok(())
}

const SUBSCRIPTION_FORMAT: IdFormat = IdFormat::new(&[
    Segment::Literal("subscriptions"),
    Segment::Variable("subscriptionId"),
]);

/// `/subscriptions/{subscriptionId}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    /// Subscription GUID.
    pub subscription_id: String,
}

impl SubscriptionId {
    /// Create a subscription ID.
    pub fn new(subscription_id: impl Into<String>) -> Result<Self> {
        let id = Self {
            subscription_id: subscription_id.into(),
        };
        require_segment(Self::KIND, "ID", &id.subscription_id)?;
        Ok(id)
    }
}

impl ResourceId for SubscriptionId {
    const FORMAT: IdFormat = SUBSCRIPTION_FORMAT;
    const KIND: &'static str = "subscription";

    fn from_parsed(mut parsed: ParsedId) -> Result<Self> {
        Ok(Self {
            subscription_id: parsed.take("subscriptionId")?,
        })
    }

    fn segment_values(&self) -> Vec<&str> {
        vec![self.subscription_id.as_str()]
    }

    fn name(&self) -> &str {
        &self.subscription_id
    }

    fn resource_group(&self) -> Option<&str> {
        None
    }
}

id_string_traits!(SubscriptionId);

const RESOURCE_GROUP_FORMAT: IdFormat = IdFormat::new(&[
    Segment::Literal("subscriptions"),
    Segment::Variable("subscriptionId"),
    Segment::Literal("resourceGroups"),
    Segment::Variable("resourceGroupName"),
]);

/// `/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceGroupId {
    /// Subscription GUID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
}

impl ResourceGroupId {
    /// Create a resource group ID.
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Result<Self> {
        let id = Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
        };
        require_segment(Self::KIND, "subscription ID", &id.subscription_id)?;
        require_segment(Self::KIND, "name", &id.resource_group)?;
        Ok(id)
    }

    /// The subscription containing this resource group.
    pub fn parent(&self) -> SubscriptionId {
        SubscriptionId {
            subscription_id: self.subscription_id.clone(),
        }
    }
}

impl ResourceId for ResourceGroupId {
    const FORMAT: IdFormat = RESOURCE_GROUP_FORMAT;
    const KIND: &'static str = "resource group";

    fn from_parsed(mut parsed: ParsedId) -> Result<Self> {
        Ok(Self {
            subscription_id: parsed.take("subscriptionId")?,
            resource_group: parsed.take("resourceGroupName")?,
        })
    }

    fn segment_values(&self) -> Vec<&str> {
        vec![self.subscription_id.as_str(), self.resource_group.as_str()]
    }

    fn name(&self) -> &str {
        &self.resource_group
    }

    fn resource_group(&self) -> Option<&str> {
        Some(&self.resource_group)
    }
}

id_string_traits!(ResourceGroupId);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const NESTED: IdFormat = IdFormat::new(&[
        Segment::Literal("subscriptions"),
        Segment::Variable("subscriptionId"),
        Segment::Literal("resourceGroups"),
        Segment::Variable("resourceGroupName"),
        Segment::Literal("providers"),
        Segment::Literal("Microsoft.Cache"),
        Segment::Literal("redis"),
        Segment::Variable("cacheName"),
        Segment::Literal("firewallRules"),
        Segment::Variable("ruleName"),
    ]);

    const RAW: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.Cache/redis/cache1/firewallRules/rule1";

    fn assert_malformed(raw: &str) {
        let err = NESTED.parse(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedId, "input: {:?}", raw);
    }

    #[test]
    fn test_parse_extracts_variables() {
        let parsed = NESTED.parse(RAW).unwrap();
        assert_eq!(
            parsed.get("subscriptionId"),
            Some("00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(parsed.get("resourceGroupName"), Some("rg1"));
        assert_eq!(parsed.get("cacheName"), Some("cache1"));
        assert_eq!(parsed.get("ruleName"), Some("rule1"));
        assert_eq!(parsed.get("missing"), None);
    }

    #[test]
    fn test_format_round_trip() {
        let parsed = NESTED.parse(RAW).unwrap();
        assert_eq!(NESTED.format(&parsed.values()).unwrap(), RAW);
    }

    #[test]
    fn test_malformed_inputs() {
        assert_malformed("");
        assert_malformed("subscriptions/sub/resourceGroups/rg1");
        assert_malformed("/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Cache/redis/cache1");
        assert_malformed(&format!("{}/", RAW));
        assert_malformed(&RAW.replace("/cache1/", "//"));
        assert_malformed(&RAW.replace("firewallRules", "FirewallRules"));
        assert_malformed(&RAW.replace("resourceGroups", "resourcegroups"));
        assert_malformed(&RAW.replace("Microsoft.Cache", "Microsoft.Storage"));
    }

    #[test]
    fn test_casing_message_is_explicit() {
        let err = NESTED
            .parse(&RAW.replace("firewallRules", "FirewallRules"))
            .unwrap_err();
        assert!(err.message().contains("case-sensitive"));
        assert!(err.message().contains("{ruleName}"));
    }

    #[test]
    fn test_format_rejects_bad_values() {
        assert!(NESTED.format(&["sub", "rg"]).is_err());
        assert!(NESTED.format(&["sub", "rg", "", "rule"]).is_err());
        assert!(NESTED.format(&["sub", "rg", "a/b", "rule"]).is_err());
    }

    #[test]
    fn test_example_template() {
        assert_eq!(
            RESOURCE_GROUP_FORMAT.example(),
            "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}"
        );
    }

    #[test]
    fn test_resource_group_id() {
        let id = ResourceGroupId::parse("/subscriptions/sub1/resourceGroups/group1").unwrap();
        assert_eq!(id.subscription_id, "sub1");
        assert_eq!(id.resource_group, "group1");
        assert_eq!(id.to_string(), "/subscriptions/sub1/resourceGroups/group1");
        assert_eq!(id.context().resource_type, "resource group");

        assert!(ResourceGroupId::new("sub1", "").is_err());

        let parent = id.parent();
        assert_eq!(parent.to_string(), "/subscriptions/sub1");
        let reparsed: SubscriptionId = "/subscriptions/sub1".parse().unwrap();
        assert_eq!(parent, reparsed);
        assert_eq!(reparsed.context().resource_group, None);
    }

    #[test]
    fn test_validate_helper() {
        assert!(RESOURCE_GROUP_FORMAT
            .validate("/subscriptions/s/resourceGroups/g")
            .is_ok());
        let message = RESOURCE_GROUP_FORMAT.validate("/subscriptions/s").unwrap_err();
        assert!(message.contains("expected 4 segments, got 2"));
    }
}
