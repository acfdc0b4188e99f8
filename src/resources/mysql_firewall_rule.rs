//! `hemmer_mysql_firewall_rule`: a firewall rule on a MySQL server.
//!
//! The rules API only accepts whole-object PUTs, so updates send the full
//! properties object built from the current remote state. Creating a rule
//! whose name is already taken overwrites it.

use serde::{Deserialize, Serialize};

use crate::context::OperationContext;
use crate::error::{ProviderError, Result};
use crate::id::{id_string_traits, require_segment, IdFormat, ParsedId, ResourceGroupId, ResourceId, Segment};
use crate::lifecycle::{CreatePolicy, Resource, UpdateMode};
use crate::mapper::{FieldMapping, StateMapper};
use crate::schema::{Attribute, Schema, Validator};
use crate::types::{ChangeSet, DesiredConfig};
use crate::validators;

const SERVER_FORMAT: IdFormat = IdFormat::new(&[
    Segment::Literal("subscriptions"),
    Segment::Variable("subscriptionId"),
    Segment::Literal("resourceGroups"),
    Segment::Variable("resourceGroupName"),
    Segment::Literal("providers"),
    Segment::Literal("Microsoft.DBforMySQL"),
    Segment::Literal("servers"),
    Segment::Variable("serverName"),
]);

const FIREWALL_RULE_FORMAT: IdFormat = IdFormat::new(&[
    Segment::Literal("subscriptions"),
    Segment::Variable("subscriptionId"),
    Segment::Literal("resourceGroups"),
    Segment::Variable("resourceGroupName"),
    Segment::Literal("providers"),
    Segment::Literal("Microsoft.DBforMySQL"),
    Segment::Literal("servers"),
    Segment::Variable("serverName"),
    Segment::Literal("firewallRules"),
    Segment::Variable("firewallRuleName"),
]);

/// `/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DBforMySQL/servers/{}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MySqlServerId {
    /// Subscription GUID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Server name.
    pub name: String,
}

impl MySqlServerId {
    /// Create a server ID.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let id = Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
        };
        require_segment(Self::KIND, "subscription ID", &id.subscription_id)?;
        require_segment(Self::KIND, "resource group", &id.resource_group)?;
        require_segment(Self::KIND, "name", &id.name)?;
        Ok(id)
    }

    /// The resource group containing the server.
    pub fn parent(&self) -> ResourceGroupId {
        ResourceGroupId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
        }
    }
}

impl ResourceId for MySqlServerId {
    const FORMAT: IdFormat = SERVER_FORMAT;
    const KIND: &'static str = "MySQL server";

    fn from_parsed(mut parsed: ParsedId) -> Result<Self> {
        Ok(Self {
            subscription_id: parsed.take("subscriptionId")?,
            resource_group: parsed.take("resourceGroupName")?,
            name: parsed.take("serverName")?,
        })
    }

    fn segment_values(&self) -> Vec<&str> {
        vec![
            self.subscription_id.as_str(),
            self.resource_group.as_str(),
            self.name.as_str(),
        ]
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn resource_group(&self) -> Option<&str> {
        Some(&self.resource_group)
    }
}

id_string_traits!(MySqlServerId);

/// `.../servers/{serverName}/firewallRules/{firewallRuleName}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FirewallRuleId {
    /// Subscription GUID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Owning server name.
    pub server: String,
    /// Rule name.
    pub name: String,
}

impl FirewallRuleId {
    /// Create a rule ID under `server`.
    pub fn new(server: &MySqlServerId, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_segment(Self::KIND, "name", &name)?;
        Ok(Self {
            subscription_id: server.subscription_id.clone(),
            resource_group: server.resource_group.clone(),
            server: server.name.clone(),
            name,
        })
    }

    /// The server the rule belongs to.
    pub fn parent(&self) -> MySqlServerId {
        MySqlServerId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            name: self.server.clone(),
        }
    }
}

impl ResourceId for FirewallRuleId {
    const FORMAT: IdFormat = FIREWALL_RULE_FORMAT;
    const KIND: &'static str = "MySQL firewall rule";

    fn from_parsed(mut parsed: ParsedId) -> Result<Self> {
        Ok(Self {
            subscription_id: parsed.take("subscriptionId")?,
            resource_group: parsed.take("resourceGroupName")?,
            server: parsed.take("serverName")?,
            name: parsed.take("firewallRuleName")?,
        })
    }

    fn segment_values(&self) -> Vec<&str> {
        vec![
            self.subscription_id.as_str(),
            self.resource_group.as_str(),
            self.server.as_str(),
            self.name.as_str(),
        ]
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn resource_group(&self) -> Option<&str> {
        Some(&self.resource_group)
    }
}

id_string_traits!(FirewallRuleId);

/// Local configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallRuleConfig {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub resource_group_name: String,
    #[allow(missing_docs)]
    pub server_name: String,
    /// First address of the allowed range.
    pub start_ip_address: String,
    /// Last address of the allowed range, inclusive.
    pub end_ip_address: String,
}

/// PUT body, used for both create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallRulePayload {
    #[allow(missing_docs)]
    pub properties: FirewallRuleProperties,
}

/// The rule's address range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRuleProperties {
    #[allow(missing_docs)]
    pub start_ip_address: String,
    #[allow(missing_docs)]
    pub end_ip_address: String,
}

/// The `hemmer_mysql_firewall_rule` resource family.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlFirewallRule;

fn resource_group_name() -> Validator {
    validators::string_matches(&validators::RESOURCE_NAME, "is not a valid resource group name")
}

const FIELDS: &[FieldMapping] = &[
    FieldMapping::validated("name", validators::non_empty_string),
    FieldMapping::validated("resource_group_name", resource_group_name),
    FieldMapping::validated("server_name", validators::non_empty_string),
    FieldMapping::validated("start_ip_address", validators::ipv4_address),
    FieldMapping::validated("end_ip_address", validators::ipv4_address),
];

fn parse_ipv4(field: &str, raw: &str) -> Result<std::net::Ipv4Addr> {
    raw.parse()
        .map_err(|_| ProviderError::Validation(format!("{} {:?} is not an IPv4 address", field, raw)))
}

fn check_range(start: &str, end: &str) -> Result<()> {
    if parse_ipv4("start_ip_address", start)? > parse_ipv4("end_ip_address", end)? {
        return Err(ProviderError::Validation(format!(
            "start_ip_address {} is after end_ip_address {}",
            start, end
        )));
    }
    Ok(())
}

impl StateMapper for MySqlFirewallRule {
    type Id = FirewallRuleId;
    type Config = FirewallRuleConfig;
    type Payload = FirewallRulePayload;
    type RemoteState = FirewallRulePayload;

    fn expand(desired: &DesiredConfig<FirewallRuleConfig>) -> Result<FirewallRulePayload> {
        let config = desired.value();
        check_range(&config.start_ip_address, &config.end_ip_address)?;
        Ok(FirewallRulePayload {
            properties: FirewallRuleProperties {
                start_ip_address: config.start_ip_address.clone(),
                end_ip_address: config.end_ip_address.clone(),
            },
        })
    }

    fn flatten(id: &FirewallRuleId, state: &FirewallRulePayload) -> FirewallRuleConfig {
        FirewallRuleConfig {
            name: id.name.clone(),
            resource_group_name: id.resource_group.clone(),
            server_name: id.server.clone(),
            start_ip_address: state.properties.start_ip_address.clone(),
            end_ip_address: state.properties.end_ip_address.clone(),
        }
    }
}

impl Resource for MySqlFirewallRule {
    type UpdatePayload = FirewallRulePayload;

    const TYPE_NAME: &'static str = "hemmer_mysql_firewall_rule";
    const CREATE_POLICY: CreatePolicy = CreatePolicy::Upsert;
    const UPDATE_MODE: UpdateMode = UpdateMode::FullPayload;

    fn base_schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "resource_group_name",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute("server_name", Attribute::required_string().with_force_new())
            .with_attribute("start_ip_address", Attribute::required_string())
            .with_attribute("end_ip_address", Attribute::required_string())
    }

    fn field_mappings() -> &'static [FieldMapping] {
        FIELDS
    }

    fn resource_id(ctx: &OperationContext, config: &FirewallRuleConfig) -> Result<FirewallRuleId> {
        let server = MySqlServerId::new(
            ctx.subscription_id()?,
            &config.resource_group_name,
            &config.server_name,
        )?;
        FirewallRuleId::new(&server, &config.name)
    }

    fn patch(
        current: &FirewallRulePayload,
        config: &FirewallRuleConfig,
        changes: &ChangeSet,
    ) -> Result<FirewallRulePayload> {
        let mut next = current.clone();
        if changes.contains("start_ip_address") {
            next.properties.start_ip_address = config.start_ip_address.clone();
        }
        if changes.contains("end_ip_address") {
            next.properties.end_ip_address = config.end_ip_address.clone();
        }
        check_range(&next.properties.start_ip_address, &next.properties.end_ip_address)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::verify_field_mappings;
    use crate::validation;
    use serde_json::json;

    fn config(start: &str, end: &str) -> FirewallRuleConfig {
        FirewallRuleConfig {
            name: "office".into(),
            resource_group_name: "rg1".into(),
            server_name: "db1".into(),
            start_ip_address: start.into(),
            end_ip_address: end.into(),
        }
    }

    fn desired(start: &str, end: &str) -> DesiredConfig<FirewallRuleConfig> {
        DesiredConfig::new(config(start, end), FIELDS.iter().map(|field| field.schema_key))
    }

    #[test]
    fn test_field_mappings_cover_schema() {
        verify_field_mappings(
            &MySqlFirewallRule::schema(),
            MySqlFirewallRule::field_mappings(),
            &FirewallRuleConfig::default(),
        )
        .unwrap();
    }

    #[test]
    fn test_rule_id_under_server() {
        let raw = "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.DBforMySQL/servers/db1/firewallRules/office";
        let id: FirewallRuleId = raw.parse().unwrap();
        assert_eq!(id.server, "db1");
        assert_eq!(id.parent().to_id_string(), raw.trim_end_matches("/firewallRules/office"));
        assert_eq!(id.to_string(), raw);
        assert_eq!(id.context().resource_type, "MySQL firewall rule");
    }

    #[test]
    fn test_schema_rejects_bad_addresses() {
        let schema = MySqlFirewallRule::schema();
        let value = json!({
            "name": "office",
            "resource_group_name": "rg1",
            "server_name": "db1",
            "start_ip_address": "10.0.0.300",
            "end_ip_address": "10.0.0.10"
        });
        let diagnostics = validation::validate(&schema, &value);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("start_ip_address"));
    }

    #[test]
    fn test_expand_checks_range_order() {
        assert!(MySqlFirewallRule::expand(&desired("10.0.0.1", "10.0.0.9")).is_ok());
        let err = MySqlFirewallRule::expand(&desired("10.0.0.9", "10.0.0.1")).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn test_expand_body_shape() {
        let body = serde_json::to_value(MySqlFirewallRule::expand(&desired("1.2.3.4", "1.2.3.4")).unwrap())
            .unwrap();
        assert_eq!(
            body,
            json!({"properties": {"startIpAddress": "1.2.3.4", "endIpAddress": "1.2.3.4"}})
        );
    }

    #[test]
    fn test_patch_keeps_unchanged_fields() {
        let current = MySqlFirewallRule::expand(&desired("10.0.0.1", "10.0.0.9")).unwrap();
        let wanted = config("10.0.0.5", "10.0.0.50");
        let changes: ChangeSet = ["end_ip_address"].into_iter().collect();

        let next = MySqlFirewallRule::patch(&current, &wanted, &changes).unwrap();
        assert_eq!(next.properties.start_ip_address, "10.0.0.1");
        assert_eq!(next.properties.end_ip_address, "10.0.0.50");
    }

    #[test]
    fn test_flatten_takes_names_from_id() {
        let server = MySqlServerId::new("sub1", "rg1", "db1").unwrap();
        let id = FirewallRuleId::new(&server, "office").unwrap();
        let remote = MySqlFirewallRule::expand(&desired("10.0.0.1", "10.0.0.9")).unwrap();
        assert_eq!(MySqlFirewallRule::flatten(&id, &remote), config("10.0.0.1", "10.0.0.9"));
    }
}
