//! `hemmer_container_registry`: an Azure Container Registry.
//!
//! Updates are PATCH requests carrying only the changed fields. The network
//! rule set is a `MaxItems: 1` block; removing it from configuration resets
//! the remote rule set to allow-all rather than leaving the old rules in
//! place.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::OperationContext;
use crate::error::Result;
use crate::id::{id_string_traits, require_segment, IdFormat, ParsedId, ResourceGroupId, ResourceId, Segment};
use crate::lifecycle::{CreatePolicy, Resource, UpdateMode};
use crate::mapper::{
    expand_single_block, expand_tags, flatten_single_block, flatten_string, flatten_tags,
    FieldMapping, StateMapper,
};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema, Validator};
use crate::types::{ChangeSet, DesiredConfig};
use crate::validators;

/// SKUs accepted by the registry API.
pub const SKUS: &[&str] = &["Basic", "Standard", "Premium"];

const DEFAULT_ACTIONS: &[&str] = &["Allow", "Deny"];

static REGISTRY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-zA-Z0-9]{5,50}$").expect("registry name pattern compiles"));

const REGISTRY_FORMAT: IdFormat = IdFormat::new(&[
    Segment::Literal("subscriptions"),
    Segment::Variable("subscriptionId"),
    Segment::Literal("resourceGroups"),
    Segment::Variable("resourceGroupName"),
    Segment::Literal("providers"),
    Segment::Literal("Microsoft.ContainerRegistry"),
    Segment::Literal("registries"),
    Segment::Variable("registryName"),
]);

/// `/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerRegistry/registries/{}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryId {
    /// Subscription GUID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Registry name.
    pub name: String,
}

impl RegistryId {
    /// Create a registry ID.
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

    /// The resource group containing the registry.
    pub fn parent(&self) -> ResourceGroupId {
        ResourceGroupId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
        }
    }
}

impl ResourceId for RegistryId {
    const FORMAT: IdFormat = REGISTRY_FORMAT;
    const KIND: &'static str = "container registry";

    fn from_parsed(mut parsed: ParsedId) -> Result<Self> {
        Ok(Self {
            subscription_id: parsed.take("subscriptionId")?,
            resource_group: parsed.take("resourceGroupName")?,
            name: parsed.take("registryName")?,
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

id_string_traits!(RegistryId);

/// Local configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Globally unique registry name.
    pub name: String,
    /// Resource group to create the registry in.
    pub resource_group_name: String,
    /// Azure region.
    pub location: String,
    /// One of [`SKUS`].
    #[serde(default = "default_sku")]
    pub sku: String,
    /// Whether the admin user is enabled.
    #[serde(default)]
    pub admin_enabled: bool,
    /// Resource tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// At most one rule set.
    #[serde(default)]
    pub network_rule_set: Vec<NetworkRuleSetBlock>,
    /// Computed: the registry's login host name.
    #[serde(default)]
    pub login_server: String,
}

fn default_sku() -> String {
    "Basic".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            resource_group_name: String::new(),
            location: String::new(),
            sku: default_sku(),
            admin_enabled: false,
            tags: BTreeMap::new(),
            network_rule_set: Vec::new(),
            login_server: String::new(),
        }
    }
}

/// The `network_rule_set` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRuleSetBlock {
    /// `Allow` or `Deny`.
    #[serde(default = "default_action")]
    pub default_action: String,
    /// IPv4 addresses or CIDR ranges allowed through.
    #[serde(default)]
    pub ip_rules: Vec<String>,
}

fn default_action() -> String {
    "Allow".to_string()
}

/// `{"name": "Premium"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    #[allow(missing_docs)]
    pub name: String,
}

/// Network rules as the API models them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRuleSet {
    #[allow(missing_docs)]
    pub default_action: String,
    #[allow(missing_docs)]
    #[serde(default)]
    pub ip_rules: Vec<IpRule>,
}

impl NetworkRuleSet {
    /// Allow everything, with no explicit rules.
    pub fn allow_all() -> Self {
        Self {
            default_action: "Allow".to_string(),
            ip_rules: Vec::new(),
        }
    }

    fn is_allow_all(&self) -> bool {
        self.default_action == "Allow" && self.ip_rules.is_empty()
    }
}

/// One allowed address or range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpRule {
    #[allow(missing_docs)]
    pub action: String,
    /// Address or CIDR range.
    pub value: String,
}

/// Create (PUT) body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryPayload {
    #[allow(missing_docs)]
    pub location: String,
    #[allow(missing_docs)]
    pub sku: Sku,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "RegistryProperties::is_empty")]
    pub properties: RegistryProperties,
}

/// Settable registry properties. Shared by create and update bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryProperties {
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_user_enabled: Option<bool>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_rule_set: Option<NetworkRuleSet>,
}

impl RegistryProperties {
    fn is_empty(&self) -> bool {
        self.admin_user_enabled.is_none() && self.network_rule_set.is_none()
    }
}

/// Update (PATCH) body; absent fields are left unchanged remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryUpdate {
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<RegistryProperties>,
}

/// The remote representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRegistry {
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<RemoteRegistryProperties>,
}

/// Properties returned by the API, including server-computed ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRegistryProperties {
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_server: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_user_enabled: Option<bool>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_rule_set: Option<NetworkRuleSet>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// The `hemmer_container_registry` resource family.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerRegistry;

fn registry_name() -> Validator {
    validators::string_matches(&REGISTRY_NAME, "may only contain 5 to 50 alphanumeric characters")
}

fn resource_group_name() -> Validator {
    validators::string_matches(&validators::RESOURCE_NAME, "is not a valid resource group name")
}

fn sku() -> Validator {
    validators::string_in_slice(SKUS)
}

const FIELDS: &[FieldMapping] = &[
    FieldMapping::validated("name", registry_name),
    FieldMapping::validated("resource_group_name", resource_group_name),
    FieldMapping::validated("location", validators::non_empty_string),
    FieldMapping::validated("sku", sku),
    FieldMapping::plain("admin_enabled"),
    FieldMapping::plain("tags"),
    FieldMapping::plain("network_rule_set"),
    FieldMapping::plain("login_server"),
];

fn expand_rule_set(block: &NetworkRuleSetBlock) -> NetworkRuleSet {
    NetworkRuleSet {
        default_action: block.default_action.clone(),
        ip_rules: block
            .ip_rules
            .iter()
            .map(|value| IpRule {
                action: "Allow".to_string(),
                value: value.clone(),
            })
            .collect(),
    }
}

fn flatten_rule_set(rules: &NetworkRuleSet) -> NetworkRuleSetBlock {
    NetworkRuleSetBlock {
        default_action: rules.default_action.clone(),
        ip_rules: rules.ip_rules.iter().map(|rule| rule.value.clone()).collect(),
    }
}

impl StateMapper for ContainerRegistry {
    type Id = RegistryId;
    type Config = RegistryConfig;
    type Payload = RegistryPayload;
    type RemoteState = RemoteRegistry;

    fn expand(desired: &DesiredConfig<RegistryConfig>) -> Result<RegistryPayload> {
        let config = desired.value();
        Ok(RegistryPayload {
            location: config.location.clone(),
            sku: Sku {
                name: config.sku.clone(),
            },
            tags: expand_tags(&config.tags),
            properties: RegistryProperties {
                admin_user_enabled: desired
                    .is_set("admin_enabled")
                    .then_some(config.admin_enabled),
                network_rule_set: expand_single_block(&config.network_rule_set, expand_rule_set),
            },
        })
    }

    fn flatten(id: &RegistryId, state: &RemoteRegistry) -> RegistryConfig {
        let props = state.properties.as_ref();
        // The API reports allow-all even when no rule set was configured.
        let rules = props
            .and_then(|p| p.network_rule_set.as_ref())
            .filter(|rules| !rules.is_allow_all());

        RegistryConfig {
            name: id.name.clone(),
            resource_group_name: id.resource_group.clone(),
            location: flatten_string(state.location.as_ref()),
            sku: state
                .sku
                .as_ref()
                .map(|sku| sku.name.clone())
                .unwrap_or_else(default_sku),
            admin_enabled: props.and_then(|p| p.admin_user_enabled).unwrap_or(false),
            tags: flatten_tags(state.tags.as_ref()),
            network_rule_set: flatten_single_block(rules, flatten_rule_set),
            login_server: flatten_string(props.and_then(|p| p.login_server.as_ref())),
        }
    }
}

impl Resource for ContainerRegistry {
    type UpdatePayload = RegistryUpdate;

    const TYPE_NAME: &'static str = "hemmer_container_registry";
    const CREATE_POLICY: CreatePolicy = CreatePolicy::RejectExisting;
    const UPDATE_MODE: UpdateMode = UpdateMode::Delta;

    fn base_schema() -> Schema {
        let rule_set = Block::new()
            .with_attribute(
                "default_action",
                Attribute::optional_string()
                    .with_default(serde_json::json!("Allow"))
                    .with_validator(validators::string_in_slice(DEFAULT_ACTIONS)),
            )
            .with_attribute(
                "ip_rules",
                Attribute::new(AttributeType::list(AttributeType::String), AttributeFlags::optional())
                .with_description("IPv4 addresses or CIDR ranges"),
            );

        Schema::v0()
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "resource_group_name",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute("location", Attribute::required_string().with_force_new())
            .with_attribute(
                "sku",
                Attribute::optional_string().with_default(serde_json::json!("Basic")),
            )
            .with_attribute(
                "admin_enabled",
                Attribute::optional_bool().with_default(serde_json::json!(false)),
            )
            .with_attribute("tags", Attribute::optional_string_map())
            .with_block("network_rule_set", NestedBlock::single(rule_set))
            .with_attribute(
                "login_server",
                Attribute::computed_string().with_description("Registry login host name"),
            )
    }

    fn field_mappings() -> &'static [FieldMapping] {
        FIELDS
    }

    fn resource_id(ctx: &OperationContext, config: &RegistryConfig) -> Result<RegistryId> {
        RegistryId::new(ctx.subscription_id()?, &config.resource_group_name, &config.name)
    }

    fn expand_delta(config: &RegistryConfig, changes: &ChangeSet) -> Result<RegistryUpdate> {
        let mut update = RegistryUpdate::default();
        if changes.contains("sku") {
            update.sku = Some(Sku {
                name: config.sku.clone(),
            });
        }
        if changes.contains("tags") {
            // An empty map clears the tags; absent would keep them.
            update.tags = Some(config.tags.clone());
        }

        let mut properties = RegistryProperties::default();
        if changes.contains("admin_enabled") {
            properties.admin_user_enabled = Some(config.admin_enabled);
        }
        if changes.contains("network_rule_set") {
            properties.network_rule_set = Some(
                expand_single_block(&config.network_rule_set, expand_rule_set)
                    .unwrap_or_else(NetworkRuleSet::allow_all),
            );
        }
        if !properties.is_empty() {
            update.properties = Some(properties);
        }
        Ok(update)
    }
}
