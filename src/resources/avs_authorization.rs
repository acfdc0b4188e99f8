//! `hemmer_avs_authorization`: an ExpressRoute authorization on an Azure
//! VMware Solution private cloud.
//!
//! Nothing about an authorization can change in place. Every configurable
//! field forces replacement, so Update only ever confirms the resource still
//! exists.

use serde::{Deserialize, Serialize};

use crate::context::OperationContext;
use crate::error::Result;
use crate::id::{id_string_traits, require_segment, IdFormat, ParsedId, ResourceGroupId, ResourceId, Segment};
use crate::lifecycle::{CreatePolicy, Resource, UpdateMode};
use crate::mapper::{flatten_string, FieldMapping, StateMapper};
use crate::schema::{Attribute, Schema, Validator};
use crate::types::DesiredConfig;
use crate::validators;

const PRIVATE_CLOUD_FORMAT: IdFormat = IdFormat::new(&[
    Segment::Literal("subscriptions"),
    Segment::Variable("subscriptionId"),
    Segment::Literal("resourceGroups"),
    Segment::Variable("resourceGroupName"),
    Segment::Literal("providers"),
    Segment::Literal("Microsoft.AVS"),
    Segment::Literal("privateClouds"),
    Segment::Variable("privateCloudName"),
]);

const AUTHORIZATION_FORMAT: IdFormat = IdFormat::new(&[
    Segment::Literal("subscriptions"),
    Segment::Variable("subscriptionId"),
    Segment::Literal("resourceGroups"),
    Segment::Variable("resourceGroupName"),
    Segment::Literal("providers"),
    Segment::Literal("Microsoft.AVS"),
    Segment::Literal("privateClouds"),
    Segment::Variable("privateCloudName"),
    Segment::Literal("authorizations"),
    Segment::Variable("authorizationName"),
]);

/// `/subscriptions/{}/resourceGroups/{}/providers/Microsoft.AVS/privateClouds/{}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrivateCloudId {
    /// Subscription GUID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Private cloud name.
    pub private_cloud: String,
}

impl PrivateCloudId {
    /// Create a private cloud ID.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        private_cloud: impl Into<String>,
    ) -> Result<Self> {
        let id = Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            private_cloud: private_cloud.into(),
        };
        require_segment(Self::KIND, "subscription ID", &id.subscription_id)?;
        require_segment(Self::KIND, "resource group", &id.resource_group)?;
        require_segment(Self::KIND, "name", &id.private_cloud)?;
        Ok(id)
    }

    /// The resource group containing the private cloud.
    pub fn parent(&self) -> ResourceGroupId {
        ResourceGroupId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
        }
    }
}

impl ResourceId for PrivateCloudId {
    const FORMAT: IdFormat = PRIVATE_CLOUD_FORMAT;
    const KIND: &'static str = "AVS private cloud";

    fn from_parsed(mut parsed: ParsedId) -> Result<Self> {
        Ok(Self {
            subscription_id: parsed.take("subscriptionId")?,
            resource_group: parsed.take("resourceGroupName")?,
            private_cloud: parsed.take("privateCloudName")?,
        })
    }

    fn segment_values(&self) -> Vec<&str> {
        vec![
            self.subscription_id.as_str(),
            self.resource_group.as_str(),
            self.private_cloud.as_str(),
        ]
    }

    fn name(&self) -> &str {
        &self.private_cloud
    }

    fn resource_group(&self) -> Option<&str> {
        Some(&self.resource_group)
    }
}

id_string_traits!(PrivateCloudId);

/// `.../privateClouds/{}/authorizations/{}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorizationId {
    /// Subscription GUID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Private cloud name.
    pub private_cloud: String,
    /// Authorization name.
    pub name: String,
}

impl AuthorizationId {
    /// Create an authorization ID under `private_cloud`.
    pub fn new(private_cloud: &PrivateCloudId, name: impl Into<String>) -> Result<Self> {
        let id = Self {
            subscription_id: private_cloud.subscription_id.clone(),
            resource_group: private_cloud.resource_group.clone(),
            private_cloud: private_cloud.private_cloud.clone(),
            name: name.into(),
        };
        require_segment(Self::KIND, "name", &id.name)?;
        Ok(id)
    }

    /// The private cloud the authorization belongs to.
    pub fn parent(&self) -> PrivateCloudId {
        PrivateCloudId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            private_cloud: self.private_cloud.clone(),
        }
    }
}

impl ResourceId for AuthorizationId {
    const FORMAT: IdFormat = AUTHORIZATION_FORMAT;
    const KIND: &'static str = "AVS authorization";

    fn from_parsed(mut parsed: ParsedId) -> Result<Self> {
        Ok(Self {
            subscription_id: parsed.take("subscriptionId")?,
            resource_group: parsed.take("resourceGroupName")?,
            private_cloud: parsed.take("privateCloudName")?,
            name: parsed.take("authorizationName")?,
        })
    }

    fn segment_values(&self) -> Vec<&str> {
        vec![
            self.subscription_id.as_str(),
            self.resource_group.as_str(),
            self.private_cloud.as_str(),
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

id_string_traits!(AuthorizationId);

/// Local configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Authorization name.
    pub name: String,
    /// ID of the owning private cloud.
    pub private_cloud_id: String,
    /// Computed.
    #[serde(default)]
    pub express_route_authorization_id: String,
    /// Computed, sensitive.
    #[serde(default)]
    pub express_route_authorization_key: String,
}

/// Create body. Authorizations have no settable properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthorizationPayload {}

/// The remote representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteAuthorization {
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<RemoteAuthorizationProperties>,
}

/// Server-computed properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAuthorizationProperties {
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub express_route_authorization_id: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub express_route_authorization_key: Option<String>,
}

/// The `hemmer_avs_authorization` resource family.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvsAuthorization;

fn private_cloud_id() -> Validator {
    validators::resource_id(PRIVATE_CLOUD_FORMAT)
}

const FIELDS: &[FieldMapping] = &[
    FieldMapping::validated("name", validators::non_empty_string),
    FieldMapping::validated("private_cloud_id", private_cloud_id),
    FieldMapping::plain("express_route_authorization_id"),
    FieldMapping::plain("express_route_authorization_key"),
];

impl StateMapper for AvsAuthorization {
    type Id = AuthorizationId;
    type Config = AuthorizationConfig;
    type Payload = AuthorizationPayload;
    type RemoteState = RemoteAuthorization;

    fn expand(_config: &DesiredConfig<AuthorizationConfig>) -> Result<AuthorizationPayload> {
        Ok(AuthorizationPayload {})
    }

    fn flatten(id: &AuthorizationId, state: &RemoteAuthorization) -> AuthorizationConfig {
        let props = state.properties.as_ref();
        AuthorizationConfig {
            name: id.name.clone(),
            private_cloud_id: id.parent().to_id_string(),
            express_route_authorization_id: flatten_string(
                props.and_then(|p| p.express_route_authorization_id.as_ref()),
            ),
            express_route_authorization_key: flatten_string(
                props.and_then(|p| p.express_route_authorization_key.as_ref()),
            ),
        }
    }
}

impl Resource for AvsAuthorization {
    type UpdatePayload = AuthorizationPayload;

    const TYPE_NAME: &'static str = "hemmer_avs_authorization";
    const CREATE_POLICY: CreatePolicy = CreatePolicy::RejectExisting;
    // Unreachable: every field forces replacement.
    const UPDATE_MODE: UpdateMode = UpdateMode::Delta;

    fn base_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("Name of the ExpressRoute circuit authorization")
                    .with_force_new(),
            )
            .with_attribute(
                "private_cloud_id",
                Attribute::required_string()
                    .with_description("ID of the private cloud to authorize")
                    .with_force_new(),
            )
            .with_attribute("express_route_authorization_id", Attribute::computed_string())
            .with_attribute(
                "express_route_authorization_key",
                Attribute::computed_string().sensitive(),
            )
    }

    fn field_mappings() -> &'static [FieldMapping] {
        FIELDS
    }

    fn resource_id(_ctx: &OperationContext, config: &AuthorizationConfig) -> Result<AuthorizationId> {
        let private_cloud = PrivateCloudId::parse(&config.private_cloud_id)?;
        AuthorizationId::new(&private_cloud, &config.name)
    }
}
