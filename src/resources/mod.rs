//! Built-in resource families.
//!
//! Each family is a unit struct implementing [`Resource`](crate::lifecycle::Resource)
//! plus its typed IDs, config struct and remote shapes. Register them on a
//! [`Provider`](crate::provider::Provider) with a client that speaks to the
//! matching remote API.

pub mod avs_authorization;
pub mod container_registry;
pub mod mysql_firewall_rule;

pub use avs_authorization::{AuthorizationId, AvsAuthorization, PrivateCloudId};
pub use container_registry::{ContainerRegistry, RegistryId};
pub use mysql_firewall_rule::{FirewallRuleId, MySqlFirewallRule, MySqlServerId};
