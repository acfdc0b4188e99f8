//! Hemmer Reconcile
//!
//! A resource lifecycle engine for Hemmer cloud providers. Given desired
//! configuration for a resource, it drives the remote API through Create,
//! Read, Update and Delete so that remote state converges on it, and maps
//! remote state back into configuration so drift shows up in the next plan.
//!
//! # Overview
//!
//! - **Typed IDs** ([`id`]): hierarchical, case-sensitive resource paths such
//!   as `/subscriptions/{}/resourceGroups/{}/providers/...`, parsed into
//!   per-family structs and formatted back exactly.
//! - **Lifecycle controller** ([`lifecycle`]): existence checks before
//!   create, not-found-tolerant read and delete, delta or full-payload
//!   updates.
//! - **Waiter** ([`waiter`]): polls long-running operations under a deadline
//!   and a cancellation token.
//! - **State mapper** ([`mapper`]): pure expand/flatten between local config
//!   and remote payloads.
//! - **Provider surface** ([`provider`]): JSON plan/apply operations over
//!   registered resource families.
//! - **Testing** ([`testing`]): a fake clock, an in-memory remote and a
//!   provider test harness.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_reconcile::{Provider, ProviderService};
//! use hemmer_reconcile::resources::{ContainerRegistry, MySqlFirewallRule};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     hemmer_reconcile::init_logging();
//!
//!     let provider = Provider::new("hemmer")
//!         .register::<ContainerRegistry, _>(registry_client)
//!         .register::<MySqlFirewallRule, _>(firewall_client);
//!
//!     provider
//!         .configure(serde_json::json!({"subscription_id": "00000000-0000-0000-0000-000000000000"}))
//!         .await?;
//!
//!     let plan = provider
//!         .plan("hemmer_container_registry", None, proposed.clone(), proposed)
//!         .await?;
//!     let state = provider.create("hemmer_container_registry", plan.planned_state).await?;
//!     println!("created {}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! All operations emit `tracing` spans and events. [`init_logging`] installs
//! a stderr subscriber filtered by `RUST_LOG`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod clock;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod logging;
pub mod mapper;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;
pub mod validators;
pub mod waiter;

// Re-export main types at crate root
pub use client::RemoteClient;
pub use clock::{CancellationToken, Clock, TokioClock};
pub use config::ProviderConfig;
pub use context::OperationContext;
pub use descriptor::{Operation, ResourceDescriptor, ResourceTimeouts};
pub use error::{ErrorKind, ProviderError, ResourceContext, Result};
pub use id::{IdFormat, ResourceGroupId, ResourceId, SubscriptionId};
pub use lifecycle::{
    ClientFor, CreatePolicy, LifecycleController, LifecycleState, ReadOutcome, Reconciled,
    Resource, UpdateMode,
};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use mapper::{FieldMapping, StateMapper};
pub use provider::{Provider, ProviderService, ResourceHandler, ID_KEY};
pub use retry::RetryPolicy;
pub use schema::ProviderSchema;
pub use types::{
    AttributeChange, ChangeSet, DesiredConfig, ImportedResource, PlanResult, ProviderMetadata,
};
pub use validation::{is_valid, validate, validate_result};
pub use waiter::{LongRunningOperation, OperationStatus, Waiter, WaiterSettings};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
