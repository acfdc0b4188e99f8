//! The JSON-level provider surface.
//!
//! [`ProviderService`] is what a host drives: schema discovery,
//! configuration, planning and the four lifecycle operations, all exchanging
//! `serde_json::Value` state. [`Provider`] implements it by dispatching on the
//! resource type name to registered [`ResourceHandler`]s, which are
//! type-erased [`LifecycleController`]s.
//!
//! Persisted state is the flattened configuration plus an `"id"` key holding
//! the canonical resource ID string. Everything except the ID is re-derived by
//! Read.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_reconcile::provider::{Provider, ProviderService};
//! use hemmer_reconcile::resources::ContainerRegistry;
//!
//! let provider = Provider::new("hemmer").register::<ContainerRegistry, _>(registry_client);
//! provider.configure(json!({"subscription_id": "..."})).await?;
//! let state = provider.create("hemmer_container_registry", planned).await?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use crate::clock::{CancellationToken, Clock, TokioClock};
use crate::config::ProviderConfig;
use crate::context::OperationContext;
use crate::descriptor::ResourceDescriptor;
use crate::error::{ProviderError, ResourceContext, Result};
use crate::id::ResourceId;
use crate::lifecycle::{ClientFor, LifecycleController, ReadOutcome, Resource};
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::types::{
    diff_values, ChangeSet, DesiredConfig, ImportedResource, PlanResult, ProviderMetadata,
};
use crate::validation;

/// Key under which the resource ID is persisted in state.
pub const ID_KEY: &str = "id";

/// Operations a provider exposes to its host.
#[async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// The provider's configuration schema and every resource schema.
    fn schema(&self) -> ProviderSchema;

    /// Resource type names and version. Derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.schema().resources.keys().cloned().collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>> {
        Ok(validation::validate(&self.schema().provider, &config))
    }

    /// Configure the provider. Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>>;

    /// Stop the provider, aborting in-flight operations.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>> {
        let schema = self.schema();
        let resource = schema
            .resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;
        Ok(validation::validate(resource, &config))
    }

    /// Compute the changes needed to move from `prior_state` to
    /// `proposed_state`. `prior_state` is `None` for a create; a `Null`
    /// proposed state plans a delete.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult>;

    /// Create a resource from its planned state.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value>;

    /// Refresh a resource. Returns `Null` when it no longer exists.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value>;

    /// Update a resource in place.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()>;

    /// Adopt existing infrastructure by ID.
    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>> {
        let _ = id;
        Err(ProviderError::UnknownResource(format!(
            "import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// A lifecycle controller with its types erased to JSON state.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Static description of the family.
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Create from planned state; returns the new state.
    async fn create(&self, ctx: &OperationContext, planned: &Value) -> Result<Value>;

    /// Read current state; `None` when absent.
    async fn read(&self, ctx: &OperationContext, state: &Value) -> Result<Option<Value>>;

    /// Update from `prior` to `planned`; returns the new state.
    async fn update(&self, ctx: &OperationContext, prior: &Value, planned: &Value)
        -> Result<Value>;

    /// Delete the resource `state` describes.
    async fn delete(&self, ctx: &OperationContext, state: &Value) -> Result<()>;

    /// Import by raw ID string; returns the state.
    async fn import(&self, ctx: &OperationContext, raw_id: &str) -> Result<Value>;
}

#[async_trait]
impl<R, C> ResourceHandler for LifecycleController<R, C>
where
    R: Resource,
    C: ClientFor<R> + 'static,
{
    fn descriptor(&self) -> &ResourceDescriptor {
        LifecycleController::descriptor(self)
    }

    async fn create(&self, ctx: &OperationContext, planned: &Value) -> Result<Value> {
        let config = desired_config::<R>(&self.descriptor().schema, planned)?;
        let created = LifecycleController::create(self, ctx, &config).await?;
        state_json(&created.id, &created.state)
    }

    async fn read(&self, ctx: &OperationContext, state: &Value) -> Result<Option<Value>> {
        let id = id_from_state::<R::Id>(state)?;
        match LifecycleController::read(self, ctx, &id).await? {
            ReadOutcome::Present(config) => state_json(&id, &config).map(Some),
            ReadOutcome::Absent => Ok(None),
        }
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value> {
        let id = id_from_state::<R::Id>(prior)?;
        let schema = &self.descriptor().schema;
        let changes = changed_fields(schema, prior, planned);
        let config = desired_config::<R>(schema, planned)?;
        let state = LifecycleController::update(self, ctx, &id, &config, &changes).await?;
        state_json(&id, &state)
    }

    async fn delete(&self, ctx: &OperationContext, state: &Value) -> Result<()> {
        let id = id_from_state::<R::Id>(state)?;
        LifecycleController::delete(self, ctx, &id).await
    }

    async fn import(&self, ctx: &OperationContext, raw_id: &str) -> Result<Value> {
        let imported = LifecycleController::import(self, ctx, raw_id).await?;
        state_json(&imported.id, &imported.state)
    }
}

/// The configuration part of `state`: no ID, no computed attributes, no nulls.
fn config_view(schema: &Schema, state: &Value) -> Value {
    let computed = schema.computed_keys();
    let view: Map<String, Value> = state
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(key, value)| {
            key.as_str() != ID_KEY && !computed.contains(key.as_str()) && !value.is_null()
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(view)
}

/// `state` with schema defaults filled in for absent or null attributes.
fn with_defaults(schema: &Schema, state: &Value) -> Value {
    let mut filled = state.clone();
    if let Value::Object(map) = &mut filled {
        for (name, attr) in &schema.block.attributes {
            if let Some(default) = &attr.default {
                let entry = map.entry(name.clone()).or_insert(Value::Null);
                if entry.is_null() {
                    *entry = default.clone();
                }
            }
        }
    }
    filled
}

/// Validate and type `state`; failures name the resource the state describes.
fn desired_config<R: Resource>(schema: &Schema, state: &Value) -> Result<DesiredConfig<R::Config>> {
    let view = config_view(schema, state);
    validation::ensure_valid(schema, &view)
        .and_then(|()| DesiredConfig::from_json(&view))
        .map_err(|err| {
            let context = match id_from_state::<R::Id>(state) {
                Ok(id) => id.context(),
                Err(_) => ResourceContext::from_config(<R::Id as ResourceId>::KIND, state),
            };
            err.with_context(context)
        })
}

/// Top-level user-settable fields that differ between two states.
fn changed_fields(schema: &Schema, prior: &Value, planned: &Value) -> ChangeSet {
    let computed = schema.computed_keys();
    let keys = schema.top_level_keys();
    diff_values(prior, &with_defaults(schema, planned), keys.difference(&computed).copied())
        .into_iter()
        .map(|change| change.path)
        .collect()
}

fn id_from_state<I: ResourceId>(state: &Value) -> Result<I> {
    let raw = state
        .get(ID_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Validation(format!("state has no {:?} string", ID_KEY)))?;
    I::parse(raw)
}

fn state_json<I: ResourceId, C: Serialize>(id: &I, config: &C) -> Result<Value> {
    match serde_json::to_value(config)? {
        Value::Object(mut map) => {
            map.insert(ID_KEY.to_string(), Value::String(id.to_id_string()));
            Ok(Value::Object(map))
        },
        other => Err(ProviderError::FailedPrecondition(format!(
            "resource state must serialize to an object, got {}",
            other
        ))),
    }
}

/// The schema a host sees for a resource: its attributes plus the ID.
fn state_schema(descriptor: &ResourceDescriptor) -> Schema {
    descriptor.schema.clone().with_attribute(
        ID_KEY,
        Attribute::computed_string().with_description("Canonical resource ID"),
    )
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A provider serving a fixed set of resource families.
pub struct Provider {
    name: String,
    resources: BTreeMap<&'static str, Box<dyn ResourceHandler>>,
    config: RwLock<ProviderConfig>,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
    env: EnvLookup,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// An empty provider reading overrides from the process environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: BTreeMap::new(),
            config: RwLock::new(ProviderConfig::default()),
            cancel: CancellationToken::new(),
            clock: Arc::new(TokioClock),
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Serve resource family `R` through `client`.
    pub fn register<R, C>(self, client: C) -> Self
    where
        R: Resource,
        C: ClientFor<R> + 'static,
    {
        self.register_handler(Box::new(LifecycleController::<R, C>::new(client)))
    }

    /// Serve a pre-built handler under its descriptor's type name.
    pub fn register_handler(mut self, handler: Box<dyn ResourceHandler>) -> Self {
        let type_name = handler.descriptor().type_name;
        debug!(provider = %self.name, resource_type = type_name, "Registered resource");
        self.resources.insert(type_name, handler);
        self
    }

    /// Use `clock` for every wait and backoff.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Read environment overrides through `lookup` instead of the process
    /// environment.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// The provider's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The token [`ProviderService::stop`] cancels.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The active configuration.
    pub async fn config(&self) -> ProviderConfig {
        self.config.read().await.clone()
    }

    /// A fresh context for one operation.
    pub async fn context(&self) -> OperationContext {
        let config = self.config.read().await;
        OperationContext::from_config(&config, self.clock.clone(), self.cancel.clone())
    }

    fn handler(&self, resource_type: &str) -> Result<&dyn ResourceHandler> {
        self.resources
            .get(resource_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn parse_config(&self, config: &Value) -> Result<ProviderConfig> {
        ProviderConfig::from_value_with_env(config, |key| (self.env)(key))
    }
}

#[async_trait]
impl ProviderService for Provider {
    fn schema(&self) -> ProviderSchema {
        self.resources.iter().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, (name, handler)| schema.with_resource(*name, state_schema(handler.descriptor())),
        )
    }

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let mut diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        if diagnostics.is_empty() {
            if let Err(err) = self.parse_config(&config) {
                diagnostics.push(err.into());
            }
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let diagnostics = self.validate_provider_config(config.clone()).await?;
        if diagnostics.iter().any(Diagnostic::is_error) {
            error!(errors = diagnostics.len(), "Provider configuration rejected");
            return Ok(diagnostics);
        }

        let parsed = self.parse_config(&config)?;
        info!(
            provider = %self.name,
            subscription = parsed.subscription_id.as_deref().unwrap_or("<unset>"),
            poll_interval_secs = parsed.poll_interval_secs,
            "Provider configured"
        );
        *self.config.write().await = parsed;
        Ok(diagnostics)
    }

    #[instrument(skip(self), name = "provider.stop")]
    async fn stop(&self) -> Result<()> {
        info!(provider = %self.name, "Stopping provider, cancelling in-flight operations");
        self.cancel.cancel();
        Ok(())
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>> {
        let handler = self.handler(resource_type)?;
        Ok(validation::validate(&state_schema(handler.descriptor()), &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult> {
        let _ = config;
        let schema = &self.handler(resource_type)?.descriptor().schema;
        let computed = schema.computed_keys();
        let keys = schema.top_level_keys();
        let managed: Vec<&str> = keys.difference(&computed).copied().collect();

        let proposed_state = with_defaults(schema, &proposed_state);
        let plan = match prior_state {
            None => {
                let mut planned = proposed_state;
                if let Value::Object(map) = &mut planned {
                    // Unknown until the remote API assigns them.
                    for key in computed.iter().copied().chain([ID_KEY]) {
                        map.insert(key.to_string(), Value::Null);
                    }
                }
                let changes = diff_values(&Value::Null, &planned, managed.iter().copied());
                PlanResult::with_changes(planned, changes, Vec::new())
            },
            Some(prior) if proposed_state.is_null() => {
                let changes = diff_values(&prior, &Value::Null, managed.iter().copied());
                PlanResult::with_changes(Value::Null, changes, Vec::new())
            },
            Some(prior) => {
                let changes = diff_values(&prior, &proposed_state, managed.iter().copied());
                let changed: ChangeSet = changes.iter().map(|c| c.path.as_str()).collect();
                let replace = changed.intersection(&schema.force_new_keys());

                let mut planned = proposed_state;
                if let Value::Object(map) = &mut planned {
                    for key in computed.iter().copied().chain([ID_KEY]) {
                        let carried = if replace.is_empty() {
                            prior.get(key).cloned().unwrap_or(Value::Null)
                        } else {
                            Value::Null
                        };
                        map.insert(key.to_string(), carried);
                    }
                }
                PlanResult::with_changes(planned, changes, replace)
            },
        };

        info!(
            resource_type,
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "Plan completed"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value> {
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await;
        match handler.create(&ctx, &planned_state).await {
            Ok(state) => {
                info!(resource_type, "Create completed successfully");
                Ok(state)
            },
            Err(err) => {
                error!(resource_type, error = %err, "Create failed");
                Err(err)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value> {
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await;
        match handler.read(&ctx, &current_state).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => {
                info!(resource_type, "Resource is gone, removing from state");
                Ok(Value::Null)
            },
            Err(err) => {
                error!(resource_type, error = %err, "Read failed");
                Err(err)
            },
        }
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value> {
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await;
        match handler.update(&ctx, &prior_state, &planned_state).await {
            Ok(state) => {
                info!(resource_type, "Update completed successfully");
                Ok(state)
            },
            Err(err) => {
                error!(resource_type, error = %err, "Update failed");
                Err(err)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await;
        match handler.delete(&ctx, &current_state).await {
            Ok(()) => {
                info!(resource_type, "Delete completed successfully");
                Ok(())
            },
            Err(err) => {
                error!(resource_type, error = %err, "Delete failed");
                Err(err)
            },
        }
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>> {
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await;
        let state = handler.import(&ctx, id).await.map_err(|err| {
            error!(resource_type, id, error = %err, "Import failed");
            err
        })?;
        info!(resource_type, id, "Import completed");
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}
