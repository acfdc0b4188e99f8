//! The create / read / update / delete reconciliation engine.
//!
//! A resource family implements [`Resource`] on top of [`StateMapper`],
//! declaring its create policy and update mode. [`LifecycleController`]
//! pairs it with any [`RemoteClient`] whose shapes match and drives each
//! operation as a strictly sequential series of remote calls:
//!
//! ```text
//! create: [existence check] -> expand -> submit -> wait -> read
//! read:   get (retried) -> flatten, or Absent when not found
//! update: [no-op if unchanged] -> delta or full payload -> submit -> wait -> read
//! delete: submit -> wait; not found at any point is success
//! ```
//!
//! Every error leaving the controller carries the resource's identity.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, info, instrument};

use crate::client::RemoteClient;
use crate::context::OperationContext;
use crate::descriptor::{Operation, ResourceDescriptor, ResourceTimeouts};
use crate::error::{ProviderError, ResourceContext, Result};
use crate::id::ResourceId;
use crate::mapper::{FieldMapping, StateMapper};
use crate::retry::retry_idempotent;
use crate::schema::Schema;
use crate::types::{ChangeSet, DesiredConfig};

/// What Create does when the resource may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePolicy {
    /// Look the resource up first and fail with `AlreadyExists` if present.
    RejectExisting,
    /// The remote create is an idempotent upsert; skip the lookup.
    Upsert,
}

/// How Update builds its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Send only the changed fields (PATCH-style).
    Delta,
    /// Fetch the current state, patch changed fields, resubmit it whole.
    FullPayload,
}

/// A resource family the engine can manage.
pub trait Resource: StateMapper + Send + Sync + 'static {
    /// Body of an update request.
    type UpdatePayload: Send + Sync;

    /// Unique type name, e.g. `hemmer_container_registry`.
    const TYPE_NAME: &'static str;

    /// Whether Create checks for an existing resource first.
    const CREATE_POLICY: CreatePolicy;

    /// How Update builds its request.
    const UPDATE_MODE: UpdateMode;

    /// Attribute declarations, without validators.
    fn base_schema() -> Schema;

    /// The declarative field table: schema key and validator.
    fn field_mappings() -> &'static [FieldMapping];

    /// Per-operation budgets.
    fn timeouts() -> ResourceTimeouts {
        ResourceTimeouts::default()
    }

    /// Full schema, with validators from the field table attached.
    fn schema() -> Schema {
        crate::mapper::apply_validators(Self::base_schema(), Self::field_mappings())
    }

    /// Static description of this family.
    fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor {
            type_name: Self::TYPE_NAME,
            schema: Self::schema(),
            timeouts: Self::timeouts(),
            id_format: Self::Id::FORMAT,
        }
    }

    /// The identity a new resource with `config` will have.
    fn resource_id(ctx: &OperationContext, config: &Self::Config) -> Result<Self::Id>;

    /// Build a delta update carrying only the fields in `changes`.
    ///
    /// Required when [`Resource::UPDATE_MODE`] is [`UpdateMode::Delta`].
    fn expand_delta(config: &Self::Config, changes: &ChangeSet) -> Result<Self::UpdatePayload> {
        let _ = (config, changes);
        Err(ProviderError::FailedPrecondition(format!(
            "{} does not support delta updates",
            Self::TYPE_NAME
        )))
    }

    /// Patch each changed field of `current` with its desired value.
    ///
    /// Required when [`Resource::UPDATE_MODE`] is [`UpdateMode::FullPayload`].
    fn patch(
        current: &Self::RemoteState,
        config: &Self::Config,
        changes: &ChangeSet,
    ) -> Result<Self::UpdatePayload> {
        let _ = (current, config, changes);
        Err(ProviderError::FailedPrecondition(format!(
            "{} does not support full-payload updates",
            Self::TYPE_NAME
        )))
    }
}

/// A remote client whose shapes match resource family `R`.
///
/// Implemented for every [`RemoteClient`] with the right associated types.
pub trait ClientFor<R: Resource>:
    RemoteClient<
    Id = R::Id,
    CreatePayload = R::Payload,
    UpdatePayload = R::UpdatePayload,
    State = R::RemoteState,
>
{
}

impl<R, C> ClientFor<R> for C
where
    R: Resource,
    C: RemoteClient<
        Id = R::Id,
        CreatePayload = R::Payload,
        UpdatePayload = R::UpdatePayload,
        State = R::RemoteState,
    >,
{
}

/// Lifecycle position of one resource during one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    #[allow(missing_docs)]
    Absent,
    #[allow(missing_docs)]
    Creating,
    #[allow(missing_docs)]
    Present,
    #[allow(missing_docs)]
    Updating,
    #[allow(missing_docs)]
    Deleting,
}

impl LifecycleState {
    /// Whether moving from `self` to `to` is allowed.
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Absent, Creating)
                | (Creating, Present)
                | (Present, Updating)
                | (Updating, Present)
                | (Present, Deleting)
                | (Deleting, Absent)
        )
    }

    /// States reachable in one step from `self`.
    pub fn allowed_next_states(self) -> &'static [LifecycleState] {
        use LifecycleState::*;
        match self {
            Absent => &[Creating],
            Creating => &[Present],
            Present => &[Updating, Deleting],
            Updating => &[Present],
            Deleting => &[Absent],
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks and logs the lifecycle state of one resource for one invocation.
#[derive(Debug)]
pub struct StateTracker {
    resource: String,
    state: LifecycleState,
}

impl StateTracker {
    /// Start tracking `resource` in `state`.
    pub fn new(resource: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            resource: resource.into(),
            state,
        }
    }

    /// The current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Move to `to`, refusing transitions the lifecycle does not allow.
    pub fn transition(&mut self, to: LifecycleState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(ProviderError::FailedPrecondition(format!(
                "{} cannot move from {} to {}",
                self.resource, self.state, to
            )));
        }
        info!(resource = %self.resource, from = %self.state, to = %to, "Lifecycle transition");
        self.state = to;
        Ok(())
    }
}

/// Result of a Read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<C> {
    /// The resource exists; its flattened configuration.
    Present(C),
    /// The remote reported not found; the resource should be dropped from
    /// local state.
    Absent,
}

impl<C> ReadOutcome<C> {
    /// The flattened configuration, if present.
    pub fn present(self) -> Option<C> {
        match self {
            Self::Present(config) => Some(config),
            Self::Absent => None,
        }
    }

    /// Whether the resource is absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// A resource after a successful create or import.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<I, C> {
    /// The durable identity.
    pub id: I,
    /// Flattened remote state.
    pub state: C,
}

/// Drives the CRUD lifecycle of one resource family against its client.
pub struct LifecycleController<R: Resource, C: ClientFor<R>> {
    client: C,
    descriptor: ResourceDescriptor,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource, C: ClientFor<R>> fmt::Debug for LifecycleController<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("type_name", &R::TYPE_NAME)
            .finish_non_exhaustive()
    }
}

impl<R: Resource, C: ClientFor<R>> LifecycleController<R, C> {
    /// Create a controller owning `client`.
    pub fn new(client: C) -> Self {
        Self {
            client,
            descriptor: R::descriptor(),
            _resource: PhantomData,
        }
    }

    /// The family's descriptor.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// The remote client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Create the resource described by `config`.
    #[instrument(skip_all, fields(resource_type = R::TYPE_NAME))]
    pub async fn create(
        &self,
        ctx: &OperationContext,
        config: &DesiredConfig<R::Config>,
    ) -> Result<Reconciled<R::Id, R::Config>> {
        let id = R::resource_id(ctx, config.value())
            .map_err(|err| err.with_context(config_context::<R>(config.value())))?;
        self.create_at(ctx, &id, config)
            .await
            .map(|state| Reconciled { id: id.clone(), state })
            .map_err(|err| err.with_context(id.context()))
    }

    async fn create_at(
        &self,
        ctx: &OperationContext,
        id: &R::Id,
        config: &DesiredConfig<R::Config>,
    ) -> Result<R::Config> {
        let mut tracker = StateTracker::new(id.to_id_string(), LifecycleState::Absent);

        if R::CREATE_POLICY == CreatePolicy::RejectExisting && self.fetch(ctx, id).await?.is_some() {
            return Err(ProviderError::AlreadyExists(format!(
                "a resource with the ID {:?} already exists; import it to manage it",
                id.to_id_string()
            )));
        }

        let payload = R::expand(config)?;
        tracker.transition(LifecycleState::Creating)?;
        let mut op = ctx
            .cancellation()
            .run("submitting create", self.client.create(id, payload))
            .await??;
        ctx.waiter(self.timeout(ctx, Operation::Create))
            .wait(&mut op)
            .await?;

        let state = self
            .read_present(ctx, id)
            .await?
            .ok_or_else(|| ProviderError::RemoteOperationFailed("resource not found after create".into()))?;
        tracker.transition(LifecycleState::Present)?;
        Ok(state)
    }

    /// Fetch and flatten the resource's current state.
    ///
    /// A remote not-found is [`ReadOutcome::Absent`], never an error.
    #[instrument(skip_all, fields(resource_type = R::TYPE_NAME, id = %id.to_id_string()))]
    pub async fn read(&self, ctx: &OperationContext, id: &R::Id) -> Result<ReadOutcome<R::Config>> {
        match self.read_present(ctx, id).await {
            Ok(Some(state)) => Ok(ReadOutcome::Present(state)),
            Ok(None) => {
                info!("Resource no longer exists remotely");
                Ok(ReadOutcome::Absent)
            },
            Err(err) => Err(err.with_context(id.context())),
        }
    }

    /// Bring the resource in line with `config`, touching only `changes`.
    #[instrument(skip_all, fields(resource_type = R::TYPE_NAME, id = %id.to_id_string()))]
    pub async fn update(
        &self,
        ctx: &OperationContext,
        id: &R::Id,
        config: &DesiredConfig<R::Config>,
        changes: &ChangeSet,
    ) -> Result<R::Config> {
        self.update_at(ctx, id, config, changes)
            .await
            .map_err(|err| err.with_context(id.context()))
    }

    async fn update_at(
        &self,
        ctx: &OperationContext,
        id: &R::Id,
        config: &DesiredConfig<R::Config>,
        changes: &ChangeSet,
    ) -> Result<R::Config> {
        if changes.is_empty() {
            debug!("No changed fields, skipping remote update");
            return self.require_present(ctx, id).await;
        }

        let replace = changes.intersection(&self.descriptor.schema.force_new_keys());
        if !replace.is_empty() {
            return Err(ProviderError::RequiresReplacement(replace));
        }

        let payload = match R::UPDATE_MODE {
            UpdateMode::Delta => R::expand_delta(config.value(), changes)?,
            UpdateMode::FullPayload => {
                let current = self.fetch(ctx, id).await?.ok_or_else(|| {
                    ProviderError::NotFound(format!(
                        "{} was deleted outside of Hemmer and cannot be updated",
                        id.to_id_string()
                    ))
                })?;
                R::patch(&current, config.value(), changes)?
            },
        };

        let mut tracker = StateTracker::new(id.to_id_string(), LifecycleState::Present);
        tracker.transition(LifecycleState::Updating)?;
        let mut op = ctx
            .cancellation()
            .run("submitting update", self.client.update(id, payload))
            .await??;
        ctx.waiter(self.timeout(ctx, Operation::Update))
            .wait(&mut op)
            .await?;

        let state = self
            .read_present(ctx, id)
            .await?
            .ok_or_else(|| ProviderError::RemoteOperationFailed("resource not found after update".into()))?;
        tracker.transition(LifecycleState::Present)?;
        Ok(state)
    }

    /// Delete the resource. Already gone counts as success.
    #[instrument(skip_all, fields(resource_type = R::TYPE_NAME, id = %id.to_id_string()))]
    pub async fn delete(&self, ctx: &OperationContext, id: &R::Id) -> Result<()> {
        self.delete_at(ctx, id)
            .await
            .map_err(|err| err.with_context(id.context()))
    }

    async fn delete_at(&self, ctx: &OperationContext, id: &R::Id) -> Result<()> {
        let mut tracker = StateTracker::new(id.to_id_string(), LifecycleState::Present);
        tracker.transition(LifecycleState::Deleting)?;

        let submitted = ctx
            .cancellation()
            .run("submitting delete", self.client.delete(id))
            .await?;
        let mut op = match submitted {
            Ok(op) => op,
            Err(err) if err.is_not_found() => {
                info!("Resource was already deleted");
                return tracker.transition(LifecycleState::Absent);
            },
            Err(err) => return Err(err),
        };

        match ctx
            .waiter(self.timeout(ctx, Operation::Delete))
            .wait(&mut op)
            .await
        {
            Ok(_) => {},
            Err(err) if err.is_not_found() => debug!("Resource disappeared while deleting"),
            Err(err) => return Err(err),
        }
        tracker.transition(LifecycleState::Absent)
    }

    /// Adopt an existing resource by its ID string.
    #[instrument(skip_all, fields(resource_type = R::TYPE_NAME, id = raw_id))]
    pub async fn import(
        &self,
        ctx: &OperationContext,
        raw_id: &str,
    ) -> Result<Reconciled<R::Id, R::Config>> {
        let id = R::Id::parse(raw_id)?;
        match self.read(ctx, &id).await? {
            ReadOutcome::Present(state) => Ok(Reconciled { id, state }),
            ReadOutcome::Absent => {
                let context = id.context();
                Err(ProviderError::NotFound(format!("cannot import non-existent resource {:?}", raw_id))
                    .with_context(context))
            },
        }
    }

    fn timeout(&self, ctx: &OperationContext, operation: Operation) -> std::time::Duration {
        ctx.timeout_for(self.descriptor.timeouts, operation)
    }

    /// Get with retries for transient failures, bounded by the read timeout.
    ///
    /// A get still in flight when the budget runs out is abandoned with
    /// `Timeout`, which is not retried.
    async fn fetch(&self, ctx: &OperationContext, id: &R::Id) -> Result<Option<R::RemoteState>> {
        const WHAT: &str = "reading remote state";
        let client = &self.client;
        let clock = ctx.clock();
        let started = clock.now();
        let deadline = started + self.timeout(ctx, Operation::Read);
        retry_idempotent(ctx.retry_policy(), clock, ctx.cancellation(), WHAT, move || async move {
            let remaining = deadline.saturating_duration_since(clock.now());
            tokio::select! {
                biased;
                result = client.get(id) => result,
                _ = clock.sleep(remaining) => Err(ProviderError::Timeout {
                    elapsed: clock.now().saturating_duration_since(started),
                    last_status: WHAT.to_string(),
                }),
            }
        })
        .await
    }

    async fn read_present(&self, ctx: &OperationContext, id: &R::Id) -> Result<Option<R::Config>> {
        Ok(self
            .fetch(ctx, id)
            .await?
            .map(|state| R::flatten(id, &state)))
    }

    async fn require_present(&self, ctx: &OperationContext, id: &R::Id) -> Result<R::Config> {
        self.read_present(ctx, id).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "{} was deleted outside of Hemmer",
                id.to_id_string()
            ))
        })
    }
}

/// Identity of a resource that has no ID yet, from its configuration.
fn config_context<R: Resource>(config: &R::Config) -> ResourceContext {
    let value = serde_json::to_value(config).unwrap_or_default();
    ResourceContext::from_config(<R::Id as ResourceId>::KIND, &value)
}
