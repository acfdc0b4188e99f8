//! Testing utilities for resource families and providers.
//!
//! - [`FakeClock`] drives waiters and retries without real delays.
//! - [`InMemoryClient`] is a [`RemoteClient`] backed by a map, which records
//!   every call and can be scripted to throttle, reject, fail or stall.
//! - [`ProviderTester`] exercises a [`ProviderService`] end to end.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_reconcile::testing::{FakeClock, InMemoryClient, ProviderTester};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_registry() {
//!     let remote = registry_client();
//!     let provider = Provider::new("test")
//!         .with_clock(Arc::new(FakeClock::new()))
//!         .register::<ContainerRegistry, _>(remote.clone());
//!     let tester = ProviderTester::new(provider);
//!     tester.configure(json!({"subscription_id": "sub"})).await.unwrap();
//!
//!     let state = tester.lifecycle_create("hemmer_container_registry", config).await.unwrap();
//!     assert_eq!(remote.mutating_call_count(), 1);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::RemoteClient;
use crate::clock::Clock;
use crate::descriptor::Operation;
use crate::error::{ProviderError, Result};
use crate::id::ResourceId;
use crate::provider::ProviderService;
use crate::resources::avs_authorization::{
    AuthorizationPayload, RemoteAuthorization, RemoteAuthorizationProperties,
};
use crate::resources::container_registry::{
    NetworkRuleSet, RegistryPayload, RegistryUpdate, RemoteRegistry, RemoteRegistryProperties,
};
use crate::resources::mysql_firewall_rule::FirewallRulePayload;
use crate::resources::{AuthorizationId, FirewallRuleId, RegistryId};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{ImportedResource, PlanResult};
use crate::waiter::{LongRunningOperation, OperationStatus};

// =========================================================================
// Fake clock
// =========================================================================

/// A [`Clock`] whose time only moves when something sleeps on it.
///
/// Sleeping yields once, then advances the clock by the full duration and
/// returns. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FakeClock {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl FakeClock {
    /// A clock at its starting instant.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        // Let any racing future (a poll, a cancellation) go first.
        tokio::task::yield_now().await;
        self.advance(duration);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =========================================================================
// Fake operations
// =========================================================================

/// A scripted [`LongRunningOperation`].
#[derive(Debug, Clone)]
pub struct FakeOperation {
    pending: Option<u32>,
    outcome: OperationStatus,
    polls: u32,
}

impl FakeOperation {
    /// Reports in progress `pending` times, then succeeds.
    pub fn succeeding_after(pending: u32) -> Self {
        Self {
            pending: Some(pending),
            outcome: OperationStatus::Succeeded,
            polls: 0,
        }
    }

    /// Reports in progress `pending` times, then fails with `payload`.
    pub fn failing_after(pending: u32, payload: impl Into<String>) -> Self {
        Self {
            pending: Some(pending),
            outcome: OperationStatus::Failed(payload.into()),
            polls: 0,
        }
    }

    /// Reports in progress forever.
    pub fn never_completing() -> Self {
        Self {
            pending: None,
            outcome: OperationStatus::Succeeded,
            polls: 0,
        }
    }

    /// Number of times this operation was polled.
    pub fn polls(&self) -> u32 {
        self.polls
    }
}

#[async_trait]
impl LongRunningOperation for FakeOperation {
    async fn poll(&mut self) -> Result<OperationStatus> {
        self.polls += 1;
        match self.pending {
            Some(0) => Ok(self.outcome.clone()),
            Some(n) => {
                self.pending = Some(n - 1);
                Ok(OperationStatus::InProgress("InProgress".to_string()))
            },
            None => Ok(OperationStatus::InProgress("InProgress".to_string())),
        }
    }
}

// =========================================================================
// In-memory remote
// =========================================================================

/// A call received by an [`InMemoryClient`], with the target ID string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    #[allow(missing_docs)]
    Get(String),
    #[allow(missing_docs)]
    Create(String),
    #[allow(missing_docs)]
    Update(String),
    #[allow(missing_docs)]
    Delete(String),
}

impl RemoteCall {
    /// Whether this call changes remote state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Get(_))
    }

    /// The ID the call targeted.
    pub fn id(&self) -> &str {
        match self {
            Self::Get(id) | Self::Create(id) | Self::Update(id) | Self::Delete(id) => id,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    pending_polls: u32,
    never_complete: bool,
    stalled_gets: bool,
    throttled_gets: u32,
    failing_gets: Vec<ProviderError>,
    rejections: Vec<(Operation, ProviderError)>,
    failures: Vec<(Operation, String)>,
}

impl Script {
    fn take_rejection(&mut self, operation: Operation) -> Option<ProviderError> {
        let index = self.rejections.iter().position(|(op, _)| *op == operation)?;
        Some(self.rejections.remove(index).1)
    }

    fn take_failure(&mut self, operation: Operation) -> Option<String> {
        let index = self.failures.iter().position(|(op, _)| *op == operation)?;
        Some(self.failures.remove(index).1)
    }

    fn operation(&self, failure: Option<String>) -> FakeOperation {
        match failure {
            _ if self.never_complete => FakeOperation::never_completing(),
            Some(payload) => FakeOperation::failing_after(self.pending_polls, payload),
            None => FakeOperation::succeeding_after(self.pending_polls),
        }
    }
}

struct RemoteStore<S> {
    resources: BTreeMap<String, S>,
    calls: Vec<RemoteCall>,
    script: Script,
}

type CreateFn<I, P, S> = Arc<dyn Fn(&I, P) -> S + Send + Sync>;
type UpdateFn<I, U, S> = Arc<dyn Fn(&I, &S, U) -> S + Send + Sync>;

/// A [`RemoteClient`] that keeps resources in memory.
///
/// `on_create` turns a create payload into remote state; `on_update` applies
/// an update payload to the current state. Clones share the same store, so a
/// test can keep one handle for inspection while a controller owns another.
///
/// Mutations are applied when submitted. A scripted operation failure leaves
/// the store untouched.
pub struct InMemoryClient<I, P, U, S> {
    store: Arc<Mutex<RemoteStore<S>>>,
    on_create: CreateFn<I, P, S>,
    on_update: UpdateFn<I, U, S>,
}

impl<I, P, U, S> Clone for InMemoryClient<I, P, U, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            on_create: self.on_create.clone(),
            on_update: self.on_update.clone(),
        }
    }
}

impl<I, P, U, S> fmt::Debug for InMemoryClient<I, P, U, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = lock(&self.store);
        f.debug_struct("InMemoryClient")
            .field("resources", &store.resources.keys().collect::<Vec<_>>())
            .field("calls", &store.calls.len())
            .field("script", &store.script)
            .finish()
    }
}

impl<I, P, U, S> InMemoryClient<I, P, U, S>
where
    I: ResourceId,
    S: Clone,
{
    /// An empty remote.
    pub fn new<C, M>(on_create: C, on_update: M) -> Self
    where
        C: Fn(&I, P) -> S + Send + Sync + 'static,
        M: Fn(&I, &S, U) -> S + Send + Sync + 'static,
    {
        Self {
            store: Arc::new(Mutex::new(RemoteStore {
                resources: BTreeMap::new(),
                calls: Vec::new(),
                script: Script::default(),
            })),
            on_create: Arc::new(on_create),
            on_update: Arc::new(on_update),
        }
    }

    /// Put a resource in place as if created outside of Hemmer.
    pub fn seed(&self, id: &I, state: S) {
        lock(&self.store).resources.insert(id.to_id_string(), state);
    }

    /// Remove a resource as if deleted outside of Hemmer.
    pub fn remove(&self, id: &I) -> Option<S> {
        lock(&self.store).resources.remove(&id.to_id_string())
    }

    /// Current remote state of `id`.
    pub fn state(&self, id: &I) -> Option<S> {
        lock(&self.store).resources.get(&id.to_id_string()).cloned()
    }

    /// Whether `id` exists remotely.
    pub fn contains(&self, id: &I) -> bool {
        lock(&self.store).resources.contains_key(&id.to_id_string())
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.store).calls.clone()
    }

    /// Create, update and delete calls received, in order.
    pub fn mutating_calls(&self) -> Vec<RemoteCall> {
        lock(&self.store)
            .calls
            .iter()
            .filter(|call| call.is_mutating())
            .cloned()
            .collect()
    }

    /// Number of create, update and delete calls received.
    pub fn mutating_call_count(&self) -> usize {
        self.mutating_calls().len()
    }

    /// Operations report in progress `polls` times before finishing.
    pub fn set_pending_polls(&self, polls: u32) {
        lock(&self.store).script.pending_polls = polls;
    }

    /// Operations never finish.
    pub fn set_never_complete(&self) {
        lock(&self.store).script.never_complete = true;
    }

    /// Gets never answer.
    pub fn stall_gets(&self) {
        lock(&self.store).script.stalled_gets = true;
    }

    /// The next `count` gets fail with `Throttled`.
    pub fn throttle_gets(&self, count: u32) {
        lock(&self.store).script.throttled_gets = count;
    }

    /// The next get fails with `err`.
    pub fn fail_next_get(&self, err: ProviderError) {
        lock(&self.store).script.failing_gets.push(err);
    }

    /// The next submission of `operation` is rejected with `err`.
    pub fn reject_next(&self, operation: Operation, err: ProviderError) {
        lock(&self.store).script.rejections.push((operation, err));
    }

    /// The next `operation` is accepted, then ends in terminal failure with
    /// `payload`.
    pub fn fail_next(&self, operation: Operation, payload: impl Into<String>) {
        lock(&self.store)
            .script
            .failures
            .push((operation, payload.into()));
    }

    /// Record a get and work out its answer; `None` while gets are stalled.
    fn answer_get(&self, id: &I) -> Option<Result<Option<S>>> {
        let key = id.to_id_string();
        let mut store = lock(&self.store);
        store.calls.push(RemoteCall::Get(key.clone()));
        if store.script.stalled_gets {
            return None;
        }
        if store.script.throttled_gets > 0 {
            store.script.throttled_gets -= 1;
            return Some(Err(ProviderError::Throttled("HTTP 429: TooManyRequests".to_string())));
        }
        if !store.script.failing_gets.is_empty() {
            return Some(Err(store.script.failing_gets.remove(0)));
        }
        Some(Ok(store.resources.get(&key).cloned()))
    }
}

#[async_trait]
impl<I, P, U, S> RemoteClient for InMemoryClient<I, P, U, S>
where
    I: ResourceId,
    P: Send + Sync + 'static,
    U: Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    type Id = I;
    type CreatePayload = P;
    type UpdatePayload = U;
    type State = S;
    type Operation = FakeOperation;

    async fn get(&self, id: &I) -> Result<Option<S>> {
        match self.answer_get(id) {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }

    async fn create(&self, id: &I, payload: P) -> Result<FakeOperation> {
        let key = id.to_id_string();
        let mut store = lock(&self.store);
        store.calls.push(RemoteCall::Create(key.clone()));
        if let Some(err) = store.script.take_rejection(Operation::Create) {
            return Err(err);
        }
        let failure = store.script.take_failure(Operation::Create);
        if failure.is_none() {
            let state = (self.on_create)(id, payload);
            store.resources.insert(key, state);
        }
        Ok(store.script.operation(failure))
    }

    async fn update(&self, id: &I, payload: U) -> Result<FakeOperation> {
        let key = id.to_id_string();
        let mut store = lock(&self.store);
        store.calls.push(RemoteCall::Update(key.clone()));
        if let Some(err) = store.script.take_rejection(Operation::Update) {
            return Err(err);
        }
        let current = store
            .resources
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(key.clone()))?;
        let failure = store.script.take_failure(Operation::Update);
        if failure.is_none() {
            let updated = (self.on_update)(id, &current, payload);
            store.resources.insert(key, updated);
        }
        Ok(store.script.operation(failure))
    }

    async fn delete(&self, id: &I) -> Result<FakeOperation> {
        let key = id.to_id_string();
        let mut store = lock(&self.store);
        store.calls.push(RemoteCall::Delete(key.clone()));
        if let Some(err) = store.script.take_rejection(Operation::Delete) {
            return Err(err);
        }
        if !store.resources.contains_key(&key) {
            return Err(ProviderError::NotFound(key));
        }
        let failure = store.script.take_failure(Operation::Delete);
        if failure.is_none() {
            store.resources.remove(&key);
        }
        Ok(store.script.operation(failure))
    }
}

// =========================================================================
// Remotes for the bundled resource families
// =========================================================================

/// In-memory remote for [`ContainerRegistry`](crate::resources::ContainerRegistry).
pub type RegistryClient = InMemoryClient<RegistryId, RegistryPayload, RegistryUpdate, RemoteRegistry>;

/// In-memory remote for [`MySqlFirewallRule`](crate::resources::MySqlFirewallRule).
pub type FirewallRuleClient =
    InMemoryClient<FirewallRuleId, FirewallRulePayload, FirewallRulePayload, FirewallRulePayload>;

/// In-memory remote for [`AvsAuthorization`](crate::resources::AvsAuthorization).
pub type AuthorizationClient =
    InMemoryClient<AuthorizationId, AuthorizationPayload, AuthorizationPayload, RemoteAuthorization>;

/// A registry remote that fills in the login server on create and applies
/// PATCH bodies field by field.
pub fn registry_client() -> RegistryClient {
    InMemoryClient::new(registry_created, |_id: &RegistryId, current: &RemoteRegistry, update| {
        registry_patched(current, update)
    })
}

/// A firewall rule remote; create and update both store the body as sent.
pub fn firewall_rule_client() -> FirewallRuleClient {
    InMemoryClient::new(
        |_id: &FirewallRuleId, payload| payload,
        |_id: &FirewallRuleId, _current: &FirewallRulePayload, payload| payload,
    )
}

/// An authorization remote that issues a circuit ID and key on create.
pub fn authorization_client() -> AuthorizationClient {
    InMemoryClient::new(
        |id: &AuthorizationId, _payload| RemoteAuthorization {
            id: Some(id.to_id_string()),
            properties: Some(RemoteAuthorizationProperties {
                provisioning_state: Some("Succeeded".to_string()),
                express_route_authorization_id: Some(format!("{}/circuit", id.name)),
                express_route_authorization_key: Some("secret-key".to_string()),
            }),
        },
        |_id: &AuthorizationId, current: &RemoteAuthorization, _payload| current.clone(),
    )
}

/// The state the registry API reports right after a create.
pub(crate) fn registry_created(id: &RegistryId, payload: RegistryPayload) -> RemoteRegistry {
    RemoteRegistry {
        location: Some(payload.location),
        sku: Some(payload.sku),
        tags: payload.tags,
        properties: Some(RemoteRegistryProperties {
            login_server: Some(format!("{}.azurecr.io", id.name.to_lowercase())),
            admin_user_enabled: Some(payload.properties.admin_user_enabled.unwrap_or(false)),
            network_rule_set: Some(
                payload
                    .properties
                    .network_rule_set
                    .unwrap_or_else(NetworkRuleSet::allow_all),
            ),
            provisioning_state: Some("Succeeded".to_string()),
        }),
    }
}

/// Apply a PATCH body the way the registry API does: absent fields stay.
pub(crate) fn registry_patched(current: &RemoteRegistry, update: RegistryUpdate) -> RemoteRegistry {
    let mut next = current.clone();
    if let Some(sku) = update.sku {
        next.sku = Some(sku);
    }
    if let Some(tags) = update.tags {
        next.tags = Some(tags);
    }
    if let Some(changes) = update.properties {
        let props = next.properties.get_or_insert_with(Default::default);
        if let Some(admin) = changes.admin_user_enabled {
            props.admin_user_enabled = Some(admin);
        }
        if let Some(rules) = changes.network_rule_set {
            props.network_rule_set = Some(rules);
        }
    }
    next
}

// =========================================================================
// Provider tester
// =========================================================================

/// A test harness around a [`ProviderService`].
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Validate provider configuration, failing on error diagnostics.
    pub async fn validate_provider_config(&self, config: Value) -> std::result::Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> std::result::Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<()> {
        self.provider.stop().await
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> std::result::Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(&self, resource_type: &str, proposed_state: Value) -> Result<PlanResult> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(&self, resource_type: &str, prior_state: Value) -> Result<PlanResult> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read a resource; `Null` means it is gone.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Plan, create, then read. Returns the state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Plan, update, then read. Returns the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        if plan.requires_replace {
            return Err(ProviderError::RequiresReplacement(plan.replace_paths));
        }
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Plan a delete, delete, then check that read reports the resource gone.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state.clone()).await?;
        match self.read(resource_type, current_state).await? {
            Value::Null => Ok(()),
            state => Err(ProviderError::FailedPrecondition(format!(
                "resource still present after delete: {}",
                state
            ))),
        }
    }

    /// Create, update, then delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let proposed = merge_config(&created, updated_config);
        let updated = self
            .lifecycle_update(resource_type, created, proposed)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// `state` with the keys of `config` overwritten, so computed attributes
/// and the ID survive into the proposed state.
fn merge_config(state: &Value, config: Value) -> Value {
    match (state.clone(), config) {
        (Value::Object(mut merged), Value::Object(changes)) => {
            merged.extend(changes);
            Value::Object(merged)
        },
        (_, config) => config,
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation returned error diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "{} error diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  {}", diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> std::result::Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates without replacing.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan has no changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan forces replacement of `path`.
pub fn assert_plan_replaces(plan: &PlanResult, path: &str) {
    assert!(
        plan.requires_replace && plan.replace_paths.iter().any(|p| p == path),
        "Expected plan to replace because of '{}', replace paths: {:?}",
        path,
        plan.replace_paths
    );
}

/// Assert that a plan updates in place.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it replaces because of {:?}",
        plan.replace_paths
    );
}

/// Assert that a plan changes `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that some error diagnostic's summary contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let matching = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));
    assert!(
        matching,
        "Expected an error containing '{}'. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
