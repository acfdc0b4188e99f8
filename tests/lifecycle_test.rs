//! Lifecycle controller behaviour against an in-memory remote.

use std::sync::Arc;
use std::time::Duration;

use hemmer_reconcile::config::TimeoutOverrides;
use hemmer_reconcile::descriptor::Operation;
use hemmer_reconcile::resources::container_registry::{
    NetworkRuleSetBlock, RegistryConfig, RemoteRegistry,
};
use hemmer_reconcile::resources::mysql_firewall_rule::{FirewallRuleConfig, FirewallRulePayload};
use hemmer_reconcile::resources::{
    ContainerRegistry, FirewallRuleId, MySqlFirewallRule, MySqlServerId, RegistryId,
};
use hemmer_reconcile::testing::{
    firewall_rule_client as rule_client, registry_client, FakeClock, RemoteCall,
};
use hemmer_reconcile::{
    ChangeSet, DesiredConfig, ErrorKind, LifecycleController, OperationContext, ProviderError,
    ReadOutcome, ResourceContext, ResourceId,
};

fn ctx(clock: &FakeClock) -> OperationContext {
    OperationContext::new()
        .with_clock(Arc::new(clock.clone()))
        .with_subscription("sub1")
}

fn registry_config() -> RegistryConfig {
    RegistryConfig {
        name: "acrprod01".into(),
        resource_group_name: "rg1".into(),
        location: "westeurope".into(),
        ..RegistryConfig::default()
    }
}

fn desired<T>(config: T) -> DesiredConfig<T> {
    DesiredConfig::new(config, ["name"])
}

fn registry_id() -> RegistryId {
    RegistryId::new("sub1", "rg1", "acrprod01").unwrap()
}

fn rule_config(start: &str, end: &str) -> FirewallRuleConfig {
    FirewallRuleConfig {
        name: "office".into(),
        resource_group_name: "rg1".into(),
        server_name: "db1".into(),
        start_ip_address: start.into(),
        end_ip_address: end.into(),
    }
}

fn rule_id() -> FirewallRuleId {
    FirewallRuleId::new(&MySqlServerId::new("sub1", "rg1", "db1").unwrap(), "office").unwrap()
}

#[tokio::test]
async fn test_create_then_read_returns_flattened_state() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.set_pending_polls(3);
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    let created = controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap();
    assert_eq!(created.id, registry_id());
    assert_eq!(created.state.login_server, "acrprod01.azurecr.io");
    assert!(clock.elapsed() >= Duration::from_secs(45));

    let first = controller.read(&ctx(&clock), &created.id).await.unwrap();
    let second = controller.read(&ctx(&clock), &created.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, ReadOutcome::Present(created.state));
}

#[tokio::test]
async fn test_create_rejects_existing_without_mutating() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.seed(&registry_id(), RemoteRegistry::default());
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    let err = controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.context().map(|c| c.name.as_str()), Some("acrprod01"));
    assert_eq!(remote.mutating_call_count(), 0);
}

#[tokio::test]
async fn test_upsert_family_overwrites_existing() {
    let clock = FakeClock::new();
    let remote = rule_client();
    remote.seed(
        &rule_id(),
        FirewallRulePayload::default(),
    );
    let controller = LifecycleController::<MySqlFirewallRule, _>::new(remote.clone());

    let created = controller
        .create(&ctx(&clock), &desired(rule_config("10.0.0.1", "10.0.0.9")))
        .await
        .unwrap();
    assert_eq!(created.state, rule_config("10.0.0.1", "10.0.0.9"));
    assert_eq!(
        remote.calls(),
        vec![
            RemoteCall::Create(rule_id().to_id_string()),
            RemoteCall::Get(rule_id().to_id_string()),
        ]
    );
}

#[tokio::test]
async fn test_missing_subscription_is_configuration_error() {
    let controller = LifecycleController::<ContainerRegistry, _>::new(registry_client());
    let ctx = OperationContext::new().with_clock(Arc::new(FakeClock::new()));

    let err = controller.create(&ctx, &desired(registry_config())).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(
        err.context(),
        Some(&ResourceContext::new("container registry", "acrprod01", "rg1"))
    );
}

#[tokio::test]
async fn test_terminal_create_failure_surfaces_payload() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.fail_next(Operation::Create, "QuotaExceeded: registry limit reached");
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    let err = controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteOperationFailed);
    assert!(err.to_string().contains("QuotaExceeded"));
    assert!(!remote.contains(&registry_id()));
}

#[tokio::test]
async fn test_read_absent_is_not_an_error() {
    let clock = FakeClock::new();
    let controller = LifecycleController::<ContainerRegistry, _>::new(registry_client());

    let outcome = controller.read(&ctx(&clock), &registry_id()).await.unwrap();
    assert!(outcome.is_absent());
}

#[tokio::test]
async fn test_read_retries_throttled_gets() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.seed(&registry_id(), RemoteRegistry::default());
    remote.throttle_gets(2);
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    let outcome = controller.read(&ctx(&clock), &registry_id()).await.unwrap();
    assert!(!outcome.is_absent());
    assert_eq!(remote.calls().len(), 3);
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
}

#[tokio::test]
async fn test_read_gives_up_on_a_hung_get() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.seed(&registry_id(), RemoteRegistry::default());
    remote.stall_gets();
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    let err = controller.read(&ctx(&clock), &registry_id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.context().map(|c| c.name.as_str()), Some("acrprod01"));
    assert_eq!(clock.elapsed(), Duration::from_secs(300));
    assert_eq!(remote.calls().len(), 1);
}

#[tokio::test]
async fn test_existence_check_uses_read_budget_override() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.stall_gets();
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());
    let ctx = ctx(&clock).with_timeouts(TimeoutOverrides {
        read_secs: Some(45),
        ..TimeoutOverrides::default()
    });

    let err = controller
        .create(&ctx, &desired(registry_config()))
        .await
        .unwrap_err();
    let ProviderError::Resource { source, .. } = err else {
        panic!("expected an error carrying resource context");
    };
    match *source {
        ProviderError::Timeout { elapsed, last_status } => {
            assert_eq!(elapsed, Duration::from_secs(45));
            assert_eq!(last_status, "reading remote state");
        },
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(remote.mutating_call_count(), 0);
}

#[tokio::test]
async fn test_read_does_not_retry_permission_errors() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.fail_next_get(ProviderError::PermissionDenied("HTTP 403".into()));
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    let err = controller.read(&ctx(&clock), &registry_id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(remote.calls().len(), 1);
}

#[tokio::test]
async fn test_empty_changeset_makes_no_mutating_call() {
    let clock = FakeClock::new();
    let remote = registry_client();
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());
    let created = controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap();

    let state = controller
        .update(&ctx(&clock), &created.id, &desired(created.state.clone()), &ChangeSet::empty())
        .await
        .unwrap();
    assert_eq!(state, created.state);
    assert_eq!(remote.mutating_call_count(), 1);
}

#[tokio::test]
async fn test_delta_update_sends_only_changes() {
    let clock = FakeClock::new();
    let remote = registry_client();
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());
    let created = controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap();

    let wanted = RegistryConfig {
        sku: "Premium".into(),
        network_rule_set: vec![NetworkRuleSetBlock {
            default_action: "Deny".into(),
            ip_rules: vec!["203.0.113.0/24".into()],
        }],
        ..created.state.clone()
    };
    let changes: ChangeSet = ["sku", "network_rule_set"].into_iter().collect();
    let state = controller
        .update(&ctx(&clock), &created.id, &desired(wanted.clone()), &changes)
        .await
        .unwrap();

    assert_eq!(state, wanted);
    assert_eq!(
        remote.mutating_calls().last(),
        Some(&RemoteCall::Update(registry_id().to_id_string()))
    );
}

#[tokio::test]
async fn test_update_of_force_new_field_requires_replacement() {
    let clock = FakeClock::new();
    let remote = registry_client();
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());
    let created = controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap();

    let moved = RegistryConfig {
        location: "northeurope".into(),
        ..created.state.clone()
    };
    let changes: ChangeSet = ["location", "sku"].into_iter().collect();
    let err = controller
        .update(&ctx(&clock), &created.id, &desired(moved), &changes)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RequiresReplacement);
    assert!(err.to_string().contains("location"));
    assert_eq!(remote.mutating_call_count(), 1);
}

#[tokio::test]
async fn test_full_payload_update_of_deleted_resource_is_not_found() {
    let clock = FakeClock::new();
    let remote = rule_client();
    let controller = LifecycleController::<MySqlFirewallRule, _>::new(remote.clone());

    let changes: ChangeSet = ["end_ip_address"].into_iter().collect();
    let err = controller
        .update(&ctx(&clock), &rule_id(), &desired(rule_config("10.0.0.1", "10.0.0.20")), &changes)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(remote.mutating_call_count(), 0);
}

#[tokio::test]
async fn test_full_payload_update_keeps_remote_fields() {
    let clock = FakeClock::new();
    let remote = rule_client();
    let controller = LifecycleController::<MySqlFirewallRule, _>::new(remote.clone());
    controller
        .create(&ctx(&clock), &desired(rule_config("10.0.0.1", "10.0.0.9")))
        .await
        .unwrap();

    let changes: ChangeSet = ["end_ip_address"].into_iter().collect();
    let state = controller
        .update(&ctx(&clock), &rule_id(), &desired(rule_config("10.0.0.5", "10.0.0.20")), &changes)
        .await
        .unwrap();

    // Only the changed field is taken from configuration.
    assert_eq!(state, rule_config("10.0.0.1", "10.0.0.20"));
}

#[tokio::test]
async fn test_delete_then_read_is_absent() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.set_pending_polls(2);
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());
    let created = controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap();

    controller.delete(&ctx(&clock), &created.id).await.unwrap();
    assert!(controller.read(&ctx(&clock), &created.id).await.unwrap().is_absent());
}

#[tokio::test]
async fn test_delete_of_missing_resource_succeeds() {
    let clock = FakeClock::new();
    let remote = registry_client();
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    controller.delete(&ctx(&clock), &registry_id()).await.unwrap();
    controller.delete(&ctx(&clock), &registry_id()).await.unwrap();
    assert_eq!(remote.mutating_call_count(), 2);
}

#[tokio::test]
async fn test_rejected_delete_is_reported() {
    let clock = FakeClock::new();
    let remote = registry_client();
    remote.seed(&registry_id(), RemoteRegistry::default());
    remote.reject_next(
        Operation::Delete,
        ProviderError::Conflict("another operation is in progress".into()),
    );
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());

    let err = controller.delete(&ctx(&clock), &registry_id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(remote.contains(&registry_id()));
}

#[tokio::test]
async fn test_import_existing_and_missing() {
    let clock = FakeClock::new();
    let remote = registry_client();
    let controller = LifecycleController::<ContainerRegistry, _>::new(remote.clone());
    controller
        .create(&ctx(&clock), &desired(registry_config()))
        .await
        .unwrap();

    let raw = registry_id().to_id_string();
    let imported = controller.import(&ctx(&clock), &raw).await.unwrap();
    assert_eq!(imported.id, registry_id());
    assert_eq!(imported.state.name, "acrprod01");

    let missing = raw.replace("acrprod01", "acrother01");
    let err = controller.import(&ctx(&clock), &missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let malformed = raw.replace("/registries/", "/Registries/");
    let err = controller.import(&ctx(&clock), &malformed).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedId);
}
