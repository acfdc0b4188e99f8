//! Property tests for resource ID parsing and formatting.

use hemmer_reconcile::resources::{
    AuthorizationId, FirewallRuleId, MySqlServerId, PrivateCloudId, RegistryId,
};
use hemmer_reconcile::{ErrorKind, ResourceGroupId, ResourceId};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9._-]{0,20}"
}

fn subscription() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

fn assert_round_trip<I: ResourceId>(id: &I) -> Result<(), TestCaseError> {
    let raw = id.to_id_string();
    let parsed = I::parse(&raw).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(&parsed, id);
    prop_assert_eq!(parsed.to_id_string(), raw);
    Ok(())
}

proptest! {
    #[test]
    fn registry_ids_round_trip(sub in subscription(), rg in segment(), name in segment()) {
        let id = RegistryId::new(sub, rg, name).unwrap();
        assert_round_trip(&id)?;
        prop_assert_eq!(id.parent().to_id_string(), ResourceGroupId::new(&id.subscription_id, &id.resource_group).unwrap().to_id_string());
    }

    #[test]
    fn authorization_ids_round_trip(
        sub in subscription(),
        rg in segment(),
        cloud in segment(),
        name in segment(),
    ) {
        let cloud = PrivateCloudId::new(sub, rg, cloud).unwrap();
        let id = AuthorizationId::new(&cloud, name).unwrap();
        assert_round_trip(&cloud)?;
        assert_round_trip(&id)?;
        prop_assert_eq!(id.parent(), cloud);
    }

    #[test]
    fn firewall_rule_ids_round_trip(
        sub in subscription(),
        rg in segment(),
        server in segment(),
        name in segment(),
    ) {
        let server = MySqlServerId::new(sub, rg, server).unwrap();
        let id = FirewallRuleId::new(&server, name).unwrap();
        assert_round_trip(&id)?;
        prop_assert!(id.to_id_string().starts_with(&server.to_id_string()));
    }

    #[test]
    fn wrong_literal_casing_is_malformed(sub in subscription(), rg in segment(), name in segment()) {
        let raw = RegistryId::new(sub, rg, name).unwrap().to_id_string();
        let shouted = raw.replace("/resourceGroups/", "/resourcegroups/");
        let err = RegistryId::parse(&shouted).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::MalformedId);
    }

    #[test]
    fn truncated_ids_are_malformed(
        sub in subscription(),
        rg in segment(),
        server in segment(),
        name in segment(),
        keep in 1usize..10,
    ) {
        let server = MySqlServerId::new(sub, rg, server).unwrap();
        let raw = FirewallRuleId::new(&server, name).unwrap().to_id_string();
        let truncated: Vec<&str> = raw.split('/').take(keep).collect();
        let err = FirewallRuleId::parse(&truncated.join("/")).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::MalformedId);
    }

    #[test]
    fn parse_never_panics(raw in "\\PC{0,200}") {
        let _ = RegistryId::parse(&raw);
        let _ = AuthorizationId::parse(&raw);
    }
}

#[test]
fn test_ids_of_other_families_are_rejected() {
    let server = MySqlServerId::new("sub1", "rg1", "db1").unwrap();
    let err = RegistryId::parse(&server.to_id_string()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedId);

    let rule = FirewallRuleId::new(&server, "office").unwrap();
    let err = MySqlServerId::parse(&rule.to_id_string()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedId);
}
