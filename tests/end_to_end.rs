#![cfg(all(feature = "memory-store", feature = "memory-cache"))]

use futures::executor::block_on;
use rs_mqtt_auth::{
    Access, AclRequest, AclRule, Credential, MemoryCache, MemoryStore, Options, Orchestrator,
    OrchestratorBuilder, Pbkdf2Hasher, Policy,
};
use std::time::Duration;

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_user(
        "test",
        Pbkdf2Hasher::new().iterations(1_000).hash(b"testpw"),
        false,
    );
    store.add_user(
        "admin",
        Pbkdf2Hasher::new().iterations(10).hash(b"adminpw"),
        true,
    );
    store
}

fn orchestrator(store: &MemoryStore) -> Orchestrator<MemoryCache> {
    OrchestratorBuilder::new()
        .backend(store.clone().into_backend())
        .cache(MemoryCache::new(1_024).with_ttl(Duration::from_secs(60)))
        .build()
        .unwrap()
}

fn acl(
    orchestrator: &Orchestrator<MemoryCache>,
    username: &str,
    topic: &str,
    access: Access,
) -> bool {
    let request = AclRequest::new(username, topic, "test_client", access);
    block_on(orchestrator.check_acl(&request)).is_allowed()
}

#[test]
fn password_and_read_only_rule_scenario() {
    let store = seeded_store();
    let orchestrator = orchestrator(&store);

    assert!(block_on(orchestrator.authenticate(&Credential::new("test", "testpw"))).is_allowed());
    assert!(
        !block_on(orchestrator.authenticate(&Credential::new("test", "wrong_password")))
            .is_allowed()
    );
    assert!(
        !block_on(orchestrator.authenticate(&Credential::new("nobody", "testpw"))).is_allowed()
    );

    store.add_rule(AclRule::from_row(Some("test".to_string()), "test/topic/1", 1).unwrap());

    assert!(acl(&orchestrator, "test", "test/topic/1", Access::Read));
    assert!(!acl(&orchestrator, "test", "test/topic/2", Access::Read));
    assert!(!acl(&orchestrator, "test", "test/topic/1", Access::Write));
}

#[test]
fn strict_rules_do_not_grant_wildcard_subscriptions() {
    let store = seeded_store();
    store.add_rule(AclRule::owned("test", "test/topic/1", Access::Read));
    let orchestrator = orchestrator(&store);

    assert!(!acl(&orchestrator, "test", "test/topic/+", Access::Read));
    assert!(!acl(&orchestrator, "test", "test/#", Access::Read));
}

#[test]
fn wildcard_and_placeholder_rules() {
    let store = seeded_store();
    store.add_rule(AclRule::owned("test", "test/topic/+", Access::Read));
    store.add_rule(AclRule::owned("test", "test/sensors/#", Access::ReadWrite));
    store.add_rule(AclRule::shared("users/%u/#", Access::ReadWrite));
    store.add_rule(AclRule::shared("clients/%c", Access::Write));
    let orchestrator = orchestrator(&store);

    assert!(acl(&orchestrator, "test", "test/topic/3", Access::Read));
    assert!(!acl(&orchestrator, "test", "test/topic/3/extra", Access::Read));
    assert!(acl(&orchestrator, "test", "test/sensors", Access::Write));
    assert!(acl(&orchestrator, "test", "test/sensors/a/b", Access::Read));
    assert!(acl(&orchestrator, "test", "users/test/inbox", Access::Write));
    assert!(!acl(&orchestrator, "test", "users/other/inbox", Access::Read));
    assert!(acl(&orchestrator, "test", "clients/test_client", Access::Write));
    assert!(!acl(&orchestrator, "test", "clients/test_client", Access::Read));
}

#[test]
fn wildcard_client_ids_do_not_widen_placeholder_rules() {
    let store = seeded_store();
    store.add_rule(AclRule::shared("clients/%c/#", Access::ReadWrite));
    let orchestrator = orchestrator(&store);

    for client_id in ["+", "#"] {
        let request = AclRequest::new("test", "clients/victim/inbox", client_id, Access::Read);
        assert!(!block_on(orchestrator.check_acl(&request)).is_allowed());
    }
    let own = AclRequest::new("test", "clients/dev-1/inbox", "dev-1", Access::Read);
    assert!(block_on(orchestrator.check_acl(&own)).is_allowed());
}

#[test]
fn superuser_bypass_can_be_disabled() {
    let store = seeded_store();
    let orchestrator = orchestrator(&store);

    assert!(block_on(orchestrator.is_superuser("admin")).is_allowed());
    assert!(!block_on(orchestrator.is_superuser("test")).is_allowed());
    assert!(acl(&orchestrator, "admin", "anything/at/all", Access::Write));

    let opts = Options::new()
        .with("check_superuser", "false")
        .with("policy", "all");
    let strict = OrchestratorBuilder::new()
        .apply_options(&opts)
        .unwrap()
        .backend(store.clone().into_backend())
        .build()
        .unwrap();
    let request = AclRequest::new("admin", "anything/at/all", "id", Access::Write);
    assert!(!block_on(strict.check_acl(&request)).is_allowed());
}

#[test]
fn cached_decisions_survive_until_the_user_is_invalidated() {
    let store = seeded_store();
    store.add_rule(AclRule::owned("test", "test/topic/1", Access::Read));
    let orchestrator = orchestrator(&store);

    assert!(acl(&orchestrator, "test", "test/topic/1", Access::Read));
    store.clear_rules();
    assert!(acl(&orchestrator, "test", "test/topic/1", Access::Read));

    block_on(orchestrator.invalidate_user("test"));
    assert!(!acl(&orchestrator, "test", "test/topic/1", Access::Read));
}

#[test]
fn any_policy_falls_through_to_later_backends() {
    let empty = MemoryStore::new();
    let store = seeded_store();
    store.add_rule(AclRule::owned("test", "test/topic/1", Access::Read));
    let orchestrator = OrchestratorBuilder::new()
        .policy(Policy::Any)
        .backend(empty.into_backend())
        .backend(store.clone().into_backend())
        .build()
        .unwrap();

    let decision = block_on(orchestrator.authenticate(&Credential::new("test", "testpw")));
    assert!(decision.is_allowed());
    assert_eq!(decision.backend(), Some("memory"));
}

#[test]
fn shutdown_denies_every_later_check() {
    let store = seeded_store();
    let orchestrator = orchestrator(&store);
    assert!(block_on(orchestrator.authenticate(&Credential::new("test", "testpw"))).is_allowed());

    block_on(orchestrator.shutdown());
    block_on(orchestrator.shutdown());

    assert!(orchestrator.is_shut_down());
    assert!(!block_on(orchestrator.authenticate(&Credential::new("test", "testpw"))).is_allowed());
    assert!(!block_on(orchestrator.is_superuser("admin")).is_allowed());
}
