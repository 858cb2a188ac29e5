//! Scenario: registry population closure

use crate::helpers::{BoomStep, TestStepRegistrar};
use planrun::builtin::BuiltinRegistrar;
use planrun::registry::{Registrar, RegistryError, RegistrySet};
use planrun::store::{ExecutionStore, InMemoryStore};
use std::sync::Arc;

fn store() -> Arc<dyn ExecutionStore> {
    Arc::new(InMemoryStore::new())
}

/// After startup, every contributed tag resolves and nothing else does.
#[test]
fn test_contributed_tags_resolve_and_only_those() {
    let registrars: Vec<Arc<dyn Registrar>> = vec![
        Arc::new(BuiltinRegistrar::new(store())),
        Arc::new(TestStepRegistrar {
            steps: vec![("boom", Arc::new(BoomStep))],
        }),
    ];
    let registries = RegistrySet::populate(&registrars).unwrap();

    for tag in ["echo", "wait", "boom"] {
        assert!(registries.steps.obtain(tag).is_ok(), "step '{}' missing", tag);
        assert!(
            registries.facilitators.obtain(tag).is_ok(),
            "facilitator '{}' missing",
            tag
        );
        assert!(
            registries.advisers.obtain(tag).is_ok(),
            "adviser '{}' missing",
            tag
        );
    }

    let err = registries.steps.obtain("shell").err().unwrap();
    assert!(matches!(err, RegistryError::UnknownTag { tag, .. } if tag == "shell"));

    let err = registries.resolvers.obtain("secrets").err().unwrap();
    assert!(matches!(err, RegistryError::UnknownTag { .. }));
}

/// Two registrars contributing the same tag abort population at startup.
#[test]
fn test_cross_registrar_duplicate_is_fatal() {
    let registrars: Vec<Arc<dyn Registrar>> = vec![
        Arc::new(BuiltinRegistrar::new(store())),
        Arc::new(TestStepRegistrar {
            steps: vec![("echo", Arc::new(BoomStep))],
        }),
    ];

    let err = RegistrySet::populate(&registrars).err().unwrap();
    assert!(matches!(err, RegistryError::DuplicateTag { tag, .. } if tag == "echo"));
}

/// Population is all-or-nothing per tag, but kinds are independent: the
/// same tag may appear once per registry kind.
#[test]
fn test_same_tag_across_kinds_is_fine() {
    let registries = RegistrySet::populate(&[
        Arc::new(BuiltinRegistrar::new(store())) as Arc<dyn Registrar>
    ])
    .unwrap();

    // "echo" exists as a step, a facilitator, and an adviser binding
    assert!(registries.steps.obtain("echo").is_ok());
    assert!(registries.facilitators.obtain("echo").is_ok());
    assert!(registries.advisers.obtain("echo").is_ok());
}
