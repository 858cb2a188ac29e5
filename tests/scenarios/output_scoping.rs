//! Scenario: sweeping-output scoping, uniqueness, and expressions

use planrun::core::{Ambiance, Level, LevelKind};
use planrun::store::InMemoryStore;
use planrun::sweep::SweepingOutputService;
use planrun::EngineError;
use std::sync::Arc;
use uuid::Uuid;

fn level(setup_id: &str, kind: LevelKind) -> Level {
    Level::new(Uuid::new_v4(), setup_id, kind)
}

fn service() -> SweepingOutputService {
    SweepingOutputService::with_default_evaluator(Arc::new(InMemoryStore::new()))
}

/// Scoping matrix: same name published at depth 1 and depth 3; resolvers
/// at different positions see different values.
#[tokio::test]
async fn test_depth_specific_resolution() {
    let svc = service();
    let plan_id = Uuid::new_v4();

    let stage = Ambiance::new(vec![level("stage", LevelKind::Stage)]);
    let group = stage.child(level("group", LevelKind::StepGroup));
    let publisher = group.child(level("publisher", LevelKind::Step));

    svc.consume(plan_id, &publisher, "result", serde_json::json!("stage-wide"), 1)
        .await
        .unwrap();
    svc.consume(plan_id, &publisher, "result", serde_json::json!("step-local"), 3)
        .await
        .unwrap();

    // at the publishing step: the deepest scope wins
    let got = svc.resolve(plan_id, &publisher, "result").await.unwrap();
    assert_eq!(got, serde_json::json!("step-local"));

    // a sibling inside the same stage, outside the publisher's own scope
    let sibling = stage.child(level("sibling", LevelKind::Step));
    let got = svc.resolve(plan_id, &sibling, "result").await.unwrap();
    assert_eq!(got, serde_json::json!("stage-wide"));

    // a node in a different stage sees neither
    let outsider = Ambiance::new(vec![level("other", LevelKind::Stage)]);
    let err = svc.resolve(plan_id, &outsider, "result").await.unwrap_err();
    assert!(matches!(err, EngineError::OutputNotFound(_)));
}

/// Publishing the same name twice at the same scope path fails the second
/// call and leaves the first value intact.
#[tokio::test]
async fn test_same_scope_duplicate_rejected() {
    let svc = service();
    let plan_id = Uuid::new_v4();
    let ambiance = Ambiance::new(vec![level("stage", LevelKind::Stage)]);

    svc.consume(plan_id, &ambiance, "artifact", serde_json::json!("keep"), 1)
        .await
        .unwrap();
    let err = svc
        .consume(plan_id, &ambiance, "artifact", serde_json::json!("drop"), 1)
        .await
        .unwrap_err();

    assert!(err.is_duplicate_output());
    assert_eq!(
        svc.resolve(plan_id, &ambiance, "artifact").await.unwrap(),
        serde_json::json!("keep")
    );
}

/// The same name at different scope paths is not a conflict.
#[tokio::test]
async fn test_same_name_different_scopes_coexist() {
    let svc = service();
    let plan_id = Uuid::new_v4();

    let stage_a = Ambiance::new(vec![level("a", LevelKind::Stage)]);
    let stage_b = Ambiance::new(vec![level("b", LevelKind::Stage)]);

    svc.consume(plan_id, &stage_a, "report", serde_json::json!("a"), 1)
        .await
        .unwrap();
    svc.consume(plan_id, &stage_b, "report", serde_json::json!("b"), 1)
        .await
        .unwrap();

    assert_eq!(
        svc.resolve(plan_id, &stage_a, "report").await.unwrap(),
        serde_json::json!("a")
    );
    assert_eq!(
        svc.resolve(plan_id, &stage_b, "report").await.unwrap(),
        serde_json::json!("b")
    );
}

/// Expressions resolve embedded references through the evaluator; a plain
/// miss keeps failing until someone publishes (no waiting inside the
/// service).
#[tokio::test]
async fn test_expression_and_late_publish() {
    let svc = service();
    let plan_id = Uuid::new_v4();
    let ambiance = Ambiance::new(vec![level("stage", LevelKind::Stage)]);

    // nothing published yet: immediate not-found, no blocking
    let err = svc.resolve(plan_id, &ambiance, "version").await.unwrap_err();
    assert!(matches!(err, EngineError::OutputNotFound(_)));

    svc.consume(plan_id, &ambiance, "version", serde_json::json!("2.4.1"), 1)
        .await
        .unwrap();

    // re-invoking after the publish succeeds
    assert_eq!(
        svc.resolve(plan_id, &ambiance, "version").await.unwrap(),
        serde_json::json!("2.4.1")
    );

    // expression splices the value into surrounding text
    let rendered = svc
        .resolve(plan_id, &ambiance, "release-<+sweep.version>")
        .await
        .unwrap();
    assert_eq!(rendered, serde_json::json!("release-2.4.1"));

    // an expression with no sweeping-output reference resolves to nothing
    let miss = svc
        .resolve_optional(plan_id, &ambiance, "<+plan.name>")
        .await
        .unwrap();
    assert_eq!(miss, None);
}
