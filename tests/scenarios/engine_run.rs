//! Scenario: full engine runs over enrolled layouts

use crate::helpers::*;
use planrun::core::{PlanStatus, Status};
use planrun::store::ExecutionStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_parallel_stages_succeed() {
    let harness = harness();
    let yaml = r#"
name: "two-stages"
stages:
  - id: "build"
    steps:
      - id: "compile"
        type: "echo"
        with:
          message: "compiling"
  - id: "package"
    steps:
      - id: "bundle"
        type: "echo"
        with:
          message: "bundling"
"#;

    let plan = run_layout(&harness, yaml).await;

    assert_eq!(plan.status, PlanStatus::Succeeded);
    assert!(plan.ended_at.is_some());
    for setup_id in ["build", "package", "compile", "bundle"] {
        assert_eq!(
            node_status(&harness, plan.id, setup_id).await,
            Status::Succeeded
        );
    }
}

#[tokio::test]
async fn test_flaky_step_retries_until_success() {
    let harness = harness_with_steps(vec![("flaky", Arc::new(FlakyStep::new(2)))]);
    let yaml = r#"
name: "retry"
stages:
  - id: "work"
    steps:
      - id: "unstable"
        type: "flaky"
        max_retries: 2
"#;

    let plan = run_layout(&harness, yaml).await;
    assert_eq!(plan.status, PlanStatus::Succeeded);

    let nodes = harness.store.nodes_of_plan(plan.id).await.unwrap();
    let unstable = nodes.iter().find(|n| n.setup_id == "unstable").unwrap();
    assert_eq!(unstable.status, Status::Succeeded);
    assert_eq!(unstable.attempts, 3);
}

#[tokio::test]
async fn test_failure_sticks_after_retries_exhausted() {
    let harness = harness_with_steps(vec![("boom", Arc::new(BoomStep))]);
    let yaml = r#"
name: "failing"
stages:
  - id: "work"
    steps:
      - id: "broken"
        type: "boom"
        max_retries: 1
"#;

    let plan = run_layout(&harness, yaml).await;

    assert_eq!(plan.status, PlanStatus::Failed);
    assert_eq!(
        node_status(&harness, plan.id, "broken").await,
        Status::Failed
    );
    assert_eq!(node_status(&harness, plan.id, "work").await, Status::Failed);

    let nodes = harness.store.nodes_of_plan(plan.id).await.unwrap();
    let broken = nodes.iter().find(|n| n.setup_id == "broken").unwrap();
    // initial attempt plus one retry
    assert_eq!(broken.attempts, 2);
}

#[tokio::test]
async fn test_gate_pauses_plan_and_resume_completes_it() {
    let (gate, open) = GateStep::new();
    let harness = harness_with_steps(vec![("gate", Arc::new(gate))]);
    let yaml = r#"
name: "gated"
stages:
  - id: "approval"
    steps:
      - id: "hold"
        type: "gate"
"#;

    let plan = run_layout(&harness, yaml).await;

    assert_eq!(plan.status, PlanStatus::Paused);
    assert_eq!(node_status(&harness, plan.id, "hold").await, Status::Paused);
    assert_eq!(
        node_status(&harness, plan.id, "approval").await,
        Status::Paused
    );

    open.store(true, Ordering::SeqCst);
    let plan = harness
        .engine
        .resume(plan.id, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(plan.status, PlanStatus::Succeeded);
    assert_eq!(
        node_status(&harness, plan.id, "hold").await,
        Status::Succeeded
    );
}

/// A pause next to a branch that later finishes must still climb: once
/// the flowing sibling completes, nothing under the stage flows and the
/// stage (and plan) pause.
#[tokio::test]
async fn test_pause_climbs_after_sibling_completes() {
    let (gate, open) = GateStep::new();
    let harness = harness_with_steps(vec![("gate", Arc::new(gate))]);
    let yaml = r#"
name: "mixed"
stages:
  - id: "work"
    steps:
      - id: "hold"
        type: "gate"
      - id: "quick"
        type: "echo"
        with:
          message: "done"
"#;

    let plan = run_layout(&harness, yaml).await;

    assert_eq!(plan.status, PlanStatus::Paused);
    assert_eq!(
        node_status(&harness, plan.id, "quick").await,
        Status::Succeeded
    );
    assert_eq!(node_status(&harness, plan.id, "hold").await, Status::Paused);
    assert_eq!(node_status(&harness, plan.id, "work").await, Status::Paused);

    open.store(true, Ordering::SeqCst);
    let plan = harness
        .engine
        .resume(plan.id, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Succeeded);
}

#[tokio::test]
async fn test_chain_runs_in_order_and_breaks_on_failure() {
    let (recorder, order) = RecorderStep::new();
    let recorder = Arc::new(recorder);
    let harness = harness_with_steps(vec![
        ("rec", recorder.clone() as Arc<dyn planrun::StepRunner>),
        ("boom", Arc::new(BoomStep)),
    ]);
    let yaml = r#"
name: "chained"
stages:
  - id: "deploy"
    chain: true
    steps:
      - id: "first"
        type: "rec"
      - id: "second"
        type: "rec"
      - id: "breaks"
        type: "boom"
      - id: "unreached"
        type: "rec"
"#;

    let plan = run_layout(&harness, yaml).await;

    assert_eq!(plan.status, PlanStatus::Failed);
    assert_eq!(
        order.lock().unwrap().as_slice(),
        ["first".to_string(), "second".to_string()]
    );
    assert_eq!(
        node_status(&harness, plan.id, "breaks").await,
        Status::Failed
    );
    assert_eq!(
        node_status(&harness, plan.id, "unreached").await,
        Status::Aborted
    );
    assert_eq!(node_status(&harness, plan.id, "deploy").await, Status::Failed);
}

#[tokio::test]
async fn test_outputs_flow_between_chained_steps() {
    let harness = harness_with_steps(vec![
        (
            "ship",
            Arc::new(PublishStep {
                name: "image",
                value: serde_json::json!("registry/app:9"),
                levels_to_keep: 1,
            }) as Arc<dyn planrun::StepRunner>,
        ),
        (
            "check",
            Arc::new(ExpectStep {
                reference: "image",
                expected: serde_json::json!("registry/app:9"),
            }),
        ),
    ]);
    let yaml = r#"
name: "dataflow"
stages:
  - id: "release"
    chain: true
    steps:
      - id: "publish-image"
        type: "ship"
      - id: "verify-image"
        type: "check"
"#;

    let plan = run_layout(&harness, yaml).await;
    assert_eq!(plan.status, PlanStatus::Succeeded);
}

#[tokio::test]
async fn test_expression_reference_between_group_and_sibling() {
    let harness = harness_with_steps(vec![
        (
            "ship",
            Arc::new(PublishStep {
                name: "tag",
                value: serde_json::json!("v1.4.0"),
                // plan-wide scope
                levels_to_keep: 0,
            }) as Arc<dyn planrun::StepRunner>,
        ),
        (
            "check",
            Arc::new(ExpectStep {
                reference: "release is <+sweep.tag>",
                expected: serde_json::json!("release is v1.4.0"),
            }),
        ),
    ]);
    let yaml = r#"
name: "expressions"
stages:
  - id: "pipeline"
    chain: true
    groups:
      - id: "produce"
        steps:
          - id: "tagger"
            type: "ship"
      - id: "consume"
        steps:
          - id: "reader"
            type: "check"
"#;

    let plan = run_layout(&harness, yaml).await;
    assert_eq!(plan.status, PlanStatus::Succeeded);
    assert_eq!(
        node_status(&harness, plan.id, "reader").await,
        Status::Succeeded
    );
}

#[tokio::test]
async fn test_abort_mid_plan_finalizes_as_aborted() {
    let (gate, _open) = GateStep::new();
    let harness = harness_with_steps(vec![("gate", Arc::new(gate))]);
    let yaml = r#"
name: "abortable"
stages:
  - id: "stuck"
    steps:
      - id: "hold"
        type: "gate"
"#;

    let plan = run_layout(&harness, yaml).await;
    assert_eq!(plan.status, PlanStatus::Paused);

    let nodes = harness.store.nodes_of_plan(plan.id).await.unwrap();
    let stage = nodes.iter().find(|n| n.setup_id == "stuck").unwrap();

    harness
        .engine
        .abort_node(stage.id, Uuid::new_v4())
        .await
        .unwrap();

    let plan = harness.store.load_plan(plan.id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Aborted);
    assert_eq!(node_status(&harness, plan.id, "hold").await, Status::Aborted);
}

#[tokio::test]
async fn test_step_timeout_expires_node() {
    let harness = harness();
    let yaml = r#"
name: "slow"
stages:
  - id: "work"
    steps:
      - id: "sleepy"
        type: "wait"
        timeout_secs: 1
        with:
          secs: 30
"#;

    let plan = run_layout(&harness, yaml).await;

    assert_eq!(plan.status, PlanStatus::Failed);
    assert_eq!(
        node_status(&harness, plan.id, "sleepy").await,
        Status::Expired
    );
}

#[tokio::test]
async fn test_unknown_step_type_fails_enrollment() {
    let harness = harness();
    let layout = planrun::PlanLayout::from_yaml(
        r#"
name: "bad"
stages:
  - id: "work"
    steps:
      - id: "mystery"
        type: "no-such-step"
"#,
    )
    .unwrap();

    let err = harness.engine.enroll(&layout).await.unwrap_err();
    assert!(matches!(err, planrun::EngineError::Registry(_)));
}
