//! Scenario: interrupts are idempotent per interrupt id

use crate::helpers::TreeBuilder;
use planrun::core::{PlanStatus, Status};
use planrun::execution::InterruptManager;
use planrun::store::ExecutionStore;
use uuid::Uuid;

/// Re-delivering the same pause produces the same final state and no
/// extra effect entries.
#[tokio::test]
async fn test_pause_twice_same_state() {
    let fx = TreeBuilder::new().await;
    let stage = fx.node("stage", None, Status::Running).await;
    let step = fx.node("step", Some(&stage), Status::Running).await;

    let manager = InterruptManager::new(fx.store.clone());
    let interrupt_id = Uuid::new_v4();

    let first = manager.register_pause(step.id, interrupt_id).await.unwrap();
    let second = manager.register_pause(step.id, interrupt_id).await.unwrap();
    assert_eq!(first, second);

    for node in [&step, &stage] {
        let after = fx.store.load_node(node.id).await.unwrap();
        assert_eq!(after.status, Status::Paused);
        assert_eq!(after.interrupt_history.len(), 1);
    }
    assert_eq!(
        fx.store.load_plan(fx.plan.id).await.unwrap().status,
        PlanStatus::Paused
    );
}

#[tokio::test]
async fn test_resume_twice_same_state() {
    let fx = TreeBuilder::new().await;
    let stage = fx.node("stage", None, Status::Paused).await;
    let step = fx.node("step", Some(&stage), Status::Paused).await;

    let manager = InterruptManager::new(fx.store.clone());
    let interrupt_id = Uuid::new_v4();

    manager.resume_plan(fx.plan.id, interrupt_id).await.unwrap();
    let second = manager.resume_plan(fx.plan.id, interrupt_id).await.unwrap();

    // second application committed nothing new
    assert!(second.is_empty());

    for node in [&step, &stage] {
        let after = fx.store.load_node(node.id).await.unwrap();
        assert_eq!(after.status, Status::Running);
        assert_eq!(after.interrupt_history.len(), 1);
    }
}

#[tokio::test]
async fn test_abort_twice_same_state() {
    let fx = TreeBuilder::new().await;
    let stage = fx.node("stage", None, Status::Running).await;
    let step = fx.node("step", Some(&stage), Status::Running).await;

    let manager = InterruptManager::new(fx.store.clone());
    let interrupt_id = Uuid::new_v4();

    manager.abort_node(stage.id, interrupt_id).await.unwrap();
    let second = manager.abort_node(stage.id, interrupt_id).await.unwrap();
    assert!(second.is_empty());

    for node in [&step, &stage] {
        let after = fx.store.load_node(node.id).await.unwrap();
        assert_eq!(after.status, Status::Aborted);
        assert_eq!(after.interrupt_history.len(), 1);
    }
    assert_eq!(
        fx.store.load_plan(fx.plan.id).await.unwrap().status,
        PlanStatus::Aborted
    );
}

/// Distinct interrupts each leave their own audit record.
#[tokio::test]
async fn test_distinct_interrupts_accumulate_history() {
    let fx = TreeBuilder::new().await;
    let stage = fx.node("stage", None, Status::Running).await;
    let step = fx.node("step", Some(&stage), Status::Running).await;

    let manager = InterruptManager::new(fx.store.clone());

    manager.register_pause(step.id, Uuid::new_v4()).await.unwrap();
    manager
        .resume_plan(fx.plan.id, Uuid::new_v4())
        .await
        .unwrap();
    manager.register_pause(step.id, Uuid::new_v4()).await.unwrap();

    let after = fx.store.load_node(step.id).await.unwrap();
    assert_eq!(after.status, Status::Paused);
    // pause, resume, pause
    assert_eq!(after.interrupt_history.len(), 3);
}
