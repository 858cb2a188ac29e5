//! Scenario: pause propagation across the node tree

use crate::helpers::TreeBuilder;
use planrun::core::{InterruptKind, PlanStatus, Status};
use planrun::execution::InterruptManager;
use planrun::store::ExecutionStore;
use uuid::Uuid;

/// Pausing one branch leaves the parent running while a sibling flows.
#[tokio::test]
async fn test_parent_unchanged_while_sibling_flows() {
    let fx = TreeBuilder::new().await;
    let a = fx.node("a", None, Status::Running).await;
    let b = fx.node("b", Some(&a), Status::Running).await;
    let _c = fx.node("c", Some(&a), Status::Running).await;

    let manager = InterruptManager::new(fx.store.clone());
    let plan_paused = manager
        .register_pause(b.id, Uuid::new_v4())
        .await
        .unwrap();

    assert!(!plan_paused);
    assert_eq!(fx.status_of(&a).await, Status::Running);
    assert_eq!(fx.status_of(&b).await, Status::Paused);
    assert_eq!(
        fx.store.load_plan(fx.plan.id).await.unwrap().status,
        PlanStatus::Pending
    );
}

/// Once the last flowing sibling pauses, the parent pauses and the pause
/// climbs to the plan.
#[tokio::test]
async fn test_last_sibling_pause_reaches_plan() {
    let fx = TreeBuilder::new().await;
    let a = fx.node("a", None, Status::Running).await;
    let b = fx.node("b", Some(&a), Status::Running).await;
    let c = fx.node("c", Some(&a), Status::Running).await;

    let manager = InterruptManager::new(fx.store.clone());

    let i1 = Uuid::new_v4();
    assert!(!manager.register_pause(b.id, i1).await.unwrap());

    let i2 = Uuid::new_v4();
    assert!(manager.register_pause(c.id, i2).await.unwrap());

    let a_after = fx.store.load_node(a.id).await.unwrap();
    assert_eq!(a_after.status, Status::Paused);
    // one effect on the parent, from the interrupt that triggered the cascade
    assert_eq!(a_after.interrupt_history.len(), 1);
    assert!(a_after.has_effect(i2, InterruptKind::PauseAll));

    assert_eq!(
        fx.store.load_plan(fx.plan.id).await.unwrap().status,
        PlanStatus::Paused
    );
}

/// Terminal siblings do not count as flowing: a branch whose other
/// branches already finished pauses its parent.
#[tokio::test]
async fn test_terminal_sibling_does_not_block_pause() {
    let fx = TreeBuilder::new().await;
    let a = fx.node("a", None, Status::Running).await;
    let b = fx.node("b", Some(&a), Status::Running).await;
    let _done = fx.node("done", Some(&a), Status::Succeeded).await;
    let _failed = fx.node("failed", Some(&a), Status::Failed).await;

    let manager = InterruptManager::new(fx.store.clone());
    let plan_paused = manager
        .register_pause(b.id, Uuid::new_v4())
        .await
        .unwrap();

    assert!(plan_paused);
    assert_eq!(fx.status_of(&a).await, Status::Paused);
}

/// A three-deep chain pauses level by level, each ancestor recording its
/// own effect.
#[tokio::test]
async fn test_pause_cascades_through_depth() {
    let fx = TreeBuilder::new().await;
    let stage = fx.node("stage", None, Status::Running).await;
    let group = fx.node("group", Some(&stage), Status::Running).await;
    let step = fx.node("step", Some(&group), Status::Running).await;

    let interrupt_id = Uuid::new_v4();
    let manager = InterruptManager::new(fx.store.clone());
    let plan_paused = manager.register_pause(step.id, interrupt_id).await.unwrap();

    assert!(plan_paused);
    for node in [&step, &group, &stage] {
        let after = fx.store.load_node(node.id).await.unwrap();
        assert_eq!(after.status, Status::Paused);
        assert!(after.has_effect(interrupt_id, InterruptKind::PauseAll));
        assert_eq!(after.interrupt_history.len(), 1);
    }
}
