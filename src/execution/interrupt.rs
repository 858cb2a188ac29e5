//! Interrupt application API: pause, resume, abort

use crate::core::{InterruptEffect, InterruptKind, PlanStatus, Status};
use crate::execution::propagation::{AppliedEffect, PropagationError, StatusPropagator};
use crate::store::ExecutionStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Applies external interrupts to nodes and plans, delegating the tree
/// walks to the propagator. Every operation is idempotent per interrupt
/// id: at-least-once delivery re-applies to a no-op.
pub struct InterruptManager {
    store: Arc<dyn ExecutionStore>,
    propagator: StatusPropagator,
}

impl InterruptManager {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        let propagator = StatusPropagator::new(store.clone());
        Self { store, propagator }
    }

    /// Pause a node and propagate upward. Returns whether the whole plan
    /// reached a paused state.
    pub async fn register_pause(
        &self,
        node_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<bool, PropagationError> {
        let node = self.load(node_id).await?;

        if node.has_effect(interrupt_id, InterruptKind::PauseAll) {
            info!(node = %node_id, "pause interrupt re-delivered, already applied");
        } else if !node.status.is_terminal() {
            self.store
                .transition_node(
                    node_id,
                    Status::Paused,
                    Some(InterruptEffect::new(interrupt_id, InterruptKind::PauseAll)),
                )
                .await
                .map_err(|source| PropagationError {
                    committed: Vec::new(),
                    source,
                })?;
            info!(node = %node_id, "paused node");
        }

        self.handle_node_paused(node.plan_execution_id, node_id, interrupt_id)
            .await
    }

    /// Propagation entry point used once a node is already paused (the
    /// status-update path). Pauses the plan record when propagation
    /// reports that the last flowing root stopped.
    pub async fn handle_node_paused(
        &self,
        plan_execution_id: Uuid,
        node_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<bool, PropagationError> {
        let plan_paused = self
            .propagator
            .propagate_pause(node_id, interrupt_id)
            .await?;

        if plan_paused {
            self.store
                .update_plan_status(plan_execution_id, PlanStatus::Paused, None)
                .await
                .map_err(|source| PropagationError {
                    committed: Vec::new(),
                    source,
                })?;
            info!(plan = %plan_execution_id, "all branches paused, plan is paused");
        }

        Ok(plan_paused)
    }

    /// Resume every paused branch of the plan and force the plan record
    /// back to `RUNNING`.
    pub async fn resume_plan(
        &self,
        plan_execution_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<Vec<AppliedEffect>, PropagationError> {
        self.propagator
            .propagate_resume(plan_execution_id, interrupt_id)
            .await
    }

    /// Abort a node and its flowing descendants. When no root of the plan
    /// remains non-terminal afterwards, the plan record is finalized as
    /// `ABORTED`.
    pub async fn abort_node(
        &self,
        node_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<Vec<AppliedEffect>, PropagationError> {
        let node = self.load(node_id).await?;
        let committed = self.propagator.propagate_abort(node_id, interrupt_id).await?;

        let roots = self
            .store
            .roots_of_plan(node.plan_execution_id)
            .await
            .map_err(|source| PropagationError {
                committed: committed.clone(),
                source,
            })?;

        if roots.iter().all(|r| r.status.is_terminal()) {
            self.store
                .update_plan_status(
                    node.plan_execution_id,
                    PlanStatus::Aborted,
                    Some(Utc::now()),
                )
                .await
                .map_err(|source| PropagationError {
                    committed: committed.clone(),
                    source,
                })?;
            info!(plan = %node.plan_execution_id, "plan aborted");
        }

        Ok(committed)
    }

    async fn load(
        &self,
        node_id: Uuid,
    ) -> Result<crate::core::NodeExecution, PropagationError> {
        self.store
            .load_node(node_id)
            .await
            .map_err(|source| PropagationError {
                committed: Vec::new(),
                source,
            })
    }
}
