//! Built-in status-update handlers
//!
//! The engine fires the handler registered for a node's new status tag on
//! every transition; handlers are where a node-level change touches
//! ancestor nodes and the plan record.

use crate::core::{PlanStatus, Status};
use crate::execution::contract::{StatusUpdateEvent, StatusUpdateHandler};
use crate::execution::interrupt::InterruptManager;
use crate::error::EngineError;
use crate::store::ExecutionStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Runs pause propagation whenever a node lands in `PAUSED`.
pub struct PausedStatusHandler {
    manager: Arc<InterruptManager>,
}

impl PausedStatusHandler {
    pub fn new(manager: Arc<InterruptManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl StatusUpdateHandler for PausedStatusHandler {
    async fn on_update(&self, event: &StatusUpdateEvent) -> Result<(), EngineError> {
        let Some(interrupt_id) = event.interrupt_id else {
            warn!(node = %event.node_id, "paused without an interrupt id, skipping propagation");
            return Ok(());
        };

        self.manager
            .handle_node_paused(event.plan_execution_id, event.node_id, interrupt_id)
            .await
            .map_err(|e| EngineError::Store(e.source))?;
        Ok(())
    }
}

/// Finalizes the plan record once every root has reached a terminal
/// status. Registered under each terminal status tag.
pub struct TerminalStatusHandler {
    store: Arc<dyn ExecutionStore>,
}

impl TerminalStatusHandler {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    fn plan_status_from_roots(statuses: &[Status]) -> Option<PlanStatus> {
        if !statuses.iter().all(|s| s.is_terminal()) {
            return None;
        }
        if statuses
            .iter()
            .any(|s| matches!(s, Status::Failed | Status::Expired))
        {
            Some(PlanStatus::Failed)
        } else if statuses.iter().any(|s| *s == Status::Aborted) {
            Some(PlanStatus::Aborted)
        } else {
            Some(PlanStatus::Succeeded)
        }
    }
}

#[async_trait]
impl StatusUpdateHandler for TerminalStatusHandler {
    async fn on_update(&self, event: &StatusUpdateEvent) -> Result<(), EngineError> {
        let roots = self.store.roots_of_plan(event.plan_execution_id).await?;
        let statuses: Vec<Status> = roots.iter().map(|r| r.status).collect();

        let Some(plan_status) = Self::plan_status_from_roots(&statuses) else {
            debug!(
                plan = %event.plan_execution_id,
                "roots still in progress, plan stays as-is"
            );
            return Ok(());
        };

        let plan = self.store.load_plan(event.plan_execution_id).await?;
        if plan.status.is_terminal() {
            return Ok(());
        }

        self.store
            .update_plan_status(event.plan_execution_id, plan_status, Some(Utc::now()))
            .await?;
        debug!(
            plan = %event.plan_execution_id,
            status = plan_status.as_str(),
            "plan finalized"
        );
        Ok(())
    }
}

/// Convenience used by tests and external pausers: build the event the
/// engine would fire for a transition.
pub fn status_event(
    plan_execution_id: Uuid,
    node_id: Uuid,
    status: Status,
    interrupt_id: Option<Uuid>,
) -> StatusUpdateEvent {
    StatusUpdateEvent {
        plan_execution_id,
        node_id,
        status,
        interrupt_id,
    }
}
