//! Persistence layer for plan and node execution records
//!
//! The engine assumes a durable document store with atomic single-document
//! writes and secondary-index queries, nothing more. `ExecutionStore` is
//! that contract; `InMemoryStore` serves tests and ephemeral runs, and the
//! SQLite store behind the `sqlite` feature provides durability.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutionStore;

use crate::core::{
    InterruptEffect, NodeExecution, PlanExecution, PlanStatus, Status, SweepingOutputInstance,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(plan, name, scope path)` uniqueness constraint rejected an
    /// insert. Expected under concurrent publishes.
    #[error("duplicate output '{name}' at scope '{scope}'")]
    DuplicateOutput { name: String, scope: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The durable store contract the engine requires:
/// - atomic single-document insert/update (`transition_node` commits a
///   status change and an optional effect append in one write),
/// - a uniqueness constraint on `(plan_execution_id, name, level_index)`,
/// - indexed queries by `parent_id`, by status, and by plan + name.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_plan(&self, plan: &PlanExecution) -> StoreResult<()>;

    async fn load_plan(&self, id: Uuid) -> StoreResult<PlanExecution>;

    async fn update_plan_status(
        &self,
        id: Uuid,
        status: PlanStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// All plan executions, most recent first.
    async fn list_plans(&self) -> StoreResult<Vec<PlanExecution>>;

    async fn insert_node(&self, node: &NodeExecution) -> StoreResult<()>;

    async fn load_node(&self, id: Uuid) -> StoreResult<NodeExecution>;

    /// Full-document save of a node the caller currently owns.
    async fn update_node(&self, node: &NodeExecution) -> StoreResult<()>;

    /// Atomically set a node's status and append an optional interrupt
    /// effect. The node's current status is deliberately not a
    /// precondition: re-applying the same transition is a no-op in effect,
    /// which is what makes interrupt delivery at-least-once safe.
    async fn transition_node(
        &self,
        id: Uuid,
        status: Status,
        effect: Option<InterruptEffect>,
    ) -> StoreResult<NodeExecution>;

    /// All nodes sharing `parent_id` (indexed query).
    async fn children_of(&self, parent_id: Uuid) -> StoreResult<Vec<NodeExecution>>;

    /// Root-level nodes (`parent_id == None`) of a plan.
    async fn roots_of_plan(&self, plan_id: Uuid) -> StoreResult<Vec<NodeExecution>>;

    /// Nodes of a plan currently in `status` (indexed query).
    async fn nodes_by_status(&self, plan_id: Uuid, status: Status)
        -> StoreResult<Vec<NodeExecution>>;

    /// All nodes of a plan.
    async fn nodes_of_plan(&self, plan_id: Uuid) -> StoreResult<Vec<NodeExecution>>;

    /// Insert a sweeping output. The uniqueness constraint on
    /// `(plan_execution_id, name, level_index)` is the sole concurrency
    /// guard: exactly one of two racing publishers succeeds.
    async fn insert_output(&self, record: &SweepingOutputInstance) -> StoreResult<()>;

    /// All outputs of a plan with the given name (indexed query).
    async fn outputs_named(
        &self,
        plan_id: Uuid,
        name: &str,
    ) -> StoreResult<Vec<SweepingOutputInstance>>;

    /// Delete a plan execution together with its nodes and outputs.
    async fn prune_plan(&self, plan_id: Uuid) -> StoreResult<()>;
}

/// In-memory store (for testing or ephemeral use)
pub struct InMemoryStore {
    inner: tokio::sync::RwLock<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    plans: HashMap<Uuid, PlanExecution>,
    nodes: HashMap<Uuid, NodeExecution>,
    outputs: HashMap<Uuid, SweepingOutputInstance>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: tokio::sync::RwLock::new(InMemoryState::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn insert_plan(&self, plan: &PlanExecution) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        state.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn load_plan(&self, id: Uuid) -> StoreResult<PlanExecution> {
        let state = self.inner.read().await;
        state
            .plans
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "plan", id })
    }

    async fn update_plan_status(
        &self,
        id: Uuid,
        status: PlanStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let plan = state
            .plans
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "plan", id })?;
        plan.status = status;
        if ended_at.is_some() {
            plan.ended_at = ended_at;
        }
        Ok(())
    }

    async fn list_plans(&self) -> StoreResult<Vec<PlanExecution>> {
        let state = self.inner.read().await;
        let mut plans: Vec<_> = state.plans.values().cloned().collect();
        plans.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(plans)
    }

    async fn insert_node(&self, node: &NodeExecution) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        state.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn load_node(&self, id: Uuid) -> StoreResult<NodeExecution> {
        let state = self.inner.read().await;
        state
            .nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "node", id })
    }

    async fn update_node(&self, node: &NodeExecution) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        if !state.nodes.contains_key(&node.id) {
            return Err(StoreError::NotFound {
                kind: "node",
                id: node.id,
            });
        }
        state.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn transition_node(
        &self,
        id: Uuid,
        status: Status,
        effect: Option<InterruptEffect>,
    ) -> StoreResult<NodeExecution> {
        let mut state = self.inner.write().await;
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "node", id })?;
        node.status = status;
        if status.is_terminal() && node.ended_at.is_none() {
            node.ended_at = Some(Utc::now());
        }
        if let Some(effect) = effect {
            node.interrupt_history.push(effect);
        }
        Ok(node.clone())
    }

    async fn children_of(&self, parent_id: Uuid) -> StoreResult<Vec<NodeExecution>> {
        let state = self.inner.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn roots_of_plan(&self, plan_id: Uuid) -> StoreResult<Vec<NodeExecution>> {
        let state = self.inner.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.plan_execution_id == plan_id && n.parent_id.is_none())
            .cloned()
            .collect())
    }

    async fn nodes_by_status(
        &self,
        plan_id: Uuid,
        status: Status,
    ) -> StoreResult<Vec<NodeExecution>> {
        let state = self.inner.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.plan_execution_id == plan_id && n.status == status)
            .cloned()
            .collect())
    }

    async fn nodes_of_plan(&self, plan_id: Uuid) -> StoreResult<Vec<NodeExecution>> {
        let state = self.inner.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.plan_execution_id == plan_id)
            .cloned()
            .collect())
    }

    async fn insert_output(&self, record: &SweepingOutputInstance) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let collision = state.outputs.values().any(|o| {
            o.plan_execution_id == record.plan_execution_id
                && o.name == record.name
                && o.level_index == record.level_index
        });
        if collision {
            return Err(StoreError::DuplicateOutput {
                name: record.name.clone(),
                scope: record.level_index.clone(),
            });
        }
        state.outputs.insert(record.id, record.clone());
        Ok(())
    }

    async fn outputs_named(
        &self,
        plan_id: Uuid,
        name: &str,
    ) -> StoreResult<Vec<SweepingOutputInstance>> {
        let state = self.inner.read().await;
        Ok(state
            .outputs
            .values()
            .filter(|o| o.plan_execution_id == plan_id && o.name == name)
            .cloned()
            .collect())
    }

    async fn prune_plan(&self, plan_id: Uuid) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        state.plans.remove(&plan_id);
        state.nodes.retain(|_, n| n.plan_execution_id != plan_id);
        state.outputs.retain(|_, o| o.plan_execution_id != plan_id);
        Ok(())
    }
}
