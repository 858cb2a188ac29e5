//! Pause, resume, and abort propagation over the node tree
//!
//! Walks follow the `parent_id` back-reference (or the children index)
//! iteratively instead of recursing, so plan depth never threatens the
//! stack. Every step of a walk commits one document; there is no rollback,
//! only resumption with the same interrupt id.

use crate::core::{InterruptEffect, InterruptKind, NodeExecution, Status};
use crate::store::{ExecutionStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// One effect committed during a propagation walk
#[derive(Debug, Clone)]
pub struct AppliedEffect {
    pub node_id: Uuid,
    pub effect: InterruptEffect,
}

/// A propagation walk hit a persistence error. The effects already
/// committed are preserved; re-invoking with the same interrupt id resumes
/// the walk where it stopped.
#[derive(Debug, Error)]
#[error("status propagation halted after {} committed effect(s)", .committed.len())]
pub struct PropagationError {
    pub committed: Vec<AppliedEffect>,
    #[source]
    pub source: StoreError,
}

/// Implements the status-update walks of the execution state machine.
pub struct StatusPropagator {
    store: Arc<dyn ExecutionStore>,
}

impl StatusPropagator {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// Pause propagation: called after `node_id` paused.
    ///
    /// Walks the parent chain upward. A parent is paused (with a
    /// `PAUSE_ALL` effect) only when none of its children are still
    /// flowing; a single flowing sibling stops the walk because other
    /// branches are still making progress.
    ///
    /// Returns whether the whole plan reached a paused state, which is
    /// true only when the walk reached a node with no parent. The caller
    /// is responsible for pausing the plan record in that case.
    pub async fn propagate_pause(
        &self,
        node_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<bool, PropagationError> {
        let mut committed: Vec<AppliedEffect> = Vec::new();
        let mut current_id = node_id;

        loop {
            let node = self.load(current_id, &committed).await?;

            let Some(parent_id) = node.parent_id else {
                info!(node = %current_id, "pause reached a root node, plan is paused");
                return Ok(true);
            };

            let siblings = self.children(parent_id, &committed).await?;
            if siblings.iter().any(|s| s.status.is_flowing()) {
                debug!(
                    parent = %parent_id,
                    "pause stops: a sibling branch is still flowing"
                );
                return Ok(false);
            }

            let parent = self.load(parent_id, &committed).await?;
            if parent.has_effect(interrupt_id, InterruptKind::PauseAll) {
                // interrupt re-delivered; the transition already happened
                debug!(parent = %parent_id, "pause already applied, walking on");
            } else {
                let effect = InterruptEffect::new(interrupt_id, InterruptKind::PauseAll);
                self.transition(parent_id, Status::Paused, effect.clone(), &mut committed)
                    .await?;
                info!(parent = %parent_id, "paused parent: no child branch flowing");
            }

            current_id = parent_id;
        }
    }

    /// Resume propagation: the mirror walk of pause.
    ///
    /// Every paused root of the plan is walked downward; each paused node
    /// on the way is transitioned back to `RUNNING` with a `RESUME`
    /// effect. Afterwards the plan record is forced to `RUNNING`
    /// regardless of how many branches were paused.
    pub async fn propagate_resume(
        &self,
        plan_execution_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<Vec<AppliedEffect>, PropagationError> {
        let mut committed: Vec<AppliedEffect> = Vec::new();

        let roots = self.roots(plan_execution_id, &committed).await?;
        // A re-invoked resume also descends through roots it already
        // transitioned, so a walk halted mid-tree picks up its leftovers.
        let mut stack: Vec<Uuid> = roots
            .iter()
            .filter(|n| {
                n.status == Status::Paused || n.has_effect(interrupt_id, InterruptKind::Resume)
            })
            .map(|n| n.id)
            .collect();

        while let Some(id) = stack.pop() {
            let node = self.load(id, &committed).await?;

            if node.status == Status::Paused {
                if node.has_effect(interrupt_id, InterruptKind::Resume) {
                    // effect recorded but a later pause re-paused the
                    // node; this resume does not own it anymore
                    continue;
                }
                let effect = InterruptEffect::new(interrupt_id, InterruptKind::Resume);
                self.transition(id, Status::Running, effect.clone(), &mut committed)
                    .await?;
                info!(node = %id, "resumed node");
            } else if !node.has_effect(interrupt_id, InterruptKind::Resume) {
                // not paused and never touched by this resume: leave the
                // subtree alone
                continue;
            }

            for child in self.children(id, &committed).await? {
                if child.status == Status::Paused
                    || child.has_effect(interrupt_id, InterruptKind::Resume)
                {
                    stack.push(child.id);
                }
            }
        }

        self.store
            .update_plan_status(plan_execution_id, crate::core::PlanStatus::Running, None)
            .await
            .map_err(|source| PropagationError {
                committed: committed.clone(),
                source,
            })?;
        info!(plan = %plan_execution_id, "plan resumed");

        Ok(committed)
    }

    /// Abort `node_id` and its non-terminal descendants, appending an
    /// `ABORT` effect per node. Abort flows through the same effect
    /// mechanism as pause and resume, not a separate channel.
    pub async fn propagate_abort(
        &self,
        node_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<Vec<AppliedEffect>, PropagationError> {
        let mut committed: Vec<AppliedEffect> = Vec::new();
        let mut stack = vec![node_id];

        while let Some(id) = stack.pop() {
            let node = self.load(id, &committed).await?;
            if node.status.is_terminal() {
                continue;
            }

            if !node.has_effect(interrupt_id, InterruptKind::Abort) {
                let effect = InterruptEffect::new(interrupt_id, InterruptKind::Abort);
                self.transition(id, Status::Aborted, effect.clone(), &mut committed)
                    .await?;
                info!(node = %id, "aborted node");
            }

            for child in self.children(id, &committed).await? {
                if !child.status.is_terminal() {
                    stack.push(child.id);
                }
            }
        }

        Ok(committed)
    }

    async fn load(
        &self,
        id: Uuid,
        committed: &[AppliedEffect],
    ) -> Result<NodeExecution, PropagationError> {
        self.store
            .load_node(id)
            .await
            .map_err(|source| PropagationError {
                committed: committed.to_vec(),
                source,
            })
    }

    async fn children(
        &self,
        parent_id: Uuid,
        committed: &[AppliedEffect],
    ) -> Result<Vec<NodeExecution>, PropagationError> {
        self.store
            .children_of(parent_id)
            .await
            .map_err(|source| PropagationError {
                committed: committed.to_vec(),
                source,
            })
    }

    async fn roots(
        &self,
        plan_execution_id: Uuid,
        committed: &[AppliedEffect],
    ) -> Result<Vec<NodeExecution>, PropagationError> {
        self.store
            .roots_of_plan(plan_execution_id)
            .await
            .map_err(|source| PropagationError {
                committed: committed.to_vec(),
                source,
            })
    }

    async fn transition(
        &self,
        id: Uuid,
        status: Status,
        effect: InterruptEffect,
        committed: &mut Vec<AppliedEffect>,
    ) -> Result<(), PropagationError> {
        self.store
            .transition_node(id, status, Some(effect.clone()))
            .await
            .map_err(|source| PropagationError {
                committed: committed.clone(),
                source,
            })?;
        committed.push(AppliedEffect {
            node_id: id,
            effect,
        });
        Ok(())
    }
}
