//! The plan execution engine - enrollment, dispatch, and interrupt API

use crate::core::layout::{GroupLayout, PlanLayout, StageLayout, StepLayout};
use crate::core::{
    Ambiance, InterruptEffect, InterruptKind, Level, LevelKind, NodeExecution, PlanExecution,
    PlanStatus, Status,
};
use crate::error::EngineError;
use crate::execution::contract::{
    Advice, AdvisingEvent, FacilitationMode, StatusUpdateEvent, StepContext, StepOutcome,
};
use crate::execution::interrupt::InterruptManager;
use crate::execution::propagation::AppliedEffect;
use crate::registry::Registries;
use crate::store::ExecutionStore;
use crate::sweep::SweepingOutputService;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Node type tags for container nodes, dispatched through the facilitator
/// registry like any step type.
pub const STAGE_TYPE: &str = "stage";
pub const STAGE_CHAIN_TYPE: &str = "stage-chain";
pub const GROUP_TYPE: &str = "group";
pub const GROUP_CHAIN_TYPE: &str = "group-chain";

/// The execution engine: owns the store, the frozen registries, the
/// sweeping-output service, and the interrupt machinery.
///
/// The engine is a cheap handle (every field is shared); cloning one hands
/// a worker task its own reference. Work is dispatched as independent
/// tasks per branch; there is no global lock over a plan's node tree. All
/// cross-branch coordination happens through single-document status
/// transitions.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn ExecutionStore>,
    registries: Arc<Registries>,
    sweep: Arc<SweepingOutputService>,
    interrupts: Arc<InterruptManager>,
}

impl Engine {
    pub fn new(store: Arc<dyn ExecutionStore>, registries: Arc<Registries>) -> Self {
        let sweep = Arc::new(SweepingOutputService::with_default_evaluator(store.clone()));
        let interrupts = Arc::new(InterruptManager::new(store.clone()));
        Self {
            store,
            registries,
            sweep,
            interrupts,
        }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub fn sweep(&self) -> &Arc<SweepingOutputService> {
        &self.sweep
    }

    pub fn interrupts(&self) -> &Arc<InterruptManager> {
        &self.interrupts
    }

    /// Enroll a plan layout: create the plan execution and one node
    /// execution per layout node, each with its immutable ambiance. All
    /// nodes start `QUEUED`; nothing runs yet.
    pub async fn enroll(&self, layout: &PlanLayout) -> Result<PlanExecution, EngineError> {
        layout.validate().map_err(|e| EngineError::InvalidPlan {
            plan: layout.name.clone(),
            reason: e.to_string(),
        })?;

        let plan = PlanExecution::new(&layout.name);
        self.store.insert_plan(&plan).await?;

        for (position, stage) in layout.stages.iter().enumerate() {
            self.enroll_stage(&plan, layout, stage, position).await?;
        }

        info!(plan = %plan.id, name = %plan.plan_name, "plan enrolled");
        Ok(plan)
    }

    async fn enroll_stage(
        &self,
        plan: &PlanExecution,
        layout: &PlanLayout,
        stage: &StageLayout,
        position: usize,
    ) -> Result<(), EngineError> {
        let stage_id = Uuid::new_v4();
        let ambiance = Ambiance::new(vec![Level::new(stage_id, &stage.id, LevelKind::Stage)]);
        let step_type = if stage.chain {
            STAGE_CHAIN_TYPE
        } else {
            STAGE_TYPE
        };
        let stage_node = blank_node(
            stage_id,
            plan.id,
            None,
            position,
            &stage.id,
            stage.name.as_deref().unwrap_or(&stage.id),
            step_type,
            ambiance,
            serde_json::Value::Null,
            None,
            0,
        );
        self.store.insert_node(&stage_node).await?;

        let mut child_position = 0;
        for group in &stage.groups {
            self.enroll_group(plan, layout, &stage_node, group, child_position)
                .await?;
            child_position += 1;
        }
        for step in &stage.steps {
            self.enroll_step(plan, layout, &stage_node, step, child_position)
                .await?;
            child_position += 1;
        }

        Ok(())
    }

    async fn enroll_group(
        &self,
        plan: &PlanExecution,
        layout: &PlanLayout,
        parent: &NodeExecution,
        group: &GroupLayout,
        position: usize,
    ) -> Result<(), EngineError> {
        let group_id = Uuid::new_v4();
        let ambiance = parent
            .ambiance
            .child(Level::new(group_id, &group.id, LevelKind::StepGroup));
        let step_type = if group.chain {
            GROUP_CHAIN_TYPE
        } else {
            GROUP_TYPE
        };
        let group_node = blank_node(
            group_id,
            plan.id,
            Some(parent.id),
            position,
            &group.id,
            group.name.as_deref().unwrap_or(&group.id),
            step_type,
            ambiance,
            serde_json::Value::Null,
            None,
            0,
        );
        self.store.insert_node(&group_node).await?;

        for (step_position, step) in group.steps.iter().enumerate() {
            self.enroll_step(plan, layout, &group_node, step, step_position)
                .await?;
        }

        Ok(())
    }

    async fn enroll_step(
        &self,
        plan: &PlanExecution,
        layout: &PlanLayout,
        parent: &NodeExecution,
        step: &StepLayout,
        position: usize,
    ) -> Result<(), EngineError> {
        // fail enrollment, not dispatch, on an unknown step type
        self.registries.steps.obtain(&step.step_type)?;

        let step_id = Uuid::new_v4();
        let ambiance = parent
            .ambiance
            .child(Level::new(step_id, &step.id, LevelKind::Step));
        let node = blank_node(
            step_id,
            plan.id,
            Some(parent.id),
            position,
            &step.id,
            step.name.as_deref().unwrap_or(&step.id),
            &step.step_type,
            ambiance,
            step.with.clone(),
            step.timeout_secs.or(layout.default_timeout_secs),
            step.max_retries.or(layout.max_retries).unwrap_or(0),
        );
        self.store.insert_node(&node).await?;
        Ok(())
    }

    /// Drive a plan until no node can still progress: every branch ends
    /// terminal, or every remaining branch is paused. Re-invoking after a
    /// resume picks up where the paused branches stopped.
    pub async fn run(&self, plan_execution_id: Uuid) -> Result<PlanExecution, EngineError> {
        let plan = self.store.load_plan(plan_execution_id).await?;
        if plan.status.is_terminal() {
            return Ok(plan);
        }
        if plan.status == PlanStatus::Paused {
            // a paused plan only moves again through a resume interrupt
            return Ok(plan);
        }

        self.store
            .update_plan_status(plan_execution_id, PlanStatus::Running, None)
            .await?;
        info!(plan = %plan_execution_id, name = %plan.plan_name, "plan running");

        let mut roots = self.store.roots_of_plan(plan_execution_id).await?;
        roots.sort_by_key(|n| n.position);

        let mut handles = Vec::with_capacity(roots.len());
        for root in roots {
            let engine = self.clone();
            handles.push(tokio::spawn(async move { engine.run_node(root.id).await }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| EngineError::Worker(e.to_string()))??;
        }

        let plan = self.store.load_plan(plan_execution_id).await?;
        info!(
            plan = %plan_execution_id,
            status = plan.status.as_str(),
            "plan run finished"
        );
        Ok(plan)
    }

    /// Resume a paused plan's status machine, then drive it again.
    pub async fn resume(
        &self,
        plan_execution_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<PlanExecution, EngineError> {
        self.interrupts
            .resume_plan(plan_execution_id, interrupt_id)
            .await
            .map_err(|e| EngineError::Store(e.source))?;
        self.run(plan_execution_id).await
    }

    /// Pause every flowing leaf of a plan. In-flight steps finish their
    /// current attempt; nothing new dispatches under a paused branch.
    pub async fn pause_plan(
        &self,
        plan_execution_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<bool, EngineError> {
        let nodes = self.store.nodes_of_plan(plan_execution_id).await?;
        let leaves: Vec<&NodeExecution> = nodes
            .iter()
            .filter(|n| n.status.is_flowing())
            .filter(|n| !nodes.iter().any(|m| m.parent_id == Some(n.id)))
            .collect();

        let mut plan_paused = false;
        for leaf in leaves {
            plan_paused = self
                .interrupts
                .register_pause(leaf.id, interrupt_id)
                .await
                .map_err(|e| EngineError::Store(e.source))?;
        }
        Ok(plan_paused)
    }

    /// Abort a node and its flowing descendants.
    pub async fn abort_node(
        &self,
        node_id: Uuid,
        interrupt_id: Uuid,
    ) -> Result<Vec<AppliedEffect>, EngineError> {
        self.interrupts
            .abort_node(node_id, interrupt_id)
            .await
            .map_err(|e| EngineError::Store(e.source))
    }

    /// Execute one node according to its facilitation mode. Boxed so
    /// container nodes can dispatch their children without an unbounded
    /// recursive future type.
    fn run_node(
        &self,
        node_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Status, EngineError>> + Send>> {
        let engine = self.clone();
        Box::pin(async move {
            let node = engine.store.load_node(node_id).await?;

            if node.status.is_terminal() {
                return Ok(node.status);
            }
            if node.status == Status::Paused {
                return Ok(Status::Paused);
            }

            let facilitator = engine.registries.facilitators.obtain(&node.step_type)?;
            match facilitator.mode() {
                FacilitationMode::Sync => engine.run_leaf(node).await,
                FacilitationMode::Async => {
                    let worker = engine.clone();
                    tokio::spawn(async move { worker.run_leaf(node).await })
                        .await
                        .map_err(|e| EngineError::Worker(e.to_string()))?
                }
                FacilitationMode::Child => engine.run_children_parallel(node).await,
                FacilitationMode::ChildChain => engine.run_children_chain(node).await,
            }
        })
    }

    /// Spawn all children at once and wait for every branch.
    async fn run_children_parallel(&self, node: NodeExecution) -> Result<Status, EngineError> {
        self.mark_running(&node).await?;

        let mut children = self.store.children_of(node.id).await?;
        children.sort_by_key(|n| n.position);

        let mut handles = Vec::with_capacity(children.len());
        for child in &children {
            let engine = self.clone();
            let child_id = child.id;
            handles.push(tokio::spawn(async move { engine.run_node(child_id).await }));
        }

        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            statuses.push(
                handle
                    .await
                    .map_err(|e| EngineError::Worker(e.to_string()))??,
            );
        }

        self.finalize_container(node, &statuses).await
    }

    /// Dispatch children one after another; a non-succeeding child stops
    /// the chain and the unreached children are aborted.
    async fn run_children_chain(&self, node: NodeExecution) -> Result<Status, EngineError> {
        self.mark_running(&node).await?;

        let mut children = self.store.children_of(node.id).await?;
        children.sort_by_key(|n| n.position);

        let mut statuses = Vec::with_capacity(children.len());
        let mut chain_broken = false;
        for child in &children {
            if chain_broken {
                // unreached links cannot run anymore
                let fresh = self.store.load_node(child.id).await?;
                if !fresh.status.is_terminal() {
                    self.abort_node(child.id, Uuid::new_v4()).await?;
                }
                statuses.push(self.store.load_node(child.id).await?.status);
                continue;
            }

            let status = self.run_node(child.id).await?;
            if !matches!(status, Status::Succeeded) {
                chain_broken = true;
            }
            statuses.push(status);
        }

        self.finalize_container(node, &statuses).await
    }

    async fn mark_running(&self, node: &NodeExecution) -> Result<(), EngineError> {
        let mut fresh = self.store.load_node(node.id).await?;
        if fresh.status == Status::Queued {
            fresh.status = Status::Running;
            if fresh.started_at.is_none() {
                fresh.started_at = Some(Utc::now());
            }
            self.store.update_node(&fresh).await?;
        }
        Ok(())
    }

    /// Derive and commit a container's status from its children. A paused
    /// branch leaves the container to pause propagation, which has already
    /// paused it (or kept it running) by the time the children unwound.
    async fn finalize_container(
        &self,
        node: NodeExecution,
        child_statuses: &[Status],
    ) -> Result<Status, EngineError> {
        let fresh = self.store.load_node(node.id).await?;
        if fresh.status == Status::Paused || fresh.status.is_terminal() {
            return Ok(fresh.status);
        }

        if child_statuses.iter().any(|s| *s == Status::Paused) {
            // A branch paused while a sibling was still flowing, so pause
            // propagation left this container alone. The flowing sibling
            // has since finished, which means nothing under the container
            // flows anymore: the pause must climb now.
            let children = self.store.children_of(node.id).await?;
            if children.iter().any(|c| c.status.is_flowing()) {
                return Ok(fresh.status);
            }

            let interrupt_id = children
                .iter()
                .filter(|c| c.status == Status::Paused)
                .filter_map(|c| {
                    c.interrupt_history
                        .iter()
                        .rev()
                        .find(|e| e.kind == InterruptKind::PauseAll)
                        .map(|e| e.interrupt_id)
                })
                .next()
                .unwrap_or_else(Uuid::new_v4);

            self.interrupts
                .register_pause(node.id, interrupt_id)
                .await
                .map_err(|e| EngineError::Store(e.source))?;
            return Ok(Status::Paused);
        }

        let status = if child_statuses
            .iter()
            .any(|s| matches!(s, Status::Failed | Status::Expired))
        {
            Status::Failed
        } else if child_statuses.iter().any(|s| *s == Status::Aborted) {
            Status::Aborted
        } else {
            Status::Succeeded
        };

        self.store.transition_node(node.id, status, None).await?;
        self.fire_status_update(node.plan_execution_id, node.id, status, None)
            .await?;
        Ok(status)
    }

    /// Run a leaf step, consulting its adviser on every outcome until the
    /// node settles.
    async fn run_leaf(&self, node: NodeExecution) -> Result<Status, EngineError> {
        let node_id = node.id;

        loop {
            let mut node = self.store.load_node(node_id).await?;
            if node.status == Status::Paused {
                return Ok(Status::Paused);
            }
            if node.status.is_terminal() {
                return Ok(node.status);
            }

            node.status = Status::Running;
            node.attempts += 1;
            if node.started_at.is_none() {
                node.started_at = Some(Utc::now());
            }
            self.store.update_node(&node).await?;
            debug!(node = %node_id, step = %node.setup_id, attempt = node.attempts, "step dispatched");

            let runner = self.registries.steps.obtain(&node.step_type)?;
            let ctx = StepContext::new(node.clone(), self.sweep.clone());

            let outcome = match node.timeout_secs {
                Some(secs) => {
                    match timeout(Duration::from_secs(secs), runner.run(&ctx)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(node = %node_id, step = %node.setup_id, secs, "step timed out");
                            let effect =
                                InterruptEffect::new(Uuid::new_v4(), InterruptKind::Expire);
                            self.store
                                .transition_node(node_id, Status::Expired, Some(effect))
                                .await?;
                            self.fire_status_update(
                                node.plan_execution_id,
                                node_id,
                                Status::Expired,
                                None,
                            )
                            .await?;
                            return Ok(Status::Expired);
                        }
                    }
                }
                None => runner.run(&ctx).await,
            };

            let (proposed, failure_message) = match outcome {
                StepOutcome::Paused => {
                    let interrupt_id = Uuid::new_v4();
                    let effect = InterruptEffect::new(interrupt_id, InterruptKind::PauseAll);
                    self.store
                        .transition_node(node_id, Status::Paused, Some(effect))
                        .await?;
                    info!(node = %node_id, step = %node.setup_id, "step paused its branch");
                    self.fire_status_update(
                        node.plan_execution_id,
                        node_id,
                        Status::Paused,
                        Some(interrupt_id),
                    )
                    .await?;
                    return Ok(Status::Paused);
                }
                StepOutcome::Succeeded { outputs } => {
                    let mut published = Vec::new();
                    for declaration in outputs {
                        match self
                            .sweep
                            .consume(
                                node.plan_execution_id,
                                &node.ambiance,
                                &declaration.name,
                                declaration.value,
                                declaration.levels_to_keep,
                            )
                            .await
                        {
                            Ok(id) => published.push(id),
                            Err(e) if e.is_duplicate_output() => {
                                // someone else already published this
                                debug!(node = %node_id, name = %declaration.name, "output already present");
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    if !published.is_empty() {
                        let mut fresh = self.store.load_node(node_id).await?;
                        fresh.output_ids.extend(published);
                        self.store.update_node(&fresh).await?;
                    }
                    (Status::Succeeded, None)
                }
                StepOutcome::Failed { message } => {
                    warn!(node = %node_id, step = %node.setup_id, error = %message, "step failed");
                    (Status::Failed, Some(message))
                }
            };

            let adviser = self.registries.advisers.obtain(&node.step_type)?;
            let event = AdvisingEvent {
                node: self.store.load_node(node_id).await?,
                outcome: proposed,
                failure_message,
            };

            match adviser.advise(&event).await {
                Advice::Proceed => {
                    self.store.transition_node(node_id, proposed, None).await?;
                    self.fire_status_update(node.plan_execution_id, node_id, proposed, None)
                        .await?;
                    return Ok(proposed);
                }
                Advice::Retry { wait_secs } => {
                    info!(node = %node_id, step = %node.setup_id, wait_secs, "retrying step");
                    if wait_secs > 0 {
                        tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    }
                    continue;
                }
                Advice::Rollback => {
                    error!(node = %node_id, step = %node.setup_id, "adviser rolled the branch back");
                    self.abort_node(node_id, Uuid::new_v4()).await?;
                    let fresh = self.store.load_node(node_id).await?;
                    self.fire_status_update(node.plan_execution_id, node_id, fresh.status, None)
                        .await?;
                    return Ok(fresh.status);
                }
            }
        }
    }

    /// Fire the status-update handler registered for the new status, when
    /// one exists.
    async fn fire_status_update(
        &self,
        plan_execution_id: Uuid,
        node_id: Uuid,
        status: Status,
        interrupt_id: Option<Uuid>,
    ) -> Result<(), EngineError> {
        if let Some(handler) = self.registries.status_handlers.find(status.as_str()) {
            let event = StatusUpdateEvent {
                plan_execution_id,
                node_id,
                status,
                interrupt_id,
            };
            handler.on_update(&event).await?;
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn blank_node(
    id: Uuid,
    plan_execution_id: Uuid,
    parent_id: Option<Uuid>,
    position: usize,
    setup_id: &str,
    name: &str,
    step_type: &str,
    ambiance: Ambiance,
    parameters: serde_json::Value,
    timeout_secs: Option<u64>,
    max_retries: usize,
) -> NodeExecution {
    NodeExecution {
        id,
        plan_execution_id,
        parent_id,
        position,
        setup_id: setup_id.to_string(),
        name: name.to_string(),
        step_type: step_type.to_string(),
        status: Status::Queued,
        ambiance,
        interrupt_history: Vec::new(),
        output_ids: Vec::new(),
        attempts: 0,
        max_retries,
        parameters,
        timeout_secs,
        started_at: None,
        ended_at: None,
    }
}
