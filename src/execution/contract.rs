//! Behavior seams dispatched through the type registries
//!
//! Each pluggable capability is a small interface; the engine obtains the
//! implementation for a node's type tag from the matching registry and
//! never couples to individual step implementations at compile time.

use crate::core::{Ambiance, NodeExecution, Status};
use crate::error::EngineError;
use crate::sweep::SweepingOutputService;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// How a node is facilitated: whether it runs inline, detached, or by
/// spawning and awaiting sub-nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilitationMode {
    /// Run the step inline on the dispatching worker
    Sync,
    /// Run the step on its own task; the engine awaits its report
    Async,
    /// Spawn all children and wait for every branch
    Child,
    /// Spawn children one after another, each gated on the previous
    ChildChain,
}

/// Decides the facilitation mode for a node type
pub trait Facilitator: Send + Sync {
    fn mode(&self) -> FacilitationMode;
}

/// A sweeping output a step wants published when it finishes
#[derive(Debug, Clone)]
pub struct OutputDeclaration {
    /// Name, unique per scope
    pub name: String,

    /// Value payload
    pub value: serde_json::Value,

    /// How many leading ambiance levels the output keeps for scoping
    pub levels_to_keep: usize,
}

/// What a step reports back to the engine
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Unit of work finished; publish the declared outputs
    Succeeded { outputs: Vec<OutputDeclaration> },
    /// Unit of work failed
    Failed { message: String },
    /// Step asks to pause its branch (e.g. a manual gate)
    Paused,
}

/// Execution-time surface handed to a step runner: the node record plus
/// scoped access to sweeping outputs.
pub struct StepContext {
    node: NodeExecution,
    sweep: Arc<SweepingOutputService>,
}

impl StepContext {
    pub fn new(node: NodeExecution, sweep: Arc<SweepingOutputService>) -> Self {
        Self { node, sweep }
    }

    pub fn node(&self) -> &NodeExecution {
        &self.node
    }

    pub fn ambiance(&self) -> &Ambiance {
        &self.node.ambiance
    }

    /// Fetch a step parameter by key.
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.node.parameters.get(key)
    }

    /// Resolve a name or expression from this node's position.
    pub async fn resolve(&self, reference: &str) -> Result<serde_json::Value, EngineError> {
        self.sweep
            .resolve(self.node.plan_execution_id, &self.node.ambiance, reference)
            .await
    }

    /// Resolve, reporting a miss as `None`.
    pub async fn resolve_optional(
        &self,
        reference: &str,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        self.sweep
            .resolve_optional(self.node.plan_execution_id, &self.node.ambiance, reference)
            .await
    }

    /// Publish a sweeping output mid-step.
    pub async fn publish(
        &self,
        name: &str,
        value: serde_json::Value,
        levels_to_keep: usize,
    ) -> Result<Uuid, EngineError> {
        self.sweep
            .consume(
                self.node.plan_execution_id,
                &self.node.ambiance,
                name,
                value,
                levels_to_keep,
            )
            .await
    }
}

/// Performs the actual unit of work for a leaf step
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> StepOutcome;
}

/// What the adviser saw: the node after its step finished, with the status
/// the outcome proposes.
#[derive(Debug, Clone)]
pub struct AdvisingEvent {
    pub node: NodeExecution,
    pub outcome: Status,
    pub failure_message: Option<String>,
}

/// What to do next with a finished node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advice {
    /// Accept the proposed status
    Proceed,
    /// Re-run the node after an optional wait
    Retry { wait_secs: u64 },
    /// Give up on the branch and abort the remaining flowing work
    Rollback,
}

/// Decides what happens after a node's step reports an outcome
#[async_trait]
pub trait Adviser: Send + Sync {
    async fn advise(&self, event: &AdvisingEvent) -> Advice;
}

/// Fired on every node status transition
#[derive(Debug, Clone)]
pub struct StatusUpdateEvent {
    pub plan_execution_id: Uuid,
    pub node_id: Uuid,
    pub status: Status,
    /// The interrupt that caused the transition, when one did
    pub interrupt_id: Option<Uuid>,
}

/// Cross-cutting reaction to a node status change; may touch ancestor
/// nodes and the plan record.
#[async_trait]
pub trait StatusUpdateHandler: Send + Sync {
    async fn on_update(&self, event: &StatusUpdateEvent) -> Result<(), EngineError>;
}

/// Resolves a reference (name or expression) from a node's position;
/// implementations are looked up by reference-kind tag.
#[async_trait]
pub trait OutputResolver: Send + Sync {
    async fn resolve(
        &self,
        plan_execution_id: Uuid,
        ambiance: &Ambiance,
        reference: &str,
    ) -> Result<serde_json::Value, EngineError>;
}
