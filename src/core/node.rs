//! Node execution record - one per executed node instance

use crate::core::ambiance::Ambiance;
use crate::core::interrupt::{InterruptEffect, InterruptKind};
use crate::core::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of work in a plan: a stage, a step group, or a step.
///
/// The record is the unit of persistence: status transitions and
/// interrupt-effect appends happen as atomic single-document writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    /// Unique runtime id
    pub id: Uuid,

    /// Owning plan execution
    pub plan_execution_id: Uuid,

    /// Parent node; `None` marks a root node within the plan
    pub parent_id: Option<Uuid>,

    /// Order among siblings; chains dispatch children in this order
    pub position: usize,

    /// Identifier of the node within the plan layout
    pub setup_id: String,

    /// Human-readable name
    pub name: String,

    /// Step-type tag used for registry dispatch
    pub step_type: String,

    /// Current status
    pub status: Status,

    /// The node's position in the tree. Immutable once constructed.
    pub ambiance: Ambiance,

    /// Ordered audit trail of interrupt applications on this node
    pub interrupt_history: Vec<InterruptEffect>,

    /// Ids of sweeping outputs this node produced
    pub output_ids: Vec<Uuid>,

    /// Attempts so far (1 on first dispatch)
    pub attempts: usize,

    /// Maximum retries before a failure sticks
    pub max_retries: usize,

    /// Opaque step parameters handed to the step runner
    pub parameters: serde_json::Value,

    /// Per-step timeout; `None` means no limit
    pub timeout_secs: Option<u64>,

    /// When the node first started running
    pub started_at: Option<DateTime<Utc>>,

    /// When the node reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,
}

impl NodeExecution {
    /// Whether an effect for this interrupt id and kind was already applied.
    /// Re-delivered interrupts are detected through this, keeping
    /// propagation idempotent without cross-document locks.
    pub fn has_effect(&self, interrupt_id: Uuid, kind: InterruptKind) -> bool {
        self.interrupt_history
            .iter()
            .any(|e| e.interrupt_id == interrupt_id && e.kind == kind)
    }
}
