//! Interrupt signals and their audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of interrupt applied to a node or plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptKind {
    /// Pause the node and, transitively, any parent whose branches all stop flowing
    PauseAll,
    /// Resume a paused subtree
    Resume,
    /// Abort the node and its flowing descendants
    Abort,
    /// Node exceeded its timeout
    Expire,
}

impl InterruptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptKind::PauseAll => "PAUSE_ALL",
            InterruptKind::Resume => "RESUME",
            InterruptKind::Abort => "ABORT",
            InterruptKind::Expire => "EXPIRE",
        }
    }
}

/// Immutable audit record of one interrupt application on one node.
/// Append-only: never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptEffect {
    /// Id of the external interrupt that caused this effect
    pub interrupt_id: Uuid,

    /// What was applied
    pub kind: InterruptKind,

    /// When the effect was applied to the node
    pub registered_at: DateTime<Utc>,
}

impl InterruptEffect {
    pub fn new(interrupt_id: Uuid, kind: InterruptKind) -> Self {
        Self {
            interrupt_id,
            kind,
            registered_at: Utc::now(),
        }
    }
}
