//! Execution status models

use serde::{Deserialize, Serialize};

/// Status of a single node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Node is waiting to be picked up by a worker
    Queued,
    /// Node is actively executing
    Running,
    /// Node was paused by an interrupt (or by pause propagation)
    Paused,
    /// Node completed successfully
    Succeeded,
    /// Node failed
    Failed,
    /// Node was aborted by an interrupt
    Aborted,
    /// Node exceeded its timeout
    Expired,
}

impl Status {
    /// Terminal statuses can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Succeeded | Status::Failed | Status::Aborted | Status::Expired
        )
    }

    /// Flowing statuses are the non-terminal, non-paused ones: the node
    /// still indicates active work.
    pub fn is_flowing(&self) -> bool {
        matches!(self, Status::Queued | Status::Running)
    }

    /// Stable tag used for persistence and registry dispatch.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Paused => "PAUSED",
            Status::Succeeded => "SUCCEEDED",
            Status::Failed => "FAILED",
            Status::Aborted => "ABORTED",
            Status::Expired => "EXPIRED",
        }
    }

    /// Parse a persisted status tag.
    pub fn parse(tag: &str) -> Option<Status> {
        match tag {
            "QUEUED" => Some(Status::Queued),
            "RUNNING" => Some(Status::Running),
            "PAUSED" => Some(Status::Paused),
            "SUCCEEDED" => Some(Status::Succeeded),
            "FAILED" => Some(Status::Failed),
            "ABORTED" => Some(Status::Aborted),
            "EXPIRED" => Some(Status::Expired),
            _ => None,
        }
    }
}

/// Overall plan execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    /// Plan has been enrolled but not started
    Pending,
    /// At least one node can still make progress
    Running,
    /// Every remaining branch is paused
    Paused,
    /// All nodes succeeded
    Succeeded,
    /// At least one node failed and nothing can progress
    Failed,
    /// Plan was aborted
    Aborted,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Succeeded | PlanStatus::Failed | PlanStatus::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "PENDING",
            PlanStatus::Running => "RUNNING",
            PlanStatus::Paused => "PAUSED",
            PlanStatus::Succeeded => "SUCCEEDED",
            PlanStatus::Failed => "FAILED",
            PlanStatus::Aborted => "ABORTED",
        }
    }

    pub fn parse(tag: &str) -> Option<PlanStatus> {
        match tag {
            "PENDING" => Some(PlanStatus::Pending),
            "RUNNING" => Some(PlanStatus::Running),
            "PAUSED" => Some(PlanStatus::Paused),
            "SUCCEEDED" => Some(PlanStatus::Succeeded),
            "FAILED" => Some(PlanStatus::Failed),
            "ABORTED" => Some(PlanStatus::Aborted),
            _ => None,
        }
    }
}
