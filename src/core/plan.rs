//! Plan execution record - one per pipeline run

use crate::core::status::PlanStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One pipeline run. Created when a plan begins; its status is derived
/// from (or forced by) node-level transitions and becomes terminal once no
/// node can still progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecution {
    /// Unique execution id
    pub id: Uuid,

    /// Name of the plan layout this run was enrolled from
    pub plan_name: String,

    /// Overall status
    pub status: PlanStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,
}

impl PlanExecution {
    /// Create a fresh, pending plan execution.
    pub fn new(plan_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_name: plan_name.into(),
            status: PlanStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}
