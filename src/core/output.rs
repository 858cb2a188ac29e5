//! Sweeping output record - one per published output

use crate::core::ambiance::Ambiance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, scope-addressed value published by a node. Created by a step's
/// `consume` call; never updated; pruned with the owning plan execution.
///
/// Uniqueness: `(plan_execution_id, name, level_index)` - the engine never
/// silently overwrites a sweeping output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepingOutputInstance {
    /// Unique output id
    pub id: Uuid,

    /// Owning plan execution
    pub plan_execution_id: Uuid,

    /// Name, unique per scope
    pub name: String,

    /// The publishing node's ambiance truncated to the retained levels
    pub levels: Ambiance,

    /// Derived level-runtime-id index used for scoped lookup
    pub level_index: String,

    /// Serialized value payload
    pub value: serde_json::Value,

    /// When the output was published
    pub published_at: DateTime<Utc>,
}

impl SweepingOutputInstance {
    pub fn new(
        plan_execution_id: Uuid,
        name: impl Into<String>,
        levels: Ambiance,
        value: serde_json::Value,
    ) -> Self {
        let level_index = levels.runtime_id_index();
        Self {
            id: Uuid::new_v4(),
            plan_execution_id,
            name: name.into(),
            levels,
            level_index,
            value,
            published_at: Utc::now(),
        }
    }
}
