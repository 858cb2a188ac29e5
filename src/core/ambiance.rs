//! Ambiance - the ordered level path addressing a node execution

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a level in the execution tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Stage,
    StepGroup,
    Step,
}

/// One entry in an ambiance: the owning node's runtime id plus its type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Runtime id of the node execution that owns this level
    pub runtime_id: Uuid,

    /// Identifier of the node within the plan layout
    pub setup_id: String,

    /// What kind of node this level represents
    pub kind: LevelKind,
}

impl Level {
    pub fn new(runtime_id: Uuid, setup_id: impl Into<String>, kind: LevelKind) -> Self {
        Self {
            runtime_id,
            setup_id: setup_id.into(),
            kind,
        }
    }
}

/// The ordered sequence of levels identifying a node execution's position
/// in the tree, root first. Immutable once constructed for a node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ambiance {
    levels: Vec<Level>,
}

impl Ambiance {
    pub fn new(levels: Vec<Level>) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Runtime id of the deepest level, i.e. the node this ambiance belongs to.
    pub fn current_runtime_id(&self) -> Option<Uuid> {
        self.levels.last().map(|l| l.runtime_id)
    }

    /// Derive a child ambiance by appending one level.
    pub fn child(&self, level: Level) -> Ambiance {
        let mut levels = self.levels.clone();
        levels.push(level);
        Ambiance { levels }
    }

    /// Keep only the first `levels_to_keep` levels. Keeping more levels
    /// than exist is equivalent to keeping all of them.
    pub fn truncated(&self, levels_to_keep: usize) -> Ambiance {
        Ambiance {
            levels: self
                .levels
                .iter()
                .take(levels_to_keep)
                .cloned()
                .collect(),
        }
    }

    /// The level-runtime-id index: the joined runtime ids of every level.
    /// Two ambiances sharing a longer index prefix are closer in the tree,
    /// so a longer matching index means a more specific scope.
    pub fn runtime_id_index(&self) -> String {
        self.levels
            .iter()
            .map(|l| l.runtime_id.to_string())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Every index obtainable by truncating this ambiance at each depth,
    /// from plan scope (empty) down to the full path. These are exactly the
    /// scopes whose outputs are visible to this node.
    pub fn ancestor_indices(&self) -> Vec<String> {
        (0..=self.levels.len())
            .map(|depth| self.truncated(depth).runtime_id_index())
            .collect()
    }
}
