//! Plan layout from YAML - the typed graph handed over by the plan supplier

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level plan layout loaded from YAML: the compiled graph of nodes
/// (ids, types, parent links) the engine executes. Compilation itself
/// happens upstream; this is only the handoff shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanLayout {
    /// Plan name
    pub name: String,

    /// Root-level stages, executed in parallel
    pub stages: Vec<StageLayout>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Maximum retries per step (global default)
    #[serde(default)]
    pub max_retries: Option<usize>,
}

/// A stage: a root node grouping step groups and steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLayout {
    /// Unique stage identifier within the plan
    pub id: String,

    /// Human-readable stage name
    #[serde(default)]
    pub name: Option<String>,

    /// Whether children run as a chain (one after another) or in parallel
    #[serde(default)]
    pub chain: bool,

    /// Child step groups
    #[serde(default)]
    pub groups: Vec<GroupLayout>,

    /// Direct child steps
    #[serde(default)]
    pub steps: Vec<StepLayout>,
}

/// A step group nested under a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupLayout {
    /// Unique group identifier within the plan
    pub id: String,

    /// Human-readable group name
    #[serde(default)]
    pub name: Option<String>,

    /// Whether children run as a chain or in parallel
    #[serde(default)]
    pub chain: bool,

    /// Child steps
    pub steps: Vec<StepLayout>,
}

/// A leaf step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLayout {
    /// Unique step identifier within the plan
    pub id: String,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// Step-type tag resolved through the step registry
    #[serde(rename = "type")]
    pub step_type: String,

    /// Opaque parameters handed to the step runner
    #[serde(default)]
    pub with: serde_json::Value,

    /// Timeout for this step (overrides the plan default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Maximum retries for this step (overrides the plan default)
    #[serde(default)]
    pub max_retries: Option<usize>,
}

impl PlanLayout {
    /// Load a plan layout from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a plan layout from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let layout: PlanLayout = serde_yaml::from_str(yaml)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Validate the layout structure
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            anyhow::bail!("Plan '{}' has no stages", self.name);
        }

        // All node ids must be unique across the plan
        let mut seen_ids = std::collections::HashSet::new();
        for stage in &self.stages {
            if !seen_ids.insert(&stage.id) {
                anyhow::bail!("Duplicate node id: {}", stage.id);
            }
            for group in &stage.groups {
                if !seen_ids.insert(&group.id) {
                    anyhow::bail!("Duplicate node id: {}", group.id);
                }
                if group.steps.is_empty() {
                    anyhow::bail!("Step group '{}' has no steps", group.id);
                }
                for step in &group.steps {
                    if !seen_ids.insert(&step.id) {
                        anyhow::bail!("Duplicate node id: {}", step.id);
                    }
                }
            }
            for step in &stage.steps {
                if !seen_ids.insert(&step.id) {
                    anyhow::bail!("Duplicate node id: {}", step.id);
                }
            }
            if stage.groups.is_empty() && stage.steps.is_empty() {
                anyhow::bail!("Stage '{}' has no children", stage.id);
            }
        }

        Ok(())
    }
}

/// Produces the initial graph of nodes before execution begins
pub trait PlanSupplier {
    fn supply(&self) -> Result<PlanLayout>;
}

/// Plan supplier backed by a YAML file on disk
pub struct YamlPlanSupplier {
    path: std::path::PathBuf,
}

impl YamlPlanSupplier {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PlanSupplier for YamlPlanSupplier {
    fn supply(&self) -> Result<PlanLayout> {
        PlanLayout::from_file(&self.path)
    }
}
