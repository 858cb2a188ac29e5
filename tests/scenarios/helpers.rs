//! Test utility functions for the engine scenarios

use planrun::builtin::{BuiltinRegistrar, DefaultAdviser, ModeFacilitator};
use planrun::core::{
    Ambiance, Level, LevelKind, NodeExecution, PlanExecution, PlanLayout, Status,
};
use planrun::execution::{
    Engine, FacilitationMode, OutputDeclaration, StepContext, StepOutcome, StepRunner,
};
use planrun::registry::{Registrar, RegistryError, RegistrySet};
use planrun::store::{ExecutionStore, InMemoryStore};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Engine plus its backing store, wired with the builtin registrar and any
/// test-step contributions.
pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub engine: Engine,
}

pub fn harness() -> TestHarness {
    harness_with_steps(Vec::new())
}

pub fn harness_with_steps(steps: Vec<(&'static str, Arc<dyn StepRunner>)>) -> TestHarness {
    let store = Arc::new(InMemoryStore::new());
    let store_dyn: Arc<dyn ExecutionStore> = store.clone();

    let registrars: Vec<Arc<dyn Registrar>> = vec![
        Arc::new(BuiltinRegistrar::new(store_dyn.clone())),
        Arc::new(TestStepRegistrar { steps }),
    ];
    let registries = Arc::new(RegistrySet::populate(&registrars).expect("registries populate"));

    let engine = Engine::new(store_dyn, registries);
    TestHarness { store, engine }
}

/// Contributes test steps as synchronous leaves with the default adviser.
pub struct TestStepRegistrar {
    pub steps: Vec<(&'static str, Arc<dyn StepRunner>)>,
}

impl Registrar for TestStepRegistrar {
    fn register(&self, set: &mut RegistrySet) -> Result<(), RegistryError> {
        let adviser = Arc::new(DefaultAdviser);
        for (tag, runner) in &self.steps {
            set.steps.register(*tag, runner.clone())?;
            set.facilitators
                .register(*tag, Arc::new(ModeFacilitator(FacilitationMode::Sync)))?;
            set.advisers.register(*tag, adviser.clone())?;
        }
        Ok(())
    }
}

/// Fails the first `failures` runs, then succeeds.
pub struct FlakyStep {
    failures: usize,
    runs: AtomicUsize,
}

impl FlakyStep {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StepRunner for FlakyStep {
    async fn run(&self, _ctx: &StepContext) -> StepOutcome {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        if run < self.failures {
            StepOutcome::Failed {
                message: format!("induced failure {}", run + 1),
            }
        } else {
            StepOutcome::Succeeded {
                outputs: Vec::new(),
            }
        }
    }
}

/// Always fails.
pub struct BoomStep;

#[async_trait]
impl StepRunner for BoomStep {
    async fn run(&self, _ctx: &StepContext) -> StepOutcome {
        StepOutcome::Failed {
            message: "boom".to_string(),
        }
    }
}

/// Pauses its branch until opened, then succeeds.
pub struct GateStep {
    open: Arc<AtomicBool>,
}

impl GateStep {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let open = Arc::new(AtomicBool::new(false));
        (Self { open: open.clone() }, open)
    }
}

#[async_trait]
impl StepRunner for GateStep {
    async fn run(&self, _ctx: &StepContext) -> StepOutcome {
        if self.open.load(Ordering::SeqCst) {
            StepOutcome::Succeeded {
                outputs: Vec::new(),
            }
        } else {
            StepOutcome::Paused
        }
    }
}

/// Publishes one declared output and succeeds.
pub struct PublishStep {
    pub name: &'static str,
    pub value: serde_json::Value,
    pub levels_to_keep: usize,
}

#[async_trait]
impl StepRunner for PublishStep {
    async fn run(&self, _ctx: &StepContext) -> StepOutcome {
        StepOutcome::Succeeded {
            outputs: vec![OutputDeclaration {
                name: self.name.to_string(),
                value: self.value.clone(),
                levels_to_keep: self.levels_to_keep,
            }],
        }
    }
}

/// Resolves a reference and fails unless it matches the expectation.
pub struct ExpectStep {
    pub reference: &'static str,
    pub expected: serde_json::Value,
}

#[async_trait]
impl StepRunner for ExpectStep {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        match ctx.resolve(self.reference).await {
            Ok(value) if value == self.expected => StepOutcome::Succeeded {
                outputs: Vec::new(),
            },
            Ok(value) => StepOutcome::Failed {
                message: format!("expected {}, resolved {}", self.expected, value),
            },
            Err(e) => StepOutcome::Failed {
                message: e.to_string(),
            },
        }
    }
}

/// Records the order steps ran in.
pub struct RecorderStep {
    pub order: Arc<Mutex<Vec<String>>>,
}

impl RecorderStep {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let order = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                order: order.clone(),
            },
            order,
        )
    }
}

#[async_trait]
impl StepRunner for RecorderStep {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        self.order
            .lock()
            .expect("order lock")
            .push(ctx.node().setup_id.clone());
        StepOutcome::Succeeded {
            outputs: Vec::new(),
        }
    }
}

/// Insert a hand-built node tree directly into a store; used by the
/// propagation scenarios that exercise the state machine without running
/// steps.
pub struct TreeBuilder {
    pub store: Arc<InMemoryStore>,
    pub plan: PlanExecution,
}

impl TreeBuilder {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let plan = PlanExecution::new("fixture");
        store.insert_plan(&plan).await.expect("insert plan");
        Self { store, plan }
    }

    pub async fn node(
        &self,
        setup_id: &str,
        parent: Option<&NodeExecution>,
        status: Status,
    ) -> NodeExecution {
        let id = Uuid::new_v4();
        let ambiance = match parent {
            None => Ambiance::new(vec![Level::new(id, setup_id, LevelKind::Stage)]),
            Some(p) => {
                let kind = if p.parent_id.is_none() {
                    LevelKind::StepGroup
                } else {
                    LevelKind::Step
                };
                p.ambiance.child(Level::new(id, setup_id, kind))
            }
        };

        let node = NodeExecution {
            id,
            plan_execution_id: self.plan.id,
            parent_id: parent.map(|p| p.id),
            position: 0,
            setup_id: setup_id.to_string(),
            name: setup_id.to_string(),
            step_type: "echo".to_string(),
            status,
            ambiance,
            interrupt_history: Vec::new(),
            output_ids: Vec::new(),
            attempts: 0,
            max_retries: 0,
            parameters: serde_json::Value::Null,
            timeout_secs: None,
            started_at: None,
            ended_at: None,
        };
        self.store.insert_node(&node).await.expect("insert node");
        node
    }

    pub async fn status_of(&self, node: &NodeExecution) -> Status {
        self.store
            .load_node(node.id)
            .await
            .expect("load node")
            .status
    }
}

/// Enroll a YAML layout and run it to completion.
pub async fn run_layout(harness: &TestHarness, yaml: &str) -> PlanExecution {
    let layout = PlanLayout::from_yaml(yaml).expect("parse layout");
    let plan = harness.engine.enroll(&layout).await.expect("enroll");
    harness.engine.run(plan.id).await.expect("run")
}

/// Status of the node with the given layout id.
pub async fn node_status(harness: &TestHarness, plan_id: Uuid, setup_id: &str) -> Status {
    let nodes = harness
        .store
        .nodes_of_plan(plan_id)
        .await
        .expect("load nodes");
    nodes
        .iter()
        .find(|n| n.setup_id == setup_id)
        .unwrap_or_else(|| panic!("no node '{}' in plan", setup_id))
        .status
}
