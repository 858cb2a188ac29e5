//! Built-in registrar contribution
//!
//! The minimum set of bindings needed to run a plan layout end to end:
//! `echo` and `wait` step runners, facilitators for the four facilitation
//! modes, the default adviser, the sweeping-output resolver, and the
//! pause/terminal status-update handlers.

use crate::core::Ambiance;
use crate::error::EngineError;
use crate::execution::contract::{
    Advice, AdvisingEvent, Adviser, FacilitationMode, Facilitator, OutputDeclaration,
    OutputResolver, StepContext, StepOutcome, StepRunner,
};
use crate::execution::engine::{GROUP_CHAIN_TYPE, GROUP_TYPE, STAGE_CHAIN_TYPE, STAGE_TYPE};
use crate::execution::interrupt::InterruptManager;
use crate::execution::status_update::{PausedStatusHandler, TerminalStatusHandler};
use crate::registry::{Registrar, RegistryError, RegistrySet};
use crate::store::ExecutionStore;
use crate::sweep::SweepingOutputService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Step that logs a message and optionally publishes it as a sweeping
/// output. References like `<+sweep.name>` in the message are resolved
/// from the step's position.
pub struct EchoStep;

#[async_trait]
impl StepRunner for EchoStep {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let message = ctx
            .param("message")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let rendered = if message.contains("<+") {
            match ctx.resolve_optional(&message).await {
                Ok(Some(value)) => match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                Ok(None) => message,
                Err(e) => {
                    return StepOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            }
        } else {
            message
        };

        info!(step = %ctx.node().setup_id, message = %rendered, "echo");

        let outputs = match ctx.param("publish") {
            Some(publish) => {
                let Some(name) = publish.get("name").and_then(|v| v.as_str()) else {
                    return StepOutcome::Failed {
                        message: "publish requires a name".to_string(),
                    };
                };
                let levels_to_keep = publish
                    .get("levels_to_keep")
                    .and_then(|v| v.as_u64())
                    .map(|n| n as usize)
                    .unwrap_or_else(|| ctx.ambiance().depth());
                vec![OutputDeclaration {
                    name: name.to_string(),
                    value: serde_json::Value::String(rendered),
                    levels_to_keep,
                }]
            }
            None => Vec::new(),
        };

        StepOutcome::Succeeded { outputs }
    }
}

/// Step that sleeps for `secs` seconds.
pub struct WaitStep;

#[async_trait]
impl StepRunner for WaitStep {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let secs = ctx.param("secs").and_then(|v| v.as_u64()).unwrap_or(0);
        tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;
        StepOutcome::Succeeded {
            outputs: Vec::new(),
        }
    }
}

/// One facilitator per facilitation mode; nodes pick theirs by type tag.
pub struct ModeFacilitator(pub FacilitationMode);

impl Facilitator for ModeFacilitator {
    fn mode(&self) -> FacilitationMode {
        self.0
    }
}

/// Default adviser: retry a failure while the node has retries left,
/// otherwise accept whatever the outcome proposed.
pub struct DefaultAdviser;

#[async_trait]
impl Adviser for DefaultAdviser {
    async fn advise(&self, event: &AdvisingEvent) -> Advice {
        if event.outcome == crate::core::Status::Failed
            && event.node.attempts <= event.node.max_retries
        {
            return Advice::Retry { wait_secs: 0 };
        }
        Advice::Proceed
    }
}

/// Reference resolver backed by the sweeping-output service.
pub struct SweepOutputResolver {
    sweep: Arc<SweepingOutputService>,
}

impl SweepOutputResolver {
    pub fn new(sweep: Arc<SweepingOutputService>) -> Self {
        Self { sweep }
    }
}

#[async_trait]
impl OutputResolver for SweepOutputResolver {
    async fn resolve(
        &self,
        plan_execution_id: Uuid,
        ambiance: &Ambiance,
        reference: &str,
    ) -> Result<serde_json::Value, EngineError> {
        self.sweep.resolve(plan_execution_id, ambiance, reference).await
    }
}

/// Contributes the built-in bindings for every registry kind.
pub struct BuiltinRegistrar {
    store: Arc<dyn ExecutionStore>,
}

impl BuiltinRegistrar {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }
}

impl Registrar for BuiltinRegistrar {
    fn register(&self, set: &mut RegistrySet) -> Result<(), RegistryError> {
        set.steps.register("echo", Arc::new(EchoStep))?;
        set.steps.register("wait", Arc::new(WaitStep))?;

        set.facilitators
            .register("echo", Arc::new(ModeFacilitator(FacilitationMode::Sync)))?;
        set.facilitators
            .register("wait", Arc::new(ModeFacilitator(FacilitationMode::Async)))?;
        set.facilitators.register(
            STAGE_TYPE,
            Arc::new(ModeFacilitator(FacilitationMode::Child)),
        )?;
        set.facilitators.register(
            STAGE_CHAIN_TYPE,
            Arc::new(ModeFacilitator(FacilitationMode::ChildChain)),
        )?;
        set.facilitators.register(
            GROUP_TYPE,
            Arc::new(ModeFacilitator(FacilitationMode::Child)),
        )?;
        set.facilitators.register(
            GROUP_CHAIN_TYPE,
            Arc::new(ModeFacilitator(FacilitationMode::ChildChain)),
        )?;

        let adviser = Arc::new(DefaultAdviser);
        for tag in ["echo", "wait"] {
            set.advisers.register(tag, adviser.clone())?;
        }

        let sweep = Arc::new(SweepingOutputService::with_default_evaluator(
            self.store.clone(),
        ));
        set.resolvers
            .register("sweep", Arc::new(SweepOutputResolver::new(sweep)))?;

        let interrupts = Arc::new(InterruptManager::new(self.store.clone()));
        set.status_handlers.register(
            "PAUSED",
            Arc::new(PausedStatusHandler::new(interrupts)),
        )?;

        let terminal = Arc::new(TerminalStatusHandler::new(self.store.clone()));
        for tag in ["SUCCEEDED", "FAILED", "ABORTED", "EXPIRED"] {
            set.status_handlers.register(tag, terminal.clone())?;
        }

        Ok(())
    }
}
