mod builtin;
mod cli;
mod core;
mod error;
mod execution;
mod registry;
mod store;
mod sweep;

use anyhow::{Context, Result};
use builtin::BuiltinRegistrar;
use cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use cli::{Cli, Command};
use crate::core::layout::{PlanSupplier, YamlPlanSupplier};
use crate::core::{PlanLayout, PlanStatus, Status};
use execution::Engine;
use registry::{Registrar, RegistrySet};
use store::{ExecutionStore, InMemoryStore};
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_plan(cmd).await?,
        Command::Validate(cmd) => validate_plan(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn run_plan(cmd: &RunCommand) -> Result<()> {
    let supplier = YamlPlanSupplier::new(&cmd.file);
    let layout = supplier.supply().context("Failed to load plan layout")?;
    println!("Loaded plan: {}", layout.name);

    let store = build_store(cmd.in_memory).await?;

    let registrars: Vec<Arc<dyn Registrar>> = vec![Arc::new(BuiltinRegistrar::new(store.clone()))];
    let registries = Arc::new(RegistrySet::populate(&registrars)?);

    let engine = Engine::new(store.clone(), registries);
    let plan = engine.enroll(&layout).await?;
    println!("Enrolled plan execution {}", plan.id);

    let plan = engine.run(plan.id).await?;

    let mut nodes = store.nodes_of_plan(plan.id).await?;
    nodes.sort_by_key(|n| (n.ambiance.depth(), n.position));
    println!();
    for node in &nodes {
        let indent = "  ".repeat(node.ambiance.depth().saturating_sub(1));
        println!("{}{}: {}", indent, node.setup_id, node.status.as_str());
    }

    println!("\nPlan {}: {}", plan.id, plan.status.as_str());
    if matches!(plan.status, PlanStatus::Failed | PlanStatus::Aborted) {
        let failed: Vec<String> = nodes
            .iter()
            .filter(|n| matches!(n.status, Status::Failed | Status::Expired))
            .map(|n| n.setup_id.clone())
            .collect();
        if !failed.is_empty() {
            error!("failed nodes: {}", failed.join(", "));
        }
        std::process::exit(1);
    }

    Ok(())
}

fn validate_plan(cmd: &ValidateCommand) -> Result<()> {
    match PlanLayout::from_file(&cmd.file) {
        Ok(layout) => {
            let steps: usize = layout
                .stages
                .iter()
                .map(|s| s.steps.len() + s.groups.iter().map(|g| g.steps.len()).sum::<usize>())
                .sum();
            println!("Plan layout is valid");
            println!("  Name: {}", layout.name);
            println!("  Stages: {}", layout.stages.len());
            println!("  Steps: {}", steps);
            Ok(())
        }
        Err(e) => {
            println!("Validation failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "sqlite")]
async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = store::SqliteExecutionStore::with_default_path().await?;
    let plans = store.list_plans().await?;

    if plans.is_empty() {
        println!("No plan executions in history");
        return Ok(());
    }

    for plan in plans.iter().take(cmd.limit) {
        let ended = plan
            .ended_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<12} {:<10} started {}  ended {}",
            plan.id,
            plan.plan_name,
            plan.status.as_str(),
            plan.started_at.to_rfc3339(),
            ended
        );
    }

    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn show_history(_cmd: &HistoryCommand) -> Result<()> {
    println!("History requires the sqlite feature");
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn build_store(in_memory: bool) -> Result<Arc<dyn ExecutionStore>> {
    if in_memory {
        Ok(Arc::new(InMemoryStore::new()))
    } else {
        Ok(Arc::new(
            store::SqliteExecutionStore::with_default_path().await?,
        ))
    }
}

#[cfg(not(feature = "sqlite"))]
async fn build_store(_in_memory: bool) -> Result<Arc<dyn ExecutionStore>> {
    Ok(Arc::new(InMemoryStore::new()))
}
