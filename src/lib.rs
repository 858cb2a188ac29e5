//! planrun - a persistence-backed execution engine for compiled pipeline plans

pub mod builtin;
pub mod cli;
pub mod core;
pub mod error;
pub mod execution;
pub mod registry;
pub mod store;
pub mod sweep;

// Re-export commonly used types
pub use crate::core::{
    Ambiance, InterruptEffect, InterruptKind, Level, LevelKind, NodeExecution, PlanExecution,
    PlanLayout, PlanStatus, Status,
};
pub use error::EngineError;
pub use execution::{Engine, FacilitationMode, StepContext, StepOutcome, StepRunner};
pub use registry::{Registrar, Registries, RegistrySet};
pub use store::{ExecutionStore, InMemoryStore};
pub use sweep::SweepingOutputService;
