//! Engine error taxonomy

use crate::registry::RegistryError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine and the sweeping-output service.
///
/// Configuration errors (`Registry`) are fatal. Conflicts
/// (`DuplicateOutput`) and misses (`OutputNotFound`) are recoverable and
/// left to the caller to interpret.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not resolve output '{0}'")]
    OutputNotFound(String),

    #[error("duplicate output '{name}' at scope '{scope}'")]
    DuplicateOutput { name: String, scope: String },

    #[error("plan '{plan}' cannot run: {reason}")]
    InvalidPlan { plan: String, reason: String },

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Conflict errors are expected under concurrent publishes and mean
    /// "someone else already published this".
    pub fn is_duplicate_output(&self) -> bool {
        matches!(self, EngineError::DuplicateOutput { .. })
    }
}
