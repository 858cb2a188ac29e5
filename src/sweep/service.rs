//! The sweeping-output service: publish and scoped resolution

use crate::core::{Ambiance, SweepingOutputInstance};
use crate::error::EngineError;
use crate::store::{ExecutionStore, StoreError};
use crate::sweep::expression::{ExpressionEvaluator, SweepExpressionEvaluator};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Publishes and resolves sweeping outputs against the execution store.
///
/// Publish is append-only and durable before returning; resolution is
/// read-only. Resolution never waits for a pending publish: a miss fails
/// immediately and callers re-invoke later if they want to poll.
pub struct SweepingOutputService {
    store: Arc<dyn ExecutionStore>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl SweepingOutputService {
    pub fn new(store: Arc<dyn ExecutionStore>, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { store, evaluator }
    }

    /// Service wired to the built-in `<+sweep.name>` evaluator.
    pub fn with_default_evaluator(store: Arc<dyn ExecutionStore>) -> Self {
        let evaluator = Arc::new(SweepExpressionEvaluator::new(store.clone()));
        Self::new(store, evaluator)
    }

    /// Publish a named value at the scope obtained by keeping the first
    /// `levels_to_keep` levels of the publishing node's ambiance.
    ///
    /// A collision on `(plan, name, exact scope path)` is reported as a
    /// duplicate-output failure; the previously published value stays
    /// untouched.
    pub async fn consume(
        &self,
        plan_execution_id: Uuid,
        ambiance: &Ambiance,
        name: &str,
        value: serde_json::Value,
        levels_to_keep: usize,
    ) -> Result<Uuid, EngineError> {
        let levels = ambiance.truncated(levels_to_keep);
        let record = SweepingOutputInstance::new(plan_execution_id, name, levels, value);
        let id = record.id;

        match self.store.insert_output(&record).await {
            Ok(()) => {
                debug!(
                    name,
                    scope = %record.level_index,
                    "published sweeping output"
                );
                Ok(id)
            }
            Err(StoreError::DuplicateOutput { name, scope }) => {
                debug!(name = %name, scope = %scope, "sweeping output already published");
                Err(EngineError::DuplicateOutput { name, scope })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a reference from the requesting node's position.
    ///
    /// A plain name is matched against every output of the plan with that
    /// name whose scope is an ancestor-prefix of the requester's ambiance;
    /// the deepest such scope wins. An expression is handed to the
    /// evaluator, which performs the same name-based resolution for any
    /// sweeping-output reference it contains.
    pub async fn resolve(
        &self,
        plan_execution_id: Uuid,
        ambiance: &Ambiance,
        reference: &str,
    ) -> Result<serde_json::Value, EngineError> {
        self.resolve_optional(plan_execution_id, ambiance, reference)
            .await?
            .ok_or_else(|| EngineError::OutputNotFound(reference.to_string()))
    }

    /// Like [`resolve`](Self::resolve) but reports a miss as `None`.
    pub async fn resolve_optional(
        &self,
        plan_execution_id: Uuid,
        ambiance: &Ambiance,
        reference: &str,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        if is_expression(reference) {
            return self
                .evaluator
                .evaluate(reference, plan_execution_id, ambiance)
                .await;
        }

        Ok(
            resolve_name(self.store.as_ref(), plan_execution_id, ambiance, reference)
                .await?
                .map(|record| record.value),
        )
    }
}

/// Whether a reference carries expression syntax rather than a plain name.
pub(crate) fn is_expression(reference: &str) -> bool {
    reference.contains("<+")
}

/// Name-based scoped resolution shared by the service and the built-in
/// evaluator: among outputs named `name`, the one whose level index is the
/// deepest ancestor-prefix of `ambiance` wins.
pub(crate) async fn resolve_name(
    store: &dyn ExecutionStore,
    plan_execution_id: Uuid,
    ambiance: &Ambiance,
    name: &str,
) -> Result<Option<SweepingOutputInstance>, StoreError> {
    let candidates = store.outputs_named(plan_execution_id, name).await?;
    let visible: HashSet<String> = ambiance.ancestor_indices().into_iter().collect();

    Ok(candidates
        .into_iter()
        .filter(|record| visible.contains(&record.level_index))
        .max_by_key(|record| record.levels.depth()))
}
