//! Expression evaluation seam for sweeping-output references

use crate::core::Ambiance;
use crate::error::EngineError;
use crate::store::ExecutionStore;
use crate::sweep::service::resolve_name;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

/// Evaluates an expression string from a node's position in the tree.
///
/// The engine calls into the evaluator but does not implement expression
/// syntax itself; an evaluator that cannot resolve the expression to an
/// output value returns `None`.
#[async_trait]
pub trait ExpressionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        expression: &str,
        plan_execution_id: Uuid,
        ambiance: &Ambiance,
    ) -> Result<Option<serde_json::Value>, EngineError>;
}

/// Built-in evaluator for `<+sweep.name>` references.
///
/// A sweeping-output reference inside the expression is resolved with the
/// same scoped name lookup the service uses. An expression that is exactly
/// one reference yields the output value as-is; a reference embedded in
/// surrounding text is spliced in as its string rendering.
pub struct SweepExpressionEvaluator {
    store: Arc<dyn ExecutionStore>,
    reference: Regex,
}

impl SweepExpressionEvaluator {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            // compiled once; the pattern is a literal
            reference: Regex::new(r"<\+sweep\.([A-Za-z0-9_][A-Za-z0-9_.\-]*)>")
                .expect("sweep reference pattern is valid"),
        }
    }

    fn render(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl ExpressionEvaluator for SweepExpressionEvaluator {
    async fn evaluate(
        &self,
        expression: &str,
        plan_execution_id: Uuid,
        ambiance: &Ambiance,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        // Whole expression is a single reference: hand the value through
        // without stringifying.
        if let Some(captures) = self.reference.captures(expression) {
            let whole = captures
                .get(0)
                .map(|m| m.as_str() == expression)
                .unwrap_or(false);
            if whole {
                let name = &captures[1];
                let found =
                    resolve_name(self.store.as_ref(), plan_execution_id, ambiance, name).await?;
                return Ok(found.map(|record| record.value));
            }
        } else {
            // No sweeping-output reference: nothing for this evaluator.
            return Ok(None);
        }

        // References embedded in surrounding text: splice each one in.
        let mut rendered = String::with_capacity(expression.len());
        let mut last_end = 0;
        for captures in self.reference.captures_iter(expression) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let name = &captures[1];

            let found =
                resolve_name(self.store.as_ref(), plan_execution_id, ambiance, name).await?;
            let value = match found {
                Some(record) => record.value,
                None => return Err(EngineError::OutputNotFound(name.to_string())),
            };

            rendered.push_str(&expression[last_end..whole.start()]);
            rendered.push_str(&Self::render(&value));
            last_end = whole.end();
        }
        rendered.push_str(&expression[last_end..]);

        Ok(Some(serde_json::Value::String(rendered)))
    }
}
