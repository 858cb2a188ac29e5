//! Sweeping outputs - scoped named values published by nodes
//!
//! A node publishes a named value visible to itself and its ancestors'
//! scope; any later node resolves it by exact name (deepest visible scope
//! wins) or through an expression.

pub mod expression;
pub mod service;

pub use expression::{ExpressionEvaluator, SweepExpressionEvaluator};
pub use service::SweepingOutputService;
