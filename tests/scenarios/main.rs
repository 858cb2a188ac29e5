//! Scenario-based tests for the plan execution engine

mod helpers;

mod engine_run;
mod interrupt_idempotence;
mod output_scoping;
mod pause_propagation;
mod registry_closure;
