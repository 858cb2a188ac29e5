//! Execution engine - the state machine over plan and node records

pub mod contract;
pub mod engine;
pub mod interrupt;
pub mod propagation;
pub mod status_update;

pub use contract::{
    Advice, Adviser, AdvisingEvent, FacilitationMode, Facilitator, OutputDeclaration,
    OutputResolver, StatusUpdateEvent, StatusUpdateHandler, StepContext, StepOutcome, StepRunner,
};
pub use engine::Engine;
pub use interrupt::InterruptManager;
pub use propagation::{AppliedEffect, PropagationError, StatusPropagator};
pub use status_update::{PausedStatusHandler, TerminalStatusHandler};
