//! Registrar contributions and the per-kind registry set

use crate::execution::contract::{
    Adviser, Facilitator, OutputResolver, StatusUpdateHandler, StepRunner,
};
use crate::registry::{Registry, RegistryBuilder, RegistryError};
use std::sync::Arc;

/// A startup-time contributor of tag-to-implementation bindings.
///
/// Every registered registrar is asked once, during the single-threaded
/// population phase, to add its pairs into the shared working set.
pub trait Registrar: Send + Sync {
    fn register(&self, set: &mut RegistrySet) -> Result<(), RegistryError>;
}

/// The shared working set registrars populate, one builder per registry
/// kind. Frozen into [`Registries`] before the engine starts.
pub struct RegistrySet {
    pub steps: RegistryBuilder<dyn StepRunner>,
    pub facilitators: RegistryBuilder<dyn Facilitator>,
    pub advisers: RegistryBuilder<dyn Adviser>,
    pub resolvers: RegistryBuilder<dyn OutputResolver>,
    pub status_handlers: RegistryBuilder<dyn StatusUpdateHandler>,
}

impl RegistrySet {
    pub fn new() -> Self {
        Self {
            steps: RegistryBuilder::new("step"),
            facilitators: RegistryBuilder::new("facilitator"),
            advisers: RegistryBuilder::new("adviser"),
            resolvers: RegistryBuilder::new("resolver"),
            status_handlers: RegistryBuilder::new("event-handler"),
        }
    }

    /// Ask each registrar for its contributions, then freeze. Any
    /// duplicate tag aborts population immediately.
    pub fn populate(registrars: &[Arc<dyn Registrar>]) -> Result<Registries, RegistryError> {
        let mut set = RegistrySet::new();
        for registrar in registrars {
            registrar.register(&mut set)?;
        }
        Ok(set.freeze())
    }

    /// Seal every working set into its read-only registry.
    pub fn freeze(self) -> Registries {
        Registries {
            steps: self.steps.freeze(),
            facilitators: self.facilitators.freeze(),
            advisers: self.advisers.freeze(),
            resolvers: self.resolvers.freeze(),
            status_handlers: self.status_handlers.freeze(),
        }
    }
}

impl Default for RegistrySet {
    fn default() -> Self {
        Self::new()
    }
}

/// The frozen registries the engine dispatches through. Read-only after
/// startup; lookups need no synchronization.
pub struct Registries {
    pub steps: Registry<dyn StepRunner>,
    pub facilitators: Registry<dyn Facilitator>,
    pub advisers: Registry<dyn Adviser>,
    pub resolvers: Registry<dyn OutputResolver>,
    pub status_handlers: Registry<dyn StatusUpdateHandler>,
}
