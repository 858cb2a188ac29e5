//! Type registries - frozen tag-to-implementation maps
//!
//! Every pluggable behavior in the engine (step running, facilitation,
//! advising, reference resolution, status-update handling) is dispatched
//! through a registry: populated once at process start from registrar
//! contributions, read-only afterward.

pub mod registrar;

pub use registrar::{Registrar, Registries, RegistrySet};

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by registry population and lookup. Both are configuration
/// errors: fatal, surfaced immediately, never retried.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate registration of tag '{tag}' in {kind} registry")]
    DuplicateTag { kind: &'static str, tag: String },

    #[error("no implementation registered for tag '{tag}' in {kind} registry")]
    UnknownTag { kind: &'static str, tag: String },
}

/// A frozen map from a type tag to exactly one behavior implementation.
///
/// Lookups need no synchronization: the map is never mutated after
/// `RegistryBuilder::freeze`.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Return the implementation bound to `tag`. An unknown tag is a
    /// configuration error: all tags must be known at startup.
    pub fn obtain(&self, tag: &str) -> Result<Arc<T>, RegistryError> {
        self.entries
            .get(tag)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTag {
                kind: self.kind,
                tag: tag.to_string(),
            })
    }

    /// Optional lookup for dispatch sites where an absent tag means
    /// "nothing to do" rather than a configuration error.
    pub fn find(&self, tag: &str) -> Option<Arc<T>> {
        self.entries.get(tag).cloned()
    }

    /// All registered tags, in no particular order.
    pub fn tags(&self) -> Vec<&str> {
        self.entries.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Working set used during the one-time, single-threaded population phase.
pub struct RegistryBuilder<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> RegistryBuilder<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Add a `(tag, implementation)` pair. Registering a tag that already
    /// exists is a startup-time fatal error, not deferred to request time.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        implementation: Arc<T>,
    ) -> Result<(), RegistryError> {
        let tag = tag.into();
        if self.entries.contains_key(&tag) {
            return Err(RegistryError::DuplicateTag {
                kind: self.kind,
                tag,
            });
        }
        self.entries.insert(tag, implementation);
        Ok(())
    }

    /// Seal the working set into a read-only registry.
    pub fn freeze(self) -> Registry<T> {
        Registry {
            kind: self.kind,
            entries: self.entries,
        }
    }
}
