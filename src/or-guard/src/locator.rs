//! Guard lookup by identifier
//!
//! The combinator never constructs guards itself. It asks a [`GuardLocator`]
//! for an instance of every configured identifier, once when it is built (to
//! reject unknown identifiers early) and again at the start of each evaluation.

use crate::error::{GuardError, Result};
use crate::guard::Guard;
use crate::types::GuardId;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Resolves guard identifiers to guard instances
pub trait GuardLocator<C>: Send + Sync {
    /// Resolve `id` to a runnable guard
    fn resolve(&self, id: &str) -> Result<Arc<dyn Guard<C>>>;
}

type GuardFactory<C> = Arc<dyn Fn() -> Arc<dyn Guard<C>> + Send + Sync>;

enum Registration<C> {
    /// Same instance on every resolution
    Shared(Arc<dyn Guard<C>>),
    /// Fresh instance on every resolution
    Factory(GuardFactory<C>),
}

impl<C> Clone for Registration<C> {
    fn clone(&self) -> Self {
        match self {
            Registration::Shared(guard) => Registration::Shared(Arc::clone(guard)),
            Registration::Factory(factory) => Registration::Factory(Arc::clone(factory)),
        }
    }
}

/// Thread-safe in-memory guard locator
pub struct GuardRegistry<C> {
    entries: DashMap<GuardId, Registration<C>>,
}

impl<C> GuardRegistry<C> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a shared guard instance, replacing any previous registration
    pub fn register<G>(&self, id: impl Into<GuardId>, guard: G)
    where
        G: Guard<C> + 'static,
    {
        let id = id.into();
        debug!("Registering guard: {}", id);
        self.entries.insert(id, Registration::Shared(Arc::new(guard)));
    }

    /// Register a factory producing a new guard on each resolution
    pub fn register_factory<F, G>(&self, id: impl Into<GuardId>, factory: F)
    where
        F: Fn() -> G + Send + Sync + 'static,
        G: Guard<C> + 'static,
    {
        let id = id.into();
        debug!("Registering guard factory: {}", id);
        let factory: GuardFactory<C> = Arc::new(move || Arc::new(factory()) as Arc<dyn Guard<C>>);
        self.entries.insert(id, Registration::Factory(factory));
    }

    /// Remove a registration, returning whether it existed
    pub fn unregister(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Check whether `id` is registered
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of registered guards
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C> Default for GuardRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for GuardRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardRegistry")
            .field("guards", &self.entries.len())
            .finish()
    }
}

impl<C> GuardLocator<C> for GuardRegistry<C>
where
    C: 'static,
{
    fn resolve(&self, id: &str) -> Result<Arc<dyn Guard<C>>> {
        // Clone out of the shard before calling a factory so user code never runs under the lock
        let registration = self
            .entries
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GuardError::NotRegistered(id.to_string()))?;

        Ok(match registration {
            Registration::Shared(guard) => guard,
            Registration::Factory(factory) => factory(),
        })
    }
}
