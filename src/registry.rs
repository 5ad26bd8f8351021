//! Name → algorithm resolution with a process-lifetime cache.
//!
//! The first `resolve` of a name builds the unit from its factory and caches
//! it; later calls hand out the same `Arc`. Parameter edits made through one
//! handle are therefore visible to every chain holding that name.
//!
//! No registry lock is held while a factory runs, so a factory may resolve
//! other names. A factory that resolves its own name deadlocks.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, info};

use crate::algorithms;
use crate::error::VisionError;
use crate::pipeline::Algorithm;

pub type Factory = Box<dyn Fn() -> Result<Arc<dyn Algorithm>> + Send + Sync>;

type Slot = Arc<OnceCell<Arc<dyn Algorithm>>>;

static GLOBAL: Lazy<Arc<AlgorithmRegistry>> = Lazy::new(|| Arc::new(AlgorithmRegistry::with_builtin()));

#[derive(Default)]
pub struct AlgorithmRegistry {
    catalog: Mutex<BTreeMap<String, Arc<Factory>>>,
    loaded: Mutex<HashMap<String, Slot>>,
}

impl AlgorithmRegistry {
    /// Empty catalog, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in units; nothing is loaded yet.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        algorithms::register_builtin(&registry);
        registry
    }

    /// The process-wide registry.
    pub fn global() -> Arc<AlgorithmRegistry> {
        GLOBAL.clone()
    }

    /// Make `name` resolvable. Replacing a factory does not evict a unit
    /// that was already loaded under that name.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Algorithm>> + Send + Sync + 'static,
    {
        lock(&self.catalog).insert(name.to_string(), Arc::new(Box::new(factory)));
    }

    /// Names that can be resolved, sorted.
    pub fn available(&self) -> Vec<String> {
        lock(&self.catalog).keys().cloned().collect()
    }

    /// A unit that was already loaded, without loading it.
    pub fn loaded(&self, name: &str) -> Option<Arc<dyn Algorithm>> {
        lock(&self.loaded).get(name).and_then(|slot| slot.get().cloned())
    }

    pub fn loaded_count(&self) -> usize {
        lock(&self.loaded).values().filter(|slot| slot.get().is_some()).count()
    }

    /// Shared instance for `name`, loading it on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Algorithm>, VisionError> {
        let slot = {
            let mut loaded = lock(&self.loaded);
            if let Some(unit) = loaded.get(name).and_then(|slot| slot.get()) {
                return Ok(unit.clone());
            }
            if !lock(&self.catalog).contains_key(name) {
                return Err(VisionError::UnknownAlgorithm(name.to_string()));
            }
            loaded.entry(name.to_string()).or_default().clone()
        };

        // Racing resolves of one name wait on the slot; only one runs the factory.
        let unit = slot.get_or_try_init(|| {
            let factory = lock(&self.catalog)
                .get(name)
                .cloned()
                .ok_or_else(|| VisionError::UnknownAlgorithm(name.to_string()))?;
            debug!(algorithm = name, "loading algorithm");
            let unit = factory().map_err(|source| VisionError::AlgorithmLoad {
                name: name.to_string(),
                source,
            })?;
            info!(algorithm = name, settings = unit.settings().len(), "algorithm loaded");
            Ok::<_, VisionError>(unit)
        })?;
        Ok(unit.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
