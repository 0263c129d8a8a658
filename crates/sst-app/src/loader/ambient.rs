use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use super::{Capability, LoadedCapability};

/// Capabilities already attached to the running process, e.g. by an earlier
/// script load. Checked after the module tier is exhausted.
#[derive(Default)]
pub struct AmbientRegistry {
    entries: RwLock<HashMap<Capability, LoadedCapability>>,
}

impl AmbientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> Arc<AmbientRegistry> {
        static GLOBAL: OnceLock<Arc<AmbientRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(AmbientRegistry::new())).clone()
    }

    pub fn register(&self, loaded: LoadedCapability) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(loaded.capability(), loaded);
    }

    pub fn get(&self, capability: Capability) -> Option<LoadedCapability> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&capability).cloned()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.get(capability).is_some()
    }
}

impl fmt::Debug for AmbientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_set().entries(entries.keys()).finish()
    }
}
