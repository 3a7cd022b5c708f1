//! In-use VM name bookkeeping.
//!
//! Every VM name is registered here for the duration of its job so the
//! janitor process reclaiming orphaned VMs never stops one that is still
//! in use. The set is shared by all handlers of the process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Process-wide set of VM names currently in use.
#[derive(Debug, Default)]
pub struct NameSet {
    names: Mutex<HashSet<String>>,
}

impl NameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: impl Into<String>) {
        self.lock().insert(name.into());
    }

    pub fn remove(&self, name: &str) {
        self.lock().remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Register a name for the lifetime of the returned guard. The name
    /// is removed on drop, on every exit path.
    pub fn reserve(self: &Arc<Self>, name: impl Into<String>) -> NameReservation {
        let name = name.into();
        self.add(name.clone());
        NameReservation {
            set: Arc::clone(self),
            name,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // A poisoned name set only happens when another handler panicked
        // mid-mutation; the set of plain strings is still coherent.
        self.names.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Scoped registration of one VM name.
#[derive(Debug)]
pub struct NameReservation {
    set: Arc<NameSet>,
    name: String,
}

impl NameReservation {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameReservation {
    fn drop(&mut self) {
        self.set.remove(&self.name);
    }
}
