//! Named entry points for interactive front ends.
//!
//! Front ends register a zero-argument entry function under a name; the
//! launcher resolves by name at startup. The registry is copy-on-write so
//! resolution never blocks registration.

use crate::launch::LaunchError;
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Name the built-in console registers under.
pub const CONSOLE_ENTRY: &str = "console";

pub type EntryFuture = Pin<Box<dyn Future<Output = crate::Result<()>> + Send>>;

/// A zero-argument entry function handing control to a front end.
pub type EntryPoint = fn() -> EntryFuture;

pub struct EntryRegistry {
    entries: ArcSwap<HashMap<String, EntryPoint>>,
}

impl EntryRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Register (or replace) an entry point under a name.
    pub fn register(&self, name: impl Into<String>, entry: EntryPoint) {
        let name = name.into();
        let current = self.entries.load();
        let mut updated: HashMap<String, EntryPoint> =
            current.iter().map(|(k, v)| (k.clone(), *v)).collect();
        updated.insert(name, entry);
        self.entries.store(Arc::new(updated));
    }

    /// Look up an entry point by name.
    pub fn resolve(&self, name: &str) -> Result<EntryPoint, LaunchError> {
        self.entries
            .load()
            .get(name)
            .copied()
            .ok_or_else(|| LaunchError::EntryPointNotFound {
                symbol: name.to_string(),
                hint: {
                    let mut names = self.names();
                    if names.is_empty() {
                        Some("no entry points are registered".to_string())
                    } else {
                        names.sort();
                        Some(format!("registered entry points: {}", names.join(", ")))
                    }
                },
            })
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.entries.load().keys().cloned().collect()
    }
}

impl Default for EntryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: Lazy<EntryRegistry> = Lazy::new(|| {
    let registry = EntryRegistry::new();
    registry.register(CONSOLE_ENTRY, crate::console::entry);
    registry
});

/// The process-wide registry. The built-in console is registered on first use.
pub fn global() -> &'static EntryRegistry {
    &GLOBAL_REGISTRY
}
