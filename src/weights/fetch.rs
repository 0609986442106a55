//! Process-wide weights facade.
//!
//! Holds the global [`WeightsStore`] and the [`fetch_weights`] provider the
//! launch path binds and the pipeline resolves through.

use super::error::WeightsError;
use super::store::{ModelWeights, WeightsStore};
use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};

static GLOBAL_STORE: Lazy<RwLock<Arc<WeightsStore>>> =
    Lazy::new(|| RwLock::new(Arc::new(WeightsStore::new())));

/// The process-wide weights store.
pub fn global_store() -> Arc<WeightsStore> {
    match GLOBAL_STORE.read() {
        Ok(store) => Arc::clone(&store),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// Replace the process-wide weights store. Mainly useful in tests and in
/// embedders that configure their own roots and mirror.
pub fn set_global_store(store: Arc<WeightsStore>) {
    match GLOBAL_STORE.write() {
        Ok(mut slot) => *slot = store,
        Err(poisoned) => *poisoned.into_inner() = store,
    }
}

/// Resolve weights by name through the process-wide store.
pub async fn fetch_weights(name: &str) -> Result<Arc<ModelWeights>, WeightsError> {
    global_store().resolve(name).await
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests below swap the process-wide store; serialize them.
    static STORE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn test_global_store_returns_same_instance() {
        let _guard = STORE_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let store = Arc::new(WeightsStore::new());
        store.ensure_root("/data/models");
        set_global_store(Arc::clone(&store));
        assert_eq!(global_store().search_roots(), store.search_roots());
        set_global_store(Arc::new(WeightsStore::new()));
    }

    #[tokio::test]
    async fn test_fetch_weights_uses_global_store() {
        let _guard = STORE_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        set_global_store(Arc::new(WeightsStore::new()));
        let err = fetch_weights("absent.pt").await.unwrap_err();
        assert!(matches!(err, WeightsError::NotFound { .. }));
    }
}
