//! Process-wide default store used by default guard configurations.
//!
//! Guards always hold an explicit store handle; this registry only supplies
//! one to `GuardConfig::default_params()` at the moment it is called.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::store::Store;

static DEFAULT_STORE: Lazy<RwLock<Option<Arc<dyn Store>>>> = Lazy::new(|| RwLock::new(None));

/// Register the default store, replacing any previous one.
pub fn init(store: Arc<dyn Store>) {
    let mut slot = DEFAULT_STORE.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(store);
    tracing::debug!("default store registered");
}

/// Forget the default store.
pub fn reset() {
    let mut slot = DEFAULT_STORE.write().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

/// Currently registered default store, if any.
pub fn default_store() -> Option<Arc<dyn Store>> {
    DEFAULT_STORE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}
