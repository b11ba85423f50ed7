// ABOUTME: Shared application state for the docbundle HTTP server.
// ABOUTME: Owns the store connection and runs blocking SQLite work off the async runtime.

use std::sync::Arc;

use docbundle_core::OrgId;
use docbundle_store::{BundleStore, RetryPolicy, StoreError};
use tokio::sync::Mutex;

use crate::api::ApiError;

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub store: Arc<Mutex<BundleStore>>,
    /// Org used when a request does not name one.
    pub default_org_id: Option<OrgId>,
    pub retry: RetryPolicy,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: BundleStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            default_org_id: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_default_org(mut self, org_id: Option<OrgId>) -> Self {
        self.default_org_id = org_id;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a store operation on the blocking pool while holding the store lock.
    pub async fn with_store<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut BundleStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || {
            let mut store = store.blocking_lock();
            op(&mut store)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?;

        Ok(result?)
    }
}
