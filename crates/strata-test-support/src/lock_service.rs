//! In-memory `LockService` backed by one async mutex per registered key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strata_core::error::{LockError, StoreError};
use strata_core::repository::LockService;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::fault::FaultPlan;

/// Registered keys and their locks.
#[derive(Debug, Default)]
pub struct InMemoryLockService {
    keys: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    faults: FaultPlan,
}

impl InMemoryLockService {
    /// Creates a service with no registered keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault plan consulted by every operation.
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    fn registered(&self, key: &str) -> Option<Arc<AsyncMutex<()>>> {
        self.keys.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn ensure_registered(&self, key: &str) -> Result<(), StoreError> {
        self.faults
            .check(0)
            .map_err(|fault| StoreError::from_fault("ensure_lock_key", fault))?;
        self.keys
            .lock()
            .unwrap()
            .entry(key.to_owned())
            .or_insert_with(|| {
                debug!(key, "lock key registered");
                Arc::default()
            });
        Ok(())
    }

    async fn with_lock<F, Fut, T, E>(&self, key: &str, action: F) -> Result<T, LockError<E>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        self.faults
            .check(0)
            .map_err(|fault| StoreError::from_fault("with_lock", fault))?;
        let lock = self
            .registered(key)
            .ok_or_else(|| StoreError::LockKeyNotRegistered(key.to_owned()))?;

        let _guard = lock.lock().await;
        action().await.map_err(LockError::Action)
    }
}
