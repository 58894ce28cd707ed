//! Single-flight execution: concurrent requests for the same key share one in-flight operation.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt::Debug, future::Future, hash::Hash, sync::Arc};

use crate::error::BuildError;

pub type SharedResult<T> = Shared<BoxFuture<'static, Result<T, BuildError>>>;

/// Table of in-flight operations keyed by a composite key (operation tag plus arguments).
///
/// An entry lives exactly as long as its operation runs. It is removed when the operation
/// completes, successfully or not, so a request made after completion starts a fresh execution
/// instead of reusing a stale result.
pub struct SingleFlight<K, T> {
    inflight: Arc<Mutex<HashMap<K, SharedResult<T>>>>,
}

impl<K, T> Clone for SingleFlight<K, T> {
    fn clone(&self) -> Self {
        SingleFlight {
            inflight: self.inflight.clone(),
        }
    }
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        SingleFlight {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the execution registered under `key`, or start `operation` and register it.
    ///
    /// Every caller that joins before completion observes the same result or the same error.
    pub fn once<F, Fut>(&self, key: K, operation: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BuildError>> + Send + 'static,
    {
        if let Some(existing) = self.inflight.lock().get(&key) {
            tracing::trace!("[SingleFlight] Joining {:?}", key);
            return existing.clone();
        }

        let table = self.inflight.clone();
        let registered = key.clone();
        let operation = operation();
        let execution = async move {
            let result = operation.await;
            table.lock().remove(&registered);
            result
        }
        .boxed()
        .shared();

        self.inflight.lock().entry(key).or_insert(execution).clone()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}
