//! Per-build resolution cache
//!
//! Maps publication id to the resolved record. Readers share the entry map;
//! writers take it exclusively. A second table tracks resolutions in flight
//! so that concurrent workers asking for the same uncached id wait on one
//! resolution instead of each going upstream.

use citetree_common::Publication;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, RwLock};

type Flight = Arc<OnceCell<Option<Publication>>>;

/// Cache owned by one tree build (or one forest build)
#[derive(Default)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, Publication>>,
    inflight: Mutex<HashMap<String, Flight>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a resolved publication
    pub async fn get(&self, id: &str) -> Option<Publication> {
        self.entries.read().await.get(id).cloned()
    }

    /// Record a resolved publication
    pub async fn put(&self, id: impl Into<String>, publication: Publication) {
        self.entries.write().await.insert(id.into(), publication);
    }

    /// Number of resolved ids held
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Run `resolve` at most once among concurrent callers for `id`.
    ///
    /// Callers arriving while a resolution is pending receive its outcome.
    /// The pending slot is dropped once settled, so later callers start over
    /// from the cache.
    pub async fn single_flight<F, Fut>(&self, id: &str, resolve: F) -> Option<Publication>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Publication>>,
    {
        let flight = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(id.to_string()).or_default().clone()
        };

        let outcome = flight.get_or_init(resolve).await.clone();

        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, &flight))
        {
            inflight.remove(id);
        }

        outcome
    }

    /// Ids with a resolution still pending
    #[cfg(test)]
    pub async fn pending(&self) -> usize {
        self.inflight.lock().await.len()
    }
}
