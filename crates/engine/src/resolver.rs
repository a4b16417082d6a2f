//! Reference resolution
//!
//! Turns reference stubs into full publications, consulting the build's
//! cache, then the persistent store, then the upstream metadata source.
//! Any failure drops the single reference; a batch never fails as a whole.

use crate::cache::ResolutionCache;
use citetree_common::metrics::{self, ResolutionSource};
use citetree_common::models::ReferenceStub;
use citetree_common::{AppError, LookupField, MetadataFetcher, Publication, PublicationStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ReferenceResolver {
    store: Arc<dyn PublicationStore>,
    fetcher: Arc<dyn MetadataFetcher>,
    cache: Arc<ResolutionCache>,
    fetch_timeout: Duration,
}

impl ReferenceResolver {
    pub fn new(
        store: Arc<dyn PublicationStore>,
        fetcher: Arc<dyn MetadataFetcher>,
        cache: Arc<ResolutionCache>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            cache,
            fetch_timeout,
        }
    }

    /// Resolve a shard of references in order, skipping the ones that fail.
    pub async fn resolve_batch(
        &self,
        stubs: &[ReferenceStub],
        ancestors: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Publication> {
        let mut resolved = Vec::with_capacity(stubs.len());

        for (index, stub) in stubs.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(remaining = stubs.len() - index, "Build cancelled, stopping shard");
                break;
            }
            if let Some(publication) = self.resolve_one(stub, ancestors, cancel).await {
                resolved.push(publication);
            }
        }

        resolved
    }

    /// Resolve a single reference
    pub async fn resolve_one(
        &self,
        stub: &ReferenceStub,
        ancestors: &[String],
        cancel: &CancellationToken,
    ) -> Option<Publication> {
        if !stub.is_resolvable() {
            debug!(title = %stub.title, "Skipping reference without paperId");
            metrics::record_resolution(ResolutionSource::Omitted);
            return None;
        }

        let id = stub.paper_id.as_str();
        if let Some(hit) = self.cache.get(id).await {
            metrics::record_resolution(ResolutionSource::Cache);
            return Some(hit);
        }

        self.cache
            .single_flight(id, || self.resolve_uncached(id, ancestors, cancel))
            .await
    }

    async fn resolve_uncached(
        &self,
        id: &str,
        ancestors: &[String],
        cancel: &CancellationToken,
    ) -> Option<Publication> {
        // Another flight may have filled the cache between our miss and now.
        if let Some(hit) = self.cache.get(id).await {
            metrics::record_resolution(ResolutionSource::Cache);
            return Some(hit);
        }

        match self.store.find(LookupField::PaperId, id).await {
            Ok(Some(stored)) => {
                metrics::record_resolution(ResolutionSource::Store);
                return Some(stored);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(paper_id = %id, error = %e, "Store lookup failed, omitting reference");
                metrics::record_resolution(ResolutionSource::Omitted);
                return None;
            }
        }

        let mut publication = match self.fetch(id, cancel).await {
            Ok(publication) => publication,
            Err(AppError::Cancelled) => {
                debug!(paper_id = %id, "Fetch abandoned on cancellation");
                metrics::record_resolution(ResolutionSource::Omitted);
                return None;
            }
            Err(e) => {
                warn!(paper_id = %id, error = %e, "Error while retrieving paper from upstream");
                metrics::record_resolution(ResolutionSource::Omitted);
                return None;
            }
        };

        publication.ancestors = ancestors.to_vec();
        if publication.paper_id.is_empty() {
            info!(paper_id = %id, "Upstream returned an empty paperId, using the reference id");
            publication.paper_id = id.to_string();
        }

        if let Err(e) = self.store.insert(&publication).await {
            warn!(
                paper_id = %publication.paper_id,
                error = %e,
                "Failed to persist fetched paper, omitting reference"
            );
            metrics::record_resolution(ResolutionSource::Omitted);
            return None;
        }

        if publication.paper_id != id {
            self.cache.put(id, publication.clone()).await;
        }
        self.cache
            .put(publication.paper_id.clone(), publication.clone())
            .await;

        metrics::record_resolution(ResolutionSource::Upstream);
        Some(publication)
    }

    /// Upstream fetch bounded by the per-fetch deadline and the build's token
    async fn fetch(&self, id: &str, cancel: &CancellationToken) -> citetree_common::Result<Publication> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            outcome = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(id)) => {
                outcome.unwrap_or_else(|_| {
                    Err(AppError::UpstreamTimeout {
                        timeout_ms: self.fetch_timeout.as_millis() as u64,
                    })
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citetree_common::db::InMemoryStore;
    use citetree_common::scholar::StaticFetcher;

    fn stub(id: &str) -> ReferenceStub {
        ReferenceStub {
            paper_id: id.to_string(),
            title: String::new(),
        }
    }

    fn resolver(
        store: Arc<InMemoryStore>,
        fetcher: Arc<StaticFetcher>,
    ) -> (ReferenceResolver, Arc<ResolutionCache>) {
        let cache = Arc::new(ResolutionCache::new());
        let resolver = ReferenceResolver::new(store, fetcher, cache.clone(), Duration::from_secs(5));
        (resolver, cache)
    }

    #[tokio::test]
    async fn test_empty_id_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(StaticFetcher::default());
        let (resolver, _) = resolver(store.clone(), fetcher.clone());

        let out = resolver
            .resolve_batch(&[stub(""), stub("")], &["root".to_string()], &CancellationToken::new())
            .await;

        assert!(out.is_empty());
        assert_eq!(store.lookup_count(), 0);
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store_and_upstream() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(StaticFetcher::default());
        let (resolver, cache) = resolver(store.clone(), fetcher.clone());
        cache.put("p2", Publication::new("p2", "Cached")).await;

        let out = resolver
            .resolve_one(&stub("p2"), &[], &CancellationToken::new())
            .await;

        assert_eq!(out.unwrap().title, "Cached");
        assert_eq!(store.lookup_count(), 0);
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_stored_record_returned_verbatim() {
        let mut stored = Publication::new("p3", "T3s");
        stored.ancestors = vec!["old-root".into()];
        let store = Arc::new(InMemoryStore::with_publications([stored.clone()]));
        let fetcher = Arc::new(StaticFetcher::new([Publication::new("p3", "Upstream")]));
        let (resolver, _) = resolver(store.clone(), fetcher.clone());

        let out = resolver
            .resolve_one(&stub("p3"), &["p1".to_string()], &CancellationToken::new())
            .await;

        assert_eq!(out.unwrap(), stored);
        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_fetched_record_is_stamped_and_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(StaticFetcher::new([Publication::new("p2", "T2")]));
        let (resolver, cache) = resolver(store.clone(), fetcher.clone());
        let chain = vec!["p1".to_string()];

        let out = resolver
            .resolve_one(&stub("p2"), &chain, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.ancestors, chain);
        assert_eq!(store.get("p2").await.unwrap().ancestors, chain);
        assert!(cache.get("p2").await.is_some());
        assert_eq!(fetcher.calls_for("p2"), 1);
    }

    #[tokio::test]
    async fn test_empty_upstream_id_is_substituted() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher =
            Arc::new(StaticFetcher::default().with_alias("p9", Publication::new("", "Nameless")));
        let (resolver, _) = resolver(store.clone(), fetcher);

        let out = resolver
            .resolve_one(&stub("p9"), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.paper_id, "p9");
        assert_eq!(store.get("p9").await.unwrap().title, "Nameless");
    }

    #[tokio::test]
    async fn test_failures_are_omitted_without_aborting_batch() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(
            StaticFetcher::new([Publication::new("ok", "Fine")]).with_failure("broken"),
        );
        let (resolver, _) = resolver(store, fetcher);

        let out = resolver
            .resolve_batch(
                &[stub("broken"), stub("missing"), stub("ok")],
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].paper_id, "ok");
    }

    #[tokio::test]
    async fn test_insert_failure_omits_item() {
        let store = Arc::new(InMemoryStore::new());
        store.set_fail_inserts(true);
        let fetcher = Arc::new(StaticFetcher::new([Publication::new("p2", "T2")]));
        let (resolver, cache) = resolver(store, fetcher.clone());

        let out = resolver
            .resolve_one(&stub("p2"), &[], &CancellationToken::new())
            .await;

        assert!(out.is_none());
        assert!(cache.get("p2").await.is_none());
        assert_eq!(fetcher.calls_for("p2"), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_omits_item() {
        let store = Arc::new(InMemoryStore::new());
        store.set_fail_lookups(true);
        let fetcher = Arc::new(StaticFetcher::new([Publication::new("p2", "T2")]));
        let (resolver, _) = resolver(store, fetcher.clone());

        let out = resolver
            .resolve_one(&stub("p2"), &[], &CancellationToken::new())
            .await;

        assert!(out.is_none());
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_slow_fetch_hits_deadline() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(
            StaticFetcher::new([Publication::new("slow", "Slow")]).with_delay(Duration::from_secs(5)),
        );
        let cache = Arc::new(ResolutionCache::new());
        let resolver =
            ReferenceResolver::new(store.clone(), fetcher, cache, Duration::from_millis(50));

        let out = resolver
            .resolve_one(&stub("slow"), &[], &CancellationToken::new())
            .await;

        assert!(out.is_none());
        assert_eq!(store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_batch() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(StaticFetcher::new([Publication::new("p2", "T2")]));
        let (resolver, _) = resolver(store, fetcher.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = resolver.resolve_batch(&[stub("p2")], &[], &cancel).await;

        assert!(out.is_empty());
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(
            StaticFetcher::new([Publication::new("p2", "T2")])
                .with_delay(Duration::from_millis(50)),
        );
        let cache = Arc::new(ResolutionCache::new());
        let resolver = Arc::new(ReferenceResolver::new(
            store.clone(),
            fetcher.clone(),
            cache,
            Duration::from_secs(5),
        ));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve_one(&stub("p2"), &[], &CancellationToken::new())
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        assert_eq!(fetcher.calls_for("p2"), 1);
        assert_eq!(store.insert_count(), 1);
    }
}
