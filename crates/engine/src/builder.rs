//! Citation tree builder
//!
//! Expands a root publication's references level by level. Each node's
//! reference list is split into contiguous shards resolved concurrently;
//! the node waits for every shard before building its children, then
//! descends into each child in turn. Recursion stops at the requested depth
//! whether or not the citation graph has cycles.

use crate::cache::ResolutionCache;
use crate::resolver::ReferenceResolver;
use citetree_common::config::TreeConfig;
use citetree_common::metrics;
use citetree_common::models::ReferenceStub;
use citetree_common::{
    AppError, MetadataFetcher, Publication, PublicationStore, Result, TreeNode,
};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

/// A validated build request
///
/// Construction rejects an empty root id and a depth outside
/// `1..=depth_limit`, so a builder never starts on malformed input.
#[derive(Debug, Clone)]
pub struct TreeRequest {
    root: Publication,
    max_depth: usize,
}

impl TreeRequest {
    pub fn new(root: Publication, max_depth: i64, depth_limit: usize) -> Result<Self> {
        if root.paper_id.trim().is_empty() {
            return Err(AppError::Validation {
                message: "root publication has no paperId".to_string(),
                field: Some("id".to_string()),
            });
        }
        let max_depth = Self::check_depth(max_depth, depth_limit)?;

        Ok(Self { root, max_depth })
    }

    /// Validate a requested depth against `1..=depth_limit`
    pub fn check_depth(max_depth: i64, depth_limit: usize) -> Result<usize> {
        if max_depth < 1 {
            return Err(AppError::Validation {
                message: format!("maxDepth must be at least 1, got {}", max_depth),
                field: Some("maxDepth".to_string()),
            });
        }
        let max_depth = max_depth as usize;
        if max_depth > depth_limit {
            return Err(AppError::Validation {
                message: format!("maxDepth {} exceeds the limit of {}", max_depth, depth_limit),
                field: Some("maxDepth".to_string()),
            });
        }
        Ok(max_depth)
    }

    pub fn root(&self) -> &Publication {
        &self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Builder tuning
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Shards per expansion step
    pub workers: usize,
    /// Deadline for each upstream fetch
    pub fetch_timeout: Duration,
}

impl From<&TreeConfig> for BuilderConfig {
    fn from(config: &TreeConfig) -> Self {
        Self {
            workers: config.worker_count(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::from(&TreeConfig::default())
    }
}

pub struct CitationTreeBuilder {
    store: Arc<dyn PublicationStore>,
    fetcher: Arc<dyn MetadataFetcher>,
    config: BuilderConfig,
}

impl CitationTreeBuilder {
    pub fn new(
        store: Arc<dyn PublicationStore>,
        fetcher: Arc<dyn MetadataFetcher>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    pub fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Build one tree with a fresh resolution cache.
    ///
    /// Never fails: references that cannot be resolved are left out.
    #[instrument(
        skip_all,
        fields(
            build_id = %Uuid::now_v7(),
            root = %request.root().paper_id,
            max_depth = request.max_depth()
        )
    )]
    pub async fn build(&self, request: &TreeRequest, cancel: &CancellationToken) -> TreeNode {
        let cache = Arc::new(ResolutionCache::new());
        self.build_with_cache(request, cache, cancel).await
    }

    /// Build one tree per request, sharing a single cache across the batch
    #[instrument(skip_all, fields(build_id = %Uuid::now_v7(), roots = requests.len()))]
    pub async fn build_forest(
        &self,
        requests: &[TreeRequest],
        cancel: &CancellationToken,
    ) -> Vec<TreeNode> {
        let cache = Arc::new(ResolutionCache::new());
        let mut trees = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            debug!(index, root = %request.root().paper_id, "Building tree for search hit");
            trees.push(self.build_with_cache(request, cache.clone(), cancel).await);
        }

        trees
    }

    async fn build_with_cache(
        &self,
        request: &TreeRequest,
        cache: Arc<ResolutionCache>,
        cancel: &CancellationToken,
    ) -> TreeNode {
        let start = Instant::now();
        let resolver = Arc::new(ReferenceResolver::new(
            self.store.clone(),
            self.fetcher.clone(),
            cache.clone(),
            self.config.fetch_timeout,
        ));

        let root = request.root();
        let mut node = TreeNode::from(root);
        node.children = self
            .expand(
                resolver,
                root.references.clone(),
                vec![root.paper_id.clone()],
                1,
                request.max_depth(),
                cancel.clone(),
            )
            .await;

        let elapsed = start.elapsed();
        let node_count = node.node_count();
        metrics::record_tree_build(elapsed.as_secs_f64(), node_count, request.max_depth());
        let cached = cache.entry_count().await;
        info!(
            nodes = node_count,
            cached = cached,
            cancelled = cancel.is_cancelled(),
            elapsed_ms = elapsed.as_millis() as u64,
            "All citations have been computed"
        );

        node
    }

    /// Resolve `references` at `depth` and recurse into every resolved child.
    fn expand(
        &self,
        resolver: Arc<ReferenceResolver>,
        references: Vec<ReferenceStub>,
        ancestors: Vec<String>,
        depth: usize,
        max_depth: usize,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Vec<TreeNode>> {
        async move {
            if depth > max_depth || cancel.is_cancelled() {
                return Vec::new();
            }

            let resolved = self
                .fan_out(&resolver, &references, &ancestors, &cancel)
                .await;

            let mut children = Vec::with_capacity(resolved.len());
            for publication in resolved {
                let mut child = TreeNode::from(&publication);

                let mut chain = ancestors.clone();
                chain.push(child.paper_id.clone());

                child.children = self
                    .expand(
                        resolver.clone(),
                        publication.references,
                        chain,
                        depth + 1,
                        max_depth,
                        cancel.clone(),
                    )
                    .await;
                children.push(child);
            }

            children
        }
        .boxed()
    }

    /// One resolver task per shard, joined in shard order.
    async fn fan_out(
        &self,
        resolver: &Arc<ReferenceResolver>,
        references: &[ReferenceStub],
        ancestors: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Publication> {
        let shards = partition(references, self.workers());

        let tasks = shards.into_iter().map(|shard| {
            let resolver = resolver.clone();
            let shard = shard.to_vec();
            let ancestors = ancestors.to_vec();
            let cancel = cancel.clone();
            tokio::spawn(
                async move { resolver.resolve_batch(&shard, &ancestors, &cancel).await }
                    .in_current_span(),
            )
        });

        let mut resolved = Vec::with_capacity(references.len());
        for (shard, outcome) in join_all(tasks).await.into_iter().enumerate() {
            match outcome {
                Ok(batch) => resolved.extend(batch),
                Err(e) => warn!(shard, error = %e, "Shard worker failed, dropping its references"),
            }
        }

        resolved
    }
}

/// Split `items` into `shards` contiguous slices.
///
/// Slice `i` covers `[i*n/shards, (i+1)*n/shards)`, so sizes differ by at most
/// one and trailing slices may be empty when there are fewer items than shards.
pub fn partition<T>(items: &[T], shards: usize) -> Vec<&[T]> {
    let shards = shards.max(1);
    let n = items.len();
    (0..shards)
        .map(|i| &items[i * n / shards..(i + 1) * n / shards])
        .collect()
}
