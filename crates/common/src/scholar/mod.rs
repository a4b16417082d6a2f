//! External metadata source abstraction
//!
//! Provides a unified interface for resolving publication metadata:
//! - Semantic Scholar Graph API client
//! - Static in-process fetcher for tests and offline runs
//! - Identifier normalization for DOI and ArXiv inputs

mod client;
mod ids;

pub use client::{SemanticScholarClient, PAPER_FIELDS};
pub use ids::{normalize_arxiv, normalize_doi};

use crate::errors::{AppError, Result};
use crate::models::Publication;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Trait for resolving publication metadata from an external service
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Resolve a single id (`<paperId>`, `DOI:<doi>`, `ARXIV:<id>`) into a full record
    async fn fetch(&self, id: &str) -> Result<Publication>;

    /// Keyword search returning at most `limit` full records
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Publication>>;
}

/// Fetcher backed by a fixed set of publications
///
/// Counts calls per id and can delay or fail selected ids.
#[derive(Default)]
pub struct StaticFetcher {
    publications: HashMap<String, Publication>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(publications: impl IntoIterator<Item = Publication>) -> Self {
        Self {
            publications: publications
                .into_iter()
                .map(|p| (p.paper_id.clone(), p))
                .collect(),
            ..Self::default()
        }
    }

    /// Serve `publication` for `id` even if its own `paper_id` differs
    pub fn with_alias(mut self, id: impl Into<String>, publication: Publication) -> Self {
        self.publications.insert(id.into(), publication);
        self
    }

    /// Make every fetch of `id` fail with an upstream error
    pub fn with_failure(mut self, id: impl Into<String>) -> Self {
        self.failing.insert(id.into());
        self
    }

    /// Sleep before answering each fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches issued for `id`
    pub fn calls_for(&self, id: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of fetches issued overall
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn lookup(&self, id: &str) -> Option<&Publication> {
        if let Some(found) = self.publications.get(id) {
            return Some(found);
        }
        let (scheme, value) = id.split_once(':')?;
        self.publications.values().find(|p| match scheme {
            "DOI" => p.doi() == Some(value),
            "ARXIV" => p.arxiv() == Some(value),
            _ => false,
        })
    }
}

#[async_trait]
impl MetadataFetcher for StaticFetcher {
    async fn fetch(&self, id: &str) -> Result<Publication> {
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(id.to_string()).or_insert(0) += 1;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(id) {
            return Err(AppError::Upstream {
                message: format!("fetch of {} failed", id),
            });
        }

        self.lookup(id)
            .cloned()
            .ok_or_else(|| AppError::PaperNotFound { id: id.to_string() })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Publication>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<Publication> = self
            .publications
            .values()
            .filter(|p| p.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.paper_id.cmp(&b.paper_id));
        hits.truncate(limit);
        Ok(hits)
    }
}
