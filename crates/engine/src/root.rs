//! Root lookup
//!
//! Locates the publication a tree grows from. Unlike reference resolution,
//! every failure here is reported to the caller: without a root there is
//! nothing to build.

use citetree_common::scholar::{normalize_arxiv, normalize_doi};
use citetree_common::{
    AppError, LookupField, MetadataFetcher, Publication, PublicationStore, Result,
};
use tracing::{debug, info, instrument, warn};

/// External identifier a root is requested by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootQuery {
    Doi(String),
    ArXiv(String),
}

impl RootQuery {
    pub fn doi(raw: &str) -> Self {
        RootQuery::Doi(normalize_doi(raw))
    }

    pub fn arxiv(raw: &str) -> Self {
        RootQuery::ArXiv(normalize_arxiv(raw))
    }

    pub fn lookup_field(&self) -> LookupField {
        match self {
            RootQuery::Doi(_) => LookupField::Doi,
            RootQuery::ArXiv(_) => LookupField::ArXiv,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            RootQuery::Doi(value) | RootQuery::ArXiv(value) => value,
        }
    }

    /// Identifier form the Graph API accepts on `/paper/{id}`
    pub fn upstream_id(&self) -> String {
        match self {
            RootQuery::Doi(doi) => format!("DOI:{}", doi),
            RootQuery::ArXiv(id) => format!("ARXIV:{}", id),
        }
    }
}

/// Find the root in the store, or fetch and persist it.
#[instrument(skip(store, fetcher), fields(field = %query.lookup_field()))]
pub async fn locate_root(
    store: &dyn PublicationStore,
    fetcher: &dyn MetadataFetcher,
    query: &RootQuery,
) -> Result<Publication> {
    if query.value().is_empty() {
        return Err(AppError::MissingField {
            field: "id".to_string(),
        });
    }

    if let Some(stored) = store.find(query.lookup_field(), query.value()).await? {
        debug!(paper_id = %stored.paper_id, "Root served from store");
        return Ok(stored);
    }

    let mut root = fetcher.fetch(&query.upstream_id()).await?;
    if root.paper_id.is_empty() {
        return Err(AppError::Validation {
            message: format!("upstream returned no paperId for {}", query.upstream_id()),
            field: Some("id".to_string()),
        });
    }
    root.ancestors.clear();

    store.insert(&root).await?;
    info!(paper_id = %root.paper_id, "Root fetched and stored");
    Ok(root)
}

/// Keyword search, preferring stored records over fresh search hits.
#[instrument(skip(store, fetcher))]
pub async fn search_roots(
    store: &dyn PublicationStore,
    fetcher: &dyn MetadataFetcher,
    query: &str,
    limit: usize,
) -> Result<Vec<Publication>> {
    let hits = fetcher.search(query, limit).await?;
    let mut roots = Vec::with_capacity(hits.len());

    for hit in hits {
        if hit.paper_id.is_empty() {
            warn!(title = %hit.title, "Search hit without paperId, skipping");
            continue;
        }
        match store.find(LookupField::PaperId, &hit.paper_id).await? {
            Some(stored) => roots.push(stored),
            None => roots.push(hit),
        }
    }

    debug!(hits = roots.len(), "Search roots resolved");
    Ok(roots)
}
