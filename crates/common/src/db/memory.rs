//! In-memory publication store
//!
//! Test double for `PublicationStore`. The gateway always runs against
//! Postgres. Counts calls and can be switched into failure modes to exercise
//! persistence error paths.

use crate::db::{LookupField, PublicationStore};
use crate::errors::{AppError, Result};
use crate::models::Publication;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Publication>>,
    lookups: AtomicUsize,
    inserts: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_inserts: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records
    pub fn with_publications(publications: impl IntoIterator<Item = Publication>) -> Self {
        let documents = publications
            .into_iter()
            .map(|p| (p.paper_id.clone(), p))
            .collect();
        Self {
            documents: RwLock::new(documents),
            ..Self::default()
        }
    }

    pub async fn get(&self, paper_id: &str) -> Option<Publication> {
        self.documents.read().await.get(paper_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Number of `find` calls so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of successful `insert` calls so far
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PublicationStore for InMemoryStore {
    async fn find(&self, field: LookupField, value: &str) -> Result<Option<Publication>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseConnection {
                message: "lookup failure injected".to_string(),
            });
        }

        let documents = self.documents.read().await;
        let found = match field {
            LookupField::PaperId => documents.get(value).cloned(),
            LookupField::Doi => documents.values().find(|p| p.doi() == Some(value)).cloned(),
            LookupField::ArXiv => documents.values().find(|p| p.arxiv() == Some(value)).cloned(),
        };
        Ok(found)
    }

    async fn insert(&self, publication: &Publication) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseConnection {
                message: "insert failure injected".to_string(),
            });
        }
        if publication.paper_id.is_empty() {
            return Err(AppError::InvalidFormat {
                message: "cannot store a publication without paperId".to_string(),
            });
        }

        self.documents
            .write()
            .await
            .insert(publication.paper_id.clone(), publication.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_by_each_field() {
        let mut paper = Publication::new("p1", "Attention");
        paper.external_ids.doi = Some("10.1/attn".into());
        paper.external_ids.arxiv = Some("1706.03762".into());
        let store = InMemoryStore::with_publications([paper]);

        let by_id = store.find(LookupField::PaperId, "p1").await.unwrap();
        let by_doi = store.find(LookupField::Doi, "10.1/attn").await.unwrap();
        let by_arxiv = store.find(LookupField::ArXiv, "1706.03762").await.unwrap();

        assert_eq!(by_id.unwrap().title, "Attention");
        assert_eq!(by_doi.unwrap().paper_id, "p1");
        assert_eq!(by_arxiv.unwrap().paper_id, "p1");
        assert!(store.find(LookupField::PaperId, "p2").await.unwrap().is_none());
        assert_eq!(store.lookup_count(), 4);
    }

    #[tokio::test]
    async fn test_insert_overwrites_ancestors() {
        let store = InMemoryStore::new();
        let mut paper = Publication::new("p1", "Title");
        paper.ancestors = vec!["root".into()];
        store.insert(&paper).await.unwrap();

        paper.ancestors = vec!["other".into(), "mid".into()];
        store.insert(&paper).await.unwrap();

        let stored = store.get("p1").await.unwrap();
        assert_eq!(stored.ancestors, vec!["other".to_string(), "mid".to_string()]);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.insert_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::new();
        store.set_fail_inserts(true);
        tokio_test::assert_err!(store.insert(&Publication::new("p1", "")).await);
        assert!(store.is_empty().await);

        store.set_fail_inserts(false);
        tokio_test::assert_ok!(store.insert(&Publication::new("p1", "")).await);

        store.set_fail_lookups(true);
        tokio_test::assert_err!(store.find(LookupField::PaperId, "p1").await);
    }

    #[tokio::test]
    async fn test_rejects_empty_id() {
        let store = InMemoryStore::new();
        let err = store.insert(&Publication::new("", "No id")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
    }
}
