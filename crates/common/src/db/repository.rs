//! Postgres-backed publication store
//!
//! Publications are kept as JSONB documents keyed by `paper_id`, with the
//! DOI and ArXiv identifiers denormalized into indexed columns.

use crate::db::models::*;
use crate::db::{DbPool, LookupField, PublicationStore};
use crate::errors::{AppError, Result};
use crate::models::Publication;
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use tracing::{debug, instrument};

/// Repository for publication documents
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn column(field: LookupField) -> PublicationColumn {
        match field {
            LookupField::PaperId => PublicationColumn::PaperId,
            LookupField::Doi => PublicationColumn::Doi,
            LookupField::ArXiv => PublicationColumn::Arxiv,
        }
    }
}

#[async_trait]
impl PublicationStore for Repository {
    #[instrument(skip(self), level = "debug")]
    async fn find(&self, field: LookupField, value: &str) -> Result<Option<Publication>> {
        let row = PublicationEntity::find()
            .filter(Self::column(field).eq(value))
            .one(self.pool.read())
            .await?;

        debug!(found = row.is_some(), "Store lookup");

        row.map(|r| serde_json::from_value::<Publication>(r.document))
            .transpose()
            .map_err(Into::into)
    }

    #[instrument(skip(self, publication), fields(paper_id = %publication.paper_id), level = "debug")]
    async fn insert(&self, publication: &Publication) -> Result<()> {
        if publication.paper_id.is_empty() {
            return Err(AppError::InvalidFormat {
                message: "cannot store a publication without paperId".to_string(),
            });
        }

        let now = chrono::Utc::now();
        let row = PublicationActiveModel {
            paper_id: Set(publication.paper_id.clone()),
            doi: Set(publication.doi().map(str::to_owned)),
            arxiv: Set(publication.arxiv().map(str::to_owned)),
            title: Set(publication.title.clone()),
            document: Set(serde_json::to_value(publication)?),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        // Re-inserting refreshes the document, which carries the latest ancestor chain.
        PublicationEntity::insert(row)
            .on_conflict(
                OnConflict::column(PublicationColumn::PaperId)
                    .update_columns([
                        PublicationColumn::Doi,
                        PublicationColumn::Arxiv,
                        PublicationColumn::Title,
                        PublicationColumn::Document,
                        PublicationColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.pool.write())
            .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
