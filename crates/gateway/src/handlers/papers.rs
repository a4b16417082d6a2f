//! Citation tree handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use citetree_common::{
    errors::{AppError, Result},
    TreeNode,
};
use citetree_engine::{locate_root, search_roots, RootQuery, TreeRequest};

/// Default number of search hits expanded for `type=QUERY`
pub const DEFAULT_QUERY_LIMIT: usize = 5;

/// Raw query string; every field arrives as text so parse errors stay ours
#[derive(Debug, Default, Deserialize)]
pub struct PaperParams {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "maxDepth")]
    pub max_depth: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Doi,
    ArXiv,
    Query,
}

impl LookupKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DOI" => Ok(LookupKind::Doi),
            "ARXIV" => Ok(LookupKind::ArXiv),
            "QUERY" => Ok(LookupKind::Query),
            other => Err(AppError::Validation {
                message: format!("unknown type '{}', expected DOI, ARXIV or QUERY", other),
                field: Some("type".to_string()),
            }),
        }
    }
}

/// Parsed and validated tree request parameters
#[derive(Debug, Validate)]
pub struct TreeParams {
    #[validate(length(min = 1, max = 1000))]
    pub id: String,
    pub kind: LookupKind,
    pub max_depth: i64,
    #[validate(range(min = 1, max = 100))]
    pub limit: usize,
}

impl TreeParams {
    pub fn parse(raw: PaperParams, default_max_depth: usize) -> Result<Self> {
        let id = raw
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::MissingField {
                field: "id".to_string(),
            })?;
        let kind = raw
            .kind
            .as_deref()
            .ok_or_else(|| AppError::MissingField {
                field: "type".to_string(),
            })
            .and_then(LookupKind::parse)?;
        let max_depth = parse_number(raw.max_depth.as_deref(), "maxDepth", default_max_depth as i64)?;
        let limit = parse_number(raw.limit.as_deref(), "limit", DEFAULT_QUERY_LIMIT)?;

        let params = Self {
            id,
            kind,
            max_depth,
            limit,
        };
        params.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;
        Ok(params)
    }
}

fn parse_number<T: std::str::FromStr>(raw: Option<&str>, field: &str, default: T) -> Result<T> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|_| AppError::Validation {
            message: format!("{} must be an integer, got '{}'", field, value),
            field: Some(field.to_string()),
        }),
    }
}

/// One tree for DOI/ARXIV lookups, a forest for keyword queries
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TreeResponse {
    Tree(TreeNode),
    Forest(Vec<TreeNode>),
}

/// Build the citation tree for a paper
pub async fn get_paper_tree(
    State(state): State<AppState>,
    Query(raw): Query<PaperParams>,
) -> Result<Json<TreeResponse>> {
    let params = TreeParams::parse(raw, state.config.tree.default_max_depth)?;
    let depth_limit = state.config.tree.max_depth_limit;
    // Reject a bad depth before touching the store or upstream
    TreeRequest::check_depth(params.max_depth, depth_limit)?;

    // Dropping the guard (client gone, request timed out) stops the build.
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let store = state.store.as_ref();
    let fetcher = state.fetcher.as_ref();

    let response = match params.kind {
        LookupKind::Doi | LookupKind::ArXiv => {
            let query = match params.kind {
                LookupKind::Doi => RootQuery::doi(&params.id),
                _ => RootQuery::arxiv(&params.id),
            };
            let root = locate_root(store, fetcher, &query).await?;
            let request = TreeRequest::new(root, params.max_depth, depth_limit)?;
            TreeResponse::Tree(state.builder.build(&request, &cancel).await)
        }
        LookupKind::Query => {
            let roots = search_roots(store, fetcher, &params.id, params.limit).await?;
            let requests = roots
                .into_iter()
                .map(|root| TreeRequest::new(root, params.max_depth, depth_limit))
                .collect::<Result<Vec<_>>>()?;
            TreeResponse::Forest(state.builder.build_forest(&requests, &cancel).await)
        }
    };

    tracing::info!(
        id = %params.id,
        kind = ?params.kind,
        max_depth = params.max_depth,
        cancelled = cancel.is_cancelled(),
        "Citation tree request served"
    );

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use citetree_common::db::InMemoryStore;
    use citetree_common::scholar::StaticFetcher;
    use citetree_common::Publication;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn corpus() -> Vec<Publication> {
        let mut root = Publication::new("P1", "Attention Is All You Need")
            .with_references(["P2", "", "P3"]);
        root.external_ids.doi = Some("10.5555/3295222".into());
        root.external_ids.arxiv = Some("1706.03762".into());

        vec![
            root,
            Publication::new("P2", "Neural Machine Translation").with_references(["P4"]),
            Publication::new("P3", "Layer Normalization"),
            Publication::new("P4", "Sequence to Sequence Learning"),
        ]
    }

    async fn call(fetcher: StaticFetcher, uri: &str) -> (StatusCode, Value) {
        let state = test_support::state(Arc::new(InMemoryStore::new()), Arc::new(fetcher));
        send(state, uri).await
    }

    async fn send(state: crate::AppState, uri: &str) -> (StatusCode, Value) {
        let response = crate::create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[test]
    fn test_params_defaults() {
        let params = TreeParams::parse(
            PaperParams {
                id: Some("10.1/x".into()),
                kind: Some("doi".into()),
                ..PaperParams::default()
            },
            2,
        )
        .unwrap();

        assert_eq!(params.kind, LookupKind::Doi);
        assert_eq!(params.max_depth, 2);
        assert_eq!(params.limit, DEFAULT_QUERY_LIMIT);
    }

    #[test]
    fn test_params_rejections() {
        let base = || PaperParams {
            id: Some("x".into()),
            kind: Some("QUERY".into()),
            ..PaperParams::default()
        };

        let missing_id = TreeParams::parse(PaperParams { id: None, ..base() }, 2);
        assert!(matches!(missing_id, Err(AppError::MissingField { .. })));

        let missing_type = TreeParams::parse(PaperParams { kind: None, ..base() }, 2);
        assert!(matches!(missing_type, Err(AppError::MissingField { .. })));

        let bad_type = TreeParams::parse(PaperParams { kind: Some("ISBN".into()), ..base() }, 2);
        assert!(matches!(bad_type, Err(AppError::Validation { .. })));

        let bad_depth = TreeParams::parse(
            PaperParams {
                max_depth: Some("deep".into()),
                ..base()
            },
            2,
        );
        assert!(matches!(bad_depth, Err(AppError::Validation { .. })));

        let bad_limit = TreeParams::parse(
            PaperParams {
                limit: Some("500".into()),
                ..base()
            },
            2,
        );
        assert!(matches!(bad_limit, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_doi_tree() {
        let (status, body) = call(
            StaticFetcher::new(corpus()),
            "/v1/paper?id=10.5555/3295222&type=DOI&maxDepth=2",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paperId"], "P1");
        assert_eq!(body["externalIds"]["DOI"], "10.5555/3295222");

        let refs = body["references"].as_array().unwrap();
        let ids: Vec<&str> = refs.iter().map(|r| r["paperId"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["P2", "P3"]);
        assert_eq!(refs[0]["references"][0]["paperId"], "P4");
        assert!(refs[0]["references"][0]["references"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_arxiv_tree_depth_one() {
        let (status, body) = call(
            StaticFetcher::new(corpus()),
            "/v1/paper?id=arXiv:1706.03762&type=ARXIV&maxDepth=1",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paperId"], "P1");
        let refs = body["references"].as_array().unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r["references"].as_array().unwrap().is_empty()));
    }

    #[tokio::test]
    async fn test_query_forest() {
        let (status, body) = call(
            StaticFetcher::new(corpus()),
            "/v1/paper?id=learning&type=QUERY&maxDepth=1&limit=5",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let trees = body.as_array().unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0]["paperId"], "P4");
    }

    #[tokio::test]
    async fn test_error_responses() {
        let (status, body) = call(StaticFetcher::new(corpus()), "/v1/paper?type=DOI").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_FIELD");

        let (status, body) = call(StaticFetcher::default(), "/v1/paper?id=10.1/none&type=DOI").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "PAPER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_out_of_range_depth_rejected_before_lookup() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = Arc::new(StaticFetcher::new(corpus()));

        for depth in ["0", "-1", "9"] {
            let uri = format!("/v1/paper?id=10.5555/3295222&type=DOI&maxDepth={}", depth);
            let (status, body) = send(test_support::state(store.clone(), fetcher.clone()), &uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "maxDepth={}", depth);
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        }

        assert_eq!(store.lookup_count(), 0);
        assert_eq!(fetcher.total_calls(), 0);
    }
}
