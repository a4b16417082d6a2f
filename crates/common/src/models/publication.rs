//! Publication record and its nested parts

use super::null_as_default;
use serde::{Deserialize, Serialize};

/// A bibliographic record as resolved from the store or upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    /// Upstream identifier; empty when upstream data is malformed
    #[serde(default, deserialize_with = "null_as_default")]
    pub paper_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub r#abstract: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub external_ids: ExternalIds,

    /// Always serialized; an absent link is `{"url": ""}`
    #[serde(default, deserialize_with = "null_as_default")]
    pub open_access_pdf: OpenAccessPdf,

    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<Author>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub references: Vec<ReferenceStub>,

    /// Path from the tree root in the build that last wrote this record
    #[serde(default, deserialize_with = "null_as_default")]
    pub ancestors: Vec<String>,
}

/// Identifiers assigned by other indexes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(rename = "DOI", default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(rename = "ArXiv", default, skip_serializing_if = "Option::is_none")]
    pub arxiv: Option<String>,

    #[serde(rename = "MAG", default, skip_serializing_if = "Option::is_none")]
    pub mag: Option<String>,

    #[serde(rename = "ACL", default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,

    #[serde(rename = "PubMed", default, skip_serializing_if = "Option::is_none")]
    pub pubmed: Option<String>,
}

/// Open access link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccessPdf {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Unresolved bibliography entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceStub {
    #[serde(default, deserialize_with = "null_as_default")]
    pub paper_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
}

impl Publication {
    /// Minimal record, mostly useful for fixtures
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Builder-style helper to attach reference stubs
    pub fn with_references<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = ids
            .into_iter()
            .map(|id| ReferenceStub {
                paper_id: id.into(),
                title: String::new(),
            })
            .collect();
        self
    }

    pub fn doi(&self) -> Option<&str> {
        self.external_ids.doi.as_deref().filter(|s| !s.is_empty())
    }

    pub fn arxiv(&self) -> Option<&str> {
        self.external_ids.arxiv.as_deref().filter(|s| !s.is_empty())
    }
}

impl ReferenceStub {
    /// Stubs without an id cannot be requested upstream
    pub fn is_resolvable(&self) -> bool {
        !self.paper_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_upstream_with_nulls() {
        let raw = r#"{
            "paperId": "649def34f8be52c8b66281af98ae884c09aef38b",
            "externalIds": {"DOI": "10.1000/xyz", "ArXiv": "1706.03762", "CorpusId": 13756489},
            "title": "Attention Is All You Need",
            "abstract": null,
            "openAccessPdf": null,
            "authors": [{"authorId": null, "name": "A. Vaswani"}],
            "references": [
                {"paperId": "abc", "title": "Seq2Seq"},
                {"paperId": null, "title": "Unknown"}
            ]
        }"#;

        let paper: Publication = serde_json::from_str(raw).unwrap();
        assert_eq!(paper.r#abstract, "");
        assert_eq!(paper.open_access_pdf, OpenAccessPdf::default());
        assert_eq!(paper.doi(), Some("10.1000/xyz"));
        assert_eq!(paper.arxiv(), Some("1706.03762"));
        assert_eq!(paper.authors[0].author_id, "");
        assert!(paper.references[0].is_resolvable());
        assert!(!paper.references[1].is_resolvable());
        assert!(paper.ancestors.is_empty());
    }

    #[test]
    fn test_serialize_omits_absent_identifiers() {
        let mut paper = Publication::new("p1", "Title");
        paper.external_ids.doi = Some("10.1/abc".into());

        let value = serde_json::to_value(&paper).unwrap();
        assert_eq!(value["externalIds"], serde_json::json!({"DOI": "10.1/abc"}));
        assert_eq!(value["openAccessPdf"], serde_json::json!({"url": ""}));
        assert_eq!(value["references"], serde_json::json!([]));
        assert_eq!(value["ancestors"], serde_json::json!([]));
    }

    #[test]
    fn test_null_external_ids() {
        let paper: Publication =
            serde_json::from_str(r#"{"paperId": "x", "externalIds": null, "authors": null}"#)
                .unwrap();
        assert_eq!(paper.external_ids, ExternalIds::default());
        assert!(paper.authors.is_empty());
    }
}
