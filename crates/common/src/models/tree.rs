//! Citation tree output node

use super::publication::{Author, ExternalIds, OpenAccessPdf, Publication};
use serde::{Deserialize, Serialize};

/// A publication plus its resolved references.
///
/// Children are serialized under `references`, mirroring the publication's
/// own bibliography field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub paper_id: String,
    pub title: String,
    pub r#abstract: String,
    pub external_ids: ExternalIds,
    pub open_access_pdf: OpenAccessPdf,
    pub authors: Vec<Author>,
    #[serde(rename = "references")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }

    /// Number of levels below this node
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.height())
            .max()
            .unwrap_or(0)
    }
}

impl From<&Publication> for TreeNode {
    fn from(paper: &Publication) -> Self {
        Self {
            paper_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            r#abstract: paper.r#abstract.clone(),
            external_ids: paper.external_ids.clone(),
            open_access_pdf: paper.open_access_pdf.clone(),
            authors: paper.authors.clone(),
            children: Vec::new(),
        }
    }
}
