//! Publication data model
//!
//! Wire shapes follow the Semantic Scholar Graph API field names, so a
//! publication decoded from upstream can be persisted and re-served unchanged.

mod publication;
mod tree;

pub use publication::{Author, ExternalIds, OpenAccessPdf, Publication, ReferenceStub};
pub use tree::TreeNode;

use serde::{Deserialize, Deserializer};

/// Decode an explicit `null` as the type's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
