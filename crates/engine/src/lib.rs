//! CiteTree Engine
//!
//! Builds depth-bounded citation trees:
//! - Per-build resolution cache with single-flight resolution
//! - Reference resolver (cache, store, then upstream)
//! - Sharded, level-by-level tree builder with cancellation
//! - Root lookup by DOI, ArXiv id or keyword search

pub mod builder;
pub mod cache;
pub mod resolver;
pub mod root;

pub use builder::{partition, BuilderConfig, CitationTreeBuilder, TreeRequest};
pub use cache::ResolutionCache;
pub use resolver::ReferenceResolver;
pub use root::{locate_root, search_roots, RootQuery};
