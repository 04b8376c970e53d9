//! Response caching.
//!
//! - [`SemanticCache`] — exact fingerprint map over an approximate
//!   similarity tier. See [`semantic`] module docs for the lookup rules.
//! - [`VectorStore`] — the similarity backend seam, with the bundled
//!   [`InMemoryVectorStore`].

pub mod semantic;
pub mod vector;

pub use semantic::{
    CacheConfig, CacheHit, CacheWrite, SemanticCache, distance_to_similarity, fingerprint,
};
pub use vector::{CacheMetadata, InMemoryVectorStore, VectorMatch, VectorStore};
