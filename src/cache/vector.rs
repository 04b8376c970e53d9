//! Approximate-similarity document store.
//!
//! [`VectorStore`] is the seam for the second cache tier. The bundled
//! [`InMemoryVectorStore`] ranks documents by cosine distance between
//! term-frequency vectors; deployments with an embedding-backed store plug
//! in their own implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{GatewayError, Result};

/// Metadata persisted alongside each cached prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Serialized upstream response body.
    pub response: String,
    pub prompt_hash: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub energy_joules: f64,
    pub provider: String,
}

/// One query result, closest first.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub document: String,
    pub metadata: CacheMetadata,
    /// Distance from the query; 0 means identical.
    pub distance: f64,
}

/// Similarity search over stored prompts.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `k` stored documents nearest to `text`, closest first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorMatch>>;

    /// Store documents with their metadata under the given ids.
    ///
    /// All three slices must have the same length.
    async fn add(
        &self,
        documents: Vec<String>,
        metadatas: Vec<CacheMetadata>,
        ids: Vec<String>,
    ) -> Result<()>;
}

struct StoredDocument {
    id: String,
    document: String,
    metadata: CacheMetadata,
    terms: HashMap<String, f64>,
}

/// Process-local [`VectorStore`] using bag-of-words cosine distance.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collection: String,
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryVectorStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            documents: RwLock::new(Vec::new()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut terms = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        *terms.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

/// `1 - cos(a, b)`; empty vectors are maximally distant.
fn cosine_distance(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 1.0;
    }
    // Rounding in the norms leaves identical vectors a few ulps apart.
    let distance = 1.0 - dot / denom;
    if distance < 1e-12 { 0.0 } else { distance }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorMatch>> {
        let query = term_frequencies(text);
        let documents = self
            .documents
            .read()
            .map_err(|_| GatewayError::Cache("vector store lock poisoned".into()))?;
        let mut matches: Vec<VectorMatch> = documents
            .iter()
            .map(|doc| VectorMatch {
                id: doc.id.clone(),
                document: doc.document.clone(),
                metadata: doc.metadata.clone(),
                distance: cosine_distance(&query, &doc.terms),
            })
            .collect();
        // Stable sort keeps insertion order among equal distances.
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);
        Ok(matches)
    }

    async fn add(
        &self,
        documents: Vec<String>,
        metadatas: Vec<CacheMetadata>,
        ids: Vec<String>,
    ) -> Result<()> {
        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(GatewayError::Cache(format!(
                "mismatched batch: {} documents, {} metadatas, {} ids",
                documents.len(),
                metadatas.len(),
                ids.len()
            )));
        }
        let mut stored = self
            .documents
            .write()
            .map_err(|_| GatewayError::Cache("vector store lock poisoned".into()))?;
        for ((document, metadata), id) in documents.into_iter().zip(metadatas).zip(ids) {
            stored.push(StoredDocument {
                terms: term_frequencies(&document),
                id,
                document,
                metadata,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(provider: &str) -> CacheMetadata {
        CacheMetadata {
            response: "{}".into(),
            prompt_hash: "h".into(),
            model: "gpt-4".into(),
            prompt_tokens: 1,
            completion_tokens: 1,
            energy_joules: 0.5,
            provider: provider.into(),
        }
    }

    #[test]
    fn identical_text_has_zero_distance() {
        let a = term_frequencies("user:What is the capital of France?");
        assert_eq!(cosine_distance(&a, &a), 0.0);
        assert_eq!(cosine_distance(&a, &HashMap::new()), 1.0);

        for text in [
            "user:the the the cat sat on the mat with the hat",
            "system:You are terse.\nuser:Summarize 3 3 3 points about energy use in data centres",
            "user:a b c d e f g h i j k l m n o p q r s t u v w x y z a a a",
        ] {
            let v = term_frequencies(text);
            assert_eq!(cosine_distance(&v, &v), 0.0, "{text}");
        }
    }

    #[tokio::test]
    async fn stored_prompt_queries_at_zero_distance() {
        let store = InMemoryVectorStore::new("llm_cache");
        let prompt = "user:the the the cat sat on the mat with the hat";
        store
            .add(vec![prompt.into()], vec![metadata("a")], vec!["a".into()])
            .await
            .unwrap();
        let matches = store.query(prompt, 1).await.unwrap();
        assert_eq!(matches[0].distance, 0.0);
    }

    #[tokio::test]
    async fn query_returns_closest_first() {
        let store = InMemoryVectorStore::new("llm_cache");
        store
            .add(
                vec!["user:tell me a joke".into(), "user:capital of france".into()],
                vec![metadata("a"), metadata("b")],
                vec!["1".into(), "2".into()],
            )
            .await
            .unwrap();
        let matches = store.query("user:the capital of France", 1).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "2");
        assert!(matches[0].distance > 0.0);
    }

    #[tokio::test]
    async fn mismatched_batch_is_rejected() {
        let store = InMemoryVectorStore::new("llm_cache");
        let result = store
            .add(vec!["doc".into()], vec![], vec!["1".into()])
            .await;
        assert!(matches!(result, Err(GatewayError::Cache(_))));
        assert!(store.is_empty());
    }
}
