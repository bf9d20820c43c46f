use crate::embeddings::Embedder;
use crate::error::Result;
use crate::vector_db::{Document, Index, ScoredEntry};
use std::sync::Arc;
use tracing::debug;

/// Outcome of one retrieval: every fetched hit, and the one entry (if any)
/// the answer should be grounded in.
#[derive(Debug)]
pub struct Retrieval<'a> {
    pub hits: Vec<ScoredEntry<'a>>,
    pub grounding: Option<ScoredEntry<'a>>,
}

pub struct Retriever {
    index: Index,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    threshold: f32,
}

impl Retriever {
    pub fn new(index: Index, embedder: Arc<dyn Embedder>, top_k: usize, threshold: f32) -> Self {
        Retriever {
            index,
            embedder,
            top_k,
            threshold,
        }
    }

    pub async fn build(
        documents: Vec<Document>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        threshold: f32,
    ) -> Result<Self> {
        let index = Index::build(documents, embedder.as_ref()).await?;
        Ok(Self::new(index, embedder, top_k, threshold))
    }

    /// Embeds the query and ranks the index against it. A failed embedding
    /// fails the retrieval; it is never reported as "no context".
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval<'_>> {
        let query_vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_vector, self.top_k)?;
        let grounding = select_grounding(&hits, self.threshold);

        debug!(
            "Retrieved {} hits, top score {:?}, grounded: {}",
            hits.len(),
            hits.first().map(|h| h.score),
            grounding.is_some()
        );

        Ok(Retrieval { hits, grounding })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// Only the best hit is ever used, and only when it reaches the threshold.
pub fn select_grounding<'a>(hits: &[ScoredEntry<'a>], threshold: f32) -> Option<ScoredEntry<'a>> {
    hits.first().copied().filter(|top| top.score >= threshold)
}
