use crate::embeddings::Embedder;
use crate::error::{ChatError, Result};
use ndarray::Array1;
use tracing::{debug, info};

const NORM_EPSILON: f32 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub document: Document,
    pub vector: Array1<f32>,
}

impl IndexEntry {
    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn label(&self) -> &str {
        &self.document.label
    }

    pub fn text(&self) -> &str {
        &self.document.text
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredEntry<'a> {
    pub entry: &'a IndexEntry,
    pub score: f32,
}

/// Normalized dot product of `a` and `b`.
///
/// Vectors of different lengths are rejected rather than truncated, and an
/// all-zero input scores 0.
pub fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> Result<f32> {
    if a.len() != b.len() {
        return Err(ChatError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let dot_product = a.dot(b);
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();

    Ok(dot_product / (norm_a * norm_b + NORM_EPSILON))
}

/// Read-only list of embedded documents, searched by brute-force scan.
#[derive(Debug, Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    /// Embeds every document in order. The first failure aborts the build,
    /// so an index either covers all documents or does not exist.
    pub async fn build<E>(documents: Vec<Document>, embedder: &E) -> Result<Self>
    where
        E: Embedder + ?Sized,
    {
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(documents.len());

        for document in documents {
            let vector = embedder.embed(&document.text).await?;

            if let Some(first) = entries.first() {
                if first.vector.len() != vector.len() {
                    return Err(ChatError::DimensionMismatch {
                        left: first.vector.len(),
                        right: vector.len(),
                    });
                }
            }

            debug!("Embedded '{}' ({} dims)", document.id, vector.len());
            entries.push(IndexEntry { document, vector });
        }

        info!("Built index with {} entries", entries.len());
        Ok(Index { entries })
    }

    /// Returns the `k` best entries by descending score. Equal scores keep
    /// insertion order.
    pub fn search(&self, query: &Array1<f32>, k: usize) -> Result<Vec<ScoredEntry<'_>>> {
        let mut scored = self
            .entries
            .iter()
            .map(|entry| {
                cosine_similarity(query, &entry.vector).map(|score| ScoredEntry { entry, score })
            })
            .collect::<Result<Vec<_>>>()?;

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality shared by every entry, or `None` for an empty index.
    pub fn dimensions(&self) -> Option<usize> {
        self.entries.first().map(|e| e.vector.len())
    }
}
