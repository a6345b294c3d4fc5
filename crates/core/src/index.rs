use crate::chunking::{ChunkingConfig, TextChunk};
use crate::embeddings::Embedder;
use crate::error::SearchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Identity of the document an index was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentFingerprint {
    pub key: String,
    pub file_name: String,
    pub checksum: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: TextChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    pub document: DocumentFingerprint,
    pub model: String,
    pub dimensions: usize,
    pub chunking: ChunkingConfig,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub score: f32,
    pub chunk: TextChunk,
}

impl VectorIndex {
    /// Embeds every chunk once and keeps the vectors alongside the text.
    pub async fn build<E>(
        document: DocumentFingerprint,
        chunks: Vec<TextChunk>,
        chunking: ChunkingConfig,
        embedder: &E,
    ) -> Result<Self, SearchError>
    where
        E: Embedder + ?Sized,
    {
        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let vectors = embedder.embed_batch(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(SearchError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                if vector.len() != embedder.dimensions() {
                    return Err(SearchError::Embedding(format!(
                        "embedding dimension {} != {}",
                        vector.len(),
                        embedder.dimensions()
                    )));
                }
                Ok(IndexEntry { vector, chunk })
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        Ok(Self {
            document,
            model: embedder.model().to_string(),
            dimensions: embedder.dimensions(),
            chunking,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` chunks by descending cosine similarity; equal scores keep
    /// document order.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        if query_vector.len() != self.dimensions {
            return Err(SearchError::Embedding(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.dimensions
            )));
        }

        let mut scored = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query_vector, &entry.vector), entry))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| {
            right
                .0
                .partial_cmp(&left.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.1.chunk.index.cmp(&right.1.chunk.index))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| ScoredChunk {
                score,
                chunk: entry.chunk.clone(),
            })
            .collect())
    }

    /// Rejects a loaded index whose vectors disagree with its header.
    pub(crate) fn verify(&self, key: &str) -> Result<(), SearchError> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.vector.len() != self.dimensions)
        {
            return Err(SearchError::CorruptIndex {
                key: key.to_string(),
                details: format!(
                    "chunk {} has {} dimensions, header says {}",
                    entry.chunk.index,
                    entry.vector.len(),
                    self.dimensions
                ),
            });
        }
        Ok(())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
