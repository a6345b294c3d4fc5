use crate::answer::{answer_question, Answer, LanguageModel};
use crate::chunking::{split_text, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{PipelineError, SearchError};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::{DocumentFingerprint, ScoredChunk, VectorIndex};
use crate::ingest::{digest_bytes, document_key};
use crate::store::IndexStore;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub key: String,
    pub file_name: String,
    pub pages: usize,
    pub chunks: usize,
    pub checksum: String,
    pub path: PathBuf,
    /// False when an existing index was reused instead of rebuilt.
    pub rebuilt: bool,
}

/// Extract → chunk → embed → persist on the way in; load → search →
/// prompt → generate on the way out.
pub struct RagPipeline<E, M>
where
    E: Embedder,
    M: LanguageModel,
{
    embedder: E,
    model: M,
    store: IndexStore,
    extractor: LopdfExtractor,
}

impl<E, M> RagPipeline<E, M>
where
    E: Embedder,
    M: LanguageModel,
{
    pub fn new(embedder: E, model: M, store: IndexStore) -> Self {
        Self {
            embedder,
            model,
            store,
            extractor: LopdfExtractor,
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Builds the index for `file_name` and replaces any index already
    /// stored under the same key.
    pub async fn ingest_pdf(
        &self,
        file_name: &str,
        pdf: &[u8],
        chunking: ChunkingConfig,
    ) -> Result<IngestReport, PipelineError> {
        chunking.validate()?;
        let key = document_key(file_name)?;

        let extractor = self.extractor;
        let bytes = pdf.to_vec();
        let (page_count, chunks, checksum) = blocking(move || {
            let pages = extractor.extract_pages(&bytes)?;
            let text = pages.iter().map(|page| page.text.as_str()).collect::<String>();
            let chunks = split_text(&text, chunking)?;
            Ok((pages.len(), chunks, digest_bytes(&bytes)))
        })
        .await?;
        if chunks.is_empty() {
            warn!(key = %key, file_name, "pdf contains no extractable text");
        }

        let fingerprint = DocumentFingerprint {
            key: key.clone(),
            file_name: file_name.to_string(),
            checksum,
            page_count,
            ingested_at: Utc::now(),
        };

        let index = VectorIndex::build(fingerprint, chunks, chunking, &self.embedder).await?;
        let store = self.store.clone();
        let (path, index) = blocking(move || {
            let path = store.save(&index.document.key, &index)?;
            Ok((path, index))
        })
        .await?;

        info!(
            key = %key,
            pages = page_count,
            chunks = index.len(),
            model = %index.model,
            "pdf ingested"
        );

        Ok(IngestReport {
            key,
            file_name: file_name.to_string(),
            pages: index.document.page_count,
            chunks: index.len(),
            checksum: index.document.checksum,
            path,
            rebuilt: true,
        })
    }

    /// Reuses the stored index for the document when present, building it
    /// otherwise.
    pub async fn ensure_index(
        &self,
        file_name: &str,
        pdf: &[u8],
        chunking: ChunkingConfig,
    ) -> Result<IngestReport, PipelineError> {
        let key = document_key(file_name)?;
        let index = match self.load_index(&key).await {
            Ok(index) => index,
            Err(error) if error.is_not_found() => {
                return self.ingest_pdf(file_name, pdf, chunking).await
            }
            Err(error) => return Err(error),
        };

        info!(key = %key, chunks = index.len(), "reusing stored index");
        Ok(IngestReport {
            path: self.store.path_for(&key)?,
            key,
            file_name: index.document.file_name.clone(),
            pages: index.document.page_count,
            chunks: index.len(),
            checksum: index.document.checksum,
            rebuilt: false,
        })
    }

    pub async fn retrieve(
        &self,
        key: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        let index = self.load_index(key).await?;
        if index.model != self.embedder.model() {
            return Err(SearchError::CorruptIndex {
                key: key.to_string(),
                details: format!(
                    "index was embedded with {}, current embedder is {}",
                    index.model,
                    self.embedder.model()
                ),
            }
            .into());
        }

        let query_vector = self.embedder.embed(question).await?;
        Ok(index.search(&query_vector, top_k)?)
    }

    async fn load_index(&self, key: &str) -> Result<VectorIndex, PipelineError> {
        let store = self.store.clone();
        let key = key.to_string();
        blocking(move || Ok(store.load(&key)?)).await
    }

    pub async fn ask(
        &self,
        key: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Answer, PipelineError> {
        let hits = self.retrieve(key, question, top_k).await?;
        info!(key, retrieved = hits.len(), "answering question");
        Ok(answer_question(&self.model, hits, question).await?)
    }
}

/// Runs PDF parsing and index file I/O on the blocking pool so request
/// handlers sharing the runtime keep making progress.
async fn blocking<T, F>(task: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await?
}
