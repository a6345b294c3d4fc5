pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod pipeline;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use answer::{
    answer_question, build_prompt, Answer, GroqChatModel, LanguageModel, Message, Role,
    ANSWER_TEMPERATURE,
};
pub use chunking::{reconstruct, split_text, ChunkingConfig, TextChunk};
pub use config::{AppConfig, DynPipeline, EmbedderKind, DEFAULT_TOP_K, INTERACTIVE_TOP_K};
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AnswerError, IngestError, PipelineError, SearchError};
pub use extractor::{extract_text, LopdfExtractor, PageText, PdfExtractor};
pub use index::{cosine_similarity, DocumentFingerprint, IndexEntry, ScoredChunk, VectorIndex};
pub use ingest::{digest_bytes, discover_pdf_files, document_key, is_pdf_name};
pub use pipeline::{IngestReport, RagPipeline};
pub use store::{IndexStore, INDEX_FILE_EXTENSION};
