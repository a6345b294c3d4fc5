use crate::answer::{GroqChatModel, LanguageModel, DEFAULT_GROQ_BASE_URL, DEFAULT_LLM_MODEL};
use crate::chunking::ChunkingConfig;
use crate::embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_MODEL_DIMENSIONS,
};
use crate::error::{AnswerError, PipelineError, SearchError};
use crate::pipeline::RagPipeline;
use crate::store::IndexStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 5;
pub const INTERACTIVE_TOP_K: usize = 3;
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

pub type DynPipeline = RagPipeline<Box<dyn Embedder>, Box<dyn LanguageModel>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Pretrained sentence-embedding model behind an HTTP endpoint.
    #[default]
    Http,
    /// Hashed character trigrams, for runs without a model server.
    Ngram,
}

impl FromStr for EmbedderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ngram" => Ok(Self::Ngram),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown embedder {other:?}, expected ngram or http")),
        }
    }
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ngram => f.write_str("ngram"),
            Self::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub kind: EmbedderKind,
    pub url: String,
    pub model: String,
    pub dimensions: usize,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::default(),
            url: DEFAULT_EMBEDDING_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_MODEL_DIMENSIONS,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            max_tokens: None,
        }
    }
}

/// Settings shared by every front end. `chunking` and `top_k` are the
/// values the chosen front end actually uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub index_dir: PathBuf,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("."),
            embedding: EmbeddingSettings::default(),
            llm: LlmSettings::default(),
            chunking: ChunkingConfig::UPLOAD,
            top_k: DEFAULT_TOP_K,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn build_embedder(&self) -> Result<Box<dyn Embedder>, SearchError> {
        match self.embedding.kind {
            EmbedderKind::Ngram => Ok(Box::new(CharacterNgramEmbedder::new(
                DEFAULT_EMBEDDING_DIMENSIONS,
            ))),
            EmbedderKind::Http => {
                let embedder = HttpEmbedder::new(
                    &self.embedding.url,
                    self.embedding.model.clone(),
                    self.embedding.dimensions,
                    self.request_timeout(),
                )?
                .with_api_key(self.embedding.api_key.clone());
                Ok(Box::new(embedder))
            }
        }
    }

    pub fn build_language_model(&self) -> Result<Box<dyn LanguageModel>, AnswerError> {
        let model = GroqChatModel::new(
            &self.llm.base_url,
            self.llm.api_key.clone(),
            self.llm.model.clone(),
            self.request_timeout(),
        )?
        .with_max_tokens(self.llm.max_tokens);
        Ok(Box::new(model))
    }

    pub fn build_pipeline(&self) -> Result<DynPipeline, PipelineError> {
        self.chunking.validate()?;
        Ok(RagPipeline::new(
            self.build_embedder()?,
            self.build_language_model()?,
            IndexStore::new(&self.index_dir),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upload_behaviour() {
        let config = AppConfig::default();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.chunking, ChunkingConfig::UPLOAD);
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.embedding.model, "multi-qa-distilbert-cos-v1");
    }

    #[test]
    fn embedder_kind_parses_case_insensitively() {
        assert_eq!("HTTP".parse::<EmbedderKind>(), Ok(EmbedderKind::Http));
        assert_eq!("ngram".parse::<EmbedderKind>(), Ok(EmbedderKind::Ngram));
        assert!("onnx".parse::<EmbedderKind>().is_err());
        assert_eq!(EmbedderKind::Http.to_string(), "http");
    }

    #[test]
    fn pipeline_builds_without_api_key() {
        let config = AppConfig::default();
        let pipeline = config
            .build_pipeline()
            .expect("missing key is only fatal at request time");
        assert_eq!(pipeline.embedder().model(), "multi-qa-distilbert-cos-v1");
        assert_eq!(pipeline.embedder().dimensions(), 768);
    }

    #[test]
    fn default_embedder_is_the_sentence_model() {
        assert_eq!(EmbedderKind::default(), EmbedderKind::Http);
        let embedder = AppConfig::default().build_embedder().unwrap();
        assert_eq!(embedder.model(), DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn ngram_embedder_is_opt_in() {
        let config = AppConfig {
            embedding: EmbeddingSettings {
                kind: EmbedderKind::Ngram,
                ..EmbeddingSettings::default()
            },
            ..AppConfig::default()
        };
        let embedder = config.build_embedder().unwrap();
        assert_eq!(embedder.model(), "char-trigram-128");
    }

    #[test]
    fn invalid_chunking_is_rejected_up_front() {
        let config = AppConfig {
            chunking: ChunkingConfig {
                chunk_chars: 100,
                overlap_chars: 100,
            },
            ..AppConfig::default()
        };
        assert!(config.build_pipeline().is_err());
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("gsk_secret".to_string());
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("gsk_secret"));
    }
}
