use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("not a pdf file: {0}")]
    NotPdf(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no index stored for document '{0}'")]
    IndexNotFound(String),

    #[error("invalid document key: {0:?}")]
    InvalidKey(String),

    #[error("corrupt index for '{key}': {details}")]
    CorruptIndex { key: String, details: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// True when the failure was caused by caller input rather than a
    /// downstream dependency.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            PipelineError::Ingest(
                IngestError::NotPdf(_)
                    | IngestError::PdfParse(_)
                    | IngestError::InvalidArgument(_)
                    | IngestError::InvalidChunkConfig(_)
            ) | PipelineError::Search(SearchError::InvalidKey(_))
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::Search(SearchError::IndexNotFound(_)))
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
