mod chat;
mod server;

use askpdf_core::answer::{DEFAULT_GROQ_BASE_URL, DEFAULT_LLM_MODEL};
use askpdf_core::config::{
    EmbeddingSettings, LlmSettings, DEFAULT_EMBEDDING_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use askpdf_core::embeddings::{DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_MODEL_DIMENSIONS};
use askpdf_core::{
    discover_pdf_files, AppConfig, ChunkingConfig, EmbedderKind, DEFAULT_TOP_K,
    INTERACTIVE_TOP_K,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use server::{AppState, ServerConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "askpdf", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding one index file per document
    #[arg(long, env = "ASKPDF_INDEX_DIR", default_value = ".")]
    index_dir: PathBuf,

    /// Groq API key; requests fail at answer time when it is absent
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_api_key: Option<String>,

    /// Groq API base URL
    #[arg(long, env = "GROQ_BASE_URL", default_value = DEFAULT_GROQ_BASE_URL)]
    groq_base_url: String,

    /// Chat model used to answer questions
    #[arg(long, env = "ASKPDF_LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    llm_model: String,

    /// Upper bound on generated tokens per answer
    #[arg(long, env = "ASKPDF_MAX_TOKENS")]
    max_tokens: Option<u32>,

    /// Embedding backend: `http` (hosted sentence model) or `ngram` (no model server)
    #[arg(long, env = "ASKPDF_EMBEDDER", default_value_t = EmbedderKind::default())]
    embedder: EmbedderKind,

    /// Base URL of an OpenAI-compatible embeddings server
    #[arg(long, env = "ASKPDF_EMBEDDING_URL", default_value = DEFAULT_EMBEDDING_URL)]
    embedding_url: String,

    /// Sentence-embedding model name
    #[arg(long, env = "ASKPDF_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Output dimension of the embedding model
    #[arg(long, env = "ASKPDF_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_MODEL_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Bearer token for the embeddings server
    #[arg(long, env = "ASKPDF_EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Chunk length in characters (defaults depend on the command)
    #[arg(long, env = "ASKPDF_CHUNK_CHARS")]
    chunk_chars: Option<usize>,

    /// Characters shared by neighbouring chunks
    #[arg(long, env = "ASKPDF_CHUNK_OVERLAP")]
    chunk_overlap: Option<usize>,

    /// Timeout for embedding and LLM requests, in seconds
    #[arg(long, env = "ASKPDF_REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "ASKPDF_HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "ASKPDF_PORT", default_value = "5000")]
        port: u16,
        /// Origins allowed to call the API from a browser.
        #[arg(
            long = "cors-origin",
            env = "ASKPDF_CORS_ORIGINS",
            value_delimiter = ',',
            default_value = "http://localhost:3000,http://127.0.0.1:3000"
        )]
        cors_origins: Vec<String>,
        /// Largest accepted upload body in bytes.
        #[arg(long, default_value_t = 32 * 1024 * 1024)]
        max_upload_bytes: usize,
        /// Chunks retrieved per question.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Index one PDF, or every PDF below a folder, under its file name.
    Ingest {
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Answer a single question against an indexed PDF.
    Ask {
        /// Document name: the uploaded file name without `.pdf`.
        #[arg(long)]
        pdf_name: String,
        #[arg(long)]
        question: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Print the retrieved chunks after the answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Interactive question loop over one PDF.
    Chat {
        #[arg(long)]
        file: PathBuf,
        /// Re-index even when an index for this file name exists.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
        #[arg(long, default_value_t = INTERACTIVE_TOP_K)]
        top_k: usize,
    },
}

impl Cli {
    fn chunking(&self, fallback: ChunkingConfig) -> anyhow::Result<ChunkingConfig> {
        let config = ChunkingConfig {
            chunk_chars: self.chunk_chars.unwrap_or(fallback.chunk_chars),
            overlap_chars: self.chunk_overlap.unwrap_or(fallback.overlap_chars),
        };
        config.validate()?;
        Ok(config)
    }

    fn app_config(&self, chunking: ChunkingConfig, top_k: usize) -> AppConfig {
        AppConfig {
            index_dir: self.index_dir.clone(),
            embedding: EmbeddingSettings {
                kind: self.embedder,
                url: self.embedding_url.clone(),
                model: self.embedding_model.clone(),
                dimensions: self.embedding_dimensions,
                api_key: self.embedding_api_key.clone(),
            },
            llm: LlmSettings {
                base_url: self.groq_base_url.clone(),
                model: self.llm_model.clone(),
                api_key: self.groq_api_key.clone(),
                max_tokens: self.max_tokens,
            },
            chunking,
            top_k,
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            eprintln!("ignoring unreadable .env file: {error}");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        embedder = %cli.embedder,
        index_dir = %cli.index_dir.display(),
        "askpdf boot"
    );

    match &cli.command {
        Command::Serve {
            host,
            port,
            cors_origins,
            max_upload_bytes,
            top_k,
        } => {
            let config = cli.app_config(cli.chunking(ChunkingConfig::UPLOAD)?, *top_k);
            let state = AppState::from_config(&config)?;
            let server = ServerConfig {
                host: host.clone(),
                port: *port,
                cors_origins: cors_origins.clone(),
                max_upload_bytes: *max_upload_bytes,
            };
            server::serve(state, server).await?;
        }
        Command::Ingest { file, folder } => {
            let config = cli.app_config(cli.chunking(ChunkingConfig::UPLOAD)?, DEFAULT_TOP_K);
            let pipeline = config.build_pipeline()?;

            let files = match (file, folder) {
                (Some(file), _) => vec![file.clone()],
                (None, Some(folder)) => discover_pdf_files(folder),
                (None, None) => Vec::new(),
            };
            if files.is_empty() {
                anyhow::bail!("no pdf files to ingest");
            }

            let mut skipped = 0usize;
            for path in &files {
                match ingest_path(&pipeline, path, config.chunking).await {
                    Ok(report) => println!(
                        "{} -> {} ({} pages, {} chunks)",
                        path.display(),
                        report.path.display(),
                        report.pages,
                        report.chunks
                    ),
                    Err(error) => {
                        skipped += 1;
                        warn!(path = %path.display(), reason = %error, "skipped pdf");
                    }
                }
            }

            if skipped == files.len() {
                anyhow::bail!("all {} pdf file(s) failed to ingest", files.len());
            }
            info!(ingested = files.len() - skipped, skipped, "ingest finished");
        }
        Command::Ask {
            pdf_name,
            question,
            top_k,
            show_sources,
        } => {
            let config = cli.app_config(cli.chunking(ChunkingConfig::UPLOAD)?, *top_k);
            let pipeline = config.build_pipeline()?;
            let answer = pipeline.ask(pdf_name, question, config.top_k).await?;

            println!("{}", answer.answer.trim());
            if *show_sources {
                for hit in &answer.sources {
                    println!(
                        "\n[chunk {} score={:.4}]\n{}",
                        hit.chunk.index, hit.score, hit.chunk.text
                    );
                }
            }
        }
        Command::Chat {
            file,
            rebuild,
            top_k,
        } => {
            let config = cli.app_config(cli.chunking(ChunkingConfig::INTERACTIVE)?, *top_k);
            let pipeline = config.build_pipeline()?;

            let report = chat::open_document(&pipeline, file, *rebuild, config.chunking).await?;
            let mut stdout = std::io::stdout();
            chat::banner(&mut stdout, &report)?;

            let input = tokio::io::BufReader::new(tokio::io::stdin());
            chat::run_session(&pipeline, &report.key, config.top_k, input, &mut stdout).await?;
        }
    }

    Ok(())
}

async fn ingest_path(
    pipeline: &askpdf_core::DynPipeline,
    path: &Path,
    chunking: ChunkingConfig,
) -> anyhow::Result<askpdf_core::IngestReport> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", path.display()))?;
    let pdf = tokio::fs::read(path).await?;
    Ok(pipeline.ingest_pdf(file_name, &pdf, chunking).await?)
}
