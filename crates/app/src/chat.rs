//! Terminal counterpart of the browser front end: load one PDF, then answer
//! questions about it until the input ends.

use askpdf_core::{ChunkingConfig, DynPipeline, Embedder, IngestReport, LanguageModel, RagPipeline};
use anyhow::Context;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

const PROMPT: &str = "Ask Questions to Your pdf: ";
const QUIT_COMMANDS: [&str; 3] = [":q", ":quit", ":exit"];

pub async fn open_document(
    pipeline: &DynPipeline,
    file: &Path,
    rebuild: bool,
    chunking: ChunkingConfig,
) -> anyhow::Result<IngestReport> {
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no file name: {}", file.display()))?;
    let pdf = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let report = if rebuild {
        pipeline.ingest_pdf(file_name, &pdf, chunking).await?
    } else {
        pipeline.ensure_index(file_name, &pdf, chunking).await?
    };
    Ok(report)
}

/// Reads one question per line and writes each answer back. Blank lines
/// re-prompt; a quit command or end of input ends the session. A failed
/// answer is reported and the session continues.
pub async fn run_session<E, M, R, W>(
    pipeline: &RagPipeline<E, M>,
    key: &str,
    top_k: usize,
    input: R,
    output: &mut W,
) -> anyhow::Result<usize>
where
    E: Embedder,
    M: LanguageModel,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&question) {
            break;
        }

        match pipeline.ask(key, question, top_k).await {
            Ok(answer) => {
                writeln!(output, "{}\n", answer.answer.trim())?;
                answered += 1;
            }
            Err(error) => {
                warn!(%error, "question failed");
                writeln!(output, "error: {error}\n")?;
            }
        }
    }

    Ok(answered)
}

pub fn banner<W: Write>(output: &mut W, report: &IngestReport) -> std::io::Result<()> {
    writeln!(output, "Ask MyPDF")?;
    writeln!(output, "{}", report.file_name)?;
    let source = if report.rebuilt { "indexed" } else { "loaded index for" };
    writeln!(
        output,
        "{source} '{}' ({} pages, {} chunks)\n",
        report.key, report.pages, report.chunks
    )
}
