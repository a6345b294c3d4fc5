use crate::error::IngestError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    /// Window settings used by the HTTP upload path.
    pub const UPLOAD: Self = Self {
        chunk_chars: 600,
        overlap_chars: 300,
    };

    /// Window settings used by the interactive session.
    pub const INTERACTIVE: Self = Self {
        chunk_chars: 500,
        overlap_chars: 200,
    };

    pub fn new(chunk_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_chars,
            overlap_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk length must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.chunk_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk length {}",
                self.overlap_chars, self.chunk_chars
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_chars - self.overlap_chars
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::UPLOAD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub index: usize,
    /// Offset of the first character, counted in chars.
    pub start: usize,
    pub text: String,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn end(&self) -> usize {
        self.start + self.char_len()
    }
}

pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<TextChunk>, IngestError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_chars).min(chars.len());
        chunks.push(TextChunk {
            index: chunks.len(),
            start,
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    Ok(chunks)
}

/// Rebuilds the source text from ordered chunks by dropping the overlapping
/// prefix of every chunk after the first. Whitespace-only text is never
/// chunked, so it comes back as `""`.
pub fn reconstruct(chunks: &[TextChunk]) -> String {
    let mut text = String::new();
    let mut covered = 0usize;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        text.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.end());
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        assert!(ChunkingConfig::new(10, 10).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(10, 9).is_ok());
    }

    #[test]
    fn windows_overlap_and_last_may_be_short() {
        let config = ChunkingConfig::new(4, 2).unwrap();
        let chunks = split_text("abcdefghi", config).unwrap();

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "cdef", "efgh", "ghi"]);
        assert_eq!(chunks[3].start, 6);
        assert_eq!(chunks[3].index, 3);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("tiny", ChunkingConfig::UPLOAD).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tiny");
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        assert!(split_text("   \n\t", ChunkingConfig::UPLOAD).unwrap().is_empty());
        assert!(split_text("", ChunkingConfig::UPLOAD).unwrap().is_empty());
    }

    #[test]
    fn reconstruct_recovers_source_text() {
        let text = "Hydraulic pumps move fluid. Pressure relief valves protect the circuit. \
                    Ünïcödé characters count as one char each: ßøå.\n\nNew paragraph.";
        for (chunk, overlap) in [(7, 3), (16, 15), (50, 0), (500, 200)] {
            let config = ChunkingConfig::new(chunk, overlap).unwrap();
            let chunks = split_text(text, config).unwrap();
            assert_eq!(reconstruct(&chunks), text, "chunk={chunk} overlap={overlap}");
        }
    }

    #[test]
    fn reconstruct_of_blank_text_is_empty() {
        let config = ChunkingConfig::new(4, 2).unwrap();
        for text in ["", "   \n", "\t\t"] {
            let chunks = split_text(text, config).unwrap();
            assert_eq!(reconstruct(&chunks), "");
        }
    }

    #[test]
    fn reconstruct_keeps_surrounding_whitespace() {
        let config = ChunkingConfig::new(4, 2).unwrap();
        let text = "  padded text \n";
        assert_eq!(reconstruct(&split_text(text, config).unwrap()), text);
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "the same input always produces the same windows ".repeat(40);
        let first = split_text(&text, ChunkingConfig::INTERACTIVE).unwrap();
        let second = split_text(&text, ChunkingConfig::INTERACTIVE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let config = ChunkingConfig::new(3, 1).unwrap();
        let chunks = split_text("日本語のテキスト", config).unwrap();
        assert!(chunks.iter().all(|chunk| chunk.char_len() <= 3));
        assert_eq!(chunks[0].text, "日本語");
    }
}
