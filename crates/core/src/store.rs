use crate::error::SearchError;
use crate::index::VectorIndex;
use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const INDEX_FILE_EXTENSION: &str = "index.json";

/// One JSON file per document key under a single directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, SearchError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{INDEX_FILE_EXTENSION}")))
    }

    pub fn exists(&self, key: &str) -> Result<bool, SearchError> {
        Ok(self.path_for(key)?.is_file())
    }

    /// Replaces whatever is stored under `key`. The file is written next to
    /// its destination and renamed, so readers never observe a partial write.
    pub fn save(&self, key: &str, index: &VectorIndex) -> Result<PathBuf, SearchError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;

        let mut staged = NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            serde_json::to_writer(&mut writer, index)?;
            writer.flush()?;
        }
        staged.as_file().sync_all()?;
        staged
            .persist(&path)
            .map_err(|error| SearchError::Io(error.error))?;

        info!(key, path = %path.display(), chunks = index.len(), "index saved");
        Ok(path)
    }

    pub fn load(&self, key: &str) -> Result<VectorIndex, SearchError> {
        let path = self.path_for(key)?;
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(SearchError::IndexNotFound(key.to_string()))
            }
            Err(error) => return Err(SearchError::Io(error)),
        };

        let index: VectorIndex = serde_json::from_reader(BufReader::new(file)).map_err(|error| {
            SearchError::CorruptIndex {
                key: key.to_string(),
                details: error.to_string(),
            }
        })?;
        index.verify(key)?;

        debug!(key, chunks = index.len(), model = %index.model, "index loaded");
        Ok(index)
    }
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Keys become file names, so anything that could escape the store
/// directory is refused.
pub fn validate_key(key: &str) -> Result<(), SearchError> {
    let invalid = key.trim().is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
        || key.starts_with('.');

    if invalid {
        Err(SearchError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{split_text, ChunkingConfig};
    use crate::embeddings::{CharacterNgramEmbedder, Embedder};
    use crate::index::DocumentFingerprint;
    use tempfile::tempdir;

    async fn build(key: &str, text: &str) -> VectorIndex {
        let fingerprint = DocumentFingerprint {
            key: key.to_string(),
            file_name: format!("{key}.pdf"),
            checksum: "abc".to_string(),
            page_count: 1,
            ingested_at: chrono::Utc::now(),
        };
        let config = ChunkingConfig::new(40, 10).unwrap();
        VectorIndex::build(
            fingerprint,
            split_text(text, config).unwrap(),
            config,
            &CharacterNgramEmbedder::default(),
        )
        .await
        .unwrap()
    }

    #[test]
    fn keys_that_escape_the_directory_are_rejected() {
        for key in ["", " ", ".", "..", "../etc", "a/b", "a\\b", ".hidden"] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
        assert!(validate_key("report").is_ok());
        assert!(validate_key("annual report 2024").is_ok());
    }

    #[test]
    fn loading_unknown_key_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path());
        assert!(matches!(
            store.load("missing"),
            Err(SearchError::IndexNotFound(key)) if key == "missing"
        ));
        assert!(!store.exists("missing")?);
        Ok(())
    }

    #[tokio::test]
    async fn save_load_search_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path());
        let text = "Pumps need inspection every six months. Valves are replaced yearly. \
                    Filters must be cleaned weekly to keep the flow rate stable.";
        let index = build("manual", text).await;

        let path = store.save("manual", &index)?;
        assert_eq!(path, dir.path().join("manual.index.json"));
        assert!(store.exists("manual")?);

        let loaded = store.load("manual")?;
        assert_eq!(loaded, index);

        let embedder = CharacterNgramEmbedder::default();
        for entry in &loaded.entries {
            let query = embedder.embed(&entry.chunk.text).await?;
            let hits = loaded.search(&query, 1)?;
            assert_eq!(hits[0].chunk, entry.chunk);
        }
        Ok(())
    }

    #[tokio::test]
    async fn save_overwrites_previous_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path());

        store.save("doc", &build("doc", "old content about turbines").await)?;
        store.save("doc", &build("doc", "new content about compressors").await)?;

        let loaded = store.load("doc")?;
        assert_eq!(loaded.entries.len(), 1);
        assert!(loaded.entries[0].chunk.text.contains("compressors"));

        let leftovers = fs::read_dir(dir.path())?.count();
        assert_eq!(leftovers, 1, "staging files must not be left behind");
        Ok(())
    }

    #[test]
    fn garbage_file_is_reported_as_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path());
        fs::write(store.path_for("torn")?, b"{\"document\":")?;

        assert!(matches!(
            store.load("torn"),
            Err(SearchError::CorruptIndex { .. })
        ));
        Ok(())
    }
}
