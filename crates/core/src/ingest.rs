use crate::error::IngestError;
use crate::store::validate_key;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PDF_EXTENSION: &str = "pdf";

pub fn is_pdf_name(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PDF_EXTENSION))
}

/// `reports/Q3 summary.pdf` becomes `Q3 summary`. Anything that is not a
/// `.pdf` name, or whose stem cannot be a store key, is rejected.
pub fn document_key(file_name: &str) -> Result<String, IngestError> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();

    if !is_pdf_name(base) {
        return Err(IngestError::NotPdf(file_name.to_string()));
    }

    let stem = &base[..base.len() - PDF_EXTENSION.len() - 1];
    validate_key(stem).map_err(|_| {
        IngestError::InvalidArgument(format!("cannot derive a document name from {file_name:?}"))
    })?;

    Ok(stem.to_string())
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_pdf_name);

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn key_is_file_name_without_extension() {
        assert_eq!(document_key("report.pdf").unwrap(), "report");
        assert_eq!(document_key("Annual.Report.PDF").unwrap(), "Annual.Report");
        assert_eq!(document_key("nested/dir/manual.pdf").unwrap(), "manual");
        assert_eq!(document_key("C:\\docs\\scan.pdf").unwrap(), "scan");
    }

    #[test]
    fn non_pdf_names_are_rejected() {
        assert!(matches!(document_key("notes.txt"), Err(IngestError::NotPdf(_))));
        assert!(matches!(document_key("pdf"), Err(IngestError::NotPdf(_))));
        assert!(matches!(document_key(""), Err(IngestError::NotPdf(_))));
    }

    #[test]
    fn empty_stem_is_rejected() {
        assert!(matches!(
            document_key(".pdf"),
            Err(IngestError::NotPdf(_)) | Err(IngestError::InvalidArgument(_))
        ));
        assert!(matches!(
            document_key("..pdf"),
            Err(IngestError::InvalidArgument(_))
        ));
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("c.txt"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }
}
