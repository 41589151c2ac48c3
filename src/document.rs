//! Document ingestion — turns an uploaded file into plain text for the seed
//! context.

use std::path::Path;

use crate::error::ExtractionError;

/// An uploaded document, as received from the user.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a document from disk.
    pub async fn read(path: &Path) -> Result<Self, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        Ok(Self { name, bytes })
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

/// Extracts text from an uploaded document.
pub trait DocumentIngestor: Send + Sync {
    fn extract(&self, document: &RawDocument) -> Result<String, ExtractionError>;
}

/// Accepts UTF-8 text documents.
pub struct PlainTextIngestor;

impl PlainTextIngestor {
    const TEXT_EXTENSIONS: &'static [&'static str] = &["txt", "md", "markdown", "csv", "tsv", "json"];
}

impl DocumentIngestor for PlainTextIngestor {
    fn extract(&self, document: &RawDocument) -> Result<String, ExtractionError> {
        if let Some(ext) = document.extension()
            && !Self::TEXT_EXTENSIONS.contains(&ext.as_str())
        {
            return Err(ExtractionError::Unsupported {
                name: document.name.clone(),
            });
        }

        let text = std::str::from_utf8(&document.bytes).map_err(|_| {
            ExtractionError::InvalidEncoding {
                name: document.name.clone(),
            }
        })?;

        let text = text.trim_start_matches('\u{feff}').trim();
        if text.is_empty() {
            return Err(ExtractionError::Empty {
                name: document.name.clone(),
            });
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trimmed_text() {
        let doc = RawDocument::new("notes.md", b"\xef\xbb\xbf  # Budget\n\nTotal: $50,000\n".to_vec());
        assert_eq!(
            PlainTextIngestor.extract(&doc).unwrap(),
            "# Budget\n\nTotal: $50,000"
        );
    }

    #[test]
    fn accepts_files_without_extension() {
        let doc = RawDocument::new("README", b"hello".to_vec());
        assert_eq!(PlainTextIngestor.extract(&doc).unwrap(), "hello");
    }

    #[test]
    fn rejects_pdf() {
        let doc = RawDocument::new("call-for-proposals.PDF", b"%PDF-1.7".to_vec());
        assert!(matches!(
            PlainTextIngestor.extract(&doc),
            Err(ExtractionError::Unsupported { .. })
        ));
    }

    #[test]
    fn rejects_binary_and_empty() {
        let binary = RawDocument::new("data.txt", vec![0xff, 0xfe, 0x00]);
        assert!(matches!(
            PlainTextIngestor.extract(&binary),
            Err(ExtractionError::InvalidEncoding { .. })
        ));

        let empty = RawDocument::new("blank.txt", b"   \n".to_vec());
        assert!(matches!(
            PlainTextIngestor.extract(&empty),
            Err(ExtractionError::Empty { .. })
        ));
    }

    #[tokio::test]
    async fn read_from_disk_keeps_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mission.txt");
        tokio::fs::write(&path, "Educate girls").await.unwrap();

        let doc = RawDocument::read(&path).await.unwrap();
        assert_eq!(doc.name, "mission.txt");
        assert_eq!(PlainTextIngestor.extract(&doc).unwrap(), "Educate girls");
    }
}
