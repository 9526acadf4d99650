//! Document loading and processing.
//!
//! Loading is a two-stage lazy operation: [`Processor::load_documents`]
//! yields raw [`Document`]s from a file, a recursive directory walk, or an
//! in-memory upload; [`Processor::process_documents`] turns them into a lazy
//! sequence of [`Chunk`]s. A document that fails to load is logged and
//! skipped; it never aborts the rest of the batch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::ProcessorConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// File extensions treated as text documents during a directory walk.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "json", "rst"];

/// Loads raw documents and splits them into chunks.
pub struct Processor {
    chunker: Arc<dyn Chunker>,
}

impl Processor {
    /// Create a processor using the configured fixed-size chunker.
    pub fn new(config: &ProcessorConfig) -> Self {
        Self { chunker: Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)) }
    }

    /// Create a processor with a custom chunking strategy.
    pub fn with_chunker(chunker: Arc<dyn Chunker>) -> Self {
        Self { chunker }
    }

    /// Load raw documents from a path.
    ///
    /// A file path yields one document; a directory is walked recursively and
    /// every file with a known text extension is loaded. Unreadable files in
    /// a directory walk are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentProcessing`] when the path does not exist
    /// or a single requested file cannot be read.
    pub async fn load_documents(&self, path: &Path) -> Result<Vec<Document>> {
        if path.is_file() {
            return Ok(vec![self.load_single_file(path).await?]);
        }
        if !path.is_dir() {
            return Err(RagError::DocumentProcessing {
                source_name: path.display().to_string(),
                message: "path does not exist".to_string(),
            });
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(path).follow_links(false).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || !has_text_extension(entry.path()) {
                continue;
            }
            match self.load_single_file(entry.path()).await {
                Ok(document) => documents.push(document),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping unreadable document");
                }
            }
        }
        debug!(root = %path.display(), count = documents.len(), "loaded documents");
        Ok(documents)
    }

    /// Build a document from uploaded bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentProcessing`] when the bytes are not valid
    /// UTF-8.
    pub fn load_uploaded(&self, bytes: &[u8], filename: &str) -> Result<Document> {
        let text = std::str::from_utf8(bytes).map_err(|e| RagError::DocumentProcessing {
            source_name: filename.to_string(),
            message: format!("uploaded file is not valid UTF-8: {e}"),
        })?;
        Ok(make_document(filename, text, None))
    }

    /// Produce a lazy sequence of chunks from loaded documents.
    ///
    /// The iterator is finite and restartable from a fresh call; no state is
    /// shared between iterations.
    pub fn process_documents<'a>(
        &'a self,
        documents: &'a [Document],
    ) -> impl Iterator<Item = Chunk> + 'a {
        documents.iter().flat_map(|document| self.chunker.chunk(document))
    }

    async fn load_single_file(&self, path: &Path) -> Result<Document> {
        let text =
            tokio::fs::read_to_string(path).await.map_err(|e| RagError::DocumentProcessing {
                source_name: path.display().to_string(),
                message: format!("failed to read file: {e}"),
            })?;
        Ok(make_document(&document_id_for(path), &text, Some(path.display().to_string())))
    }
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn document_id_for(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("document").to_string()
}

fn make_document(id: &str, text: &str, source_uri: Option<String>) -> Document {
    let mut metadata = HashMap::new();
    metadata.insert("filename".to_string(), id.to_string());
    if let Some(uri) = &source_uri {
        metadata.insert("source".to_string(), uri.clone());
    }
    Document { id: id.to_string(), text: text.to_string(), metadata, source_uri }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_path_is_a_processing_error() {
        let processor = Processor::new(&ProcessorConfig::default());
        let err = processor.load_documents(Path::new("/nonexistent/nowhere")).await.unwrap_err();
        assert!(matches!(err, RagError::DocumentProcessing { .. }));
    }

    #[tokio::test]
    async fn directory_walk_loads_only_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.bin"), [0u8, 159, 146]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.txt"), "gamma").unwrap();

        let processor = Processor::new(&ProcessorConfig::default());
        let mut docs = processor.load_documents(dir.path()).await.unwrap();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "alpha");
        assert_eq!(docs[1].text, "gamma");
    }

    #[tokio::test]
    async fn invalid_utf8_in_a_walk_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "fine").unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0x00]).unwrap();

        let processor = Processor::new(&ProcessorConfig::default());
        let docs = processor.load_documents(dir.path()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "fine");
    }

    #[test]
    fn uploaded_bytes_must_be_utf8() {
        let processor = Processor::new(&ProcessorConfig::default());
        let err = processor.load_uploaded(&[0xff, 0xfe], "upload.txt").unwrap_err();
        assert!(matches!(err, RagError::DocumentProcessing { .. }));
        let doc = processor.load_uploaded(b"hello", "upload.txt").unwrap();
        assert_eq!(doc.text, "hello");
    }

    #[test]
    fn processing_is_lazy_and_restartable() {
        let processor = Processor::new(&ProcessorConfig { chunk_size: 4, chunk_overlap: 1 });
        let docs = vec![make_document("d", "0123456789", None)];
        let first: Vec<Chunk> = processor.process_documents(&docs).collect();
        let second: Vec<Chunk> = processor.process_documents(&docs).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
