//! Ingestion write path: chunk, embed, insert

use crate::index::{Chunk, DocumentId};
use crate::retrieval::{IngestError, QueryPipeline};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Raw text plus metadata, before embedding. Supplied by upload glue.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl RawChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One document's worth of chunks to index
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub document: DocumentId,
    pub chunks: Vec<RawChunk>,
}

impl IngestRequest {
    pub fn new(document: impl Into<DocumentId>, chunks: Vec<RawChunk>) -> Self {
        Self {
            document: document.into(),
            chunks,
        }
    }
}

/// Outcome of one ingest call
#[derive(Debug)]
pub struct IngestReport {
    pub document: DocumentId,
    pub chunks_indexed: usize,
    pub duration_ms: u64,
}

impl QueryPipeline {
    /// Embed and index a document's chunks.
    ///
    /// Chunk ids are derived from the document id and ordinal, so
    /// re-ingesting a document after `remove_document` reproduces stable
    /// identifiers. Embedding failures abort the whole request; chunks
    /// already inserted stay live (re-ingest after removal to reset).
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport, IngestError> {
        if request.chunks.is_empty() {
            return Err(IngestError::EmptyDocument {
                document: request.document.to_string(),
            });
        }

        let start = std::time::Instant::now();
        let total = request.chunks.len();
        let ingested_at = chrono::Utc::now().to_rfc3339();
        let mut ordinal: u32 = 0;

        for batch in request.chunks.chunks(self.batch_size()) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embed_for_ingest(&texts).await?;

            if embeddings.len() != batch.len() {
                return Err(IngestError::Embedding(
                    crate::embedding::EmbeddingError::Unavailable(format!(
                        "embedding count mismatch: expected {}, got {}",
                        batch.len(),
                        embeddings.len()
                    )),
                ));
            }

            for (raw, embedding) in batch.iter().zip(embeddings) {
                let id = format!("{}#{:04}", request.document, ordinal);
                let mut chunk = Chunk::new(
                    id,
                    request.document.clone(),
                    ordinal,
                    raw.text.clone(),
                    embedding,
                );
                chunk.metadata = raw.metadata.clone();
                chunk
                    .metadata
                    .entry("ingested_at".to_string())
                    .or_insert_with(|| ingested_at.clone());

                self.index().insert(chunk)?;
                ordinal += 1;
            }

            debug!(document = %request.document, indexed = ordinal, total, "ingest progress");
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            document = %request.document,
            chunks = ordinal,
            duration_ms,
            "document ingested"
        );

        Ok(IngestReport {
            document: request.document,
            chunks_indexed: ordinal as usize,
            duration_ms,
        })
    }

    /// Remove every chunk of a document from the corpus.
    ///
    /// Returns the number of chunks tombstoned; unknown documents surface
    /// as an index `DocumentNotFound`, reported but not fatal.
    pub fn remove_document(&self, document: &DocumentId) -> Result<usize, IngestError> {
        Ok(self.index().delete_document(document)?)
    }
}

/// Split raw document text into chunks for ingestion.
///
/// Prefers paragraph boundaries; paragraphs longer than `max_chars` are
/// hard-split with `overlap` characters carried between consecutive
/// pieces so sentences cut mid-way stay findable.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    if max_chars == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(max_chars - 1);

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = paragraph.chars().count();

        if para_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            hard_split(paragraph, max_chars, overlap, &mut chunks);
            continue;
        }

        let current_len = current.chars().count();
        if current_len > 0 && current_len + 2 + para_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn hard_split(text: &str, max_chars: usize, overlap: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    let step = max_chars - overlap;
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
}
