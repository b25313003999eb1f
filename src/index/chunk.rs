//! Chunk data model: the atom stored and retrieved by the vector index

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier for an indexed chunk, unique within a corpus.
///
/// Opaque to the index; ordered so similarity ties break deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a source document within the corpus
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable unit of indexed text plus its embedding.
///
/// Created during ingestion, owned by the vector index, never mutated.
/// Removal happens only through explicit delete or corpus reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, unique within the corpus
    pub id: ChunkId,

    /// Source document this chunk was cut from
    pub document: DocumentId,

    /// Ordinal position within the source document
    pub ordinal: u32,

    /// Raw chunk text
    pub text: String,

    /// Embedding vector (fixed dimension, set at index creation)
    pub embedding: Vec<f32>,

    /// Optional string metadata (title, timestamp, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    pub fn new(
        id: impl Into<ChunkId>,
        document: impl Into<DocumentId>,
        ordinal: u32,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            ordinal,
            text: text.into(),
            embedding,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_ordering() {
        let a = ChunkId::new("doc#0001");
        let b = ChunkId::new("doc#0002");
        assert!(a < b);
    }

    #[test]
    fn test_chunk_builder() {
        let chunk = Chunk::new("c1", "handbook", 0, "How to apply leave", vec![1.0, 0.0])
            .with_metadata("title", "Leave policy");

        assert_eq!(chunk.id.as_str(), "c1");
        assert_eq!(chunk.document.as_str(), "handbook");
        assert_eq!(chunk.metadata.get("title").map(String::as_str), Some("Leave policy"));
    }
}
