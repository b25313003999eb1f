//! Retrieval orchestration
//!
//! Drives one query through classification and ANN retrieval in parallel,
//! applies the confidence policy, and assembles the context bundle handed
//! to the downstream generator. Also owns the ingestion write path.

mod ingest;
mod orchestrator;

pub use ingest::{chunk_text, IngestReport, IngestRequest, RawChunk};
pub use orchestrator::QueryPipeline;

pub use crate::classifier::IntentResult;
pub use crate::index::ScoredHit;

use crate::classifier::ClassifierError;
use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Embedding provider timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Vector search failed: {0}")]
    Index(#[from] IndexError),

    #[error("Classification failed: {0}")]
    Classifier(#[from] ClassifierError),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Embedding provider timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Index insert failed: {0}")]
    Index(#[from] IndexError),

    #[error("Document {document} has no chunks to ingest")]
    EmptyDocument { document: String },
}

/// One query through the pipeline. Ephemeral: lives for a single
/// invocation, nothing is cached or persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Raw query text
    pub text: String,

    /// Override for the configured default k
    pub top_k: Option<usize>,

    /// Optional conversation/context identifier, passed through for the
    /// caller's bookkeeping
    pub conversation: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: None,
            conversation: None,
        }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }
}

/// The orchestrator's output, consumed once by the external generator.
///
/// References chunks by identifier only; callers that need the chunk text
/// resolve it against the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Classified intent with the full label distribution
    pub intent: IntentResult,

    /// Retrieved chunks, similarity descending, at most k entries
    pub hits: Vec<ScoredHit>,

    /// True when the confidence policy was not satisfied: top intent
    /// confidence below threshold, or top similarity below threshold.
    /// A policy signal, not an error; callers decide how to degrade.
    pub fallback: bool,
}
