//! Query pipeline: embed, classify + retrieve in parallel, apply policy

use crate::classifier::IntentClassifier;
use crate::config::Config;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::error::QuarryError;
use crate::index::VectorIndex;
use crate::retrieval::{ContextBundle, IngestError, QueryError, QueryRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Coordinates one query through classification and retrieval.
///
/// Holds only shared read handles; many queries may run concurrently,
/// each independent. The index is the single shared-mutable resource and
/// enforces its own locking discipline.
pub struct QueryPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    classifier: Arc<IntentClassifier>,
    default_k: usize,
    intent_threshold: f32,
    similarity_threshold: f32,
    batch_size: usize,
    embed_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl QueryPipeline {
    /// Wire up the pipeline, verifying that provider, index, and
    /// classifier agree on the embedding dimension.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        classifier: Arc<IntentClassifier>,
        config: &Config,
    ) -> Result<Self, QuarryError> {
        let dim = index.dimension();
        if provider.dimension() != dim {
            return Err(QuarryError::Config(format!(
                "embedding provider dimension {} does not match index dimension {}",
                provider.dimension(),
                dim
            )));
        }
        if classifier.input_dim() != dim {
            return Err(QuarryError::Config(format!(
                "classifier input dimension {} does not match index dimension {}",
                classifier.input_dim(),
                dim
            )));
        }

        Ok(Self {
            provider,
            index,
            classifier,
            default_k: config.retrieval.default_k,
            intent_threshold: config.retrieval.intent_threshold,
            similarity_threshold: config.retrieval.similarity_threshold,
            batch_size: config.embedding.batch_size,
            embed_timeout: config.embed_timeout(),
            max_retries: config.embedding.max_retries,
            retry_backoff: config.retry_backoff(),
        })
    }

    /// Run one query end to end and assemble the context bundle.
    ///
    /// Classification and index lookup are independent reads and run as a
    /// fork-join once the query embedding is available. Low confidence is
    /// a successful outcome with `fallback` set, never an error.
    pub async fn query(&self, request: QueryRequest) -> Result<ContextBundle, QueryError> {
        let request_id = Uuid::new_v4();
        let k = request.top_k.unwrap_or(self.default_k);

        debug!(%request_id, k, conversation = ?request.conversation, "query started");

        let embedding = self
            .embed_with_retry(std::slice::from_ref(&request.text))
            .await
            .map_err(|e| match e {
                RetryFailure::Timeout(secs) => QueryError::Timeout { secs },
                RetryFailure::Provider(e) => QueryError::Embedding(e),
            })?
            .pop()
            .ok_or_else(|| {
                QueryError::Embedding(EmbeddingError::Unavailable(
                    "provider returned no embedding".to_string(),
                ))
            })?;

        let (intent, hits) = tokio::join!(
            async { self.classifier.classify(&embedding) },
            async { self.index.query(&embedding, k, None) },
        );
        let intent = intent?;
        let hits = hits?;

        let top_similarity = hits.first().map(|h| h.score);
        let retrieval_weak = match top_similarity {
            Some(score) => score < self.similarity_threshold,
            None => self.similarity_threshold > 0.0,
        };
        let fallback = intent.confidence < self.intent_threshold || retrieval_weak;

        debug!(
            %request_id,
            intent = %intent.label,
            confidence = intent.confidence,
            hits = hits.len(),
            top_similarity,
            fallback,
            "query complete"
        );

        Ok(ContextBundle {
            intent,
            hits,
            fallback,
        })
    }

    /// Embed `texts`, bounded by the configured timeout, retrying only
    /// provider outages with exponential backoff.
    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetryFailure> {
        let mut backoff = self.retry_backoff;
        let mut attempt = 0u32;
        loop {
            let call = self.provider.embed_batch(texts);
            match tokio::time::timeout(self.embed_timeout, call).await {
                Err(_) => return Err(RetryFailure::Timeout(self.embed_timeout.as_secs())),
                Ok(Ok(embeddings)) => return Ok(embeddings),
                Ok(Err(EmbeddingError::Unavailable(msg))) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "embedding provider unavailable, retrying: {msg}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Ok(Err(e)) => return Err(RetryFailure::Provider(e)),
            }
        }
    }

    pub(crate) async fn embed_for_ingest(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, IngestError> {
        self.embed_with_retry(texts).await.map_err(|e| match e {
            RetryFailure::Timeout(secs) => IngestError::Timeout { secs },
            RetryFailure::Provider(e) => IngestError::Embedding(e),
        })
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Shared handle to the underlying index, for glue layers that
    /// resolve chunk ids to text or trigger maintenance.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

enum RetryFailure {
    Timeout(u64),
    Provider(EmbeddingError),
}
