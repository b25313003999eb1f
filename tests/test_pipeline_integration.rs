//! Pipeline integration tests
//!
//! Runs the full ingest → classify → retrieve → bundle path with a
//! deterministic embedding provider, so no model download is needed.
//! The fastembed-backed end-to-end test is `#[ignore]`d like the other
//! model-download tests.

use async_trait::async_trait;
use quarry::classifier::IntentClassifier;
use quarry::config::Config;
use quarry::embedding::{EmbeddingError, EmbeddingProvider};
use quarry::index::{DocumentId, VectorIndex};
use quarry::retrieval::{IngestRequest, QueryPipeline, QueryRequest, RawChunk};
use std::sync::Arc;

/// Keyword-routing 3-dim provider: "leave" → axis 0, "clock" → axis 1,
/// everything else → axis 2. Deterministic and instant.
struct KeywordProvider;

impl KeywordProvider {
    fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("leave") {
            vec![1.0, 0.0, 0.0]
        } else if lower.contains("clock") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "keyword-3d"
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.dimension = 3;
    config.embedding.retry_backoff_ms = 1;
    config.classifier.labels = vec![
        "leave_request".to_string(),
        "clock_in".to_string(),
        "unknown".to_string(),
    ];
    config
}

/// Routes each embedding axis to the matching label, scaled so the
/// winning axis dominates after softmax.
fn axis_classifier(config: &Config) -> IntentClassifier {
    let weights = vec![
        vec![8.0, 0.0, 0.0],
        vec![0.0, 8.0, 0.0],
        vec![0.0, 0.0, 8.0],
    ];
    IntentClassifier::from_layers(
        config.classifier.labels.clone(),
        vec![(weights, vec![0.0, 0.0, 0.0])],
    )
    .unwrap()
}

fn build_pipeline(config: &Config) -> (QueryPipeline, Arc<VectorIndex>) {
    let index = Arc::new(VectorIndex::new(config.index_params()));
    let pipeline = QueryPipeline::new(
        Arc::new(KeywordProvider),
        Arc::clone(&index),
        Arc::new(axis_classifier(config)),
        config,
    )
    .unwrap();
    (pipeline, index)
}

async fn ingest_handbook(pipeline: &QueryPipeline) {
    let chunks = vec![
        RawChunk::new("How to apply for sick or casual leave in the ERP system")
            .with_metadata("title", "Leave policy"),
        RawChunk::new("Clock in and clock out corrections for missed punches"),
        RawChunk::new("Insurance module enrollment details"),
    ];
    pipeline
        .ingest(IngestRequest::new("handbook", chunks))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_leave_query_classified_and_retrieved() {
    let config = test_config();
    let (pipeline, _index) = build_pipeline(&config);
    ingest_handbook(&pipeline).await;

    let bundle = pipeline
        .query(QueryRequest::new("apply sick leave tomorrow"))
        .await
        .unwrap();

    assert_eq!(bundle.intent.label, "leave_request");
    assert!(bundle.intent.confidence > config.retrieval.intent_threshold);
    assert!(!bundle.fallback);

    // Top hit is the leave chunk; score distribution sums to one.
    assert_eq!(bundle.hits[0].chunk.as_str(), "handbook#0000");
    let sum: f32 = bundle.intent.distribution.iter().map(|(_, p)| p).sum();
    assert!((sum - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_far_query_sets_fallback_with_best_available() {
    let config = test_config();
    let (pipeline, _index) = build_pipeline(&config);

    let chunks = vec![
        RawChunk::new("How to apply for sick or casual leave"),
        RawChunk::new("Clock in and clock out corrections"),
    ];
    pipeline
        .ingest(IngestRequest::new("handbook", chunks))
        .await
        .unwrap();

    // Embeds orthogonal to everything indexed: similarity 0 < threshold.
    let bundle = pipeline
        .query(QueryRequest::new("quarterly revenue projections"))
        .await
        .unwrap();

    assert!(bundle.fallback);
    // Best-available results still returned, never an empty error.
    assert!(!bundle.hits.is_empty());
}

#[tokio::test]
async fn test_empty_index_query_yields_fallback() {
    let config = test_config();
    let (pipeline, _index) = build_pipeline(&config);

    let bundle = pipeline
        .query(QueryRequest::new("apply sick leave"))
        .await
        .unwrap();

    assert!(bundle.hits.is_empty());
    assert!(bundle.fallback);
}

#[tokio::test]
async fn test_top_k_override_bounds_results() {
    let config = test_config();
    let (pipeline, _index) = build_pipeline(&config);
    ingest_handbook(&pipeline).await;

    let bundle = pipeline
        .query(QueryRequest::new("leave or clock questions").with_top_k(1))
        .await
        .unwrap();
    assert_eq!(bundle.hits.len(), 1);

    let bundle = pipeline
        .query(QueryRequest::new("leave or clock questions").with_top_k(50))
        .await
        .unwrap();
    assert!(bundle.hits.len() <= 3);
}

#[tokio::test]
async fn test_remove_document_then_query() {
    let config = test_config();
    let (pipeline, index) = build_pipeline(&config);
    ingest_handbook(&pipeline).await;
    assert_eq!(index.len(), 3);

    let removed = pipeline
        .remove_document(&DocumentId::new("handbook"))
        .unwrap();
    assert_eq!(removed, 3);

    let bundle = pipeline
        .query(QueryRequest::new("apply sick leave"))
        .await
        .unwrap();
    assert!(bundle.hits.is_empty());
    assert!(bundle.fallback);

    // Unknown document reported, not fatal.
    assert!(pipeline.remove_document(&DocumentId::new("handbook")).is_err());
}

#[tokio::test]
async fn test_reingest_after_removal_restores_stable_ids() {
    let config = test_config();
    let (pipeline, index) = build_pipeline(&config);
    ingest_handbook(&pipeline).await;

    pipeline.remove_document(&DocumentId::new("handbook")).unwrap();
    index.rebuild().unwrap();
    ingest_handbook(&pipeline).await;

    let bundle = pipeline
        .query(QueryRequest::new("apply sick leave"))
        .await
        .unwrap();
    assert_eq!(bundle.hits[0].chunk.as_str(), "handbook#0000");
}

#[tokio::test]
async fn test_bundle_serializes_for_downstream_generator() {
    let config = test_config();
    let (pipeline, _index) = build_pipeline(&config);
    ingest_handbook(&pipeline).await;

    let bundle = pipeline
        .query(QueryRequest::new("apply sick leave"))
        .await
        .unwrap();

    let json = serde_json::to_string(&bundle).unwrap();
    assert!(json.contains("leave_request"));
    assert!(json.contains("handbook#0000"));
}

#[tokio::test]
#[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
async fn test_end_to_end_with_fastembed() {
    use quarry::embedding::FastEmbedProvider;

    let config = Config::default();
    let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model).unwrap());
    let index = Arc::new(VectorIndex::new(config.index_params()));
    let classifier = Arc::new(
        IntentClassifier::uniform(config.classifier.labels.clone(), config.embedding.dimension)
            .unwrap(),
    );
    let pipeline = QueryPipeline::new(provider, index, classifier, &config).unwrap();

    let chunks = vec![
        RawChunk::new("Employees can apply for sick leave through the HR portal."),
        RawChunk::new("Clock-in corrections require manager approval."),
        RawChunk::new("The cafeteria is open from 8am to 6pm."),
    ];
    pipeline
        .ingest(IngestRequest::new("handbook", chunks))
        .await
        .unwrap();

    let bundle = pipeline
        .query(QueryRequest::new("how do I request time off when I am ill?"))
        .await
        .unwrap();

    assert_eq!(bundle.hits[0].chunk.as_str(), "handbook#0000");
    // Uniform classifier always trips the intent threshold.
    assert!(bundle.fallback);
}
