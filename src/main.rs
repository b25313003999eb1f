use quarry::cli::{Cli, Commands};
use quarry::classifier::IntentClassifier;
use quarry::config::Config;
use quarry::embedding::FastEmbedProvider;
use quarry::error::Result;
use quarry::index::{DocumentId, VectorIndex};
use quarry::retrieval::{chunk_text, IngestRequest, QueryPipeline, QueryRequest, RawChunk};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Ingest {
            file,
            document,
            chunk_size,
            overlap,
        } => {
            cmd_ingest(&config, file, document, chunk_size, overlap).await?;
        }
        Commands::Query { text, limit, json } => {
            cmd_query(&config, &text, limit, json).await?;
        }
        Commands::Remove { document } => {
            cmd_remove(&config, &document)?;
        }
        Commands::Rebuild => {
            cmd_rebuild(&config)?;
        }
        Commands::Status => {
            cmd_status(&config)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "quarry=debug" } else { "quarry=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(p) => p,
        None => Config::default_path()?,
    };
    if path.exists() {
        Config::load(&path)
    } else {
        tracing::debug!("No config file at {:?}, using defaults", path);
        Ok(Config::default())
    }
}

/// Open the index, restoring the configured snapshot when one exists.
fn open_index(config: &Config) -> Result<Arc<VectorIndex>> {
    let params = config.index_params();
    let index = match &config.index.snapshot_path {
        Some(path) if path.exists() => VectorIndex::load(path, params)?,
        _ => VectorIndex::new(params),
    };
    Ok(Arc::new(index))
}

/// Persist the index when a snapshot path is configured.
fn persist_index(config: &Config, index: &VectorIndex) -> Result<()> {
    if let Some(path) = &config.index.snapshot_path {
        index.save(path)?;
    }
    Ok(())
}

fn build_classifier(config: &Config) -> Result<IntentClassifier> {
    match &config.classifier.weights_file {
        Some(path) if path.exists() => Ok(IntentClassifier::from_file(path)?),
        _ => {
            tracing::warn!("No classifier weights configured; every query will carry the fallback flag");
            Ok(IntentClassifier::uniform(
                config.classifier.labels.clone(),
                config.embedding.dimension,
            )?)
        }
    }
}

fn build_pipeline(config: &Config) -> Result<(QueryPipeline, Arc<VectorIndex>)> {
    let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    let index = open_index(config)?;
    let classifier = Arc::new(build_classifier(config)?);
    let pipeline = QueryPipeline::new(provider, Arc::clone(&index), classifier, config)?;
    Ok((pipeline, index))
}

async fn cmd_ingest(
    config: &Config,
    file: PathBuf,
    document: Option<String>,
    chunk_size: usize,
    overlap: usize,
) -> Result<()> {
    let document = document.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    let text = std::fs::read_to_string(&file).map_err(|e| quarry::QuarryError::Io {
        source: e,
        context: format!("Failed to read document file: {:?}", file),
    })?;

    let pieces = chunk_text(&text, chunk_size, overlap);
    if pieces.is_empty() {
        println!("Nothing to ingest: {} is empty", file.display());
        return Ok(());
    }

    let chunks: Vec<RawChunk> = pieces
        .into_iter()
        .map(|piece| RawChunk::new(piece).with_metadata("source", file.display().to_string()))
        .collect();

    let (pipeline, index) = build_pipeline(config)?;
    let report = pipeline
        .ingest(IngestRequest::new(document.as_str(), chunks))
        .await?;
    persist_index(config, &index)?;

    println!(
        "Indexed {} chunks from {} in {}ms",
        report.chunks_indexed, report.document, report.duration_ms
    );
    Ok(())
}

async fn cmd_query(
    config: &Config,
    text: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let (pipeline, index) = build_pipeline(config)?;

    let mut request = QueryRequest::new(text);
    request.top_k = limit;
    let bundle = pipeline.query(request).await?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&bundle).map_err(|e| quarry::QuarryError::Json {
                source: e,
                context: "Failed to render context bundle".to_string(),
            })?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "Intent: {} ({:.2}){}",
        bundle.intent.label,
        bundle.intent.confidence,
        if bundle.fallback { "  [fallback]" } else { "" }
    );
    if bundle.hits.is_empty() {
        println!("No matching chunks.");
    }
    for (rank, hit) in bundle.hits.iter().enumerate() {
        let preview = index
            .get(&hit.chunk)
            .map(|c| preview_text(&c.text, 96))
            .unwrap_or_default();
        println!(
            "{:2}. [{:.3}] {}  {}",
            rank + 1,
            hit.score,
            hit.chunk,
            preview
        );
    }
    Ok(())
}

fn cmd_remove(config: &Config, document: &str) -> Result<()> {
    let index = open_index(config)?;
    let removed = index.delete_document(&DocumentId::new(document))?;
    index.rebuild()?;
    persist_index(config, &index)?;
    println!("Removed {removed} chunks of document {document}");
    Ok(())
}

fn cmd_rebuild(config: &Config) -> Result<()> {
    let index = open_index(config)?;
    let before = index.pending_tombstones();
    index.rebuild()?;
    persist_index(config, &index)?;
    println!("Rebuilt index, compacted {before} tombstones");
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let index = open_index(config)?;
    println!("Corpus status");
    println!("  live chunks:        {}", index.len());
    println!("  pending tombstones: {}", index.pending_tombstones());
    println!("  dimension:          {}", index.dimension());
    println!("  metric:             {:?}", index.metric());
    println!("  intent labels:      {}", config.classifier.labels.join(", "));
    println!(
        "  thresholds:         intent {:.2}, similarity {:.2}, k {}",
        config.retrieval.intent_threshold,
        config.retrieval.similarity_threshold,
        config.retrieval.default_k
    );
    Ok(())
}

fn preview_text(text: &str, max_chars: usize) -> String {
    let mut preview: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        preview.push_str("...");
    }
    preview.replace('\n', " ")
}
