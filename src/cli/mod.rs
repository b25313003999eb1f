//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "quarry",
    version,
    about = "Retrieval-augmented query pipeline over an embedded document corpus",
    long_about = "Quarry ingests documents into an approximate nearest-neighbor index, classifies \
                  incoming queries for intent, and assembles context bundles for a downstream \
                  text generator."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/quarry/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed, and index a document file
    Ingest {
        /// Path to the raw text document
        file: PathBuf,

        /// Document identifier (defaults to the file stem)
        #[arg(short, long)]
        document: Option<String>,

        /// Maximum characters per chunk
        #[arg(long, default_value = "800")]
        chunk_size: usize,

        /// Characters of overlap between hard-split chunks
        #[arg(long, default_value = "80")]
        overlap: usize,
    },

    /// Classify a query and retrieve the best-matching chunks
    Query {
        /// Query text
        text: String,

        /// Maximum number of chunks to retrieve
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the context bundle as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a document's chunks from the corpus
    Remove {
        /// Document identifier
        document: String,
    },

    /// Compact tombstoned entries out of the index
    Rebuild,

    /// Show corpus and index status
    Status,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
