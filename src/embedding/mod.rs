//! Embedding generation
//!
//! The pipeline treats the embedding model as an injected capability
//! behind [`EmbeddingProvider`]. The trait is async so callers can bound
//! every provider call with a timeout; the bundled fastembed backend runs
//! its blocking inference on the blocking thread pool.

mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
