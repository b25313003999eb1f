//! Vector index: chunk storage plus approximate nearest-neighbor search
//!
//! The index owns the corpus. Chunks are immutable once inserted; deletes
//! are logical tombstones until `rebuild` compacts the graph. Queries over
//! a configured distance metric return similarity-ordered hits with
//! deterministic tie-breaking.

mod chunk;
mod snapshot;
mod vector_index;

pub use chunk::{Chunk, ChunkId, DocumentId};
pub use vector_index::{DistanceMetric, IndexError, IndexParams, ScoredHit, VectorIndex};
