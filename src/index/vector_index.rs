//! ANN vector index over the chunk arena
//!
//! HNSW graph for approximate search, with logical tombstones so deletes
//! take effect immediately and `rebuild` compacts the graph without
//! stopping queries.

use super::{Chunk, ChunkId, DocumentId};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Chunk not found: {id}")]
    NotFound { id: String },

    #[error("Document not found: {document}")]
    DocumentNotFound { document: String },

    #[error("Index corruption detected: {0}")]
    Corruption(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Distance metric, fixed per index instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
}

impl DistanceMetric {
    /// Convert a raw graph distance into a similarity score.
    ///
    /// Monotonic with true nearness: higher means more similar.
    pub fn similarity(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::Euclidean => 1.0 / (1.0 + distance),
        }
    }
}

/// Search hit referencing a chunk by identifier only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredHit {
    /// Chunk identifier
    pub chunk: ChunkId,
    /// Source document of the chunk
    pub document: DocumentId,
    /// Similarity score (higher is more similar)
    pub score: f32,
}

/// Tuning parameters for the HNSW graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexParams {
    /// Embedding dimension, fixed at creation
    pub dimension: usize,
    /// Distance metric, fixed at creation
    pub metric: DistanceMetric,
    /// HNSW M parameter (connections per layer)
    pub hnsw_m: usize,
    /// HNSW construction breadth (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// Default search breadth, the recall/latency knob
    pub ef_search: usize,
    /// Capacity hint for graph layer sizing
    pub capacity: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            dimension: 384,
            metric: DistanceMetric::Cosine,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            ef_search: 64,
            capacity: 16_384,
        }
    }
}

/// HNSW graph dispatching on the configured metric
enum AnnGraph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    Euclidean(Hnsw<'static, f32, DistL2>),
}

impl AnnGraph {
    fn new(params: &IndexParams) -> Self {
        match params.metric {
            DistanceMetric::Cosine => AnnGraph::Cosine(Hnsw::new(
                params.hnsw_m,
                params.capacity,
                16,
                params.hnsw_ef_construction,
                DistCosine,
            )),
            DistanceMetric::Euclidean => AnnGraph::Euclidean(Hnsw::new(
                params.hnsw_m,
                params.capacity,
                16,
                params.hnsw_ef_construction,
                DistL2,
            )),
        }
    }

    fn insert(&self, vector: &Vec<f32>, slot: usize) {
        match self {
            AnnGraph::Cosine(g) => g.insert((vector, slot)),
            AnnGraph::Euclidean(g) => g.insert((vector, slot)),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Neighbour> {
        match self {
            AnnGraph::Cosine(g) => g.search(query, k, ef),
            AnnGraph::Euclidean(g) => g.search(query, k, ef),
        }
    }
}

/// Slot-addressed chunk storage behind the graph.
///
/// The graph indexes slots, never chunk ids, so it never needs in-place
/// deletion. Slots are monotonically increasing and never reused, even
/// across rebuilds, so a reader pairing an old graph with a new store can
/// only miss entries, never mis-map them.
struct ChunkStore {
    /// Live chunks by slot
    slots: HashMap<usize, Chunk>,
    /// Live chunk id to slot
    by_id: HashMap<ChunkId, usize>,
    /// Graph-resident slots whose chunks were deleted, pending compaction
    tombstones: HashSet<usize>,
    /// Next slot to assign, monotone across rebuilds
    next_slot: usize,
    /// Bumped on every mutation
    generation: u64,
}

impl ChunkStore {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            by_id: HashMap::new(),
            tombstones: HashSet::new(),
            next_slot: 0,
            generation: 0,
        }
    }
}

/// Mutable chunk collection with approximate k-NN queries.
///
/// Concurrency: queries take short read locks and never hold them across
/// the final sort; insert/delete/rebuild serialize on a single writer
/// mutex. Rebuild constructs the replacement graph off-lock and swaps it
/// in atomically, so in-flight queries always complete against a
/// consistent view.
pub struct VectorIndex {
    graph: RwLock<AnnGraph>,
    store: RwLock<ChunkStore>,
    /// Single-writer discipline for insert/delete/rebuild
    writer: Mutex<()>,
    params: IndexParams,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The HNSW graph itself is not Debug; report the parameters only.
        f.debug_struct("VectorIndex")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    pub fn new(params: IndexParams) -> Self {
        let graph = AnnGraph::new(&params);
        Self {
            graph: RwLock::new(graph),
            store: RwLock::new(ChunkStore::new()),
            writer: Mutex::new(()),
            params,
        }
    }

    /// Insert a chunk.
    ///
    /// Re-inserting a live id with an identical embedding is a no-op;
    /// the same id with a divergent embedding is corruption (chunks are
    /// immutable, re-indexing goes through delete).
    pub fn insert(&self, chunk: Chunk) -> Result<(), IndexError> {
        if chunk.embedding.len() != self.params.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.params.dimension,
                actual: chunk.embedding.len(),
            });
        }

        let _writer = self.writer.lock().unwrap();

        let slot = {
            let store = self.store.read().unwrap();
            if let Some(&existing_slot) = store.by_id.get(&chunk.id) {
                let existing = &store.slots[&existing_slot];
                if existing.embedding == chunk.embedding {
                    return Ok(());
                }
                return Err(IndexError::Corruption(format!(
                    "duplicate chunk id {} with divergent embedding",
                    chunk.id
                )));
            }
            store.next_slot
        };

        {
            let graph = self.graph.write().unwrap();
            graph.insert(&chunk.embedding, slot);
        }

        let mut store = self.store.write().unwrap();
        store.by_id.insert(chunk.id.clone(), slot);
        store.slots.insert(slot, chunk);
        store.next_slot += 1;
        store.generation += 1;

        Ok(())
    }

    /// Logically delete a chunk. Queries never return it afterwards,
    /// even before the graph is physically compacted.
    pub fn delete(&self, id: &ChunkId) -> Result<(), IndexError> {
        let _writer = self.writer.lock().unwrap();

        let mut store = self.store.write().unwrap();
        let slot = store
            .by_id
            .remove(id)
            .ok_or_else(|| IndexError::NotFound { id: id.to_string() })?;
        store.slots.remove(&slot);
        store.tombstones.insert(slot);
        store.generation += 1;

        debug!(chunk = %id, slot, "tombstoned chunk");
        Ok(())
    }

    /// Tombstone every live chunk of a document. Returns the count.
    pub fn delete_document(&self, document: &DocumentId) -> Result<usize, IndexError> {
        let _writer = self.writer.lock().unwrap();

        let mut store = self.store.write().unwrap();
        let ids: Vec<ChunkId> = store
            .slots
            .values()
            .filter(|c| &c.document == document)
            .map(|c| c.id.clone())
            .collect();

        if ids.is_empty() {
            return Err(IndexError::DocumentNotFound {
                document: document.to_string(),
            });
        }

        for id in &ids {
            if let Some(slot) = store.by_id.remove(id) {
                store.slots.remove(&slot);
                store.tombstones.insert(slot);
            }
        }
        store.generation += 1;

        info!(document = %document, chunks = ids.len(), "removed document from index");
        Ok(ids.len())
    }

    /// Approximate k-nearest query.
    ///
    /// Returns up to k live chunks ordered by similarity descending, ties
    /// broken by chunk id ascending. Empty index yields an empty Vec.
    /// `ef_search` overrides the configured search breadth; no exact
    /// top-k guarantee either way.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        ef_search: Option<usize>,
    ) -> Result<Vec<ScoredHit>, IndexError> {
        if vector.len() != self.params.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.params.dimension,
                actual: vector.len(),
            });
        }

        let garbage = {
            let store = self.store.read().unwrap();
            if store.by_id.is_empty() {
                return Ok(Vec::new());
            }
            store.tombstones.len()
        };

        if k == 0 {
            return Ok(Vec::new());
        }

        // Over-fetch to cover tombstoned slots still resident in the graph.
        let fetch = k + garbage;
        let ef = ef_search.unwrap_or(self.params.ef_search).max(fetch);

        let neighbours = {
            let graph = self.graph.read().unwrap();
            graph.search(vector, fetch, ef)
        };

        let mut hits: Vec<ScoredHit> = {
            let store = self.store.read().unwrap();
            neighbours
                .into_iter()
                .filter_map(|n| {
                    store.slots.get(&n.d_id).map(|chunk| ScoredHit {
                        chunk: chunk.id.clone(),
                        document: chunk.document.clone(),
                        score: self.params.metric.similarity(n.distance),
                    })
                })
                .collect()
        };

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.cmp(&b.chunk))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Compact tombstoned entries out of the graph.
    ///
    /// Builds the replacement graph from live chunks without holding the
    /// read path's locks, verifies every embedding dimension, then swaps
    /// graph and store under both write locks at once. Idempotent.
    pub fn rebuild(&self) -> Result<(), IndexError> {
        let _writer = self.writer.lock().unwrap();

        let (live, start_slot) = {
            let store = self.store.read().unwrap();
            let live: Vec<Chunk> = store.slots.values().cloned().collect();
            (live, store.next_slot)
        };

        for chunk in &live {
            if chunk.embedding.len() != self.params.dimension {
                return Err(IndexError::Corruption(format!(
                    "chunk {} has embedding dimension {}, index expects {}",
                    chunk.id,
                    chunk.embedding.len(),
                    self.params.dimension
                )));
            }
        }

        let new_graph = AnnGraph::new(&self.params);
        let mut new_slots = HashMap::with_capacity(live.len());
        let mut new_by_id = HashMap::with_capacity(live.len());
        for (offset, chunk) in live.into_iter().enumerate() {
            let slot = start_slot + offset;
            new_graph.insert(&chunk.embedding, slot);
            new_by_id.insert(chunk.id.clone(), slot);
            new_slots.insert(slot, chunk);
        }
        let next_slot = start_slot + new_slots.len();

        // Atomic swap: both locks held so readers see old/old or new/new.
        let mut graph = self.graph.write().unwrap();
        let mut store = self.store.write().unwrap();
        *graph = new_graph;
        store.slots = new_slots;
        store.by_id = new_by_id;
        store.tombstones.clear();
        store.next_slot = next_slot;
        store.generation += 1;

        info!(live = store.slots.len(), "index rebuilt, tombstones compacted");
        Ok(())
    }

    /// Number of live chunks
    pub fn len(&self) -> usize {
        self.store.read().unwrap().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.params.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.params.metric
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Number of tombstoned slots awaiting compaction
    pub fn pending_tombstones(&self) -> usize {
        self.store.read().unwrap().tombstones.len()
    }

    /// Look up a live chunk by id (for glue layers that need the text)
    pub fn get(&self, id: &ChunkId) -> Option<Chunk> {
        let store = self.store.read().unwrap();
        store.by_id.get(id).and_then(|slot| store.slots.get(slot)).cloned()
    }

    /// Clone out all live chunks, ordered by id (snapshot write path)
    pub(crate) fn live_chunks(&self) -> Vec<Chunk> {
        let store = self.store.read().unwrap();
        let mut chunks: Vec<Chunk> = store.slots.values().cloned().collect();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        chunks
    }
}
