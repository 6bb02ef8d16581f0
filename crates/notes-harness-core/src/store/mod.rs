//! Storage and nearest-neighbor abstractions.
//!
//! The ranking core talks to two collaborators:
//!
//! - [`ChunkStore`]: chunks keyed by `(document_id, ordinal)` with point
//!   and neighbor-range lookup, plus atomic whole-document replacement.
//! - [`NeighborSearch`]: exact or approximate kNN over chunk embeddings,
//!   returning [`SearchHit`]s in ascending distance order.
//!
//! A hit carries the chunk, its filename, and its context window, all read
//! from the same corpus state as its distance. The pipeline never goes back
//! to the store for them, so a document re-ingested mid-query cannot pair an
//! old distance with new text.
//!
//! Any backend implementing both can sit behind the retrieval pipeline
//! (in-memory exact search, a database RPC, an ANN index).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::ops::RangeInclusive;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Candidate, Chunk, ChunkId, Document};

/// One nearest-neighbor result with everything ranking needs.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub distance: f64,
    pub chunk: Chunk,
    pub filename: String,
    /// Texts of the previous, own, and next chunk of the same document,
    /// ascending by ordinal. Missing neighbors are simply absent.
    pub window: Vec<String>,
}

impl SearchHit {
    pub fn candidate(&self) -> Candidate {
        Candidate::new(self.chunk.id.clone(), self.distance)
    }
}

/// Chunk storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`replace_document`](ChunkStore::replace_document) | Atomically swap a document and all its chunks |
/// | [`remove_document`](ChunkStore::remove_document) | Drop a document and its chunks |
/// | [`get_document`](ChunkStore::get_document) | Document metadata lookup |
/// | [`get_chunk`](ChunkStore::get_chunk) | Point lookup by `(document_id, ordinal)` |
/// | [`get_range`](ChunkStore::get_range) | Ordinal range lookup for context windows |
/// | [`corpus_size`](ChunkStore::corpus_size) | Number of chunks visible to an owner |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Replace a document and its complete chunk set.
    ///
    /// Readers must observe either the full old chunk set or the full new
    /// one, never a mix.
    async fn replace_document(&self, doc: Document, chunks: Vec<Chunk>) -> Result<()>;

    /// Remove a document and its chunks. Returns whether it existed.
    async fn remove_document(&self, document_id: &str) -> Result<bool>;

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>>;

    /// Chunks of one document whose ordinal lies in `ordinals`, ascending.
    async fn get_range(
        &self,
        document_id: &str,
        ordinals: RangeInclusive<u32>,
    ) -> Result<Vec<Chunk>>;

    async fn corpus_size(&self, owner: &str) -> Result<usize>;
}

/// Nearest-neighbor search backend.
#[async_trait]
pub trait NeighborSearch: Send + Sync {
    /// Return up to `pool_size` of the owner's chunks nearest to `query`,
    /// ascending by distance. An empty corpus yields `[]`.
    ///
    /// Every hit in one call must come from a single consistent view of the
    /// corpus.
    async fn search(&self, owner: &str, query: &[f32], pool_size: usize)
        -> Result<Vec<SearchHit>>;
}
