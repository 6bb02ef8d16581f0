//! In-memory [`ChunkStore`] + [`NeighborSearch`] implementation.
//!
//! The whole corpus sits behind a single `std::sync::RwLock`, so replacing a
//! document's chunks is one write-locked swap and concurrent searches see
//! either the old or the new chunk set. Vector search is brute-force cosine
//! distance over every chunk the owner can see; each hit's text, filename,
//! and window are copied out under the same read guard.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkId, Document};

use super::{ChunkStore, NeighborSearch, SearchHit};

#[derive(Default)]
struct Corpus {
    docs: HashMap<String, Document>,
    chunks: BTreeMap<ChunkId, Chunk>,
}

impl Corpus {
    fn remove(&mut self, document_id: &str) -> bool {
        let existed = self.docs.remove(document_id).is_some();
        self.chunks.retain(|id, _| id.document_id != document_id);
        existed
    }

    fn range(&self, document_id: &str, lo: u32, hi: u32) -> impl Iterator<Item = &Chunk> {
        let bounds = ChunkId::new(document_id, lo)..=ChunkId::new(document_id, hi);
        self.chunks.range(bounds).map(|(_, c)| c)
    }

    fn window(&self, id: &ChunkId) -> Vec<String> {
        let lo = id.ordinal.saturating_sub(1);
        let hi = id.ordinal.saturating_add(1);
        self.range(&id.document_id, lo, hi)
            .map(|c| c.text.clone())
            .collect()
    }
}

/// In-memory exact-search store for tests, the CLI, and small corpora.
#[derive(Default)]
pub struct InMemoryStore {
    corpus: RwLock<Corpus>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Corpus>> {
        self.corpus.read().map_err(|_| Error::Store {
            message: "corpus lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Corpus>> {
        self.corpus.write().map_err(|_| Error::Store {
            message: "corpus lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn replace_document(&self, doc: Document, chunks: Vec<Chunk>) -> Result<()> {
        if let Some(stray) = chunks.iter().find(|c| c.id.document_id != doc.id) {
            return Err(Error::invalid(format!(
                "chunk {} does not belong to document {}",
                stray.id, doc.id
            )));
        }

        let mut corpus = self.write()?;
        corpus.remove(&doc.id);
        for chunk in chunks {
            corpus.chunks.insert(chunk.id.clone(), chunk);
        }
        corpus.docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<bool> {
        Ok(self.write()?.remove(document_id))
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(document_id).cloned())
    }

    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>> {
        Ok(self.read()?.chunks.get(id).cloned())
    }

    async fn get_range(
        &self,
        document_id: &str,
        ordinals: RangeInclusive<u32>,
    ) -> Result<Vec<Chunk>> {
        let (lo, hi) = ordinals.into_inner();
        if lo > hi {
            return Ok(Vec::new());
        }
        let corpus = self.read()?;
        Ok(corpus.range(document_id, lo, hi).cloned().collect())
    }

    async fn corpus_size(&self, owner: &str) -> Result<usize> {
        let corpus = self.read()?;
        Ok(corpus
            .chunks
            .keys()
            .filter(|id| owned_by(&corpus.docs, &id.document_id, owner))
            .count())
    }
}

#[async_trait]
impl NeighborSearch for InMemoryStore {
    async fn search(
        &self,
        owner: &str,
        query: &[f32],
        pool_size: usize,
    ) -> Result<Vec<SearchHit>> {
        if pool_size == 0 {
            return Ok(Vec::new());
        }
        let corpus = self.read()?;
        let mut scored: Vec<(f64, &Chunk)> = corpus
            .chunks
            .values()
            .filter(|c| owned_by(&corpus.docs, &c.id.document_id, owner))
            .map(|c| (cosine_distance(query, &c.embedding), c))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(pool_size);

        Ok(scored
            .into_iter()
            .filter_map(|(distance, chunk)| {
                let doc = corpus.docs.get(&chunk.id.document_id)?;
                Some(SearchHit {
                    distance,
                    chunk: chunk.clone(),
                    filename: doc.filename.clone(),
                    window: corpus.window(&chunk.id),
                })
            })
            .collect())
    }
}

fn owned_by(docs: &HashMap<String, Document>, document_id: &str, owner: &str) -> bool {
    docs.get(document_id).is_some_and(|d| d.owner == owner)
}
