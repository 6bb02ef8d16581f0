//! Ingestion pipeline: extract → chunk → embed → replace.
//!
//! Chunk texts are embedded in batches with at most `max_in_flight` batches
//! outstanding. Results are reassembled in input order before being paired
//! with chunk ordinals, and every vector is L2-normalized. A batch returning
//! the wrong number of vectors, or a vector of the wrong dimension, aborts the
//! whole document: batches still running are cancelled and nothing is written.
//!
//! The document's chunk set is then swapped in with one
//! [`ChunkStore::replace_document`] call, so concurrent queries see either
//! the old or the new chunks.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use notes_harness_core::chunk::{chunk_pages, ChunkOutcome};
use notes_harness_core::embedding::{ensure_count, ensure_dims, l2_normalize, EmbeddingProvider};
use notes_harness_core::models::{Chunk, ChunkId, Document};
use notes_harness_core::store::ChunkStore;
use notes_harness_core::{Error, Result};

use crate::config::Config;
use crate::connector_fs::NoteFile;
use crate::extract;

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ingested {
        document: Document,
        chunks: usize,
    },
    /// Extraction produced no usable text. The store is left untouched.
    NoExtractableContent,
}

pub struct Ingestor {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ChunkStore>,
    max_chars: usize,
    overlap: usize,
    batch_size: usize,
    max_in_flight: usize,
}

impl Ingestor {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ChunkStore>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            store,
            max_chars: config.chunking.max_chars,
            overlap: config.chunking.overlap_chars,
            batch_size: config.embedding.batch_size.max(1),
            max_in_flight: config.embedding.max_in_flight.max(1),
        }
    }

    /// Ingest already-extracted pages as `document_id`, replacing any
    /// previous version of it.
    pub async fn ingest_pages<S: AsRef<str>>(
        &self,
        owner: &str,
        document_id: &str,
        filename: &str,
        pages: &[S],
    ) -> Result<IngestOutcome> {
        let page_chunks = match chunk_pages(pages, self.max_chars, self.overlap) {
            ChunkOutcome::Chunks(chunks) => chunks,
            ChunkOutcome::NoExtractableContent => {
                info!(document = document_id, filename, "no extractable content");
                return Ok(IngestOutcome::NoExtractableContent);
            }
        };

        let texts: Vec<String> = page_chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_order(
            self.provider.clone(),
            texts,
            self.batch_size,
            self.max_in_flight,
        )
        .await?;
        ensure_count(page_chunks.len(), vectors.len())?;

        let pages_used = page_chunks.iter().map(|c| c.page).max().unwrap_or(1);
        let chunks: Vec<Chunk> = page_chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (piece, embedding))| Chunk {
                id: ChunkId::new(document_id, ordinal as u32),
                page: piece.page,
                text: piece.text,
                hash: piece.hash,
                embedding,
            })
            .collect();
        let chunk_count = chunks.len();

        let document = Document {
            id: document_id.to_string(),
            owner: owner.to_string(),
            filename: filename.to_string(),
            pages: pages_used,
        };
        self.store.replace_document(document.clone(), chunks).await?;

        info!(
            document = document_id,
            filename,
            chunks = chunk_count,
            pages = pages_used,
            "document ingested"
        );
        Ok(IngestOutcome::Ingested {
            document,
            chunks: chunk_count,
        })
    }

    /// Extract and ingest a note file found by the scanner.
    pub async fn ingest_file(&self, owner: &str, file: &NoteFile) -> anyhow::Result<IngestOutcome> {
        let pages = extract::extract_file(&file.path)
            .with_context(|| format!("Failed to extract {}", file.path.display()))?;
        let document_id = document_id_for(owner, &file.relative);
        let outcome = self
            .ingest_pages(owner, &document_id, &file.relative, &pages)
            .await
            .with_context(|| format!("Failed to ingest {}", file.relative))?;
        Ok(outcome)
    }
}

/// `notes ingest`: scan the notes directory and report what would be indexed.
pub async fn run_ingest(config: &Config) -> anyhow::Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("Ingestion requires embeddings. Set [embedding] provider in config.");
    }
    let service = crate::answer::NotesService::start(config)?;
    let report = service.ingest_directory(&config.notes).await;
    service.shutdown();
    let report = report?;

    let mut chunks_total = 0;
    for (file, outcome) in &report.ingested {
        match outcome {
            IngestOutcome::Ingested { document, chunks } => {
                chunks_total += chunks;
                println!(
                    "  {} → {} chunks, {} pages",
                    file.relative, chunks, document.pages
                );
            }
            IngestOutcome::NoExtractableContent => {
                println!("  {} → no extractable content", file.relative);
            }
        }
    }
    for (file, reason) in &report.failed {
        println!("  {} failed: {}", file.relative, reason);
    }
    println!(
        "ingest {}: {} files, {} chunks, {} failed",
        config.notes.owner,
        report.ingested.len(),
        chunks_total,
        report.failed.len()
    );
    Ok(())
}

/// Stable document id for a file, so re-ingesting it replaces the old version.
pub fn document_id_for(owner: &str, relative_path: &str) -> String {
    let name = format!("notes://{}/{}", owner, relative_path);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// Spawned embedding batches. Dropping the set aborts every task still running.
struct BatchTasks(Vec<JoinHandle<Result<Vec<Vec<f32>>>>>);

impl Drop for BatchTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Embed `texts` in batches of `batch_size` with at most `max_in_flight`
/// concurrent calls, returning normalized vectors in input order.
pub async fn embed_in_order(
    provider: Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
    batch_size: usize,
    max_in_flight: usize,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let total = texts.len();
    let limit = Arc::new(Semaphore::new(max_in_flight.max(1)));

    let mut tasks = BatchTasks(Vec::new());
    for (index, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        let batch = batch.to_vec();
        let provider = provider.clone();
        let limit = limit.clone();
        tasks.0.push(tokio::spawn(async move {
            let _permit = limit.acquire_owned().await.map_err(|e| Error::Embedding {
                message: format!("embedding limiter closed: {}", e),
            })?;
            let vectors = provider.embed(&batch).await?;
            ensure_count(batch.len(), vectors.len())?;
            debug!(batch = index, size = batch.len(), "embedding batch complete");
            Ok::<_, Error>(vectors)
        }));
    }

    // Handles are awaited in spawn order, which is input order.
    let mut out = Vec::with_capacity(total);
    for handle in tasks.0.iter_mut() {
        let vectors = handle.await.map_err(|e| Error::Embedding {
            message: format!("embedding task failed: {}", e),
        })??;
        out.extend(vectors);
    }
    ensure_count(total, out.len())?;

    let dims = provider.dims();
    for vector in out.iter_mut() {
        ensure_dims(dims, vector.len())?;
        l2_normalize(vector);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notes_harness_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Encodes each text's trailing number into the vector, delaying early
    /// batches so they finish last.
    struct SlowEarlyProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for SlowEarlyProvider {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let first: f32 = texts[0].trim_start_matches('t').parse().unwrap_or(0.0);
            tokio::time::sleep(Duration::from_millis((40.0 - first * 4.0).max(1.0) as u64)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.trim_start_matches('t').parse().unwrap_or(0.0), 1.0])
                .collect())
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_in_order_reassembles_and_bounds_concurrency() {
        let provider = Arc::new(SlowEarlyProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let texts: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
        let vectors = embed_in_order(provider.clone(), texts, 1, 3).await.unwrap();

        assert_eq!(vectors.len(), 10);
        for (i, v) in vectors.iter().enumerate() {
            let norm = (1.0 + (i * i) as f32).sqrt();
            assert!((v[0] - i as f32 / norm).abs() < 1e-5, "vector {} out of order", i);
        }
        assert!(provider.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_fatal_and_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(Arc::new(ShortProvider), store.clone(), &Config::default());
        let err = ingestor
            .ingest_pages("u1", "doc", "doc.md", &["some text worth keeping"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingCountMismatch { .. }));
        assert_eq!(store.corpus_size("u1").await.unwrap(), 0);
    }

    /// The first batch comes back empty; every other batch counts itself
    /// only after a delay.
    struct FailFirstProvider {
        completed: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FailFirstProvider {
        fn model_name(&self) -> &str {
            "fail-first"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts[0] == "t0" {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct WideProvider;

    #[async_trait]
    impl EmbeddingProvider for WideProvider {
        fn model_name(&self) -> &str {
            "wide"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_failed_batch_cancels_outstanding_batches() {
        let provider = Arc::new(FailFirstProvider {
            completed: AtomicUsize::new(0),
        });
        let texts: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
        let err = embed_in_order(provider.clone(), texts, 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingCountMismatch { expected: 1, actual: 0 }));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(provider.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_fatal_and_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(Arc::new(WideProvider), store.clone(), &Config::default());
        let err = ingestor
            .ingest_pages("u1", "doc", "doc.md", &["three for two"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding { .. }));
        assert_eq!(store.corpus_size("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_document_is_no_extractable_content() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(Arc::new(ShortProvider), store.clone(), &Config::default());
        let outcome = ingestor
            .ingest_pages("u1", "doc", "doc.md", &["   \n\t", ""])
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::NoExtractableContent);
    }

    #[test]
    fn test_document_id_is_stable_per_owner_and_path() {
        assert_eq!(document_id_for("u", "a.md"), document_id_for("u", "a.md"));
        assert_ne!(document_id_for("u", "a.md"), document_id_for("v", "a.md"));
    }
}
