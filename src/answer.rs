//! The question-answering service.
//!
//! [`NotesService`] owns the collaborators (chunk store, neighbor search,
//! embedder, generator) and the ranking stages. It is built once at startup,
//! passed by reference to whatever serves requests, and closed with
//! [`NotesService::shutdown`].

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use notes_harness_core::embedding::{embed_query, EmbeddingProvider};
use notes_harness_core::generation::{GenerationRequest, Generator};
use notes_harness_core::models::{AnswerMode, ChunkId, Query, SelectedPassage};
use notes_harness_core::provenance::ProvenanceClassifier;
use notes_harness_core::search::{Retrieval, RetrievalParams, RetrievalPipeline};
use notes_harness_core::store::memory::InMemoryStore;
use notes_harness_core::store::{ChunkStore, NeighborSearch};
use notes_harness_core::{Error, Result};

use crate::config::{Config, NotesConfig, RetrievalConfig};
use crate::connector_fs::{scan_notes, NoteFile};
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::ingest::{IngestOutcome, Ingestor};

pub const MIN_QUESTION_CHARS: usize = 3;
pub const MAX_QUESTION_CHARS: usize = 1000;

/// A cited chunk as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    /// Marker-free answer text for display.
    pub answer: String,
    pub mode: AnswerMode,
    pub citations: Vec<Citation>,
    /// Cited filenames, first-seen order, deduplicated.
    pub sources: Vec<String>,
    pub notes_part: String,
    pub enrichment_part: String,
    pub min_distance: f64,
}

/// Per-file ingestion result.
#[derive(Debug)]
pub struct IngestReport {
    pub ingested: Vec<(NoteFile, IngestOutcome)>,
    pub failed: Vec<(NoteFile, String)>,
}

pub struct NotesService {
    store: Arc<dyn ChunkStore>,
    search: Arc<dyn NeighborSearch>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    pipeline: RetrievalPipeline,
    classifier: ProvenanceClassifier,
    ingestor: Ingestor,
    retrieval: RetrievalConfig,
}

impl NotesService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        search: Arc<dyn NeighborSearch>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        config: &Config,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(embedder.clone(), store.clone(), config),
            store,
            search,
            embedder,
            generator,
            pipeline: RetrievalPipeline::new(&config.retrieval.settings()),
            classifier: ProvenanceClassifier::new(config.retrieval.relevance_cutoff),
            retrieval: config.retrieval.clone(),
        }
    }

    /// Build providers from config over a fresh in-memory corpus.
    pub fn start(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let corpus = Arc::new(InMemoryStore::new());
        info!(
            embedder = embedder.model_name(),
            generator = generator.model_name(),
            "notes service started"
        );
        Ok(Self::new(corpus.clone(), corpus, embedder, generator, config))
    }

    pub fn shutdown(self) {
        info!("notes service stopped");
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    pub fn retrieval_config(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Scan a notes directory and ingest every matching file for its owner.
    ///
    /// Extraction failures are reported per file. An embedding count
    /// mismatch aborts the run.
    pub async fn ingest_directory(&self, notes: &NotesConfig) -> anyhow::Result<IngestReport> {
        let files = scan_notes(notes)?;
        let mut report = IngestReport {
            ingested: Vec::new(),
            failed: Vec::new(),
        };

        for file in files {
            match self.ingestor.ingest_file(&notes.owner, &file).await {
                Ok(outcome) => report.ingested.push((file, outcome)),
                Err(err) => {
                    if let Some(mismatch @ Error::EmbeddingCountMismatch { .. }) =
                        err.downcast_ref::<Error>()
                    {
                        anyhow::bail!("{}: {}", file.relative, mismatch);
                    }
                    warn!(file = %file.relative, error = %format!("{:#}", err), "ingestion failed");
                    report.failed.push((file, format!("{:#}", err)));
                }
            }
        }
        Ok(report)
    }

    /// Embed `question` and run the retrieval pipeline for `owner`.
    pub async fn retrieve(
        &self,
        owner: &str,
        question: &str,
        params: &RetrievalParams,
    ) -> Result<Retrieval> {
        let question = validate_question(question)?;
        params.validate(self.retrieval.max_k)?;

        let embedding = embed_query(self.embedder.as_ref(), question).await?;
        let query = Query::new(question, embedding);
        self.pipeline
            .run(
                self.store.as_ref(),
                self.search.as_ref(),
                owner,
                &query,
                params,
            )
            .await
    }

    /// Answer `question` from `user_id`'s notes.
    pub async fn answer_query(
        &self,
        user_id: &str,
        question: &str,
        k: usize,
        similarity_threshold: f64,
        allow_enrichment: bool,
    ) -> Result<AnswerResponse> {
        let params = RetrievalParams {
            k,
            similarity_threshold,
            lambda: self.retrieval.mmr_lambda,
        };
        let retrieval = self.retrieve(user_id, question, &params).await?;

        let request = GenerationRequest {
            question: question.trim().to_string(),
            passages: retrieval.selection.clone(),
            allow_enrichment,
        };
        let generated = self.generator.generate(&request).await?;

        let selection_ids: Vec<ChunkId> = retrieval
            .selection
            .iter()
            .map(|p| p.chunk_id.clone())
            .collect();
        let verdict = self.classifier.classify(
            &generated.text,
            retrieval.min_distance,
            &selection_ids,
            generated.declared_citations.as_deref(),
        );

        let citations = shape_citations(&verdict.citations, &retrieval.selection);
        let mut sources: Vec<String> = Vec::new();
        for c in &citations {
            if !sources.contains(&c.filename) {
                sources.push(c.filename.clone());
            }
        }

        info!(
            user = user_id,
            mode = %verdict.mode,
            citations = citations.len(),
            min_distance = retrieval.min_distance,
            "question answered"
        );

        Ok(AnswerResponse {
            answer: verdict.display_text(),
            mode: verdict.mode,
            citations,
            sources,
            notes_part: verdict.notes_part,
            enrichment_part: verdict.enrichment_part,
            min_distance: retrieval.min_distance,
        })
    }
}

/// Trim and length-check a question.
pub fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    let len = trimmed.chars().count();
    if !(MIN_QUESTION_CHARS..=MAX_QUESTION_CHARS).contains(&len) {
        return Err(Error::invalid(format!(
            "question must be {} to {} characters, got {}",
            MIN_QUESTION_CHARS, MAX_QUESTION_CHARS, len
        )));
    }
    Ok(trimmed)
}

fn shape_citations(ids: &[ChunkId], selection: &[SelectedPassage]) -> Vec<Citation> {
    ids.iter()
        .filter_map(|id| selection.iter().find(|p| &p.chunk_id == id))
        .map(|p| Citation {
            chunk_id: p.chunk_id.to_string(),
            document_id: p.chunk_id.document_id.clone(),
            filename: p.filename.clone(),
            page: p.page,
        })
        .collect()
}
