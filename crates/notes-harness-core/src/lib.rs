//! # Notes Harness Core
//!
//! Runtime-agnostic retrieval-and-ranking engine for question answering over
//! a user's own notes: chunking, candidate retrieval, threshold filtering,
//! MMR diversity reranking, and answer provenance classification.
//!
//! This crate contains no tokio, network, or filesystem dependencies.
//! Embedding, nearest-neighbor search, chunk storage, and text generation
//! are consumed through the collaborator traits in [`embedding`], [`store`],
//! and [`generation`].
//!
//! ## Query path
//!
//! ```text
//! query embedding ─▶ CandidateRetriever ─▶ ThresholdFilter ─▶ DiversityReranker
//!                                                                   │
//!                      ProvenanceClassifier ◀── Generator ◀─────────┘
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod provenance;
pub mod rerank;
pub mod retrieve;
pub mod search;
pub mod store;
pub mod text;
pub mod threshold;

pub use error::{Error, Result};
