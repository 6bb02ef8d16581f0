//! # Notes Harness
//!
//! Question answering over a user's own notes.
//!
//! Notes are extracted page by page, cut into overlapping windows, embedded
//! and stored per owner. A question is embedded, matched against the
//! owner's chunks, filtered by similarity, reranked for diversity with
//! Maximal Marginal Relevance, and handed to a generator together with the
//! neighbouring chunks of each pick. The answer is then classified as
//! notes-only, mixed, or model-only, and cited accordingly.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ Notes dir   │──▶│   Ingestor   │──▶│ ChunkStore │
//! │ md/txt/pdf  │   │ Chunk+Embed  │   │  (memory)  │
//! └─────────────┘   └──────────────┘   └─────┬──────┘
//!                                            │
//!     question ──▶ Retrieve ▶ Threshold ▶ MMR ▶ Generate ▶ Provenance
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! notes chunk ./notes/biology.md         # preview chunk windows
//! notes ingest                           # scan and index [notes].root
//! notes search "photosynthesis" --k 3
//! notes ask "How do plants make sugar?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Notes directory scanner |
//! | [`extract`] | Page-wise text extraction |
//! | [`chunk`] | Chunk preview command |
//! | [`embedding`] | HTTP embedding providers |
//! | [`ingest`] | Extract, chunk, embed, replace |
//! | [`generation`] | Prompting and HTTP generators |
//! | [`answer`] | The question-answering service |
//! | [`search`] | Search and ask commands |
//!
//! The ranking stages themselves live in the `notes-harness-core` crate.

pub mod answer;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod search;
