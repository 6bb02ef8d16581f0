//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! [`load_config`] validates the result so that bad values fail at startup
//! rather than halfway through a query.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use notes_harness_core::chunk::{DEFAULT_MAX_CHARS, DEFAULT_OVERLAP};
use notes_harness_core::provenance::DEFAULT_RELEVANCE_CUTOFF;
use notes_harness_core::search::{
    RetrievalParams, RetrievalSettings, DEFAULT_K, DEFAULT_MAX_K, DEFAULT_SIMILARITY_THRESHOLD,
};
use notes_harness_core::threshold::NO_CANDIDATE_DISTANCE;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub notes: NotesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}
fn default_overlap_chars() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f64,
    #[serde(default = "default_pool_multiplier")]
    pub pool_multiplier: usize,
    #[serde(default = "default_rerank_budget")]
    pub rerank_budget: usize,
    #[serde(default = "default_secondary_cutoff_trigger")]
    pub secondary_cutoff_trigger: usize,
    #[serde(default = "default_secondary_cutoff_margin")]
    pub secondary_cutoff_margin: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    /// Distance above which retrieval counts as irrelevant for provenance.
    #[serde(default = "default_relevance_cutoff")]
    pub relevance_cutoff: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let settings = RetrievalSettings::default();
        Self {
            k: DEFAULT_K,
            max_k: DEFAULT_MAX_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            mmr_lambda: default_mmr_lambda(),
            pool_multiplier: settings.pool_multiplier,
            rerank_budget: settings.rerank_budget,
            secondary_cutoff_trigger: settings.secondary_cutoff_trigger,
            secondary_cutoff_margin: settings.secondary_cutoff_margin,
            lexical_weight: settings.lexical_weight,
            relevance_cutoff: DEFAULT_RELEVANCE_CUTOFF,
        }
    }
}

impl RetrievalConfig {
    pub fn settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            pool_multiplier: self.pool_multiplier,
            rerank_budget: self.rerank_budget,
            secondary_cutoff_trigger: self.secondary_cutoff_trigger,
            secondary_cutoff_margin: self.secondary_cutoff_margin,
            lexical_weight: self.lexical_weight,
        }
    }

    /// Request parameters from config defaults, with optional overrides.
    pub fn params(
        &self,
        k: Option<usize>,
        threshold: Option<f64>,
        lambda: Option<f64>,
    ) -> RetrievalParams {
        RetrievalParams {
            k: k.unwrap_or(self.k),
            similarity_threshold: threshold.unwrap_or(self.similarity_threshold),
            lambda: lambda.unwrap_or(self.mmr_lambda),
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}
fn default_max_k() -> usize {
    DEFAULT_MAX_K
}
fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_mmr_lambda() -> f64 {
    notes_harness_core::rerank::DEFAULT_LAMBDA
}
fn default_pool_multiplier() -> usize {
    RetrievalSettings::default().pool_multiplier
}
fn default_rerank_budget() -> usize {
    RetrievalSettings::default().rerank_budget
}
fn default_secondary_cutoff_trigger() -> usize {
    RetrievalSettings::default().secondary_cutoff_trigger
}
fn default_secondary_cutoff_margin() -> f64 {
    RetrievalSettings::default().secondary_cutoff_margin
}
fn default_lexical_weight() -> f64 {
    RetrievalSettings::default().lexical_weight
}
fn default_relevance_cutoff() -> f64 {
    DEFAULT_RELEVANCE_CUTOFF
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,
    #[serde(default = "default_passage_char_limit")]
    pub passage_char_limit: usize,
    #[serde(default = "default_allow_enrichment")]
    pub allow_enrichment: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            context_char_budget: default_context_char_budget(),
            passage_char_limit: default_passage_char_limit(),
            allow_enrichment: default_allow_enrichment(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_max_in_flight() -> usize {
    10
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.55
}
fn default_max_output_tokens() -> u32 {
    768
}
fn default_context_char_budget() -> usize {
    12_000
}
fn default_passage_char_limit() -> usize {
    2_500
}
fn default_allow_enrichment() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            owner: default_owner(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./notes")
}
fn default_owner() -> String {
    "local".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.pdf".to_string(),
    ]
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    // Retrieval
    let r = &config.retrieval;
    if r.max_k == 0 {
        bail!("retrieval.max_k must be >= 1");
    }
    r.params(None, None, None)
        .validate(r.max_k)
        .context("invalid retrieval defaults")?;
    if r.pool_multiplier == 0 {
        bail!("retrieval.pool_multiplier must be >= 1");
    }
    if r.rerank_budget == 0 {
        bail!("retrieval.rerank_budget must be >= 1");
    }
    if r.secondary_cutoff_margin < 0.0 {
        bail!("retrieval.secondary_cutoff_margin must be >= 0");
    }
    if r.lexical_weight < 0.0 {
        bail!("retrieval.lexical_weight must be >= 0");
    }
    if !(0.0..NO_CANDIDATE_DISTANCE).contains(&r.relevance_cutoff) {
        bail!(
            "retrieval.relevance_cutoff must be in [0.0, {}) so an empty retrieval is never relevant",
            NO_CANDIDATE_DISTANCE
        );
    }

    // Embedding
    let e = &config.embedding;
    match e.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if e.is_enabled() {
        if e.dims.is_none() || e.dims == Some(0) {
            bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
        }
        if e.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                e.provider
            );
        }
    }
    if e.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if e.max_in_flight == 0 {
        bail!("embedding.max_in_flight must be >= 1");
    }

    // Generation
    let g = &config.generation;
    match g.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if g.is_enabled() && g.model.is_none() {
        bail!(
            "generation.model must be specified when provider is '{}'",
            g.provider
        );
    }
    if g.context_char_budget == 0 || g.passage_char_limit < 2 {
        bail!("generation.context_char_budget and generation.passage_char_limit must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/notes.example.toml")).unwrap();
        assert!(config.embedding.is_enabled());
        assert!(config.generation.is_enabled());
        assert_eq!(config.notes.exclude_globs, vec!["drafts/**".to_string()]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.max_chars, 360);
        assert_eq!(config.chunking.overlap_chars, 90);
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.retrieval.max_k, 20);
        assert_eq!(config.retrieval.similarity_threshold, 0.60);
        assert_eq!(config.retrieval.mmr_lambda, 0.7);
        assert_eq!(config.retrieval.rerank_budget, 15);
        assert_eq!(config.retrieval.relevance_cutoff, 0.5);
        assert_eq!(config.embedding.max_in_flight, 10);
        assert_eq!(config.generation.max_output_tokens, 768);
        assert_eq!(config.notes.owner, "local");
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_overrides_parse() {
        let config = parse_config(
            r#"
            [retrieval]
            k = 8
            mmr_lambda = 0.5

            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
            dims = 768

            [notes]
            root = "/tmp/notes"
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k, 8);
        assert_eq!(config.retrieval.params(None, None, None).lambda, 0.5);
        assert_eq!(config.embedding.dims, Some(768));
        assert_eq!(config.notes.root, PathBuf::from("/tmp/notes"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse_config("[chunking]\nmax_chars = 10\noverlap_chars = 10").is_err());
        assert!(parse_config("[retrieval]\nk = 30").is_err());
        assert!(parse_config("[retrieval]\nrelevance_cutoff = 1.0").is_err());
        assert!(parse_config("[retrieval]\nsimilarity_threshold = 1.2").is_err());
        assert!(parse_config("[embedding]\nprovider = \"local\"").is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"\nmodel = \"m\"").is_err());
        assert!(parse_config("[generation]\nprovider = \"ollama\"").is_err());
    }
}
