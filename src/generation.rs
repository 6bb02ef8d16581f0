//! Answer generation over chat-completion APIs.
//!
//! Implements [`notes_harness_core::generation::Generator`] for:
//! - **[`DisabledGenerator`]**: always fails; `notes ask` needs a real provider.
//! - **[`OpenAIGenerator`]**: `POST {url}/chat/completions`.
//! - **[`OllamaGenerator`]**: `POST {url}/api/chat` with `stream: false`.
//!
//! # Prompt
//!
//! Passages are rendered best-first as `[n] filename · p.N` blocks until the
//! context budget is spent (the first passage is always included), each
//! soft-truncated at a word boundary. When enrichment is allowed the model
//! is told to put general-knowledge additions after
//! [`ENRICHMENT_MARKER`]; otherwise it is told not to add any.
//!
//! # Cleanup
//!
//! Bracket references like `[2]` are recorded as declared citations and
//! stripped, a trailing `Sources:` footer is removed, and an empty answer
//! becomes [`NOT_FOUND_ANSWER`].

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

use notes_harness_core::generation::{
    GeneratedAnswer, GenerationRequest, Generator, ENRICHMENT_MARKER, NOT_FOUND_ANSWER,
};
use notes_harness_core::models::ChunkId;
use notes_harness_core::{Error, Result};

use crate::config::GenerationConfig;
use crate::embedding::send_with_retry;

static BRACKET_REF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s*\[(\d+)\]\s*").ok());
static SOURCES_FOOTER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*sources:.*$").ok());

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Context packing limits.
#[derive(Debug, Clone, Copy)]
pub struct PromptSettings {
    pub context_char_budget: usize,
    pub passage_char_limit: usize,
}

impl From<&GenerationConfig> for PromptSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            context_char_budget: config.context_char_budget,
            passage_char_limit: config.passage_char_limit,
        }
    }
}

pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedAnswer> {
        Err(Error::Generation {
            message: "Generation provider is disabled; set [generation].provider in the config"
                .to_string(),
        })
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    prompt: PromptSettings,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            prompt: PromptSettings::from(config),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedAnswer> {
        let prompt = build_prompt(request, &self.prompt);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "max_tokens": self.max_output_tokens,
        });
        let http = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = send_with_retry(http, self.max_retries, "OpenAI")
            .await
            .map_err(as_generation_error)?;

        let raw = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Generation {
                message: "Invalid OpenAI response: missing choices[0].message.content".into(),
            })?;
        Ok(finish_answer(raw, request))
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_output_tokens: u32,
    prompt: PromptSettings,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            prompt: PromptSettings::from(config),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedAnswer> {
        let prompt = build_prompt(request, &self.prompt);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_output_tokens,
            },
        });
        let http = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body);
        let json = send_with_retry(http, self.max_retries, "Ollama")
            .await
            .map_err(as_generation_error)?;

        let raw = json
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Generation {
                message: "Invalid Ollama response: missing message.content".into(),
            })?;
        Ok(finish_answer(raw, request))
    }
}

// ============ Prompt + cleanup ============

/// Render the question and passages into a single prompt.
pub fn build_prompt(request: &GenerationRequest, settings: &PromptSettings) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut running = 0usize;

    for (i, passage) in request.passages.iter().enumerate() {
        let text = passage.context_window_text.trim();
        if text.is_empty() {
            continue;
        }
        let block = format!(
            "[{}] {} · p.{}\n{}",
            i + 1,
            passage.filename,
            passage.page,
            soft_truncate(text, settings.passage_char_limit)
        );
        let delta = block.chars().count() + 2;
        if running + delta > settings.context_char_budget && !blocks.is_empty() {
            break;
        }
        running += delta;
        blocks.push(block);
    }

    let context = if blocks.is_empty() {
        "No notes provided".to_string()
    } else {
        blocks.join("\n\n")
    };

    let knowledge_rule = if request.allow_enrichment {
        format!(
            "- Answer from the NOTES first.\n\
             - If widely accepted general knowledge adds something useful, put it after a line \
             containing only {marker}. Never put general knowledge before that line.\n\
             - If the NOTES do not answer the question but you are certain from general knowledge, \
             start with \"I couldn't find an answer in your notes, but\" and answer briefly.",
            marker = ENRICHMENT_MARKER
        )
    } else {
        "- Answer only from the NOTES. Do not add outside knowledge.".to_string()
    };

    format!(
        "You answer questions about a person's own study notes.\n\n\
         QUESTION: {question}\n\n\
         NOTES:\n<<<NOTES_START>>>\n{context}\n<<<NOTES_END>>>\n\n\
         RULES\n\
         {knowledge_rule}\n\
         - If you cannot answer, say: \"{not_found}\"\n\
         - If the NOTES contradict well-established facts, say so and give the correct fact.\n\
         - Be concise: 2 to 6 sentences. No footers and no source lists.",
        question = request.question.trim(),
        context = context,
        knowledge_rule = knowledge_rule,
        not_found = NOT_FOUND_ANSWER,
    )
}

/// Cut `text` to at most `max_chars` characters, ending at a word boundary
/// with an ellipsis.
pub fn soft_truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let cut: String = text.chars().take(keep).collect();
    let mid_word = text
        .chars()
        .nth(keep)
        .is_some_and(|c| c.is_alphanumeric())
        && cut.chars().last().is_some_and(|c| c.is_alphanumeric());

    let mut end = cut.as_str();
    if mid_word {
        if let Some(pos) = end.rfind(char::is_whitespace) {
            end = &end[..pos];
        }
    }
    let end = end.trim_end_matches(|c: char| !c.is_alphanumeric());
    let end = if end.is_empty() { cut.as_str() } else { end };
    format!("{}…", end)
}

/// Turn raw model output into a cleaned answer with declared citations.
pub fn finish_answer(raw: &str, request: &GenerationRequest) -> GeneratedAnswer {
    let declared = declared_citations(raw, request);
    let text = clean_answer(raw);
    debug!(chars = text.len(), declared = ?declared.as_ref().map(Vec::len), "generation cleaned");
    GeneratedAnswer {
        text,
        declared_citations: declared,
    }
}

/// Strip bracket references and any `Sources:` footer.
pub fn clean_answer(raw: &str) -> String {
    let mut text = raw.replace('\0', " ");
    if let Some(re) = BRACKET_REF.as_ref() {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Some(re) = SOURCES_FOOTER.as_ref() {
        text = re.replace_all(&text, "").into_owned();
    }
    let text = text.trim();
    if text.is_empty() {
        NOT_FOUND_ANSWER.to_string()
    } else {
        text.to_string()
    }
}

fn declared_citations(raw: &str, request: &GenerationRequest) -> Option<Vec<ChunkId>> {
    let re = BRACKET_REF.as_ref()?;
    let mut ids: Vec<ChunkId> = Vec::new();
    for cap in re.captures_iter(raw) {
        let Some(n) = cap.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) else {
            continue;
        };
        let Some(passage) = n.checked_sub(1).and_then(|i| request.passages.get(i)) else {
            continue;
        };
        if !ids.contains(&passage.chunk_id) {
            ids.push(passage.chunk_id.clone());
        }
    }
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

fn as_generation_error(err: Error) -> Error {
    Error::Generation {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notes_harness_core::models::SelectedPassage;

    fn passage(ordinal: u32, filename: &str, page: u32, text: &str) -> SelectedPassage {
        SelectedPassage {
            chunk_id: ChunkId::new("doc", ordinal),
            filename: filename.to_string(),
            page,
            text: text.to_string(),
            context_window_text: text.to_string(),
            combined_score: 1.0,
            mmr_score: Some(1.0),
            lexical_overlap: 0.0,
            distance: 0.1,
        }
    }

    fn request(passages: Vec<SelectedPassage>, allow_enrichment: bool) -> GenerationRequest {
        GenerationRequest {
            question: "What is photosynthesis?".to_string(),
            passages,
            allow_enrichment,
        }
    }

    const SETTINGS: PromptSettings = PromptSettings {
        context_char_budget: 12_000,
        passage_char_limit: 2_500,
    };

    #[test]
    fn test_prompt_renders_passage_headers() {
        let req = request(vec![passage(0, "bio.pdf", 3, "Plants convert light.")], true);
        let prompt = build_prompt(&req, &SETTINGS);
        assert!(prompt.contains("[1] bio.pdf · p.3\nPlants convert light."));
        assert!(prompt.contains(ENRICHMENT_MARKER));
        assert!(prompt.contains("What is photosynthesis?"));
    }

    #[test]
    fn test_prompt_without_enrichment_omits_marker() {
        let req = request(vec![passage(0, "bio.pdf", 1, "x")], false);
        let prompt = build_prompt(&req, &SETTINGS);
        assert!(!prompt.contains(ENRICHMENT_MARKER));
        assert!(prompt.contains("Do not add outside knowledge"));
    }

    #[test]
    fn test_prompt_budget_keeps_first_passage() {
        let long = "word ".repeat(100);
        let req = request(
            vec![passage(0, "a.md", 1, &long), passage(1, "b.md", 1, &long)],
            true,
        );
        let tiny = PromptSettings {
            context_char_budget: 50,
            passage_char_limit: 2_500,
        };
        let prompt = build_prompt(&req, &tiny);
        assert!(prompt.contains("[1] a.md"));
        assert!(!prompt.contains("[2] b.md"));
    }

    #[test]
    fn test_empty_passages_render_placeholder() {
        let prompt = build_prompt(&request(Vec::new(), true), &SETTINGS);
        assert!(prompt.contains("No notes provided"));
    }

    #[test]
    fn test_soft_truncate_word_boundary() {
        assert_eq!(soft_truncate("short", 10), "short");
        let out = soft_truncate("alpha beta gamma delta", 14);
        assert_eq!(out, "alpha beta…");
        assert!(out.chars().count() <= 14);
    }

    #[test]
    fn test_clean_answer_strips_refs_and_footer() {
        let raw = "Plants make sugar [1]. Light drives it [2].\nSources: bio.pdf";
        assert_eq!(clean_answer(raw), "Plants make sugar . Light drives it .");
    }

    #[test]
    fn test_clean_answer_empty_becomes_not_found() {
        assert_eq!(clean_answer("  [3] "), NOT_FOUND_ANSWER);
    }

    #[test]
    fn test_finish_answer_declares_referenced_passages() {
        let req = request(
            vec![passage(0, "a.md", 1, "x"), passage(1, "b.md", 1, "y")],
            true,
        );
        let answer = finish_answer("Yes [2], see also [2] and [9].", &req);
        assert_eq!(answer.declared_citations, Some(vec![ChunkId::new("doc", 1)]));
        assert!(!answer.text.contains('['));

        let plain = finish_answer("No refs here.", &req);
        assert_eq!(plain.declared_citations, None);
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let err = DisabledGenerator
            .generate(&request(Vec::new(), true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
    }
}
