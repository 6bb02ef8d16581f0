//! `notes search` and `notes ask`.
//!
//! The corpus lives in memory, so both commands ingest `[notes].root` for
//! `[notes].owner` before running the query.

use anyhow::{bail, Result};

use notes_harness_core::models::SelectedPassage;

use crate::answer::{AnswerResponse, NotesService};
use crate::config::Config;

/// Start the service and load the configured notes directory into it.
pub async fn load_service(config: &Config) -> Result<NotesService> {
    if !config.embedding.is_enabled() {
        bail!("Searching notes requires embeddings. Set [embedding] provider in config.");
    }
    let service = NotesService::start(config)?;
    let report = service.ingest_directory(&config.notes).await?;
    for (file, reason) in &report.failed {
        eprintln!("skipped {}: {}", file.relative, reason);
    }
    Ok(service)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    threshold: Option<f64>,
    lambda: Option<f64>,
) -> Result<()> {
    let params = config.retrieval.params(k, threshold, lambda);
    let service = load_service(config).await?;
    let retrieval = service
        .retrieve(&config.notes.owner, query, &params)
        .await;
    service.shutdown();
    let retrieval = retrieval?;

    if retrieval.selection.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, passage) in retrieval.selection.iter().enumerate() {
        print_passage(i, passage);
    }
    println!(
        "{} of {} candidates passed (pool {}, min distance {:.3})",
        retrieval.survivors, retrieval.candidates, retrieval.pool_size, retrieval.min_distance
    );
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    k: Option<usize>,
    threshold: Option<f64>,
    no_enrich: bool,
    json: bool,
) -> Result<()> {
    if !config.generation.is_enabled() {
        bail!("Asking requires a generator. Set [generation] provider in config.");
    }
    let params = config.retrieval.params(k, threshold, None);
    let allow_enrichment = config.generation.allow_enrichment && !no_enrich;

    let service = load_service(config).await?;
    let response = service
        .answer_query(
            &config.notes.owner,
            question,
            params.k,
            params.similarity_threshold,
            allow_enrichment,
        )
        .await;
    service.shutdown();
    let response = response?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_answer(&response);
    }
    Ok(())
}

fn print_passage(i: usize, passage: &SelectedPassage) {
    println!(
        "{}. [{:.3}] {} p.{}",
        i + 1,
        passage.combined_score,
        passage.filename,
        passage.page
    );
    match passage.mmr_score {
        Some(mmr) => println!(
            "    distance: {:.3}  mmr: {:.3}  lexical: {:.2}",
            passage.distance, mmr, passage.lexical_overlap
        ),
        None => println!(
            "    distance: {:.3}  lexical: {:.2}",
            passage.distance, passage.lexical_overlap
        ),
    }
    println!("    excerpt: \"{}\"", passage.text.replace('\n', " ").trim());
    println!("    id: {}", passage.chunk_id);
    println!();
}

fn print_answer(response: &AnswerResponse) {
    println!("{}", response.answer);
    println!();
    println!("mode: {}", response.mode.as_str());
    if !response.citations.is_empty() {
        println!("sources:");
        for citation in &response.citations {
            println!("  - {} p.{}", citation.filename, citation.page);
        }
    }
}
