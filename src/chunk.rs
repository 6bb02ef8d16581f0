//! `notes chunk <file>`: show how a file would be split before embedding.
//!
//! Needs no providers, so it is handy for tuning `[chunking]` settings.

use anyhow::{Context, Result};
use std::path::Path;

use notes_harness_core::chunk::{chunk_pages, ChunkOutcome, PageChunk};

use crate::config::Config;
use crate::extract;

/// Extract and chunk a file with the configured window settings.
pub fn chunk_file(config: &Config, path: &Path) -> Result<ChunkOutcome> {
    let pages = extract::extract_file(path)
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    Ok(chunk_pages(
        &pages,
        config.chunking.max_chars,
        config.chunking.overlap_chars,
    ))
}

pub fn run_chunk(config: &Config, path: &Path) -> Result<()> {
    match chunk_file(config, path)? {
        ChunkOutcome::NoExtractableContent => {
            println!("no extractable content");
        }
        ChunkOutcome::Chunks(chunks) => {
            for (ordinal, chunk) in chunks.iter().enumerate() {
                print_chunk(ordinal, chunk);
            }
            let pages = chunks.iter().map(|c| c.page).max().unwrap_or(1);
            println!("{} chunks, {} pages", chunks.len(), pages);
        }
    }
    Ok(())
}

fn print_chunk(ordinal: usize, chunk: &PageChunk) {
    println!(
        "--- #{} p.{} ({} chars) {}",
        ordinal,
        chunk.page,
        chunk.text.chars().count(),
        &chunk.hash[..12.min(chunk.hash.len())]
    );
    println!("{}", chunk.text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_file_uses_config_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.txt");
        let text: Vec<String> = (0..200).map(|i| format!("word{}", i)).collect();
        std::fs::write(&path, text.join(" ")).unwrap();

        let mut config = Config::default();
        config.chunking.max_chars = 100;
        config.chunking.overlap_chars = 20;
        let chunks = chunk_file(&config, &path).unwrap().into_chunks();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
        assert!(chunks.iter().all(|c| c.page == 1));
    }

    #[test]
    fn test_blank_file_has_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.md");
        std::fs::write(&path, "  \n\n\t ").unwrap();
        let outcome = chunk_file(&Config::default(), &path).unwrap();
        assert_eq!(outcome, ChunkOutcome::NoExtractableContent);
    }
}
