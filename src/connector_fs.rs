//! Notes directory scanner.
//!
//! Walks `[notes].root`, applying include/exclude globs against paths
//! relative to the root. Results are sorted for deterministic ingestion.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::NotesConfig;

/// A note file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFile {
    pub path: PathBuf,
    /// Path relative to the notes root, `/`-separated on every platform.
    pub relative: String,
}

pub fn scan_notes(config: &NotesConfig) -> Result<Vec<NoteFile>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Notes root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(NoteFile {
            path: path.to_path_buf(),
            relative: rel_str,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_applies_globs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("image.png"), "x").unwrap();
        std::fs::write(dir.path().join("drafts/c.md"), "c").unwrap();

        let config = NotesConfig {
            root: dir.path().to_path_buf(),
            exclude_globs: vec!["drafts/**".to_string()],
            ..NotesConfig::default()
        };
        let files = scan_notes(&config).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["b.md", "sub/a.txt"]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let config = NotesConfig {
            root: PathBuf::from("/definitely/not/here"),
            ..NotesConfig::default()
        };
        assert!(scan_notes(&config).is_err());
    }
}
