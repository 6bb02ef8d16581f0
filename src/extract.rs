//! Text extraction for note files.
//!
//! Plain text and Markdown are read as a single page. PDFs are extracted
//! page by page so chunks can carry their 1-based page number.

use std::path::Path;

/// Supported content types.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

/// Extraction error. The ingestion path reports it per file and moves on.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Io(std::io::Error),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Guess a content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => MIME_PDF,
        Some("md") | Some("markdown") => MIME_MARKDOWN,
        _ => MIME_TEXT,
    }
}

/// Extract pages of text from raw bytes; `pages[0]` is page 1.
pub fn extract_pages(bytes: &[u8], content_type: &str) -> Result<Vec<String>, ExtractError> {
    match content_type {
        MIME_PDF => pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_TEXT | MIME_MARKDOWN => Ok(vec![String::from_utf8_lossy(bytes).into_owned()]),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Read a file and extract its pages.
pub fn extract_file(path: &Path) -> Result<Vec<String>, ExtractError> {
    let bytes = std::fs::read(path).map_err(ExtractError::Io)?;
    extract_pages(&bytes, content_type_for(path))
}
