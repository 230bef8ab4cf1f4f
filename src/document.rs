//! Plain-text extraction for book uploads (PDF and EPUB).
//!
//! Extraction never fails the caller: errors are logged and produce an empty
//! string, leaving moderation to work from the title and description.

use crate::error::{Result, VerifyError};
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::OnceLock;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Character cap for general-purpose extraction.
pub const GENERAL_TEXT_LIMIT: usize = 10_000;

/// Character cap for text sent to the classifier.
pub const MODERATION_TEXT_LIMIT: usize = 5_000;

/// EPUB documents read per book.
const MAX_EPUB_ENTRIES: usize = 5;

/// Decompressed markup bytes allowed per character of requested text.
const EPUB_BYTES_PER_CHAR: u64 = 16;

/// Floor for the decompression budget so small limits still see real markup.
const MIN_EPUB_READ_BYTES: u64 = 64 * 1024;

const DOCUMENT_EXTENSIONS: &[&str] = &[".xhtml", ".html", ".htm"];

/// Supported document containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Epub,
}

impl DocumentFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" | "application/x-pdf" => Some(DocumentFormat::Pdf),
            "application/epub+zip" | "application/epub" => Some(DocumentFormat::Epub),
            _ => None,
        }
    }
}

/// Extract up to `limit` characters of whitespace-normalized text.
pub fn extract_text(bytes: &[u8], mime: &str, limit: usize) -> String {
    let Some(format) = DocumentFormat::from_mime(mime) else {
        warn!("Unsupported document type for text extraction: {}", mime);
        return String::new();
    };

    let raw = match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Epub => extract_epub(bytes, limit),
    };

    match raw {
        Ok(text) => {
            let text = truncate_chars(&collapse_whitespace(&text), limit);
            debug!("Extracted {} characters from {:?}", text.chars().count(), format);
            text
        }
        Err(e) => {
            warn!("Text extraction from {:?} failed: {}", format, e);
            String::new()
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| VerifyError::Extraction(format!("Failed to parse PDF: {e}")))?;

    let mut text = String::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push(' ');
            }
            Err(e) => debug!("Skipping PDF page {}: {}", page_number, e),
        }
    }

    Ok(text)
}

/// Total decompressed bytes `extract_epub` reads for a `limit`-character excerpt.
pub fn epub_read_budget(limit: usize) -> u64 {
    (limit as u64)
        .saturating_mul(EPUB_BYTES_PER_CHAR)
        .max(MIN_EPUB_READ_BYTES)
}

fn extract_epub(bytes: &[u8], limit: usize) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| VerifyError::Extraction(format!("Failed to read EPUB container: {e}")))?;

    let mut text = String::new();
    let mut processed = 0;
    let mut remaining = epub_read_budget(limit);

    for index in 0..archive.len() {
        if processed == MAX_EPUB_ENTRIES || remaining == 0 {
            break;
        }

        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping EPUB entry {}: {}", index, e);
                continue;
            }
        };

        if entry.is_dir() || !is_document_entry(entry.name()) {
            continue;
        }
        processed += 1;

        let mut markup = Vec::new();
        if let Err(e) = entry.by_ref().take(remaining).read_to_end(&mut markup) {
            debug!("Skipping unreadable EPUB entry {}: {}", entry.name(), e);
            continue;
        }
        remaining = remaining.saturating_sub(markup.len() as u64);

        // A budget cut may split a multi-byte character.
        text.push_str(&strip_markup(&String::from_utf8_lossy(&markup)));
        text.push(' ');

        if text.split_whitespace().map(|w| w.chars().count() + 1).sum::<usize>() > limit {
            break;
        }
    }

    Ok(text)
}

/// Content documents only: no container metadata, package or navigation files.
fn is_document_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.starts_with("meta-inf/")
        && !lower.ends_with('/')
        && DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn markup_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)>")
                .expect("valid block regex"),
            Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"),
        )
    })
}

/// Drop tags and non-content blocks from (X)HTML and decode common entities.
fn strip_markup(markup: &str) -> String {
    let (blocks, tags) = markup_patterns();
    let without_blocks = blocks.replace_all(markup, " ");
    let without_tags = tags.replace_all(&without_blocks, " ");

    without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
