//! Keyword fallback used when the content classifier is unavailable.
//!
//! Matching is whole-word and case-insensitive. A denylisted term always
//! wins over gospel vocabulary.

use super::{ModerationVerdict, FLAG_HEURISTIC};
use regex::Regex;
use std::sync::OnceLock;

/// Explicit or violent terms that force rejection.
pub const DENYLIST: &[&str] = &[
    "violence", "violent", "kill", "killing", "murder", "gore", "blood bath", "porn",
    "pornography", "nude", "nudity", "naked", "sex", "sexual", "explicit", "xxx", "drugs",
    "cocaine", "terrorist", "terrorism", "rape", "suicide", "hate speech",
];

/// Gospel vocabulary in English, Yoruba, Hausa and Igbo that supports approval.
pub const ALLOWLIST: &[&str] = &[
    // English
    "god", "jesus", "christ", "christian", "gospel", "worship", "praise", "hallelujah",
    "alleluia", "amen", "bible", "scripture", "church", "lord", "holy spirit", "prayer",
    "sermon", "hymn", "psalm", "faith", "salvation", "blessing", "grace",
    // Yoruba
    "ọlọrun", "olorun", "oluwa", "olúwa", "jesu", "jésù", "ẹmi mimọ", "emi mimo", "adura",
    "ìyìn", "iyin", "ògo", "ogo",
    // Hausa
    "ubangiji", "yesu", "almasihu", "addu'a", "yabo", "bishara",
    // Igbo
    "chineke", "chukwu", "jisos", "kraịst", "ekpere", "otuto", "mmụọ nsọ", "mmuo nso",
];

fn term_pattern(terms: &[&str]) -> Regex {
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid keyword regex")
}

fn denylist_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| term_pattern(DENYLIST))
}

fn allowlist_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| term_pattern(ALLOWLIST))
}

/// Distinct denylisted terms found in `text`, lowercased.
pub fn denylist_hits(text: &str) -> Vec<String> {
    let mut hits: Vec<String> = denylist_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    hits.sort();
    hits.dedup();
    hits
}

pub fn has_gospel_terms(text: &str) -> bool {
    allowlist_pattern().is_match(text)
}

/// Verdict from keywords alone.
pub fn heuristic_verdict(text: &str) -> ModerationVerdict {
    let hits = denylist_hits(text);
    if !hits.is_empty() {
        let flags = std::iter::once(FLAG_HEURISTIC.to_string())
            .chain(hits.iter().map(|term| format!("denylist:{term}")));
        return ModerationVerdict::new(
            false,
            0.8,
            format!("Inappropriate terms found: {}", hits.join(", ")),
            flags,
            true,
        );
    }

    if has_gospel_terms(text) {
        return ModerationVerdict::new(
            true,
            0.6,
            "Gospel content detected by keyword analysis",
            [FLAG_HEURISTIC.to_string()],
            false,
        );
    }

    ModerationVerdict::new(
        false,
        0.4,
        "No gospel or inappropriate terms found; manual review required",
        [FLAG_HEURISTIC.to_string()],
        true,
    )
}
