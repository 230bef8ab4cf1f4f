use super::ModerationVerdict;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Approvals below this confidence still go to human review.
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Flag set when the reply had no usable JSON verdict.
pub const FLAG_UNPARSED: &str = "unparsed_response";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    is_approved: Option<bool>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    requires_review: Option<bool>,
}

fn json_block() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid JSON block regex"))
}

fn approval_words() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:approved|gospel|christian|appropriate)\b")
            .expect("valid approval regex")
    })
}

/// Interpret a classifier reply.
///
/// The outermost `{...}` block is read as a JSON verdict. Replies without
/// one fall back to keyword presence and always require review.
pub fn parse_classifier_response(raw: &str) -> ModerationVerdict {
    if let Some(verdict) = parse_json_verdict(raw) {
        return verdict;
    }

    warn!("Classifier reply had no usable JSON verdict, falling back to text matching");
    let approved = approval_words().is_match(raw);
    ModerationVerdict::new(
        approved,
        0.5,
        "Classifier response could not be parsed; manual review required",
        [FLAG_UNPARSED.to_string()],
        true,
    )
}

fn parse_json_verdict(raw: &str) -> Option<ModerationVerdict> {
    let block = json_block().find(raw)?;
    let parsed: RawVerdict = match serde_json::from_str(block.as_str()) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Classifier JSON did not parse: {}", e);
            return None;
        }
    };

    let is_approved = parsed.is_approved?;
    let confidence = parsed.confidence.unwrap_or(0.5);
    let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };

    // Uncertain approvals are never final.
    let requires_review = parsed.requires_review.unwrap_or(!is_approved)
        || (is_approved && confidence < REVIEW_CONFIDENCE_THRESHOLD);

    let reason = parsed
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| {
            if is_approved {
                "Approved by content classifier".to_string()
            } else {
                "Rejected by content classifier".to_string()
            }
        });

    Some(ModerationVerdict::new(
        is_approved,
        confidence,
        reason,
        parsed.flags,
        requires_review,
    ))
}
