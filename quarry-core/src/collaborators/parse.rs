//! Typed "parse or degrade to default" handling for model output.
//!
//! Language models wrap JSON in prose or code fences and drift from the
//! requested schema. Collaborators decode through these helpers so a bad
//! response becomes the collaborator's own default instead of an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Strip a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Decode `raw` as JSON, tolerating code fences and leading/trailing prose.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let body = strip_code_fences(raw);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first_err) => match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end]),
            _ => Err(first_err),
        },
    }
}

/// Decode `raw`, or fall back to `default()` when it does not match `T`.
pub fn parse_or_default<T: DeserializeOwned>(
    stage: &str,
    raw: &str,
    default: impl FnOnce() -> T,
) -> T {
    match parse_json(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(stage, error = %e, "Model output did not parse; using default");
            default()
        }
    }
}

/// Deserialize a 0-100 score from an integer, float, or numeric string.
pub fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Score {
        Number(f64),
        Text(String),
    }

    let value = match Score::deserialize(deserializer)? {
        Score::Number(n) => n,
        Score::Text(s) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
    };
    Ok(clamp_score(value))
}

/// Clamp an arbitrary number into the `0..=100` score range.
pub fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
