//! Report text post-processing owned by the controller.

use crate::types::Tier;

/// Words are whitespace-separated tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The visible marker appended to a truncated report.
pub fn truncation_notice(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => {
            "\n\n---\n\n*[Report truncated due to word limit. Upgrade to Premium for full reports.]*"
        }
        Tier::Premium => "\n\n---\n\n*[Report truncated due to word limit.]*",
    }
}

/// Truncate `report` so that it holds at most `limit` words, notice included.
///
/// Reports already within the limit are returned unchanged. Otherwise the
/// leading words are kept with their original formatting and the notice is
/// appended. Returns whether truncation happened.
pub fn enforce_word_limit(report: &str, limit: usize, tier: Tier) -> (String, bool) {
    if word_count(report) <= limit {
        return (report.to_string(), false);
    }

    let notice = truncation_notice(tier);
    let notice_words = word_count(notice);
    if limit <= notice_words {
        return (prefix_words(report, limit).to_string(), true);
    }

    let body = prefix_words(report, limit - notice_words);
    (format!("{}{notice}", body.trim_end()), true)
}

/// The slice of `text` up to the end of its `n`th word.
fn prefix_words(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let mut seen = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                seen += 1;
                if seen == n {
                    return &text[..idx];
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    text
}
