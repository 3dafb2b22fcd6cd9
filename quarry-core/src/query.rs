//! Query preprocessing: typo correction, question classification, keywords.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

const CORRECTIONS: [(&str, &str); 8] = [
    ("artifical", "artificial"),
    ("inteligence", "intelligence"),
    ("seperate", "separate"),
    ("definately", "definitely"),
    ("recieve", "receive"),
    ("occured", "occurred"),
    ("untill", "until"),
    ("acheive", "achieve"),
];

const STOP_WORDS: [&str; 37] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "this", "but", "they", "have",
    "had", "what", "when", "where", "who", "which", "why", "how", "does",
];

const MAX_KEYWORDS: usize = 10;

/// What kind of question a query asks. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Definition,
    HowTo,
    Why,
    Comparison,
    ProsCons,
    Examples,
    Statistics,
    History,
    Future,
    Location,
    Time,
    General,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Definition => "definition",
            QuestionType::HowTo => "how_to",
            QuestionType::Why => "why",
            QuestionType::Comparison => "comparison",
            QuestionType::ProsCons => "pros_cons",
            QuestionType::Examples => "examples",
            QuestionType::Statistics => "statistics",
            QuestionType::History => "history",
            QuestionType::Future => "future",
            QuestionType::Location => "location",
            QuestionType::Time => "time",
            QuestionType::General => "general",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static QUESTION_PATTERNS: LazyLock<Vec<(QuestionType, Regex)>> = LazyLock::new(|| {
    [
        (QuestionType::Definition, r"^(what is|what are|define|meaning of)\b"),
        (QuestionType::HowTo, r"^(how to|how do|how does|how can)\b"),
        (QuestionType::Why, r"^(why|what causes|what leads to)\b"),
        (QuestionType::Comparison, r"\b(compare|difference between|versus|vs)\b"),
        (
            QuestionType::ProsCons,
            r"\b(advantages|disadvantages|pros|cons|benefits|drawbacks)\b",
        ),
        (QuestionType::Examples, r"\b(examples of|case studies|instances of)\b"),
        (QuestionType::Statistics, r"\b(statistics|data|numbers|percentage)\b"),
        (QuestionType::History, r"\b(history of|evolution of|origin of)\b"),
        (QuestionType::Future, r"\b(future of|trends in|predictions)\b"),
        (QuestionType::Location, r"\b(where|location|place)\b"),
        (QuestionType::Time, r"\b(when|timeline|date)\b"),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect()
});

static CORRECTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    CORRECTIONS
        .iter()
        .filter_map(|(typo, fix)| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(typo)))
                .ok()
                .map(|re| (re, *fix))
        })
        .collect()
});

static WORD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\w+\b").ok());

/// A query after preprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedQuery {
    pub original: String,
    pub corrected: String,
    pub question_type: QuestionType,
    pub keywords: Vec<String>,
}

impl ProcessedQuery {
    pub fn was_corrected(&self) -> bool {
        self.original.trim() != self.corrected
    }
}

/// Run every preprocessing step on `query`.
pub fn process(query: &str) -> ProcessedQuery {
    let corrected = correct(query.trim());
    ProcessedQuery {
        original: query.to_string(),
        question_type: classify(&corrected),
        keywords: keywords(&corrected),
        corrected,
    }
}

/// Fix common misspellings, whole words only, case-insensitively.
pub fn correct(query: &str) -> String {
    CORRECTION_PATTERNS
        .iter()
        .fold(query.to_string(), |text, (re, fix)| {
            re.replace_all(&text, *fix).into_owned()
        })
}

pub fn classify(query: &str) -> QuestionType {
    let lower = query.to_lowercase();
    QUESTION_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(kind, _)| *kind)
        .unwrap_or(QuestionType::General)
}

/// Distinct non-stop-words longer than two characters, in order, at most ten.
pub fn keywords(query: &str) -> Vec<String> {
    let Some(word) = WORD.as_ref() else {
        return Vec::new();
    };
    let lower = query.to_lowercase();
    let mut seen = HashSet::new();
    word.find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .take(MAX_KEYWORDS)
        .map(String::from)
        .collect()
}
