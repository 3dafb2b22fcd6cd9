//! Fundamental domain types shared by every stage of the research pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;

/// Subscription class gating feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn is_premium(self) -> bool {
        self == Tier::Premium
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            _ => Err(PolicyError::UnknownTier {
                value: s.to_string(),
            }),
        }
    }
}

/// Research depth selector gating numeric limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Quick,
    Standard,
    Deep,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Quick, Mode::Standard, Mode::Deep];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Quick => "quick",
            Mode::Standard => "standard",
            Mode::Deep => "deep",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(Mode::Quick),
            "standard" => Ok(Mode::Standard),
            "deep" => Ok(Mode::Deep),
            _ => Err(PolicyError::UnknownMode {
                value: s.to_string(),
            }),
        }
    }
}

/// Citation style requested for the reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationStyle {
    Basic,
    Apa,
    Mla,
    Ieee,
}

impl CitationStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            CitationStyle::Basic => "basic",
            CitationStyle::Apa => "APA",
            CitationStyle::Mla => "MLA",
            CitationStyle::Ieee => "IEEE",
        }
    }
}

impl fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CitationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(CitationStyle::Basic),
            "apa" => Ok(CitationStyle::Apa),
            "mla" => Ok(CitationStyle::Mla),
            "ieee" => Ok(CitationStyle::Ieee),
            other => Err(format!("unknown citation style: {other}")),
        }
    }
}

/// Output file format handed to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Pdf,
    Docx,
    Markdown,
}

impl ExportFormat {
    /// Formats a request for `"all"` expands to.
    pub const DOCUMENTS: [ExportFormat; 3] =
        [ExportFormat::Pdf, ExportFormat::Docx, ExportFormat::Markdown];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Markdown => "markdown",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Markdown => "md",
        }
    }

    /// Parse a comma-separated request such as `"pdf,markdown"` or `"all"`.
    ///
    /// Unknown entries are dropped; the caller decides what an empty
    /// request falls back to.
    pub fn parse_request(request: &str) -> Vec<ExportFormat> {
        let mut formats = Vec::new();
        for part in request.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                for format in Self::DOCUMENTS {
                    if !formats.contains(&format) {
                        formats.push(format);
                    }
                }
                continue;
            }
            if let Ok(format) = part.parse::<ExportFormat>() {
                if !formats.contains(&format) {
                    formats.push(format);
                }
            }
        }
        formats
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "docx" | "word" => Ok(ExportFormat::Docx),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// A single result returned by a search capability. Never mutated after
/// creation; ranking is a derived view over a collection of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Name of the capability that produced this result.
    pub source_engine: String,
    /// Engine-assigned heuristic in `0.0..=1.0`.
    pub relevance_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        source_engine: impl Into<String>,
        relevance_score: f64,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            source_engine: source_engine.into(),
            relevance_score: relevance_score.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }

    /// The deduplication key for this result.
    pub fn dedup_key(&self) -> String {
        crate::search::normalize_url(&self.url)
    }
}

/// Structured summary of one source, produced by the summarize collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub url: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_facts: Vec<String>,
    #[serde(default)]
    pub statistics: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// A claim submitted for verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub text: String,
    pub source_url: String,
}

/// A claim after verification, read-only to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedFact {
    pub text: String,
    /// Confidence in `0..=100`.
    pub confidence_score: u8,
    pub supporting_source_count: u32,
    pub has_contradiction: bool,
    pub source_url: String,
}

/// How urgently a coverage gap needs more research.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Lenient parse for model output; anything unrecognised is medium.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" | "critical" => Severity::High,
            "low" | "minor" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        Severity::parse_lenient(&value)
    }
}

/// A topic the collected facts do not yet cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub topic: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
}

/// One outline section and the points it should cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub title: String,
    pub points: Vec<String>,
}

/// Research outline: section titles with their key points, in document order.
///
/// Serialized as a JSON/TOML map so model output such as
/// `{"Introduction": ["..."], "History": ["..."]}` parses directly while
/// keeping the order the sections were written in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    sections: Vec<OutlineSection>,
}

impl Outline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section, merging points into an existing section of the same title.
    pub fn push(&mut self, title: impl Into<String>, points: Vec<String>) {
        let title = title.into();
        match self.sections.iter_mut().find(|s| s.title == title) {
            Some(existing) => existing.points.extend(points),
            None => self.sections.push(OutlineSection { title, points }),
        }
    }

    pub fn sections(&self) -> &[OutlineSection] {
        &self.sections
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.title.as_str())
    }

    pub fn get(&self, title: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.points.as_slice())
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl<T: Into<String>> FromIterator<(T, Vec<String>)> for Outline {
    fn from_iter<I: IntoIterator<Item = (T, Vec<String>)>>(iter: I) -> Self {
        let mut outline = Outline::new();
        for (title, points) in iter {
            outline.push(title, points);
        }
        outline
    }
}

impl Serialize for Outline {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for section in &self.sections {
            map.serialize_entry(&section.title, &section.points)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Outline {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OutlineVisitor;

        impl<'de> serde::de::Visitor<'de> for OutlineVisitor {
            type Value = Outline;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of section titles to lists of points")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Outline, A::Error> {
                let mut outline = Outline::new();
                while let Some((title, points)) = access.next_entry::<String, Vec<String>>()? {
                    outline.push(title, points);
                }
                Ok(outline)
            }
        }

        deserializer.deserialize_map(OutlineVisitor)
    }
}
