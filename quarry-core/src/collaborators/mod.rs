//! Stage collaborator contracts.
//!
//! Every pipeline stage other than search is an external collaborator reached
//! through one of these traits. The controller depends only on the contract;
//! concrete implementations (LLM-backed, file-backed) live in `quarry-tools`.

pub mod fallback;
pub mod parse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StageError;
use crate::types::{
    CitationStyle, ExportFormat, FactCandidate, Gap, Mode, Outline, PageSummary, SearchResult,
    Tier, VerifiedFact,
};

/// Output of query expansion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    #[serde(default, alias = "expanded_topics")]
    pub topics: Vec<String>,
    #[serde(default, alias = "research_outline")]
    pub outline: Outline,
    #[serde(default)]
    pub key_questions: Vec<String>,
}

/// Output of gap analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    /// Coverage of the outline by the collected facts, `0..=100`.
    #[serde(default, deserialize_with = "parse::lenient_score")]
    pub coverage_score: u8,
    #[serde(default)]
    pub gaps: Vec<Gap>,
    #[serde(default)]
    pub additional_queries: Vec<String>,
}

/// Everything the writer needs to draft a report.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub query: &'a str,
    pub mode: Mode,
    pub outline: &'a Outline,
    pub facts: &'a [VerifiedFact],
    pub summaries: &'a [PageSummary],
    pub word_limit: usize,
}

/// Everything the publisher needs to render output files.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub query: &'a str,
    pub report: &'a str,
    pub tier: Tier,
    pub mode: Mode,
    pub formats: &'a [ExportFormat],
}

/// Expands a query into topics, an outline and key questions.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<Expansion, StageError>;
}

/// Summarizes one source page.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, source: &SearchResult) -> Result<PageSummary, StageError>;
}

/// Verifies candidate facts across sources.
#[async_trait]
pub trait FactChecker: Send + Sync {
    async fn verify(&self, facts: &[FactCandidate]) -> Result<Vec<VerifiedFact>, StageError>;
}

/// Compares collected facts with the outline and reports coverage gaps.
#[async_trait]
pub trait GapAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        outline: &Outline,
        facts: &[VerifiedFact],
        key_questions: &[String],
    ) -> Result<GapReport, StageError>;
}

#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write(&self, request: WriteRequest<'_>) -> Result<String, StageError>;
}

#[async_trait]
pub trait ReportEditor: Send + Sync {
    async fn edit(&self, report: &str) -> Result<String, StageError>;
}

/// Appends a reference list in the requested style.
#[async_trait]
pub trait CitationFormatter: Send + Sync {
    async fn cite(
        &self,
        report: &str,
        sources: &[PageSummary],
        style: CitationStyle,
    ) -> Result<String, StageError>;
}

/// Renders the final report. Returns the location written for each format.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        request: PublishRequest<'_>,
    ) -> Result<BTreeMap<ExportFormat, PathBuf>, StageError>;
}

/// The full set of stage collaborators a controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub expander: Arc<dyn QueryExpander>,
    pub summarizer: Arc<dyn Summarizer>,
    pub fact_checker: Arc<dyn FactChecker>,
    pub gap_analyzer: Arc<dyn GapAnalyzer>,
    pub writer: Arc<dyn ReportWriter>,
    pub editor: Arc<dyn ReportEditor>,
    pub citations: Arc<dyn CitationFormatter>,
    pub publisher: Arc<dyn Publisher>,
}
