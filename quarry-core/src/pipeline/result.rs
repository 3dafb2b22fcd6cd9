//! Request and result types for the `research()` entry point.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::types::{CitationStyle, ExportFormat, Mode, Tier};
use crate::usage::UsageStats;

/// User id used when the caller does not identify one.
pub const ANONYMOUS_USER: &str = "anonymous";

/// One call to `research()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    pub tier: Tier,
    pub mode: Mode,
    /// Comma-separated formats, or `"all"`.
    pub output_format: String,
    pub citation_style: CitationStyle,
    pub user_id: String,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, tier: Tier, mode: Mode) -> Self {
        Self {
            query: query.into(),
            tier,
            mode,
            output_format: ExportFormat::Pdf.as_str().to_string(),
            citation_style: CitationStyle::Basic,
            user_id: ANONYMOUS_USER.to_string(),
        }
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    pub fn with_citation_style(mut self, style: CitationStyle) -> Self {
        self.citation_style = style;
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }
}

/// Counters describing a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Summarized sources.
    pub sources_count: usize,
    pub facts_count: usize,
    pub coverage_score: u8,
    /// Wall-clock seconds.
    pub elapsed_time: f64,
    pub word_count: usize,
    pub consensus_facts: usize,
    pub contradictions: usize,
    pub search_rounds: usize,
    pub search_results_count: usize,
}

/// What `research()` returns, on success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub success: bool,
    pub query: String,
    pub tier: Tier,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_files: BTreeMap<ExportFormat, PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResearchResult {
    pub fn failure(request: &ResearchRequest, error: impl fmt::Display) -> Self {
        Self {
            success: false,
            query: request.query.clone(),
            tier: request.tier,
            mode: request.mode,
            output_files: BTreeMap::new(),
            statistics: None,
            report: None,
            usage: None,
            error: Some(error.to_string()),
        }
    }
}
