//! Research session state machine.
//!
//! A session is the mutable accumulator for exactly one `research()` call.
//! It is created by the controller, owned by a single task, and dropped when
//! the result has been assembled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::collaborators::Expansion;
use crate::policy::TierLimits;
use crate::search::dedupe_against;
use crate::types::{ExportFormat, Gap, Mode, PageSummary, SearchResult, Tier, VerifiedFact};

/// Current phase of a research session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Init,
    Expanding,
    Searching,
    Summarizing,
    FactChecking,
    AnalyzingGaps,
    Writing,
    Editing,
    Citing,
    Publishing,
    Done,
    Failed,
}

impl ResearchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ResearchPhase::Init => "init",
            ResearchPhase::Expanding => "expanding",
            ResearchPhase::Searching => "searching",
            ResearchPhase::Summarizing => "summarizing",
            ResearchPhase::FactChecking => "fact_checking",
            ResearchPhase::AnalyzingGaps => "analyzing_gaps",
            ResearchPhase::Writing => "writing",
            ResearchPhase::Editing => "editing",
            ResearchPhase::Citing => "citing",
            ResearchPhase::Publishing => "publishing",
            ResearchPhase::Done => "done",
            ResearchPhase::Failed => "failed",
        }
    }

    /// Phases that run once per search round.
    pub fn is_iterative(self) -> bool {
        matches!(
            self,
            ResearchPhase::Searching
                | ResearchPhase::Summarizing
                | ResearchPhase::FactChecking
                | ResearchPhase::AnalyzingGaps
        )
    }
}

impl fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The accumulator for one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: Uuid,
    pub query: String,
    /// The query after typo correction; what gets searched.
    pub corrected_query: String,
    pub tier: Tier,
    pub mode: Mode,
    pub phase: ResearchPhase,
    /// Current search round, 1-based once the loop starts.
    pub iteration: usize,
    pub limits: TierLimits,
    pub expansion: Expansion,
    /// Deduplicated by normalized URL across every round.
    pub search_results: Vec<SearchResult>,
    /// Append-only across rounds.
    pub summaries: Vec<PageSummary>,
    pub verified_facts: Vec<VerifiedFact>,
    /// 0-100. Re-measured each round, so it may go down.
    pub coverage_score: u8,
    /// Whether gap analysis has produced a coverage score in this session.
    pub coverage_measured: bool,
    pub gaps: Vec<Gap>,
    pub report: Option<String>,
    pub final_report: Option<String>,
    pub output_files: BTreeMap<ExportFormat, PathBuf>,
    pub progress: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    seen_urls: HashSet<String>,
}

impl ResearchSession {
    pub fn new(query: impl Into<String>, limits: TierLimits) -> Self {
        let query = query.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            corrected_query: query.clone(),
            query,
            tier: limits.tier,
            mode: limits.mode,
            phase: ResearchPhase::Init,
            iteration: 0,
            limits,
            expansion: Expansion::default(),
            search_results: Vec::new(),
            summaries: Vec::new(),
            verified_facts: Vec::new(),
            coverage_score: 0,
            coverage_measured: false,
            gaps: Vec::new(),
            report: None,
            final_report: None,
            output_files: BTreeMap::new(),
            progress: 0.0,
            error: None,
            created_at: now,
            updated_at: now,
            seen_urls: HashSet::new(),
        }
    }

    /// Transition to a new phase.
    pub fn transition(&mut self, new_phase: ResearchPhase) {
        self.phase = new_phase;
        self.updated_at = Utc::now();
        self.update_progress();
    }

    /// Mark the session as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.phase = ResearchPhase::Failed;
        self.updated_at = Utc::now();
    }

    /// Whether the session is still running.
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, ResearchPhase::Done | ResearchPhase::Failed)
    }

    /// Rounds this session will run at most.
    pub fn max_rounds(&self) -> usize {
        self.limits.effective_rounds()
    }

    /// Advance to the next search round. Returns `false` once the round
    /// budget is spent; `iteration` never exceeds `max_search_rounds`.
    pub fn begin_round(&mut self) -> bool {
        if self.iteration >= self.max_rounds() {
            return false;
        }
        self.iteration += 1;
        true
    }

    pub fn is_final_round(&self) -> bool {
        self.iteration >= self.max_rounds()
    }

    /// Merge a round's results, dropping any URL already seen in an earlier
    /// round. Returns the newly added results in arrival order.
    pub fn merge_results(&mut self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let added = dedupe_against(results, &mut self.seen_urls);
        self.search_results.extend(added.iter().cloned());
        added
    }

    pub fn record_coverage(&mut self, score: u8, gaps: Vec<Gap>) {
        self.coverage_score = score.min(100);
        self.coverage_measured = true;
        self.gaps = gaps;
    }

    /// Count of facts at or above `threshold` confidence.
    pub fn consensus_facts(&self, threshold: u8) -> usize {
        self.verified_facts
            .iter()
            .filter(|f| f.confidence_score >= threshold)
            .count()
    }

    pub fn contradictions(&self) -> usize {
        self.verified_facts
            .iter()
            .filter(|f| f.has_contradiction)
            .count()
    }

    fn update_progress(&mut self) {
        let rounds = self.max_rounds().max(1) as f64;
        let round_base = 0.1 + 0.6 * (self.iteration.saturating_sub(1) as f64 / rounds);
        let round_span = 0.6 / rounds;
        self.progress = match self.phase {
            ResearchPhase::Init => 0.0,
            ResearchPhase::Expanding => 0.05,
            ResearchPhase::Searching => round_base,
            ResearchPhase::Summarizing => round_base + round_span * 0.25,
            ResearchPhase::FactChecking => round_base + round_span * 0.5,
            ResearchPhase::AnalyzingGaps => round_base + round_span * 0.75,
            ResearchPhase::Writing => 0.75,
            ResearchPhase::Editing => 0.85,
            ResearchPhase::Citing => 0.9,
            ResearchPhase::Publishing => 0.95,
            ResearchPhase::Done => 1.0,
            ResearchPhase::Failed => self.progress,
        };
    }
}

/// Callback for progressive research updates.
pub trait ResearchCallback: Send + Sync {
    /// Called when the research phase changes.
    fn on_phase_change(&self, phase: ResearchPhase, progress: f64);
    /// Called when a search round finishes.
    fn on_round_complete(&self, round: usize, max_rounds: usize, coverage: u8);
    /// Called when a stage fails and its fallback is used instead.
    fn on_stage_degraded(&self, stage: &str, reason: &str);
}

/// No-op callback.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {
    fn on_phase_change(&self, _phase: ResearchPhase, _progress: f64) {}
    fn on_round_complete(&self, _round: usize, _max_rounds: usize, _coverage: u8) {}
    fn on_stage_degraded(&self, _stage: &str, _reason: &str) {}
}
