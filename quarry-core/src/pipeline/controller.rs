//! Pipeline controller: drives the stage sequence and the search loop.

use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::report::{enforce_word_limit, word_count};
use super::result::{ResearchRequest, ResearchResult, Statistics};
use super::session::{NoOpResearchCallback, ResearchCallback, ResearchPhase, ResearchSession};
use crate::collaborators::fallback::{fact_candidates, heuristic_coverage, heuristic_facts};
use crate::collaborators::{Collaborators, Expansion, PublishRequest, WriteRequest};
use crate::config::{PipelineConfig, QuarryConfig, SearchConfig};
use crate::error::{ConfigError, PipelineError};
use crate::policy;
use crate::query;
use crate::search::SearchAggregator;
use crate::types::{CitationStyle, ExportFormat, SearchResult, Tier, VerifiedFact};
use crate::usage::UsageStore;

/// Runs research sessions end to end.
///
/// Holds no per-run state; every `research()` call builds its own session,
/// so one controller may serve concurrent calls.
pub struct ResearchController {
    aggregator: Arc<SearchAggregator>,
    collaborators: Collaborators,
    /// Per-tier overrides of `collaborators`.
    tier_collaborators: HashMap<Tier, Collaborators>,
    usage: Arc<UsageStore>,
    callback: Arc<dyn ResearchCallback>,
    pipeline: PipelineConfig,
    search: SearchConfig,
    default_format: ExportFormat,
}

impl ResearchController {
    pub fn new(
        aggregator: Arc<SearchAggregator>,
        collaborators: Collaborators,
        config: &QuarryConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            aggregator,
            collaborators,
            tier_collaborators: HashMap::new(),
            usage: Arc::new(UsageStore::new()),
            callback: Arc::new(NoOpResearchCallback),
            pipeline: config.pipeline.clone(),
            search: config.search.clone(),
            default_format: config.default_export_format()?,
        })
    }

    /// Use `collaborators` for runs at `tier` instead of the shared set.
    pub fn with_tier_collaborators(mut self, tier: Tier, collaborators: Collaborators) -> Self {
        self.tier_collaborators.insert(tier, collaborators);
        self
    }

    pub fn with_usage_store(mut self, usage: Arc<UsageStore>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn usage_store(&self) -> &Arc<UsageStore> {
        &self.usage
    }

    /// Run one research request.
    ///
    /// Never returns an error value: policy refusals and pipeline failures
    /// come back as a result with `success == false`.
    pub async fn research(&self, request: ResearchRequest) -> ResearchResult {
        let started = Instant::now();
        info!(
            query = %request.query,
            tier = %request.tier,
            mode = %request.mode,
            "Research started"
        );

        let limits = match policy::resolve(request.tier, request.mode) {
            Ok(limits) => limits,
            Err(e) => {
                warn!(error = %e, "Research refused by policy");
                return ResearchResult::failure(&request, e);
            }
        };

        let reservation = match self.usage.reserve(&request.user_id, request.tier).await {
            Ok(reservation) => reservation,
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "Research refused by usage limits");
                return ResearchResult::failure(&request, e);
            }
        };

        let mut session = ResearchSession::new(&request.query, limits);
        match self.run(&request, &mut session).await {
            Ok(()) => {
                self.transition(&mut session, ResearchPhase::Done);
                self.usage.commit(reservation).await;
                let usage = self
                    .usage
                    .usage_stats(&request.user_id, request.tier)
                    .await;
                let statistics = self.statistics(&session, started);
                info!(
                    sources = statistics.sources_count,
                    facts = statistics.facts_count,
                    coverage = statistics.coverage_score,
                    words = statistics.word_count,
                    elapsed_secs = statistics.elapsed_time,
                    "Research complete"
                );
                ResearchResult {
                    success: true,
                    query: request.query.clone(),
                    tier: request.tier,
                    mode: request.mode,
                    output_files: std::mem::take(&mut session.output_files),
                    statistics: Some(statistics),
                    report: session.final_report.take(),
                    usage: Some(usage),
                    error: None,
                }
            }
            Err(e) => {
                self.usage.release(reservation).await;
                warn!(error = %e, phase = %session.phase, "Research failed");
                session.fail(e.to_string());
                self.callback
                    .on_phase_change(ResearchPhase::Failed, session.progress);
                ResearchResult::failure(&request, e)
            }
        }
    }

    async fn run(
        &self,
        request: &ResearchRequest,
        session: &mut ResearchSession,
    ) -> Result<(), PipelineError> {
        self.expand(session).await;

        while session.begin_round() {
            let round = session.iteration;
            let rounds = session.max_rounds();
            info!(round, rounds, "Search round started");

            let added = self.search_round(session).await;
            if session.search_results.is_empty() {
                return Err(PipelineError::NoSearchResults {
                    query: session.corrected_query.clone(),
                });
            }

            self.summarize(session, added).await;
            self.fact_check(session).await;

            if session.limits.multi_round_search && !session.is_final_round() {
                self.analyze_gaps(session).await;
                self.callback
                    .on_round_complete(round, rounds, session.coverage_score);
                if session.coverage_score >= self.pipeline.convergence_threshold {
                    info!(
                        round,
                        coverage = session.coverage_score,
                        "Coverage sufficient; stopping search"
                    );
                    break;
                }
            } else {
                if !session.coverage_measured {
                    session.coverage_score = self.pipeline.estimated_coverage;
                }
                self.callback
                    .on_round_complete(round, rounds, session.coverage_score);
            }
        }

        self.write(session).await?;
        self.edit(session).await;
        self.cite(session, request.citation_style).await;
        self.publish(session, &request.output_format).await
    }

    async fn expand(&self, session: &mut ResearchSession) {
        self.transition(session, ResearchPhase::Expanding);

        let processed = query::process(&session.query);
        if processed.was_corrected() {
            info!(corrected = %processed.corrected, "Query corrected");
        }
        debug!(
            question_type = %processed.question_type,
            keywords = ?processed.keywords,
            "Query classified"
        );
        session.corrected_query = processed.corrected;

        let query = session.corrected_query.clone();
        session.expansion = match self.stages(session.tier).expander.expand(&query).await {
            Ok(expansion) => expansion.fill_missing(&query),
            Err(e) => {
                self.degraded("expand", &e);
                Expansion::fallback(&query)
            }
        };
        info!(
            topics = session.expansion.topics.len(),
            sections = session.expansion.outline.len(),
            "Query expanded"
        );
    }

    /// Queries for the current round: top expanded topics first, then the
    /// most severe gap topics, then the query itself.
    fn round_queries(&self, session: &ResearchSession) -> Vec<String> {
        let mut queries: Vec<String> = if session.iteration <= 1 {
            session
                .expansion
                .topics
                .iter()
                .take(self.pipeline.first_round_queries)
                .cloned()
                .collect()
        } else {
            let mut gaps: Vec<_> = session.gaps.iter().collect();
            gaps.sort_by_key(|g| g.severity);
            gaps.into_iter()
                .map(|g| g.topic.trim())
                .filter(|t| !t.is_empty())
                .take(self.pipeline.gap_round_queries)
                .map(String::from)
                .collect()
        };
        queries.retain(|q| !q.trim().is_empty());
        if queries.is_empty() {
            queries.push(session.corrected_query.clone());
        }
        queries
    }

    /// Run every round query concurrently and merge the results. Returns the
    /// results that were new this round.
    async fn search_round(&self, session: &mut ResearchSession) -> Vec<SearchResult> {
        self.transition(session, ResearchPhase::Searching);
        let queries = self.round_queries(session);
        let tier = session.tier;
        let per_query = if tier.is_premium() {
            self.search.results_per_query_premium
        } else {
            self.search.results_per_query_free
        };

        let outcomes = futures::future::join_all(
            queries
                .iter()
                .map(|q| self.aggregator.search(q, tier, per_query)),
        )
        .await;

        let mut found = Vec::new();
        for (q, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(results) => found.extend(results),
                Err(e) => warn!(query = %q, error = %e, "Search query produced nothing"),
            }
        }

        let added = session.merge_results(found);
        info!(
            queries = queries.len(),
            new_results = added.len(),
            total_results = session.search_results.len(),
            "Search round merged"
        );
        added
    }

    /// Summarize up to `max_sources` of this round's new results with
    /// bounded concurrency. Failing sources are dropped.
    async fn summarize(&self, session: &mut ResearchSession, candidates: Vec<SearchResult>) {
        self.transition(session, ResearchPhase::Summarizing);
        let take = session.limits.max_sources.min(candidates.len());
        let summarizer = &self.stages(session.tier).summarizer;

        let outcomes: Vec<_> = futures::stream::iter(candidates.into_iter().take(take))
            .map(|source| async move {
                let outcome = summarizer.summarize(&source).await;
                (source, outcome)
            })
            .buffered(self.pipeline.summarize_concurrency.max(1))
            .collect()
            .await;

        let mut failed = 0;
        for (source, outcome) in outcomes {
            match outcome {
                Ok(mut summary) => {
                    if summary.url.is_empty() {
                        summary.url = source.url.clone();
                    }
                    if summary.title.is_empty() {
                        summary.title = source.title.clone();
                    }
                    session.summaries.push(summary);
                }
                Err(e) => {
                    failed += 1;
                    warn!(url = %source.url, error = %e, "Summarization failed; source dropped");
                }
            }
        }
        info!(
            attempted = take,
            failed,
            total_summaries = session.summaries.len(),
            "Summarization finished"
        );
    }

    async fn fact_check(&self, session: &mut ResearchSession) {
        self.transition(session, ResearchPhase::FactChecking);

        if session.limits.advanced_fact_checking {
            let candidates = fact_candidates(&session.summaries);
            if !candidates.is_empty() {
                match self.stages(session.tier).fact_checker.verify(&candidates).await {
                    Ok(facts) if !facts.is_empty() => {
                        info!(
                            candidates = candidates.len(),
                            verified = facts.len(),
                            "Facts verified"
                        );
                        session.verified_facts = facts;
                        return;
                    }
                    Ok(_) => self.degraded("fact_check", &"verifier returned no facts"),
                    Err(e) => self.degraded("fact_check", &e),
                }
            }
        }

        session.verified_facts = heuristic_facts(
            &session.summaries,
            &session.search_results,
            self.pipeline.basic_facts_per_summary,
            self.pipeline.basic_fact_confidence,
            self.pipeline.basic_fact_cap,
        );
        info!(facts = session.verified_facts.len(), "Basic facts extracted");
    }

    async fn analyze_gaps(&self, session: &mut ResearchSession) {
        self.transition(session, ResearchPhase::AnalyzingGaps);
        let outcome = self
            .stages(session.tier)
            .gap_analyzer
            .analyze(
                &session.expansion.outline,
                &session.verified_facts,
                &session.expansion.key_questions,
            )
            .await;

        match outcome {
            Ok(report) => {
                info!(
                    coverage = report.coverage_score,
                    gaps = report.gaps.len(),
                    "Gap analysis finished"
                );
                session.record_coverage(report.coverage_score, report.gaps);
            }
            Err(e) => {
                self.degraded("gap_analysis", &e);
                let coverage = heuristic_coverage(
                    session.verified_facts.len(),
                    session.expansion.key_questions.len(),
                );
                session.record_coverage(coverage, Vec::new());
            }
        }
    }

    async fn write(&self, session: &mut ResearchSession) -> Result<(), PipelineError> {
        self.transition(session, ResearchPhase::Writing);
        let word_limit = session.limits.word_limit;
        let fact_budget = word_limit / self.pipeline.facts_per_word_divisor.max(1);

        let mut facts: Vec<VerifiedFact> = session.verified_facts.clone();
        facts.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));
        facts.truncate(fact_budget);

        let request = WriteRequest {
            query: &session.corrected_query,
            mode: session.mode,
            outline: &session.expansion.outline,
            facts: &facts,
            summaries: &session.summaries,
            word_limit,
        };
        let draft = self
            .stages(session.tier)
            .writer
            .write(request)
            .await
            .map_err(PipelineError::WriteFailed)?;

        let (report, truncated) = enforce_word_limit(&draft, word_limit, session.tier);
        if truncated {
            info!(
                words = word_count(&draft),
                limit = word_limit,
                "Report truncated to word limit"
            );
        }
        session.report = Some(report);
        Ok(())
    }

    async fn edit(&self, session: &mut ResearchSession) {
        if !session.tier.is_premium() {
            return;
        }
        self.transition(session, ResearchPhase::Editing);
        let Some(report) = session.report.clone() else {
            return;
        };
        match self.stages(session.tier).editor.edit(&report).await {
            Ok(edited) if !edited.trim().is_empty() => {
                let (edited, _) =
                    enforce_word_limit(&edited, session.limits.word_limit, session.tier);
                session.report = Some(edited);
            }
            Ok(_) => self.degraded("edit", &"editor returned an empty report"),
            Err(e) => self.degraded("edit", &e),
        }
    }

    async fn cite(&self, session: &mut ResearchSession, requested: CitationStyle) {
        self.transition(session, ResearchPhase::Citing);
        let style = if session.limits.allows_citation(requested) {
            requested
        } else {
            info!(
                requested = %requested,
                tier = %session.tier,
                "Citation style not available; using basic"
            );
            CitationStyle::Basic
        };

        let report = session.report.clone().unwrap_or_default();
        let cited = match self
            .stages(session.tier)
            .citations
            .cite(&report, &session.summaries, style)
            .await
        {
            Ok(cited) => cited,
            Err(e) => {
                self.degraded("cite", &e);
                report
            }
        };
        let (cited, _) = enforce_word_limit(&cited, session.limits.word_limit, session.tier);
        session.final_report = Some(cited);
    }

    async fn publish(
        &self,
        session: &mut ResearchSession,
        requested: &str,
    ) -> Result<(), PipelineError> {
        self.transition(session, ResearchPhase::Publishing);
        let mut formats: Vec<ExportFormat> = ExportFormat::parse_request(requested)
            .into_iter()
            .filter(|f| session.limits.export_formats.contains(f))
            .collect();
        if formats.is_empty() {
            let allowed = &session.limits.export_formats;
            let fallback = if allowed.contains(&self.default_format) {
                self.default_format
            } else {
                allowed.iter().next().copied().unwrap_or(ExportFormat::Markdown)
            };
            info!(
                requested,
                default = %self.default_format,
                fallback = %fallback,
                "No requested format is available; using fallback"
            );
            formats.push(fallback);
        }

        let report = session.final_report.clone().unwrap_or_default();
        let request = PublishRequest {
            query: &session.query,
            report: &report,
            tier: session.tier,
            mode: session.mode,
            formats: &formats,
        };
        let files = self
            .stages(session.tier)
            .publisher
            .publish(request)
            .await
            .map_err(PipelineError::PublishFailed)?;
        info!(files = files.len(), "Report published");
        session.output_files = files;
        Ok(())
    }

    fn statistics(&self, session: &ResearchSession, started: Instant) -> Statistics {
        Statistics {
            sources_count: session.summaries.len(),
            facts_count: session.verified_facts.len(),
            coverage_score: session.coverage_score,
            elapsed_time: started.elapsed().as_secs_f64(),
            word_count: session.final_report.as_deref().map_or(0, word_count),
            consensus_facts: session.consensus_facts(self.pipeline.consensus_threshold),
            contradictions: session.contradictions(),
            search_rounds: session.iteration,
            search_results_count: session.search_results.len(),
        }
    }

    fn stages(&self, tier: Tier) -> &Collaborators {
        self.tier_collaborators
            .get(&tier)
            .unwrap_or(&self.collaborators)
    }

    fn transition(&self, session: &mut ResearchSession, phase: ResearchPhase) {
        session.transition(phase);
        debug!(phase = %phase, progress = session.progress, "Phase changed");
        self.callback.on_phase_change(phase, session.progress);
    }

    fn degraded(&self, stage: &str, reason: &dyn fmt::Display) {
        let reason = reason.to_string();
        warn!(stage, reason = %reason, "Stage degraded; using fallback");
        self.callback.on_stage_degraded(stage, &reason);
    }
}
