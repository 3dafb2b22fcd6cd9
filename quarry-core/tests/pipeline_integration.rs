//! Integration tests for the research pipeline.
//!
//! These tests drive `ResearchController::research` end to end with stub
//! search engines and stub stage collaborators, checking the observable
//! properties of a run: policy gating, deduplication, word limits, the
//! convergence loop, and graceful degradation.

use async_trait::async_trait;
use quarry_core::config::QuarryConfig;
use quarry_core::search::normalize_url;
use quarry_core::{
    CapabilityError, CitationFormatter, CitationStyle, Collaborators, ExportFormat, Expansion,
    FactCandidate, FactChecker, Gap, GapAnalyzer, GapReport, Mode, Outline, PageSummary,
    PublishRequest, Publisher, QueryExpander, ReportEditor, ReportWriter, ResearchCallback,
    ResearchController, ResearchPhase, ResearchRequest, SearchAggregator, SearchCapability,
    SearchResult, Severity, StageError, Summarizer, Tier, UsageStore, VerifiedFact, WriteRequest,
};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// --- Stub search engines ---

/// What a stub engine returns for every query.
enum EngineBehavior {
    /// `count` URLs derived from the engine name and the query.
    PerQuery { count: usize },
    /// The same URL list for every query.
    Fixed(Vec<String>),
    Fail,
}

struct StubEngine {
    name: String,
    behavior: EngineBehavior,
    calls: AtomicUsize,
}

impl StubEngine {
    fn new(name: &str, behavior: EngineBehavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn per_query(name: &str, count: usize) -> Arc<Self> {
        Self::new(name, EngineBehavior::PerQuery { count })
    }

    fn fixed(name: &str, urls: &[&str]) -> Arc<Self> {
        Self::new(
            name,
            EngineBehavior::Fixed(urls.iter().map(|u| u.to_string()).collect()),
        )
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn slug(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[async_trait]
impl SearchCapability for StubEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let urls: Vec<String> = match &self.behavior {
            EngineBehavior::PerQuery { count } => (0..*count)
                .map(|i| format!("https://{}.example/{}/{i}", self.name, slug(query)))
                .collect(),
            EngineBehavior::Fixed(urls) => urls.clone(),
            EngineBehavior::Fail => {
                return Err(CapabilityError::Transport {
                    name: self.name.clone(),
                    message: "connection refused".to_string(),
                });
            }
        };
        Ok(urls
            .into_iter()
            .take(max_results)
            .enumerate()
            .map(|(i, url)| {
                SearchResult::new(
                    format!("{} result {i}", self.name),
                    url,
                    format!("Snippet about {query}."),
                    self.name.clone(),
                    0.9 - i as f64 * 0.05,
                )
            })
            .collect())
    }
}

// --- Stub collaborators ---

struct StubExpander {
    fail: bool,
}

#[async_trait]
impl QueryExpander for StubExpander {
    async fn expand(&self, query: &str) -> Result<Expansion, StageError> {
        if self.fail {
            return Err(StageError::failed("expand", "model unavailable"));
        }
        Ok(Expansion {
            topics: (1..=5).map(|i| format!("{query} angle {i}")).collect(),
            outline: Outline::from_iter([
                ("Introduction", vec!["Context".to_string()]),
                ("Findings", vec!["Evidence".to_string()]),
                ("Conclusion", vec![]),
            ]),
            key_questions: vec![format!("What is {query}?")],
        })
    }
}

/// Fails for any URL containing `broken`.
struct StubSummarizer;

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, source: &SearchResult) -> Result<PageSummary, StageError> {
        if source.url.contains("broken") {
            return Err(StageError::failed("summarize", "page could not be fetched"));
        }
        Ok(PageSummary {
            url: source.url.clone(),
            title: source.title.clone(),
            summary: format!("Summary of {}. More detail.", source.url),
            key_facts: vec![format!("Fact from {}", source.url)],
            statistics: vec![],
            entities: vec![],
        })
    }
}

#[derive(Default, Clone, Copy)]
enum StageOutcome {
    #[default]
    Succeed,
    /// Answer with nothing usable.
    Empty,
    Fail,
}

#[derive(Default)]
struct StubFactChecker {
    outcome: StageOutcome,
    calls: AtomicUsize,
}

impl StubFactChecker {
    fn with(outcome: StageOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl FactChecker for StubFactChecker {
    async fn verify(&self, facts: &[FactCandidate]) -> Result<Vec<VerifiedFact>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            StageOutcome::Succeed => {}
            StageOutcome::Empty => return Ok(Vec::new()),
            StageOutcome::Fail => return Err(StageError::failed("fact_check", "model unavailable")),
        }
        Ok(facts
            .iter()
            .map(|f| VerifiedFact {
                text: f.text.clone(),
                confidence_score: 85,
                supporting_source_count: 2,
                has_contradiction: false,
                source_url: f.source_url.clone(),
            })
            .collect())
    }
}

struct StubGapAnalyzer {
    coverage: u8,
    fail: bool,
    calls: AtomicUsize,
}

impl StubGapAnalyzer {
    fn new(coverage: u8) -> Arc<Self> {
        Arc::new(Self {
            coverage,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            coverage: 0,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GapAnalyzer for StubGapAnalyzer {
    async fn analyze(
        &self,
        _outline: &Outline,
        _facts: &[VerifiedFact],
        _key_questions: &[String],
    ) -> Result<GapReport, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StageError::failed("gap_analysis", "model unavailable"));
        }
        Ok(GapReport {
            coverage_score: self.coverage,
            gaps: vec![Gap {
                topic: format!("missing angle {call}"),
                severity: Severity::High,
                description: String::new(),
            }],
            additional_queries: vec![],
        })
    }
}

/// Emits a report of exactly `words` words, or fails.
struct StubWriter {
    words: usize,
    fail: bool,
}

#[async_trait]
impl ReportWriter for StubWriter {
    async fn write(&self, request: WriteRequest<'_>) -> Result<String, StageError> {
        if self.fail {
            return Err(StageError::failed("write", "model unavailable"));
        }
        let body = vec!["word"; self.words.saturating_sub(2)].join(" ");
        Ok(format!("# Report\n\n{body} {}", request.mode))
    }
}

/// Marks the report as edited, or fails.
#[derive(Default)]
struct StubEditor {
    outcome: StageOutcome,
    calls: AtomicUsize,
}

impl StubEditor {
    fn with(outcome: StageOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ReportEditor for StubEditor {
    async fn edit(&self, report: &str) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            StageOutcome::Succeed => Ok(format!("{report}\n\nEdited.")),
            StageOutcome::Empty => Ok("   ".to_string()),
            StageOutcome::Fail => Err(StageError::failed("edit", "model unavailable")),
        }
    }
}

#[derive(Default)]
struct StubCitations {
    styles: Mutex<Vec<CitationStyle>>,
}

#[async_trait]
impl CitationFormatter for StubCitations {
    async fn cite(
        &self,
        report: &str,
        sources: &[PageSummary],
        style: CitationStyle,
    ) -> Result<String, StageError> {
        self.styles.lock().unwrap().push(style);
        let references: Vec<String> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {} {}", i + 1, s.title, s.url))
            .collect();
        Ok(format!("{report}\n\n## References\n\n{}", references.join("\n")))
    }
}

#[derive(Default)]
struct RecordingPublisher {
    formats: Mutex<Vec<Vec<ExportFormat>>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        request: PublishRequest<'_>,
    ) -> Result<BTreeMap<ExportFormat, PathBuf>, StageError> {
        self.formats.lock().unwrap().push(request.formats.to_vec());
        Ok(request
            .formats
            .iter()
            .map(|f| (*f, PathBuf::from(format!("report.{}", f.extension()))))
            .collect())
    }
}

#[derive(Default)]
struct RecordingCallback {
    phases: Mutex<Vec<ResearchPhase>>,
    rounds: Mutex<Vec<(usize, u8)>>,
    degraded: Mutex<Vec<String>>,
}

impl ResearchCallback for RecordingCallback {
    fn on_phase_change(&self, phase: ResearchPhase, _progress: f64) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_round_complete(&self, round: usize, _max_rounds: usize, coverage: u8) {
        self.rounds.lock().unwrap().push((round, coverage));
    }

    fn on_stage_degraded(&self, stage: &str, _reason: &str) {
        self.degraded.lock().unwrap().push(stage.to_string());
    }
}

// --- Harness ---

struct Harness {
    engines: Vec<Arc<StubEngine>>,
    expander_fails: bool,
    writer: StubWriter,
    fact_checker: Arc<StubFactChecker>,
    gaps: Arc<StubGapAnalyzer>,
    editor: Arc<StubEditor>,
    citations: Arc<StubCitations>,
    publisher: Arc<RecordingPublisher>,
    callback: Arc<RecordingCallback>,
    usage: Arc<UsageStore>,
    config: QuarryConfig,
}

impl Harness {
    fn new(engines: Vec<Arc<StubEngine>>) -> Self {
        let mut config = QuarryConfig::default();
        let chain: Vec<String> = ["alpha", "beta", "gamma"].map(String::from).to_vec();
        config.search.free_chain = chain.clone();
        config.search.premium_chain = chain;
        config.search.timeout_secs = 2;

        Self {
            engines,
            expander_fails: false,
            writer: StubWriter {
                words: 300,
                fail: false,
            },
            fact_checker: Arc::new(StubFactChecker::default()),
            gaps: StubGapAnalyzer::new(50),
            editor: Arc::new(StubEditor::default()),
            citations: Arc::new(StubCitations::default()),
            publisher: Arc::new(RecordingPublisher::default()),
            callback: Arc::new(RecordingCallback::default()),
            usage: Arc::new(UsageStore::new()),
            config,
        }
    }

    /// Three healthy engines with distinct URLs per query.
    fn healthy() -> Self {
        Self::new(vec![
            StubEngine::per_query("alpha", 4),
            StubEngine::per_query("beta", 4),
            StubEngine::per_query("gamma", 4),
        ])
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            expander: Arc::new(StubExpander {
                fail: self.expander_fails,
            }),
            summarizer: Arc::new(StubSummarizer),
            fact_checker: self.fact_checker.clone(),
            gap_analyzer: self.gaps.clone(),
            writer: Arc::new(StubWriter {
                words: self.writer.words,
                fail: self.writer.fail,
            }),
            editor: self.editor.clone(),
            citations: self.citations.clone(),
            publisher: self.publisher.clone(),
        }
    }

    fn controller(self) -> (ResearchController, Self) {
        let capabilities: Vec<Arc<dyn SearchCapability>> = self
            .engines
            .iter()
            .map(|e| Arc::clone(e) as Arc<dyn SearchCapability>)
            .collect();
        let aggregator = Arc::new(SearchAggregator::new(capabilities, &self.config.search));
        let controller = ResearchController::new(aggregator, self.collaborators(), &self.config)
            .unwrap()
            .with_usage_store(self.usage.clone())
            .with_callback(self.callback.clone());
        (controller, self)
    }

    fn engine_calls(&self) -> usize {
        self.engines.iter().map(|e| e.calls()).sum()
    }
}

// --- Policy ---

#[tokio::test]
async fn test_free_deep_is_refused_before_any_search() {
    let (controller, harness) = Harness::healthy().controller();

    let result = controller
        .research(ResearchRequest::new("quantum computing", Tier::Free, Mode::Deep))
        .await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("not permitted"));
    assert!(result.statistics.is_none());
    assert_eq!(harness.engine_calls(), 0);
    assert!(harness.publisher.formats.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_daily_quota_refuses_free_user() {
    let (controller, harness) = Harness::healthy().controller();
    for _ in 0..5 {
        harness.usage.record_usage("alice").await;
    }

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick).for_user("alice"))
        .await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("Daily limit"));
    assert_eq!(harness.engine_calls(), 0);

    let premium = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Quick).for_user("alice"))
        .await;
    assert!(premium.success);
}

#[tokio::test]
async fn test_successful_run_records_usage() {
    let (controller, _harness) = Harness::healthy().controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick).for_user("bob"))
        .await;

    assert!(result.success);
    let usage = result.usage.unwrap();
    assert_eq!(usage.tasks_today, 1);
    assert_eq!(usage.remaining_today, Some(4));
}

// --- Free standard scenario ---

#[tokio::test]
async fn test_free_standard_runs_single_basic_round() {
    let (controller, harness) = Harness::healthy().controller();

    let result = controller
        .research(
            ResearchRequest::new("renewable energy storage", Tier::Free, Mode::Standard)
                .with_output_format("all")
                .with_citation_style(CitationStyle::Apa),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.search_rounds, 1);
    assert!(stats.sources_count <= 5);
    assert!(stats.facts_count > 0);
    assert_eq!(stats.coverage_score, 75);
    assert!(stats.word_count <= 2000);

    // Basic fact extraction, no gap analysis, no editing.
    assert_eq!(harness.fact_checker.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.gaps.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.editor.calls.load(Ordering::SeqCst), 0);

    // APA is premium-only, so the free run falls back to basic citations.
    assert_eq!(
        *harness.citations.styles.lock().unwrap(),
        vec![CitationStyle::Basic]
    );

    let published = harness.publisher.formats.lock().unwrap();
    assert_eq!(
        published[0],
        vec![ExportFormat::Pdf, ExportFormat::Markdown]
    );
    let keys: Vec<_> = result.output_files.keys().copied().collect();
    assert_eq!(keys, vec![ExportFormat::Pdf, ExportFormat::Markdown]);
}

#[tokio::test]
async fn test_disallowed_format_falls_back_to_default() {
    let (controller, harness) = Harness::healthy().controller();

    let result = controller
        .research(
            ResearchRequest::new("rust", Tier::Free, Mode::Quick).with_output_format("docx"),
        )
        .await;

    assert!(result.success);
    assert_eq!(
        harness.publisher.formats.lock().unwrap()[0],
        vec![ExportFormat::Pdf]
    );
}

#[tokio::test]
async fn test_default_format_outside_tier_is_not_published() {
    let mut harness = Harness::healthy();
    harness.config.pipeline.default_export_format = "docx".to_string();
    let (controller, harness) = harness.controller();

    let free = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick).with_output_format("html"))
        .await;
    assert!(free.success);
    assert_eq!(
        free.output_files.keys().copied().collect::<Vec<_>>(),
        vec![ExportFormat::Pdf]
    );

    let premium = controller
        .research(
            ResearchRequest::new("rust", Tier::Premium, Mode::Quick).with_output_format("html"),
        )
        .await;
    assert!(premium.success);

    assert_eq!(
        *harness.publisher.formats.lock().unwrap(),
        vec![vec![ExportFormat::Pdf], vec![ExportFormat::Docx]]
    );
}

#[tokio::test]
async fn test_phases_end_in_done() {
    let (controller, harness) = Harness::healthy().controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick))
        .await;

    assert!(result.success);
    let phases = harness.callback.phases.lock().unwrap();
    assert_eq!(phases.first(), Some(&ResearchPhase::Expanding));
    assert_eq!(phases.last(), Some(&ResearchPhase::Done));
    assert!(phases.contains(&ResearchPhase::Publishing));
    assert!(!phases.contains(&ResearchPhase::Editing));
}

// --- Deduplication ---

#[tokio::test]
async fn test_results_deduplicated_by_normalized_url() {
    let mut harness = Harness::new(vec![
        StubEngine::fixed(
            "alpha",
            &["https://shared.example/a", "https://shared.example/b"],
        ),
        StubEngine::fixed(
            "beta",
            &["https://SHARED.example/a/", "https://beta.example/x?utm=1"],
        ),
        StubEngine::fixed(
            "gamma",
            &["https://shared.example/b#frag", "https://beta.example/x"],
        ),
    ]);
    harness.config.search.results_per_query_free = 9;
    let (controller, _harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Standard))
        .await;

    assert!(result.success);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.search_results_count, 3);
    assert_eq!(stats.sources_count, 3);
}

#[tokio::test]
async fn test_aggregator_never_returns_duplicate_keys() {
    let engines: Vec<Arc<dyn SearchCapability>> = vec![
        StubEngine::fixed("alpha", &["https://a.example/1", "https://a.example/2"]),
        StubEngine::fixed("beta", &["https://A.example/1/", "https://b.example/1"]),
    ];
    let mut config = QuarryConfig::default();
    config.search.free_chain = vec!["alpha".to_string(), "beta".to_string()];
    let aggregator = SearchAggregator::new(engines, &config.search);

    let results = aggregator.search("anything", Tier::Free, 10).await.unwrap();

    let keys: HashSet<String> = results.iter().map(|r| normalize_url(&r.url)).collect();
    assert_eq!(keys.len(), results.len());
    assert_eq!(results.len(), 3);
}

// --- Aggregator degradation ---

#[tokio::test]
async fn test_aggregator_survives_failing_engine() {
    let failing = StubEngine::new("alpha", EngineBehavior::Fail);
    let two = StubEngine::per_query("beta", 2);
    let three = StubEngine::per_query("gamma", 3);
    let engines: Vec<Arc<dyn SearchCapability>> = vec![failing.clone(), two, three];
    let mut config = QuarryConfig::default();
    config.search.premium_chain = ["alpha", "beta", "gamma"].map(String::from).to_vec();
    let aggregator = SearchAggregator::new(engines, &config.search);

    let results = aggregator
        .search("solid state batteries", Tier::Premium, 10)
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(failing.calls(), 1);
    assert!(results.iter().all(|r| r.source_engine != "alpha"));
    assert!(
        results
            .windows(2)
            .all(|w| w[0].relevance_score >= w[1].relevance_score)
    );
}

#[tokio::test]
async fn test_no_results_fails_the_run() {
    let (controller, harness) = Harness::new(vec![
        StubEngine::new("alpha", EngineBehavior::Fail),
        StubEngine::fixed("beta", &[]),
        StubEngine::fixed("gamma", &[]),
    ])
    .controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick))
        .await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("no usable results"));
    assert!(harness.publisher.formats.lock().unwrap().is_empty());
    assert_eq!(
        harness.callback.phases.lock().unwrap().last(),
        Some(&ResearchPhase::Failed)
    );
}

// --- Summarize isolation ---

#[tokio::test]
async fn test_failed_summary_drops_only_that_source() {
    let (controller, harness) = Harness::new(vec![StubEngine::fixed(
        "alpha",
        &[
            "https://one.example",
            "https://two.example",
            "https://broken.example",
            "https://four.example",
            "https://five.example",
        ],
    )])
    .controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Standard))
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.search_results_count, 5);
    assert_eq!(stats.sources_count, 4);
    assert_eq!(stats.facts_count, 4);
    assert_eq!(stats.consensus_facts, 4);
    assert_eq!(harness.fact_checker.calls.load(Ordering::SeqCst), 1);

    let report = result.report.unwrap();
    assert!(!report.contains("broken.example"));
    assert!(report.contains("https://four.example"));
}

// --- Convergence ---

#[tokio::test]
async fn test_deep_stops_when_coverage_converges() {
    let mut harness = Harness::healthy();
    harness.gaps = StubGapAnalyzer::new(85);
    let (controller, harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("fusion power", Tier::Premium, Mode::Deep))
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.search_rounds, 1);
    assert_eq!(stats.coverage_score, 85);
    assert_eq!(harness.gaps.calls.load(Ordering::SeqCst), 1);
    // Five expanded topics, three fused engines each.
    assert_eq!(harness.engine_calls(), 15);
    assert_eq!(*harness.callback.rounds.lock().unwrap(), vec![(1, 85)]);
}

#[tokio::test]
async fn test_deep_runs_every_round_below_threshold() {
    let (controller, harness) = Harness::healthy().controller();

    let result = controller
        .research(ResearchRequest::new("fusion power", Tier::Premium, Mode::Deep))
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.search_rounds, 3);
    // Gap analysis runs after every round but the last.
    assert_eq!(harness.gaps.calls.load(Ordering::SeqCst), 2);
    assert_eq!(stats.coverage_score, 50);
    assert_eq!(harness.editor.calls.load(Ordering::SeqCst), 1);
    let rounds: Vec<usize> = harness
        .callback
        .rounds
        .lock()
        .unwrap()
        .iter()
        .map(|(round, _)| *round)
        .collect();
    assert_eq!(rounds, vec![1, 2, 3]);
}

// --- Word limit ---

#[tokio::test]
async fn test_overlong_report_is_truncated_to_limit() {
    let mut harness = Harness::healthy();
    harness.writer.words = 3000;
    let (controller, _harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Standard))
        .await;

    assert!(result.success);
    let report = result.report.unwrap();
    assert!(report.split_whitespace().count() <= 2000);
    assert!(report.contains("Report truncated due to word limit"));
    assert!(result.statistics.unwrap().word_count <= 2000);
}

#[tokio::test]
async fn test_quick_mode_limit_holds_after_citations() {
    let mut harness = Harness::healthy();
    harness.writer.words = 495;
    let (controller, _harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Quick))
        .await;

    assert!(result.success);
    assert!(result.report.unwrap().split_whitespace().count() <= 500);
}

// --- Degradation ---

#[tokio::test]
async fn test_expander_failure_uses_fallback_topics() {
    let mut harness = Harness::healthy();
    harness.expander_fails = true;
    let (controller, harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick))
        .await;

    assert!(result.success);
    assert_eq!(
        *harness.callback.degraded.lock().unwrap(),
        vec!["expand".to_string()]
    );
    // Five fallback topics, three fused engines each.
    assert_eq!(harness.engine_calls(), 15);
}

#[tokio::test]
async fn test_fact_checker_failure_uses_basic_facts() {
    let mut harness = Harness::healthy();
    harness.fact_checker = StubFactChecker::with(StageOutcome::Fail);
    let (controller, harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Standard))
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.sources_count, 5);
    // One key fact per summary at the basic confidence, none reaching consensus.
    assert_eq!(stats.facts_count, 5);
    assert_eq!(stats.consensus_facts, 0);
    assert_eq!(harness.fact_checker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *harness.callback.degraded.lock().unwrap(),
        vec!["fact_check".to_string()]
    );
}

#[tokio::test]
async fn test_empty_verification_uses_basic_facts() {
    let mut harness = Harness::healthy();
    harness.fact_checker = StubFactChecker::with(StageOutcome::Empty);
    let (controller, harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Quick))
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.statistics.unwrap().facts_count, 2);
    assert_eq!(
        *harness.callback.degraded.lock().unwrap(),
        vec!["fact_check".to_string()]
    );
}

#[tokio::test]
async fn test_all_summaries_failing_falls_back_to_snippets() {
    let (controller, harness) = Harness::new(vec![StubEngine::fixed(
        "alpha",
        &[
            "https://broken.example/1",
            "https://broken.example/2",
            "https://broken.example/3",
        ],
    )])
    .controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Standard))
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.sources_count, 0);
    assert_eq!(stats.search_results_count, 3);
    assert_eq!(stats.facts_count, 3);
    // Nothing to verify, so the checker is never asked.
    assert_eq!(harness.fact_checker.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gap_analysis_failure_uses_heuristic_coverage() {
    let mut harness = Harness::healthy();
    harness.gaps = StubGapAnalyzer::failing();
    let (controller, harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("fusion power", Tier::Premium, Mode::Deep))
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let stats = result.statistics.unwrap();
    // Fifteen verified facts over max(1 question, 5) saturates coverage,
    // which converges after the first round.
    assert_eq!(stats.facts_count, 15);
    assert_eq!(stats.coverage_score, 100);
    assert_eq!(stats.search_rounds, 1);
    assert_eq!(harness.gaps.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*harness.callback.rounds.lock().unwrap(), vec![(1, 100)]);
    assert_eq!(
        *harness.callback.degraded.lock().unwrap(),
        vec!["gap_analysis".to_string()]
    );
}

#[tokio::test]
async fn test_editor_failure_keeps_the_draft() {
    for outcome in [StageOutcome::Fail, StageOutcome::Empty] {
        let mut harness = Harness::healthy();
        harness.editor = StubEditor::with(outcome);
        let (controller, harness) = harness.controller();

        let result = controller
            .research(ResearchRequest::new("rust", Tier::Premium, Mode::Quick))
            .await;

        assert!(result.success, "error: {:?}", result.error);
        let report = result.report.unwrap();
        assert!(report.starts_with("# Report"));
        assert!(!report.contains("Edited."));
        assert_eq!(harness.editor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *harness.callback.degraded.lock().unwrap(),
            vec!["edit".to_string()]
        );
    }
}

#[tokio::test]
async fn test_successful_edit_replaces_the_draft() {
    let (controller, harness) = Harness::healthy().controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Quick))
        .await;

    assert!(result.success);
    assert!(result.report.unwrap().contains("Edited."));
    assert!(harness.callback.degraded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_tier_collaborators_are_used_only_for_their_tier() {
    let premium = Harness::healthy();
    let (controller, harness) = Harness::healthy().controller();
    let controller = controller.with_tier_collaborators(Tier::Premium, premium.collaborators());

    let free = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick))
        .await;
    assert!(free.success);
    assert_eq!(harness.publisher.formats.lock().unwrap().len(), 1);
    assert!(premium.publisher.formats.lock().unwrap().is_empty());
    assert_eq!(premium.editor.calls.load(Ordering::SeqCst), 0);

    let paid = controller
        .research(ResearchRequest::new("rust", Tier::Premium, Mode::Quick))
        .await;
    assert!(paid.success);
    assert_eq!(harness.publisher.formats.lock().unwrap().len(), 1);
    assert_eq!(premium.publisher.formats.lock().unwrap().len(), 1);
    assert_eq!(premium.editor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.editor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_run_releases_quota_slot() {
    let mut harness = Harness::healthy();
    harness.writer.fail = true;
    let (controller, harness) = harness.controller();
    for _ in 0..4 {
        harness.usage.record_usage("dana").await;
    }

    let failed = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Quick).for_user("dana"))
        .await;
    assert!(!failed.success);

    let usage = harness.usage.usage_stats("dana", Tier::Free).await;
    assert_eq!(usage.tasks_today, 4);
    assert!(harness.usage.check_access("dana", Tier::Free).await.is_ok());
}

#[tokio::test]
async fn test_write_failure_fails_the_run() {
    let mut harness = Harness::healthy();
    harness.writer.fail = true;
    let (controller, harness) = harness.controller();

    let result = controller
        .research(ResearchRequest::new("rust", Tier::Free, Mode::Standard).for_user("carol"))
        .await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("Report writing failed"));
    assert!(result.output_files.is_empty());
    assert!(harness.publisher.formats.lock().unwrap().is_empty());

    let usage = harness.usage.usage_stats("carol", Tier::Free).await;
    assert_eq!(usage.tasks_today, 0);
}

#[tokio::test]
async fn test_query_typos_are_corrected_before_search() {
    let (controller, harness) = Harness::new(vec![StubEngine::per_query("alpha", 2)]).controller();

    let result = controller
        .research(ResearchRequest::new("artifical inteligence", Tier::Free, Mode::Quick))
        .await;

    assert!(result.success);
    // The original query is echoed back unchanged.
    assert_eq!(result.query, "artifical inteligence");
    assert_eq!(harness.engine_calls(), 5);
    let report = result.report.unwrap();
    assert!(report.contains("artificial-intelligence"));
}
