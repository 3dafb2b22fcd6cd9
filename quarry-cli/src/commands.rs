//! Subcommand handlers.

use anyhow::Context;
use quarry_core::config::load_config;
use quarry_core::policy::available_modes;
use quarry_core::{
    CitationStyle, Mode, QuarryConfig, ResearchCallback, ResearchController, ResearchPhase,
    ResearchRequest, ResearchResult, Tier,
};
use std::path::Path;
use std::sync::Arc;

use crate::{Commands, ConfigAction};

pub async fn handle_command(command: Commands, workspace: &Path, quiet: bool) -> anyhow::Result<()> {
    match command {
        Commands::Research {
            query,
            tier,
            mode,
            format,
            citation,
            user,
            json,
        } => {
            let config = load(workspace)?;
            let request = build_request(&config, &query, &tier, &mode, format, &citation, user)?;
            handle_research(&config, request, quiet, json).await
        }
        Commands::Modes { tier } => handle_modes(&tier),
        Commands::Engines => {
            let config = load(workspace)?;
            handle_engines(&config);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<QuarryConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn build_request(
    config: &QuarryConfig,
    query: &str,
    tier: &str,
    mode: &str,
    format: Option<String>,
    citation: &str,
    user: Option<String>,
) -> anyhow::Result<ResearchRequest> {
    let tier: Tier = tier.parse()?;
    let mode: Mode = mode.parse()?;
    let citation: CitationStyle = citation.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let format = format.unwrap_or_else(|| config.pipeline.default_export_format.clone());

    let mut request = ResearchRequest::new(query, tier, mode)
        .with_output_format(format)
        .with_citation_style(citation);
    if let Some(user) = user {
        request = request.for_user(user);
    }
    Ok(request)
}

/// Prints pipeline progress to stderr.
struct ProgressPrinter;

impl ResearchCallback for ProgressPrinter {
    fn on_phase_change(&self, phase: ResearchPhase, progress: f64) {
        eprintln!("  [{:>3.0}%] {}", progress * 100.0, phase.as_str());
    }

    fn on_round_complete(&self, round: usize, max_rounds: usize, coverage: u8) {
        eprintln!("  round {round}/{max_rounds} complete, coverage {coverage}%");
    }

    fn on_stage_degraded(&self, stage: &str, reason: &str) {
        eprintln!("  {stage} degraded: {reason}");
    }
}

async fn handle_research(
    config: &QuarryConfig,
    request: ResearchRequest,
    quiet: bool,
    json: bool,
) -> anyhow::Result<()> {
    let aggregator = quarry_tools::build_search(config).context("Failed to set up search")?;
    let collaborators = quarry_tools::build_collaborators(config, request.tier)
        .context("Failed to set up LLM stages")?;

    let mut controller = ResearchController::new(Arc::new(aggregator), collaborators, config)?;
    if !quiet && !json {
        controller = controller.with_callback(Arc::new(ProgressPrinter));
    }

    let result = controller.research(request).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    match &result.error {
        Some(error) if !result.success => anyhow::bail!("Research failed: {}", error),
        _ => Ok(()),
    }
}

fn print_result(result: &ResearchResult) {
    if !result.success {
        return;
    }
    println!("\nResearch complete: {}", result.query);
    println!("  tier: {}  mode: {}", result.tier, result.mode);
    if let Some(stats) = &result.statistics {
        println!(
            "  sources: {}  facts: {} ({} consensus, {} contradicted)",
            stats.sources_count, stats.facts_count, stats.consensus_facts, stats.contradictions
        );
        println!(
            "  coverage: {}%  rounds: {}  words: {}  time: {:.1}s",
            stats.coverage_score, stats.search_rounds, stats.word_count, stats.elapsed_time
        );
    }
    for (format, path) in &result.output_files {
        println!("  {}: {}", format, path.display());
    }
    if let Some(usage) = &result.usage {
        match usage.daily_limit {
            Some(limit) => println!("  tasks today: {}/{}", usage.tasks_today, limit),
            None => println!("  tasks today: {} (unlimited)", usage.tasks_today),
        }
    }
}

fn handle_modes(tier: &str) -> anyhow::Result<()> {
    let tier: Tier = tier.parse()?;
    println!("Research modes for the {} tier:\n", tier);
    for availability in available_modes(tier) {
        let profile = availability.profile;
        let lock = if availability.unlocked {
            ""
        } else {
            " (premium only)"
        };
        println!("  {} [{}]{}", profile.name, profile.mode, lock);
        println!("    {}", profile.description);
        println!(
            "    up to {} sources, {} words, about {}",
            profile.max_sources, profile.max_words, profile.estimated_time
        );
    }
    Ok(())
}

fn handle_engines(config: &QuarryConfig) {
    println!("Search backends:");
    for (name, ready) in quarry_tools::credential_status(&config.engines) {
        let status = if ready { "ready" } else { "missing API key" };
        println!("  {:<12} {}", name, status);
    }
    println!("\nFree chain:    {}", config.search.free_chain.join(" -> "));
    println!("Premium chain: {}", config.search.premium_chain.join(" -> "));

    println!("\nLLM providers:");
    for tier in [Tier::Free, Tier::Premium] {
        let selected = config
            .llm
            .select_provider(tier, quarry_tools::provider_available)
            .map_or("default endpoint", |(name, _)| name);
        println!(
            "  {:<8} {} (using {})",
            tier.to_string(),
            config.llm.provider_chain(tier).join(" -> "),
            selected
        );
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
