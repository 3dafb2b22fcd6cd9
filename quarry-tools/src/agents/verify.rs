//! Batched fact verification with per-fact confidence scores.

use async_trait::async_trait;
use futures::future::join_all;
use quarry_core::collaborators::parse::{lenient_score, parse_json};
use quarry_core::{FactCandidate, FactChecker, StageError, VerifiedFact};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::{ChatRequest, LlmClient};

const STAGE: &str = "verify";
const BATCH_SIZE: usize = 10;
/// Confidence assigned when a batch could not be checked.
const UNCHECKED_CONFIDENCE: u8 = 50;

const SYSTEM_PROMPT: &str = "You are a fact-checking expert. Your job is to verify facts by:
1. Cross-referencing across multiple sources
2. Identifying contradictions
3. Assigning confidence scores (0-100)
4. Noting supporting evidence

Respond in JSON format:
{
    \"verified_facts\": [
        {
            \"fact\": \"the fact statement\",
            \"confidence_score\": 85,
            \"supporting_sources\": 3,
            \"has_contradiction\": false,
            \"notes\": \"brief explanation\"
        }
    ]
}";

#[derive(Debug, Default, Deserialize)]
struct VerifyReply {
    #[serde(default)]
    verified_facts: Vec<CheckedFact>,
}

#[derive(Debug, Deserialize)]
struct CheckedFact {
    #[serde(default)]
    fact: String,
    #[serde(default, deserialize_with = "lenient_score")]
    confidence_score: u8,
    #[serde(default)]
    supporting_sources: u32,
    #[serde(default)]
    has_contradiction: bool,
}

/// Cross-checks candidate facts in batches of ten.
pub struct LlmFactChecker {
    llm: Arc<dyn LlmClient>,
}

impl LlmFactChecker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Verify one batch. `Err` only when the call itself failed.
    async fn verify_batch(
        &self,
        batch: &[FactCandidate],
    ) -> Result<Vec<VerifiedFact>, StageError> {
        let listing = batch
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {} (Source: {})", i + 1, c.text, c.source_url))
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!(
            "Verify the following facts and assign confidence scores:\n\n{listing}\n\n\
             For each fact, assess its credibility and note any contradictions."
        );

        let raw = self
            .llm
            .complete(
                ChatRequest::new(SYSTEM_PROMPT, &user)
                    .temperature(0.2)
                    .max_tokens(2000),
            )
            .await
            .map_err(|e| StageError::backend(STAGE, e))?;

        match parse_json::<VerifyReply>(&raw) {
            Ok(reply) if !reply.verified_facts.is_empty() => Ok(reply
                .verified_facts
                .into_iter()
                .enumerate()
                .filter(|(_, checked)| !checked.fact.trim().is_empty())
                .map(|(i, checked)| {
                    let source_url = batch
                        .iter()
                        .find(|c| c.text == checked.fact)
                        .or_else(|| batch.get(i))
                        .or_else(|| batch.first())
                        .map(|c| c.source_url.clone())
                        .unwrap_or_default();
                    VerifiedFact {
                        text: checked.fact,
                        confidence_score: checked.confidence_score,
                        supporting_source_count: checked.supporting_sources.max(1),
                        has_contradiction: checked.has_contradiction,
                        source_url,
                    }
                })
                .collect()),
            Ok(_) => {
                debug!(stage = STAGE, "Reply listed no facts; marking batch unchecked");
                Ok(unchecked(batch))
            }
            Err(e) => {
                debug!(stage = STAGE, error = %e, "Reply did not parse; marking batch unchecked");
                Ok(unchecked(batch))
            }
        }
    }
}

fn unchecked(batch: &[FactCandidate]) -> Vec<VerifiedFact> {
    batch
        .iter()
        .map(|c| VerifiedFact {
            text: c.text.clone(),
            confidence_score: UNCHECKED_CONFIDENCE,
            supporting_source_count: 1,
            has_contradiction: false,
            source_url: c.source_url.clone(),
        })
        .collect()
}

#[async_trait]
impl FactChecker for LlmFactChecker {
    async fn verify(&self, facts: &[FactCandidate]) -> Result<Vec<VerifiedFact>, StageError> {
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<&[FactCandidate]> = facts.chunks(BATCH_SIZE).collect();
        let outcomes = join_all(batches.iter().map(|batch| self.verify_batch(batch))).await;

        let mut verified = Vec::with_capacity(facts.len());
        let mut failures = 0usize;
        let mut last_error = None;
        for (batch, outcome) in batches.iter().zip(outcomes) {
            match outcome {
                Ok(facts) => verified.extend(facts),
                Err(e) => {
                    warn!(error = %e, size = batch.len(), "Fact batch failed; marking unchecked");
                    failures += 1;
                    verified.extend(unchecked(batch));
                    last_error = Some(e);
                }
            }
        }

        if failures == batches.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        info!(
            candidates = facts.len(),
            verified = verified.len(),
            batches = batches.len(),
            failed_batches = failures,
            "Fact verification complete"
        );
        Ok(verified)
    }
}
