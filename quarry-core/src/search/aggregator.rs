//! Multi-source search aggregation: fusion, fallback, deduplication, ranking.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{SearchCapability, dedupe_against, rank};
use crate::config::SearchConfig;
use crate::error::{CapabilityError, SearchError};
use crate::types::{SearchResult, Tier};

/// Fans one query out across a tier's ordered fallback chain.
///
/// Individual capability failures are logged and contribute nothing; the
/// aggregator only fails when the whole chain yields zero results.
pub struct SearchAggregator {
    capabilities: Vec<Arc<dyn SearchCapability>>,
    free_chain: Vec<String>,
    premium_chain: Vec<String>,
    fusion_width: usize,
    timeout: Duration,
}

/// Outcome of calling one capability.
struct CallOutcome {
    results: Vec<SearchResult>,
    failed: bool,
}

impl SearchAggregator {
    pub fn new(capabilities: Vec<Arc<dyn SearchCapability>>, config: &SearchConfig) -> Self {
        Self {
            capabilities,
            free_chain: config.free_chain.clone(),
            premium_chain: config.premium_chain.clone(),
            fusion_width: config.fusion_width.max(1),
            timeout: config.timeout(),
        }
    }

    /// Names of every registered capability, in registration order.
    pub fn registered(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    /// The ordered chain for `tier`: configured names that are registered,
    /// minus premium-only backends for free users.
    pub fn chain(&self, tier: Tier) -> Vec<Arc<dyn SearchCapability>> {
        let names = match tier {
            Tier::Free => &self.free_chain,
            Tier::Premium => &self.premium_chain,
        };
        let mut chain: Vec<Arc<dyn SearchCapability>> = Vec::new();
        for name in names {
            let Some(capability) = self
                .capabilities
                .iter()
                .find(|c| c.name() == name.as_str())
            else {
                debug!(engine = %name, "Chain entry has no registered capability");
                continue;
            };
            if capability.premium_only() && !tier.is_premium() {
                continue;
            }
            if chain.iter().any(|c| c.name() == name.as_str()) {
                continue;
            }
            chain.push(Arc::clone(capability));
        }
        chain
    }

    /// Search `query` for up to `max_results` deduplicated, ranked results.
    pub async fn search(
        &self,
        query: &str,
        tier: Tier,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let chain = self.chain(tier);
        if chain.is_empty() {
            return Err(SearchError::NoCapabilities { tier });
        }
        let max_results = max_results.max(1);

        let width = self.fusion_width.min(chain.len());
        let per_capability = (max_results / width).max(1);
        let (fused, rest) = chain.split_at(width);

        info!(
            query,
            %tier,
            engines = ?fused.iter().map(|c| c.name()).collect::<Vec<_>>(),
            per_capability,
            "Fusing search capabilities"
        );

        let outcomes = futures::future::join_all(
            fused
                .iter()
                .map(|capability| self.call(capability.as_ref(), query, per_capability)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        let mut attempted = fused.len();
        for outcome in outcomes {
            collected.extend(dedupe_against(outcome.results, &mut seen));
        }

        if collected.len() < max_results / 2 {
            for capability in rest {
                if collected.len() >= max_results {
                    break;
                }
                let needed = max_results - collected.len();
                debug!(engine = capability.name(), needed, "Falling back");
                attempted += 1;
                let outcome = self.call(capability.as_ref(), query, needed).await;
                if outcome.failed {
                    continue;
                }
                collected.extend(dedupe_against(outcome.results, &mut seen));
            }
        }

        if collected.is_empty() {
            warn!(query, attempted, "Search chain exhausted without results");
            return Err(SearchError::Exhausted {
                query: query.to_string(),
                attempted,
            });
        }

        rank(&mut collected);
        collected.truncate(max_results);
        info!(query, count = collected.len(), "Search aggregated");
        Ok(collected)
    }

    async fn call(
        &self,
        capability: &dyn SearchCapability,
        query: &str,
        limit: usize,
    ) -> CallOutcome {
        let name = capability.name().to_string();
        let result = match tokio::time::timeout(self.timeout, capability.search(query, limit)).await
        {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout {
                name: name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match result {
            Ok(mut results) => {
                results.truncate(limit);
                debug!(engine = %name, count = results.len(), "Capability returned");
                CallOutcome {
                    results,
                    failed: false,
                }
            }
            Err(e) => {
                warn!(engine = %name, error = %e, "Search capability failed");
                CallOutcome {
                    results: Vec::new(),
                    failed: true,
                }
            }
        }
    }
}
