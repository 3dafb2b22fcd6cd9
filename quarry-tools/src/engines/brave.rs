//! Brave Search web API.

use async_trait::async_trait;
use quarry_core::{CapabilityError, SearchCapability, SearchResult};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::not_configured;
use crate::http::{self, str_field};

pub const NAME: &str = "brave";
pub const DEFAULT_BASE_URL: &str = "https://api.search.brave.com";
const RELEVANCE: f64 = 0.9;

pub struct BraveSearch {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    key_env: String,
}

impl BraveSearch {
    pub fn new(client: Client, base_url: String, api_key: Option<String>, key_env: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            key_env,
        }
    }
}

/// Extract results from a `/res/v1/web/search` response.
pub fn parse_response(body: &Value, max_results: usize) -> Vec<SearchResult> {
    body.pointer("/web/results")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| !str_field(item, "url").is_empty())
                .take(max_results)
                .map(|item| {
                    SearchResult::new(
                        str_field(item, "title"),
                        str_field(item, "url"),
                        str_field(item, "description"),
                        NAME,
                        RELEVANCE,
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchCapability for BraveSearch {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CapabilityError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| not_configured(NAME, &self.key_env))?;

        let url = format!("{}/res/v1/web/search", self.base_url);
        let count = max_results.clamp(1, 20).to_string();
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let body = http::json_body(NAME, response).await?;
        let results = parse_response(&body, max_results);
        debug!(query, count = results.len(), "Brave search returned");
        Ok(results)
    }
}
