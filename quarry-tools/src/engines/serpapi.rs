//! SerpAPI Google results. Paid; premium chains only.

use async_trait::async_trait;
use quarry_core::{CapabilityError, SearchCapability, SearchResult};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::not_configured;
use crate::http::{self, str_field};

pub const NAME: &str = "serpapi";
pub const DEFAULT_BASE_URL: &str = "https://serpapi.com";
const RELEVANCE: f64 = 0.95;

pub struct SerpApiSearch {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    key_env: String,
}

impl SerpApiSearch {
    pub fn new(client: Client, base_url: String, api_key: Option<String>, key_env: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            key_env,
        }
    }
}

pub fn parse_response(body: &Value, max_results: usize) -> Vec<SearchResult> {
    body.get("organic_results")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| !str_field(item, "link").is_empty())
                .take(max_results)
                .map(|item| {
                    SearchResult::new(
                        str_field(item, "title"),
                        str_field(item, "link"),
                        str_field(item, "snippet"),
                        NAME,
                        RELEVANCE,
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchCapability for SerpApiSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn premium_only(&self) -> bool {
        true
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

        let num = max_results.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("num", num.as_str()),
                ("api_key", api_key),
                ("engine", "google"),
            ])
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let body = http::json_body(NAME, response).await?;
        let results = parse_response(&body, max_results);
        debug!(query, count = results.len(), "SerpAPI search returned");
        Ok(results)
    }
}
