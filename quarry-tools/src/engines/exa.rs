//! Exa neural search API.

use async_trait::async_trait;
use quarry_core::{CapabilityError, SearchCapability, SearchResult};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::not_configured;
use crate::http::{self, str_field, truncate_chars};

pub const NAME: &str = "exa";
pub const DEFAULT_BASE_URL: &str = "https://api.exa.ai";
/// Used when a result carries no score of its own.
const DEFAULT_RELEVANCE: f64 = 0.8;
const SNIPPET_CHARS: usize = 500;

pub struct ExaSearch {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    key_env: String,
}

impl ExaSearch {
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
    let Some(items) = body.get("results").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| !str_field(item, "url").is_empty())
        .take(max_results)
        .map(|item| {
            let score = item
                .get("score")
                .and_then(|v| v.as_f64())
                .unwrap_or(DEFAULT_RELEVANCE);
            SearchResult::new(
                str_field(item, "title"),
                str_field(item, "url"),
                truncate_chars(str_field(item, "text").trim(), SNIPPET_CHARS),
                NAME,
                score,
            )
        })
        .collect()
}

#[async_trait]
impl SearchCapability for ExaSearch {
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

        let payload = json!({
            "query": query,
            "numResults": max_results,
            "type": "auto",
            "contents": { "text": true },
        });
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let body = http::json_body(NAME, response).await?;
        let results = parse_response(&body, max_results);
        debug!(query, count = results.len(), "Exa search returned");
        Ok(results)
    }
}
