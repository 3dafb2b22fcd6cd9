//! Google Programmable Search (Custom Search JSON API). Paid; premium
//! chains only.

use async_trait::async_trait;
use quarry_core::{CapabilityError, SearchCapability, SearchResult};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::http::{self, str_field};

pub const NAME: &str = "google_cse";
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const RELEVANCE: f64 = 0.95;
/// The API rejects `num` above 10.
const MAX_PER_REQUEST: usize = 10;

pub struct GoogleCseSearch {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    cx: Option<String>,
}

impl GoogleCseSearch {
    pub fn new(
        client: Client,
        base_url: String,
        api_key: Option<String>,
        cx: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            cx,
        }
    }
}

pub fn parse_response(body: &Value, max_results: usize) -> Vec<SearchResult> {
    body.get("items")
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
impl SearchCapability for GoogleCseSearch {
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
        let (Some(api_key), Some(cx)) = (self.api_key.as_deref(), self.cx.as_deref()) else {
            return Err(CapabilityError::NotConfigured {
                name: NAME.to_string(),
                reason: "an API key and a search engine id are both required".to_string(),
            });
        };

        let num = max_results.clamp(1, MAX_PER_REQUEST).to_string();
        let response = self
            .client
            .get(format!("{}/customsearch/v1", self.base_url))
            .query(&[("q", query), ("num", num.as_str()), ("key", api_key), ("cx", cx)])
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let body = http::json_body(NAME, response).await?;
        let results = parse_response(&body, max_results);
        debug!(query, count = results.len(), "Google CSE search returned");
        Ok(results)
    }
}
