//! Wikipedia full-text search through the MediaWiki action API. Keyless.

use async_trait::async_trait;
use quarry_core::{CapabilityError, SearchCapability, SearchResult};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::fetch::html_to_text;
use crate::http::{self, str_field};

pub const NAME: &str = "wikipedia";
pub const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org";
const RELEVANCE: f64 = 0.85;

pub struct WikipediaSearch {
    client: Client,
    base_url: String,
}

impl WikipediaSearch {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

/// Article URL for a page title under `base_url`.
pub fn article_url(base_url: &str, title: &str) -> String {
    format!(
        "{}/wiki/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&title.replace(' ', "_"))
    )
}

pub fn parse_response(body: &Value, base_url: &str, max_results: usize) -> Vec<SearchResult> {
    body.pointer("/query/search")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| !str_field(item, "title").is_empty())
                .take(max_results)
                .map(|item| {
                    let title = str_field(item, "title");
                    SearchResult::new(
                        title,
                        article_url(base_url, title),
                        html_to_text(str_field(item, "snippet")),
                        NAME,
                        RELEVANCE,
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchCapability for WikipediaSearch {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CapabilityError> {
        let limit = max_results.clamp(1, 50).to_string();
        let response = self
            .client
            .get(format!("{}/w/api.php", self.base_url))
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
                ("utf8", "1"),
            ])
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let body = http::json_body(NAME, response).await?;
        let results = parse_response(&body, &self.base_url, max_results);
        debug!(query, count = results.len(), "Wikipedia search returned");
        Ok(results)
    }
}
