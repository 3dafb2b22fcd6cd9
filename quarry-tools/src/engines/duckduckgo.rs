//! DuckDuckGo instant answers. Keyless.

use async_trait::async_trait;
use quarry_core::{CapabilityError, SearchCapability, SearchResult};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::http::{self, str_field};

pub const NAME: &str = "duckduckgo";
pub const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com";
const RELEVANCE: f64 = 0.7;

pub struct DuckDuckGoSearch {
    client: Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

/// Extract the abstract, direct results and related topics, in that order.
/// Topic groups nest their entries under `Topics`.
pub fn parse_response(body: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = str_field(body, "AbstractText");
    let abstract_url = str_field(body, "AbstractURL");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = str_field(body, "Heading");
        let title = if heading.is_empty() {
            str_field(body, "AbstractSource")
        } else {
            heading
        };
        results.push(SearchResult::new(
            title,
            abstract_url,
            abstract_text,
            NAME,
            RELEVANCE,
        ));
    }

    let mut entries: Vec<&Value> = Vec::new();
    for key in ["Results", "RelatedTopics"] {
        if let Some(items) = body.get(key).and_then(|v| v.as_array()) {
            for item in items {
                match item.get("Topics").and_then(|v| v.as_array()) {
                    Some(nested) => entries.extend(nested.iter()),
                    None => entries.push(item),
                }
            }
        }
    }

    for entry in entries {
        if results.len() >= max_results {
            break;
        }
        let text = str_field(entry, "Text");
        let url = str_field(entry, "FirstURL");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text);
        results.push(SearchResult::new(title, url, text, NAME, RELEVANCE));
    }

    results.truncate(max_results);
    results
}

#[async_trait]
impl SearchCapability for DuckDuckGoSearch {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CapabilityError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let body = http::json_body(NAME, response).await?;
        let results = parse_response(&body, max_results);
        debug!(query, count = results.len(), "DuckDuckGo search returned");
        Ok(results)
    }
}
