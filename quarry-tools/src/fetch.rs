//! Page fetching and HTML-to-text extraction.

use quarry_core::CapabilityError;
use reqwest::Client;
use tracing::debug;

use crate::http::{self, truncate_chars};

const NAME: &str = "fetch";

/// Fetches a page and returns its readable text.
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    max_chars: usize,
}

impl PageFetcher {
    pub fn new(client: Client, max_chars: usize) -> Self {
        Self { client, max_chars }
    }

    /// Fetch `url` and extract its text, truncated to `max_chars`.
    pub async fn fetch(&self, url: &str) -> Result<String, CapabilityError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(CapabilityError::NotConfigured {
                name: NAME.to_string(),
                reason: format!("unsupported URL scheme: {}", url),
            });
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;
        http::check_status(NAME, response.status())?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let text =
            if content_type.contains("text/html") || content_type.contains("application/xhtml") {
                html_to_text(&body)
            } else {
                body
            };
        debug!(url, chars = text.len(), "Page fetched");
        Ok(truncate_chars(&text, self.max_chars).to_string())
    }
}

/// Strip tags, drop script and style bodies, decode common entities, and
/// collapse blank lines.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut skip_depth = 0usize;
    let mut tag_name = String::new();
    let mut building_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                building_tag = true;
                tag_name.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                building_tag = false;
                let tag = tag_name.to_lowercase();
                match tag.as_str() {
                    "script" | "style" | "noscript" => skip_depth += 1,
                    "/script" | "/style" | "/noscript" => skip_depth = skip_depth.saturating_sub(1),
                    _ => {}
                }
                if is_block_tag(&tag) {
                    text.push('\n');
                }
            }
            _ if in_tag => {
                if building_tag && (ch.is_alphanumeric() || ch == '/') {
                    tag_name.push(ch);
                } else {
                    building_tag = false;
                }
            }
            _ if skip_depth > 0 => {}
            _ => text.push(ch),
        }
    }

    let text = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_block_tag(tag: &str) -> bool {
    let name = tag.trim_start_matches('/');
    matches!(
        name,
        "p" | "br"
            | "div"
            | "li"
            | "tr"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "section"
            | "article"
            | "blockquote"
            | "pre"
    )
}
