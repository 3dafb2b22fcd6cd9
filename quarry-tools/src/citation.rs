//! Reference list formatting in basic, APA, MLA and IEEE styles.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use quarry_core::{CitationFormatter, CitationStyle, PageSummary, StageError};
use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

/// Lines at least this long (excluding headings) get an IEEE marker.
const MARKER_MIN_LINE_CHARS: usize = 100;

/// An existing `[n]` or `(Author, 2020)` citation.
static EXISTING_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[\d+\]|\([^)]+,\s*\d{4}\)").ok());

/// Appends a reference list built from the summarized sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceCitations;

impl ReferenceCitations {
    pub fn new() -> Self {
        Self
    }

    /// Cite `sources` with `date` as the access date.
    pub fn cite_at(
        &self,
        report: &str,
        sources: &[PageSummary],
        style: CitationStyle,
        date: NaiveDate,
    ) -> String {
        if sources.is_empty() {
            return report.to_string();
        }

        let access_date = date.format("%B %d, %Y").to_string();
        let references: Vec<String> = sources
            .iter()
            .enumerate()
            .map(|(i, source)| format_reference(i + 1, source, style, &access_date))
            .collect();

        let body = if style == CitationStyle::Ieee {
            self.add_inline_markers(report, sources.len())
        } else {
            report.to_string()
        };

        format!(
            "{body}\n\n---\n\n## References\n\n{}",
            references.join("\n\n")
        )
    }

    fn has_marker(&self, line: &str) -> bool {
        EXISTING_MARKER
            .as_ref()
            .is_some_and(|re| re.is_match(line))
    }

    /// Number long body paragraphs `[1]`, `[2]`, ... holding at the last source.
    fn add_inline_markers(&self, report: &str, source_count: usize) -> String {
        let mut next = 1usize;
        report
            .split('\n')
            .map(|line| {
                if line.trim().chars().count() > MARKER_MIN_LINE_CHARS
                    && !line.starts_with('#')
                    && !self.has_marker(line)
                {
                    let marked = format!("{}.[{next}]", line.trim_end_matches('.'));
                    next = (next + 1).min(source_count);
                    marked
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The source's domain without a leading `www.`.
fn author_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn format_reference(
    index: usize,
    source: &PageSummary,
    style: CitationStyle,
    access_date: &str,
) -> String {
    let title = if source.title.trim().is_empty() {
        "Unknown Title"
    } else {
        source.title.as_str()
    };
    let url = &source.url;
    let author = author_of(url);
    match style {
        CitationStyle::Apa => {
            format!("{author}. (n.d.). {title}. Retrieved {access_date}, from {url}")
        }
        CitationStyle::Mla => format!("\"{title}.\" {author}, {access_date}, {url}."),
        CitationStyle::Ieee => {
            format!("[{index}] {author}, \"{title},\" {url} (accessed {access_date}).")
        }
        CitationStyle::Basic => format!("{title}. {url}"),
    }
}

#[async_trait]
impl CitationFormatter for ReferenceCitations {
    async fn cite(
        &self,
        report: &str,
        sources: &[PageSummary],
        style: CitationStyle,
    ) -> Result<String, StageError> {
        let cited = self.cite_at(report, sources, style, Local::now().date_naive());
        info!(style = %style, references = sources.len(), "Citations added");
        Ok(cited)
    }
}
