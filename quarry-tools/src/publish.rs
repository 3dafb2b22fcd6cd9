//! Report publishing: Markdown, PDF (genpdf) and DOCX (OOXML in a zip).

use async_trait::async_trait;
use chrono::Local;
use genpdf::elements::{Break, PageBreak, Paragraph};
use genpdf::style::{Style, StyledString};
use genpdf::{Document, SimplePageDecorator};
use quarry_core::config::OutputConfig;
use quarry_core::{ExportFormat, PublishRequest, Publisher, StageError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const STAGE: &str = "publish";
const MAX_SLUG_CHARS: usize = 50;

/// Font families tried in order after the configured font directory.
const SYSTEM_FONTS: [(&str, &str); 5] = [
    ("/usr/share/fonts/truetype/liberation", "LiberationSans"),
    ("/usr/share/fonts/liberation-sans", "LiberationSans"),
    ("/usr/share/fonts/liberation", "LiberationSans"),
    ("/System/Library/Fonts", "Helvetica"),
    ("/Library/Fonts", "Arial"),
];

/// Writes each requested format into an output directory.
#[derive(Debug, Clone)]
pub struct FilePublisher {
    dir: PathBuf,
    font_dir: Option<PathBuf>,
}

impl FilePublisher {
    pub fn new(dir: impl Into<PathBuf>, font_dir: Option<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            font_dir,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.dir.clone(), config.font_dir.clone())
    }

    async fn publish_one(
        &self,
        format: ExportFormat,
        path: PathBuf,
        request: &PublishRequest<'_>,
    ) -> Result<PathBuf, StageError> {
        match format {
            ExportFormat::Markdown => {
                tokio::fs::write(&path, request.report)
                    .await
                    .map_err(io_error)?;
                Ok(path)
            }
            ExportFormat::Pdf => {
                let doc = ReportDocument::from_request(request);
                let font_dir = self.font_dir.clone();
                tokio::task::spawn_blocking(move || {
                    render_pdf(&doc, font_dir.as_deref(), &path).map(|()| path)
                })
                .await
                .map_err(|e| StageError::failed(STAGE, format!("PDF task failed: {e}")))?
            }
            ExportFormat::Docx => {
                let doc = ReportDocument::from_request(request);
                tokio::task::spawn_blocking(move || write_docx(&doc, &path).map(|()| path))
                    .await
                    .map_err(|e| StageError::failed(STAGE, format!("DOCX task failed: {e}")))?
            }
        }
    }
}

fn io_error(source: std::io::Error) -> StageError {
    StageError::Io {
        stage: STAGE.to_string(),
        source,
    }
}

/// A filesystem-safe stem derived from the query.
pub fn file_stem(query: &str) -> String {
    let kept: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let slug: String = kept
        .trim()
        .replace(' ', "_")
        .chars()
        .take(MAX_SLUG_CHARS)
        .collect();
    if slug.is_empty() {
        "research_report".to_string()
    } else {
        slug
    }
}

/// Owned copy of what the blocking renderers need.
#[derive(Debug, Clone)]
struct ReportDocument {
    title: String,
    subtitle: String,
    body: String,
}

impl ReportDocument {
    fn from_request(request: &PublishRequest<'_>) -> Self {
        Self {
            title: request.query.to_string(),
            subtitle: format!(
                "{} research | {} tier | {}",
                request.mode,
                request.tier,
                Local::now().format("%B %d, %Y")
            ),
            body: request.report.to_string(),
        }
    }
}

/// One rendered line of a Markdown report.
#[derive(Debug, PartialEq, Eq)]
enum Block<'a> {
    Heading(u8, &'a str),
    Rule,
    Text(&'a str),
    Blank,
}

fn classify(line: &str) -> Block<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Block::Blank
    } else if trimmed.chars().all(|c| c == '-') && trimmed.len() >= 3 {
        Block::Rule
    } else if let Some(rest) = trimmed.strip_prefix("### ") {
        Block::Heading(3, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("## ") {
        Block::Heading(2, rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("# ") {
        Block::Heading(1, rest.trim())
    } else {
        Block::Text(trimmed)
    }
}

/// Drop inline emphasis markers.
fn plain(text: &str) -> String {
    text.replace("**", "").replace('*', "")
}

fn load_fonts(
    font_dir: Option<&Path>,
) -> Result<genpdf::fonts::FontFamily<genpdf::fonts::FontData>, StageError> {
    if let Some(dir) = font_dir {
        for name in ["LiberationSans", "DejaVuSans", "Arial"] {
            if let Ok(family) = genpdf::fonts::from_files(dir, name, None) {
                return Ok(family);
            }
        }
    }
    SYSTEM_FONTS
        .iter()
        .find_map(|(dir, name)| genpdf::fonts::from_files(dir, name, None).ok())
        .ok_or_else(|| StageError::failed(STAGE, "No suitable font found for PDF output"))
}

fn render_pdf(doc: &ReportDocument, font_dir: Option<&Path>, path: &Path) -> Result<(), StageError> {
    let fonts = load_fonts(font_dir)?;
    let mut pdf = Document::new(fonts);
    pdf.set_title(doc.title.clone());

    let mut decorator = SimplePageDecorator::new();
    decorator.set_margins(30);
    pdf.set_page_decorator(decorator);

    // Title page
    pdf.push(Break::new(6));
    pdf.push(Paragraph::new(StyledString::new(
        doc.title.clone(),
        Style::new().bold().with_font_size(24),
    )));
    pdf.push(Break::new(1));
    pdf.push(Paragraph::new(StyledString::new(
        doc.subtitle.clone(),
        Style::new().italic().with_font_size(12),
    )));
    pdf.push(PageBreak::new());

    for line in doc.body.lines() {
        match classify(line) {
            Block::Heading(level, text) => {
                let size = match level {
                    1 => 18,
                    2 => 14,
                    _ => 12,
                };
                pdf.push(Break::new(0.5));
                pdf.push(Paragraph::new(StyledString::new(
                    plain(text),
                    Style::new().bold().with_font_size(size),
                )));
            }
            Block::Rule => pdf.push(Break::new(1)),
            Block::Text(text) => pdf.push(Paragraph::new(plain(text))),
            Block::Blank => pdf.push(Break::new(0.5)),
        }
    }

    pdf.render_to_file(path)
        .map_err(|e| StageError::failed(STAGE, format!("Failed to render PDF: {e}")))
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn docx_paragraph(style: Option<&str>, text: &str) -> String {
    let props = style
        .map(|s| format!("<w:pPr><w:pStyle w:val=\"{s}\"/></w:pPr>"))
        .unwrap_or_default();
    format!(
        "<w:p>{props}<w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        xml_escape(&plain(text))
    )
}

fn document_xml(doc: &ReportDocument) -> String {
    let mut body = String::new();
    body.push_str(&docx_paragraph(Some("Title"), &doc.title));
    body.push_str(&docx_paragraph(Some("Subtitle"), &doc.subtitle));
    for line in doc.body.lines() {
        match classify(line) {
            // The title page already carries the report title.
            Block::Heading(1, text) if text == doc.title => {}
            Block::Heading(level, text) => {
                body.push_str(&docx_paragraph(Some(&format!("Heading{level}")), text));
            }
            Block::Text(text) => body.push_str(&docx_paragraph(None, text)),
            Block::Rule | Block::Blank => {}
        }
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    )
}

const CONTENT_TYPES_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
<Override PartName=\"/word/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml\"/>\
</Types>";

const ROOT_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
</Relationships>";

const DOCUMENT_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>\
</Relationships>";

fn styles_xml() -> String {
    let style = |id: &str, size: u32, bold: bool| {
        let bold = if bold { "<w:b/>" } else { "" };
        format!(
            "<w:style w:type=\"paragraph\" w:styleId=\"{id}\"><w:name w:val=\"{id}\"/>\
             <w:basedOn w:val=\"Normal\"/><w:rPr>{bold}<w:sz w:val=\"{size}\"/></w:rPr></w:style>"
        )
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:styles xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/>\
         <w:rPr><w:sz w:val=\"22\"/></w:rPr></w:style>{}{}{}{}{}</w:styles>",
        style("Title", 48, true),
        style("Subtitle", 24, false),
        style("Heading1", 36, true),
        style("Heading2", 28, true),
        style("Heading3", 24, true),
    )
}

fn write_docx(doc: &ReportDocument, path: &Path) -> Result<(), StageError> {
    let zip_error =
        |e: zip::result::ZipError| StageError::failed(STAGE, format!("DOCX write failed: {e}"));

    let file = std::fs::File::create(path).map_err(io_error)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.to_string()),
        ("word/styles.xml", styles_xml()),
        ("word/document.xml", document_xml(doc)),
    ];
    for (name, contents) in parts {
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(contents.as_bytes()).map_err(io_error)?;
    }
    zip.finish().map_err(zip_error)?;
    Ok(())
}

#[async_trait]
impl Publisher for FilePublisher {
    async fn publish(
        &self,
        request: PublishRequest<'_>,
    ) -> Result<BTreeMap<ExportFormat, PathBuf>, StageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error)?;

        let stem = format!(
            "{}_{}",
            file_stem(request.query),
            Local::now().format("%Y%m%d_%H%M%S")
        );

        let mut written = BTreeMap::new();
        let mut last_error = None;
        for &format in request.formats {
            let path = self.dir.join(format!("{stem}.{}", format.extension()));
            match self.publish_one(format, path, &request).await {
                Ok(path) => {
                    info!(format = %format, path = %path.display(), "Report published");
                    written.insert(format, path);
                }
                Err(e) => {
                    warn!(format = %format, error = %e, "Format could not be written");
                    last_error = Some(e);
                }
            }
        }

        match (written.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            (true, None) => Err(StageError::Empty {
                stage: STAGE.to_string(),
            }),
            _ => Ok(written),
        }
    }
}
