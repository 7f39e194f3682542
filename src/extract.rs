//! Plain-text extraction for every supported content kind.
//!
//! Each kind has an ordered list of strategies; the first one that yields
//! non-blank text wins. A kind whose strategies all fail extracts to
//! `None` and the admission pipeline skips the file.
//!
//! | Kind | Strategies |
//! |------|------------|
//! | pdf | `pdf-extract` |
//! | docx / pptx / xlsx | OOXML over `zip` + `quick-xml` |
//! | json | message record, then every string value |
//! | markdown / text | strict UTF-8, then lossy UTF-8 |
//! | html | `html2text`, then `html2text` with a plain decorator |

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use filevault_core::models::ContentKind;
use html2text::render::TrivialDecorator;

use crate::error::VaultError;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Width passed to the HTML renderer; large enough that it never wraps prose.
const HTML_RENDER_WIDTH: usize = 10_000;

/// Extraction collaborator used by admission.
pub trait Extractor: Send + Sync {
    /// Plain text of the file at `path`, or `None` if nothing usable
    /// could be extracted.
    fn extract(&self, path: &Path, kind: ContentKind) -> Option<String>;
}

/// One way of turning bytes into text.
pub struct Strategy {
    pub name: &'static str,
    run: fn(&[u8]) -> Result<String>,
}

const PDF: &[Strategy] = &[Strategy {
    name: "pdf-extract",
    run: pdf_text,
}];
const DOCX: &[Strategy] = &[Strategy {
    name: "ooxml-docx",
    run: docx_text,
}];
const PPTX: &[Strategy] = &[Strategy {
    name: "ooxml-pptx",
    run: pptx_text,
}];
const XLSX: &[Strategy] = &[Strategy {
    name: "ooxml-xlsx",
    run: xlsx_text,
}];
const JSON: &[Strategy] = &[
    Strategy {
        name: "message-record",
        run: message_record_text,
    },
    Strategy {
        name: "json-strings",
        run: json_strings_text,
    },
];
const PLAIN: &[Strategy] = &[
    Strategy {
        name: "utf8",
        run: utf8_text,
    },
    Strategy {
        name: "utf8-lossy",
        run: lossy_text,
    },
];
const HTML: &[Strategy] = &[
    Strategy {
        name: "html2text",
        run: html_render_text,
    },
    Strategy {
        name: "html2text-plain",
        run: html_plain_text,
    },
];

/// The ordered strategies for `kind`.
pub fn strategies(kind: ContentKind) -> &'static [Strategy] {
    match kind {
        ContentKind::Pdf => PDF,
        ContentKind::Docx => DOCX,
        ContentKind::Pptx => PPTX,
        ContentKind::Xlsx => XLSX,
        ContentKind::Json => JSON,
        ContentKind::Markdown | ContentKind::Text => PLAIN,
        ContentKind::Html => HTML,
    }
}

/// Default [`Extractor`]: reads the file once and runs the kind's
/// strategies in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrategyExtractor;

impl StrategyExtractor {
    /// Like [`Extractor::extract`] but reports why nothing was extracted.
    pub fn try_extract(&self, path: &Path, kind: ContentKind) -> Result<String, VaultError> {
        let bytes = std::fs::read(path).map_err(|e| VaultError::io(path, e))?;
        let mut reasons = Vec::new();
        for strategy in strategies(kind) {
            match (strategy.run)(&bytes) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!(path = %path.display(), strategy = strategy.name, chars = text.chars().count(), "extracted");
                    return Ok(text);
                }
                Ok(_) => reasons.push(format!("{}: no text", strategy.name)),
                Err(e) => reasons.push(format!("{}: {:#}", strategy.name, e)),
            }
        }
        Err(VaultError::extraction(path, reasons.join("; ")))
    }
}

impl Extractor for StrategyExtractor {
    fn extract(&self, path: &Path, kind: ContentKind) -> Option<String> {
        match self.try_extract(path, kind) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!(error = %e, "extraction failed");
                None
            }
        }
    }
}

// ---------- pdf ----------

fn pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| anyhow!("PDF extraction failed: {}", e))
}

// ---------- OOXML ----------

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).context("not an OOXML (zip) container")
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("{} not found", name))?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        bail!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name,
            MAX_XML_ENTRY_BYTES
        );
    }
    Ok(out)
}

/// Entries named `<prefix><n>.xml`, ordered by `n`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Text of every `<*:t>` element. `<*:p>` ends a paragraph.
fn text_elements(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"p" => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    text_elements(&xml)
}

fn pptx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = text_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn xlsx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = match read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(_) => Vec::new(),
    };
    let mut out = String::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let cells = sheet_cells(&xml, &shared_strings)?;
        if !out.is_empty() && !cells.is_empty() {
            out.push('\n');
        }
        out.push_str(&cells);
    }
    Ok(out)
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    use quick_xml::events::Event;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => current = Some(String::new()),
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                if let (Some(s), Ok(Event::Text(te))) =
                    (current.as_mut(), reader.read_event_into(&mut buf))
                {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"si" => {
                strings.extend(current.take());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Shared-string and inline cell values of one sheet, space-separated.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<String> {
    use quick_xml::events::Event;

    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut cell_type: Option<Vec<u8>> = None;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                cell_type = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"t")
                    .map(|a| a.value.into_owned());
            }
            Event::Start(e) if matches!(e.local_name().as_ref(), b"v" | b"t") => in_value = true,
            Event::Text(te) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                match cell_type.as_deref() {
                    Some(b"s") => {
                        if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                            cells.push(s.clone());
                        }
                    }
                    Some(b"inlineStr") | Some(b"str") => cells.push(value.to_string()),
                    _ => {}
                }
                in_value = false;
            }
            Event::End(e) if e.local_name().as_ref() == b"c" => {
                cell_type = None;
                in_value = false;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

// ---------- json ----------

/// Subject, body and sender of an exported mail message.
fn message_record_text(bytes: &[u8]) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("not a JSON object"))?;

    let mut parts = Vec::new();
    if let Some(subject) = obj.get("subject").and_then(|v| v.as_str()) {
        parts.push(format!("Subject: {}", subject));
    }
    let body = obj
        .get("body")
        .and_then(|b| b.as_str().or_else(|| b.get("content").and_then(|c| c.as_str())))
        .or_else(|| obj.get("bodyPreview").and_then(|v| v.as_str()));
    if let Some(body) = body {
        parts.push(body.to_string());
    }
    let from = obj.get("from").and_then(|f| {
        f.as_str().or_else(|| {
            f.pointer("/emailAddress/address")
                .and_then(|a| a.as_str())
        })
    });
    if let Some(from) = from {
        parts.push(format!("From: {}", from));
    }

    if parts.is_empty() {
        bail!("no subject, body or sender fields");
    }
    Ok(parts.join("\n"))
}

/// Every string value in document order, one per line.
fn json_strings_text(bytes: &[u8]) -> Result<String> {
    fn walk(v: &serde_json::Value, out: &mut Vec<String>) {
        match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
            serde_json::Value::Array(items) => items.iter().for_each(|i| walk(i, out)),
            serde_json::Value::Object(map) => map.values().for_each(|i| walk(i, out)),
            _ => {}
        }
    }

    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let mut out = Vec::new();
    walk(&value, &mut out);
    Ok(out.join("\n"))
}

// ---------- plain text ----------

fn utf8_text(bytes: &[u8]) -> Result<String> {
    Ok(std::str::from_utf8(bytes)?.to_string())
}

fn lossy_text(bytes: &[u8]) -> Result<String> {
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

// ---------- html ----------

fn html_render_text(bytes: &[u8]) -> Result<String> {
    html2text::from_read(bytes, HTML_RENDER_WIDTH).map_err(|e| anyhow!("html2text error: {}", e))
}

/// Literal text only, without link footnotes or heading markers.
fn html_plain_text(bytes: &[u8]) -> Result<String> {
    html2text::from_read_with_decorator(bytes, HTML_RENDER_WIDTH, TrivialDecorator::new())
        .map_err(|e| anyhow!("html2text plain render error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let opts = zip::write::SimpleFileOptions::default();
            for (name, body) in entries {
                zip.start_file(*name, opts).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn every_kind_has_a_strategy() {
        for kind in ContentKind::ALL {
            assert!(!strategies(kind).is_empty(), "{}", kind);
        }
        assert_eq!(strategies(ContentKind::Text)[0].name, "utf8");
    }

    #[test]
    fn docx_paragraphs_are_extracted() {
        let doc = r#"<w:document xmlns:w="x"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", doc)]);
        let text = docx_text(&bytes).unwrap();
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second & last"));
        assert!(text.contains('\n'));
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |t: &str| format!(r#"<p:sld xmlns:a="a"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>"#, t);
        let s1 = slide("first");
        let s2 = slide("second");
        let s10 = slide("tenth");
        let bytes = zip_with(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);
        assert_eq!(pptx_text(&bytes).unwrap(), "first\nsecond\ntenth");
    }

    #[test]
    fn xlsx_shared_and_inline_strings() {
        let shared = r#"<sst><si><t>Revenue</t></si><si><t>Costs</t></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row>
            <c r="A1" t="s"><v>0</v></c>
            <c r="B1" t="s"><v>1</v></c>
            <c r="C1"><v>42</v></c>
            <c r="D1" t="inlineStr"><is><t>note</t></is></c>
        </row></sheetData></worksheet>"#;
        let bytes = zip_with(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(xlsx_text(&bytes).unwrap(), "Revenue Costs note");
    }

    #[test]
    fn not_a_zip_fails_ooxml() {
        assert!(docx_text(b"not a zip").is_err());
        assert!(pdf_text(b"not a pdf").is_err());
    }

    #[test]
    fn message_record_fields() {
        let json = br#"{
            "subject": "Quarterly numbers",
            "body": {"contentType": "text", "content": "Please review the attached."},
            "from": {"emailAddress": {"address": "cfo@example.com", "name": "CFO"}}
        }"#;
        let text = message_record_text(json).unwrap();
        assert_eq!(
            text,
            "Subject: Quarterly numbers\nPlease review the attached.\nFrom: cfo@example.com"
        );
    }

    #[test]
    fn message_record_prefers_body_over_preview() {
        let json = br#"{"body": "full", "bodyPreview": "short", "from": "a@b.c"}"#;
        assert_eq!(message_record_text(json).unwrap(), "full\nFrom: a@b.c");
        let json = br#"{"bodyPreview": "short"}"#;
        assert_eq!(message_record_text(json).unwrap(), "short");
    }

    #[test]
    fn non_message_json_falls_back_to_strings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.json");
        std::fs::write(&path, r#"{"items": [{"title": "alpha"}, {"title": "beta", "n": 3}]}"#)
            .unwrap();
        let text = StrategyExtractor.extract(&path, ContentKind::Json).unwrap();
        assert!(text.contains("alpha"));
        assert!(text.contains("beta"));
    }

    #[test]
    fn invalid_utf8_falls_back_to_lossy() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("latin1.txt");
        std::fs::write(&path, b"caf\xe9 au lait").unwrap();
        let text = StrategyExtractor.extract(&path, ContentKind::Text).unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with("au lait"));
    }

    #[test]
    fn blank_file_extracts_to_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.md");
        std::fs::write(&path, "   \n").unwrap();
        assert!(StrategyExtractor.extract(&path, ContentKind::Markdown).is_none());
        let err = StrategyExtractor
            .try_extract(&path, ContentKind::Markdown)
            .unwrap_err();
        assert!(matches!(err, VaultError::ExtractionFailure { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = StrategyExtractor
            .try_extract(Path::new("/no/such/file.md"), ContentKind::Markdown)
            .unwrap_err();
        assert!(matches!(err, VaultError::Io { .. }));
    }

    #[test]
    fn plain_html_render_drops_script_style_and_decoration() {
        let html = br#"<html><head><style>body { color: red }</style>
            <script>var x = "<b>";</script></head>
            <body><!-- hidden --><h1>Title</h1><p>Fish &amp; chips &lt;fresh&gt;</p>
            <a href="https://example.com">link text</a></body></html>"#;
        let text = html_plain_text(html).unwrap();
        assert!(text.contains("Title"));
        assert!(text.contains("Fish & chips <fresh>"));
        assert!(text.contains("link text"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("# Title"));
        assert!(!text.contains("example.com"));
    }

    #[test]
    fn html_extraction_returns_visible_text() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("page.html");
        std::fs::write(&path, "<html><body><p>Visible paragraph text</p></body></html>").unwrap();
        let text = StrategyExtractor.extract(&path, ContentKind::Html).unwrap();
        assert!(text.contains("Visible paragraph text"));
    }
}
