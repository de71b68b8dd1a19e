//! Plain-text extraction for classification and summaries.
//!
//! Text formats are decoded directly. DOCX, PPTX and ODT are ZIP archives of XML
//! and are read with `zip` + `quick-xml` under entry-count and size limits.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

const MAX_ZIP_ENTRIES: usize = 1000;
const MAX_XML_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ENTRY_NAME_LENGTH: usize = 255;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const ODT_MIME: &str = "application/vnd.oasis.opendocument.text";

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static MULTIPLE_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static MIXED_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    PlainText,
    Html,
    Docx,
    Pptx,
    Odt,
}

fn classify_mime(mime_type: &str) -> Option<DocumentKind> {
    let mime = mime_type.split(';').next().unwrap_or("").trim().to_lowercase();
    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => Some(DocumentKind::Html),
        DOCX_MIME => Some(DocumentKind::Docx),
        PPTX_MIME => Some(DocumentKind::Pptx),
        ODT_MIME => Some(DocumentKind::Odt),
        "application/json" | "application/xml" | "application/x-yaml" | "application/yaml"
        | "application/javascript" | "application/x-tex" => Some(DocumentKind::PlainText),
        m if m.starts_with("text/") => Some(DocumentKind::PlainText),
        _ => None,
    }
}

/// Extract readable text from `data`, trusting `mime_type` first and sniffing the
/// content when the declared type is generic.
pub fn extract_text(data: &[u8], mime_type: &str) -> Result<String> {
    let kind = match classify_mime(mime_type) {
        Some(kind) => kind,
        None => {
            let sniffed = infer::get(data).map(|t| t.mime_type());
            debug!("Declared type '{}' not extractable, sniffed {:?}", mime_type, sniffed);
            match sniffed.and_then(classify_mime) {
                Some(kind) => kind,
                // zip-based office formats sniff as their own mime types; anything
                // unrecognised that still decodes as UTF-8 is treated as text
                None if sniffed.is_none() && std::str::from_utf8(data).is_ok() => DocumentKind::PlainText,
                None => return Err(anyhow!("Unsupported content type for text extraction: {}", mime_type)),
            }
        }
    };

    let text = match kind {
        DocumentKind::PlainText => String::from_utf8_lossy(data).into_owned(),
        DocumentKind::Html => HTML_TAG.replace_all(&String::from_utf8_lossy(data), " ").into_owned(),
        DocumentKind::Docx => extract_docx(data)?,
        DocumentKind::Pptx => extract_pptx(data)?,
        DocumentKind::Odt => extract_odt(data)?,
    };

    let cleaned = clean_text(&remove_null_bytes(&text));
    if cleaned.is_empty() {
        return Err(anyhow!("Document contains no extractable text"));
    }
    Ok(cleaned)
}

fn remove_null_bytes(text: &str) -> String {
    let cleaned: String = text.chars().filter(|&c| c != '\0').collect();
    if cleaned.len() < text.len() {
        warn!("Removed null bytes from extracted text; document data may be malformed");
    }
    cleaned
}

fn clean_text(text: &str) -> String {
    let collapsed = MIXED_WHITESPACE.replace_all(text, " ");
    let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    MULTIPLE_NEWLINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Rejects entry names that could traverse outside the archive root
fn validate_zip_entry_name(entry_name: &str) -> Result<()> {
    if entry_name.len() > MAX_ENTRY_NAME_LENGTH {
        return Err(anyhow!("ZIP entry name too long ({})", entry_name.len()));
    }
    if entry_name.contains("..") {
        return Err(anyhow!("ZIP entry contains directory traversal sequence: '{}'", entry_name));
    }
    if entry_name.starts_with('/') || entry_name.starts_with('\\') {
        return Err(anyhow!("ZIP entry contains absolute path: '{}'", entry_name));
    }
    if entry_name.len() >= 2 && entry_name.chars().nth(1) == Some(':') {
        return Err(anyhow!("ZIP entry contains Windows drive letter: '{}'", entry_name));
    }
    Ok(())
}

fn read_zip_entry_safely<R: Read>(reader: &mut R, max_size: u64) -> Result<String> {
    let mut buffer = Vec::new();
    let read = reader.take(max_size + 1).read_to_end(&mut buffer)? as u64;
    if read > max_size {
        return Err(anyhow!(
            "ZIP entry content exceeds maximum allowed size of {:.1} MB",
            max_size as f64 / (1024.0 * 1024.0)
        ));
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(data: &[u8]) -> Result<Archive<'_>> {
    let archive = zip::ZipArchive::new(Cursor::new(data))?;
    if archive.len() > MAX_ZIP_ENTRIES {
        return Err(anyhow!(
            "ZIP archive contains too many entries ({}); maximum is {}",
            archive.len(),
            MAX_ZIP_ENTRIES
        ));
    }
    for name in archive.file_names() {
        validate_zip_entry_name(name)?;
    }
    Ok(archive)
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| anyhow!("Document is missing required part {}", name))?;
    read_zip_entry_safely(&mut entry, MAX_XML_SIZE)
}

/// Collect the text of `text_tag` elements, adding a newline after each `block_tags` element
fn collect_xml_text(xml: &str, text_tag: &[u8], block_tags: &[&[u8]]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == text_tag => in_text = true,
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|e| anyhow!("Text unescape error: {}", e))?;
                out.push_str(&text);
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"w:tab" || e.name().as_ref() == b"text:tab" => {
                out.push('\t')
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"w:br" || e.name().as_ref() == b"text:line-break" => {
                out.push('\n')
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                if name.as_ref() == text_tag {
                    in_text = false;
                }
                if block_tags.contains(&name.as_ref()) {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("XML parsing error: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn extract_docx(data: &[u8]) -> Result<String> {
    let mut archive = open_archive(data)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    collect_xml_text(&xml, b"w:t", &[b"w:p", b"w:tr"])
}

fn extract_pptx(data: &[u8]) -> Result<String> {
    let mut archive = open_archive(data)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    if slides.is_empty() {
        return Err(anyhow!("Presentation contains no slides"));
    }

    let mut out = String::new();
    for (_, name) in slides {
        let xml = read_entry(&mut archive, &name)?;
        out.push_str(&collect_xml_text(&xml, b"a:t", &[b"a:p"])?);
        out.push('\n');
    }
    Ok(out)
}

fn extract_odt(data: &[u8]) -> Result<String> {
    let mut archive = open_archive(data)?;
    let xml = read_entry(&mut archive, "content.xml")?;

    // ODT text sits directly inside text:p / text:h (and nested spans)
    let mut reader = Reader::from_str(&xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if matches!(e.name().as_ref(), b"text:p" | b"text:h") => depth += 1,
            Ok(Event::End(ref e)) if matches!(e.name().as_ref(), b"text:p" | b"text:h") => {
                depth = depth.saturating_sub(1);
                out.push('\n');
            }
            Ok(Event::Text(e)) if depth > 0 => {
                let text = e.unescape().map_err(|e| anyhow!("Text unescape error: {}", e))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("XML parsing error: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
