//! Format-specific text extraction, dispatched by file-name suffix.
//!
//! | Suffix | Strategy |
//! |--------|----------|
//! | `.txt` | UTF-8 decode, invalid bytes dropped |
//! | `.pdf` | per-page text via lopdf, joined with `\n`; whole-document fallback via pdf-extract |
//! | `.pptx` | per-slide text frames, each slide followed by a `SLIDE <n> BREAK` marker |
//! | other | [`Extraction::Unsupported`] |
//!
//! Extraction never fails past this module: parser errors and panics inside
//! the PDF libraries become [`Extraction::Failed`] with a reason string.

use std::collections::HashMap;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;
use tracing::warn;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// File kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainText,
    Pdf,
    SlideDeck,
    Other,
}

impl FileKind {
    /// Classify a file by its name's suffix, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("txt") => FileKind::PlainText,
            Some("pdf") => FileKind::Pdf,
            Some("pptx") => FileKind::SlideDeck,
            _ => FileKind::Other,
        }
    }

    /// Whether the kind can yield searchable text.
    pub fn is_supported(self) -> bool {
        !matches!(self, FileKind::Other)
    }
}

/// Outcome of extracting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Text(String),
    Failed(String),
    Unsupported,
}

impl Extraction {
    /// The extracted text if there is any non-whitespace content.
    pub fn usable_text(&self) -> Option<&str> {
        match self {
            Extraction::Text(t) if !t.trim().is_empty() => Some(t),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Marker written after every slide of a deck. Search results turn it
/// back into a visual separator.
pub fn slide_marker(slide_number: usize) -> String {
    format!("\n--- SLIDE {} BREAK ---\n", slide_number)
}

/// Extract text from the file at `path`. Blocking; call from
/// `spawn_blocking` in async contexts.
pub fn extract_file(path: &Path) -> Extraction {
    let kind = FileKind::from_path(path);
    if !kind.is_supported() {
        return Extraction::Unsupported;
    }
    match std::fs::read(path) {
        Ok(bytes) => extract_bytes(&bytes, kind),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read file for extraction");
            Extraction::Failed(ExtractError::Io(e).to_string())
        }
    }
}

/// Extract text from in-memory bytes of a known kind.
pub fn extract_bytes(bytes: &[u8], kind: FileKind) -> Extraction {
    let result = match kind {
        FileKind::PlainText => Ok(String::from_utf8_lossy(bytes).replace('\u{FFFD}', "")),
        FileKind::Pdf => extract_pdf(bytes),
        FileKind::SlideDeck => extract_pptx(bytes),
        FileKind::Other => return Extraction::Unsupported,
    };
    match result {
        Ok(text) => Extraction::Text(text),
        Err(e) => {
            warn!(kind = ?kind, error = %e, "extraction failed");
            Extraction::Failed(e.to_string())
        }
    }
}

// ============ PDF ============

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    match guarded(|| extract_pdf_pages(bytes)) {
        Ok(text) => Ok(text),
        Err(page_err) => {
            // lopdf could not even load the document; give pdf-extract a try
            guarded(|| {
                pdf_extract::extract_text_from_mem(bytes)
                    .map_err(|e| ExtractError::Pdf(e.to_string()))
            })
            .map_err(|e| ExtractError::Pdf(format!("{}; fallback: {}", page_err, e)))
        }
    }
}

/// Text of every page in page order. A page that fails contributes an
/// empty string and a warning instead of failing the document.
fn extract_pdf_pages(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let pages: Vec<String> = doc
        .get_pages()
        .keys()
        .map(|&page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = page_num, error = %e, "pdf page extraction failed");
                String::new()
            }
        })
        .collect();
    Ok(pages.join("\n"))
}

/// Run a PDF parser, turning a panic into an error.
fn guarded<F>(f: F) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "parser panicked".to_string());
        Err(ExtractError::Pdf(msg))
    })
}

// ============ PPTX ============

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let slide_names = match presentation_order(&mut archive) {
        Some(order) => order,
        None => file_name_order(&archive),
    };

    let mut parts: Vec<String> = Vec::new();
    for (idx, name) in slide_names.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name, MAX_XML_ENTRY_BYTES)?;
        let frames = extract_text_frames(&xml)?;
        if !frames.is_empty() {
            parts.push(frames.join("\n"));
        }
        parts.push(slide_marker(idx + 1));
    }
    Ok(parts.join("\n"))
}

/// Slide parts sorted by the number in `ppt/slides/slideN.xml`.
fn file_name_order(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| slide_number(name));
    names
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse::<u32>()
        .unwrap_or(u32::MAX)
}

/// Slide parts in deck order: the `<p:sldId>` list of `ppt/presentation.xml`
/// resolved through `ppt/_rels/presentation.xml.rels`. `None` when either
/// part is missing or unreadable.
fn presentation_order(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Option<Vec<String>> {
    let rels = read_zip_entry_bounded(
        archive,
        "ppt/_rels/presentation.xml.rels",
        MAX_XML_ENTRY_BYTES,
    )
    .ok()?;
    let presentation =
        read_zip_entry_bounded(archive, "ppt/presentation.xml", MAX_XML_ENTRY_BYTES).ok()?;

    let targets = relationship_targets(&rels)?;
    let order: Vec<String> = slide_rel_ids(&presentation)?
        .iter()
        .filter_map(|rel_id| targets.get(rel_id))
        .map(|target| resolve_part(target))
        .filter(|part| archive.index_for_name(part).is_some())
        .collect();
    Some(order)
}

/// `Id -> Target` for every relationship in a `.rels` part.
fn relationship_targets(xml: &[u8]) -> Option<HashMap<String, String>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let (mut id, mut target) = (None, None);
                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value().ok()?.into_owned();
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
    Some(targets)
}

/// Relationship ids (`r:id`) of the `<p:sldId>` entries, in document order.
fn slide_rel_ids(xml: &[u8]) -> Option<Vec<String>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut ids = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sldId" => {
                let rel_id = e.attributes().flatten().find(|attr| {
                    attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id"
                });
                if let Some(attr) = rel_id {
                    ids.push(attr.unescape_value().ok()?.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
    Some(ids)
}

/// Resolve a relationship target from `ppt/_rels/presentation.xml.rels`
/// to an archive path.
fn resolve_part(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

/// Text of every `<p:txBody>` frame in a slide. Paragraphs inside a frame
/// are joined with `\n`; frames without text are dropped.
fn extract_text_frames(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut frames = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_frame = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"txBody" => {
                    in_frame = true;
                    paragraphs.clear();
                }
                b"p" if in_frame => paragraph.clear(),
                b"t" if in_frame => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_frame && e.local_name().as_ref() == b"br" {
                    paragraph.push('\n');
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if in_frame => paragraphs.push(std::mem::take(&mut paragraph)),
                b"txBody" => {
                    in_frame = false;
                    let frame = paragraphs.join("\n");
                    if !frame.trim().is_empty() {
                        frames.push(frame);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(frames)
}
