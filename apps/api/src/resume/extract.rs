//! Text extraction for uploaded resumes.
//!
//! Parsing is delegated to crates (`pdf-extract` for PDF, `zip` and
//! `quick-xml` for DOCX). The extractor returns ordered text units (pages for
//! PDF); the upload layer decides how much of them to keep via `apply_budget`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::resume::detect::DocumentType;

const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Unsupported(String),

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("no text could be extracted from the document")]
    Empty,
}

/// Plain text of a document, split into its natural units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub units: Vec<String>,
}

impl ExtractedDocument {
    pub fn single(text: String) -> Self {
        Self { units: vec![text] }
    }
}

/// Turns a stored upload into plain text. Implementations may block.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, path: &Path, kind: DocumentType) -> Result<ExtractedDocument, ExtractError>;
}

/// Extractor backed by the PDF, ZIP and XML crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryExtractor;

impl DocumentExtractor for LibraryExtractor {
    fn extract(&self, path: &Path, kind: DocumentType) -> Result<ExtractedDocument, ExtractError> {
        match kind {
            DocumentType::Pdf => pdf_extract::extract_text_by_pages(path)
                .map(|units| ExtractedDocument { units })
                .map_err(|e| ExtractError::Pdf(e.to_string())),
            DocumentType::Docx => docx_text(path).map(ExtractedDocument::single),
            DocumentType::Doc => {
                if is_zip_container(path)? {
                    docx_text(path).map(ExtractedDocument::single)
                } else {
                    Err(ExtractError::Unsupported(format!(
                        "{kind} (legacy binary Word documents cannot be read; save as DOCX or PDF)"
                    )))
                }
            }
            DocumentType::Txt => {
                let bytes = std::fs::read(path)?;
                Ok(ExtractedDocument::single(
                    String::from_utf8_lossy(&bytes).into_owned(),
                ))
            }
        }
    }
}

fn is_zip_container(path: &Path) -> Result<bool, ExtractError> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    Ok(file.read_exact(&mut magic).is_ok() && &magic == b"PK\x03\x04")
}

fn docx_text(path: &Path) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(File::open(path)?).map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut part = archive
        .by_name(DOCX_BODY_PART)
        .map_err(|e| ExtractError::Docx(format!("{DOCX_BODY_PART}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    document_xml_text(&xml)
}

/// Collects the text runs of a WordprocessingML body, one line per paragraph.
/// Paragraphs nested in text boxes get their own lines.
fn document_xml_text(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut run_depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(docx_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => break_line(&mut out),
                b"w:r" => run_depth += 1,
                b"w:t" => in_text = true,
                // Same content as the mc:Choice branch, for older readers.
                b"mc:Fallback" => {
                    reader.read_to_end(e.name()).map_err(docx_error)?;
                }
                name => push_run_break(&mut out, name, run_depth),
            },
            Event::Empty(e) => push_run_break(&mut out, e.name().as_ref(), run_depth),
            Event::End(e) => match e.name().as_ref() {
                b"w:p" => break_line(&mut out),
                b"w:r" => run_depth = run_depth.saturating_sub(1),
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Text(text) if in_text => out.push_str(&text.unescape().map_err(docx_error)?),
            Event::CData(text) if in_text => out.push_str(&String::from_utf8_lossy(&text)),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out.trim_end_matches('\n').to_string())
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// `w:tab` also names tab stops in paragraph properties; only run content counts.
fn push_run_break(out: &mut String, name: &[u8], run_depth: usize) {
    if run_depth == 0 {
        return;
    }
    match name {
        b"w:tab" => out.push('\t'),
        b"w:br" | b"w:cr" => out.push('\n'),
        _ => {}
    }
}

fn docx_error(err: impl std::fmt::Display) -> ExtractError {
    ExtractError::Docx(err.to_string())
}

/// Limits applied to extracted text before it is stored as context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionBudget {
    pub max_units: usize,
    pub max_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetedText {
    pub text: String,
    pub truncated: bool,
}

/// Keeps the first `max_units` units, then the first `max_chars` characters.
/// `truncated` reports whether anything was dropped.
pub fn apply_budget(document: ExtractedDocument, budget: ExtractionBudget) -> BudgetedText {
    let mut truncated = document.units.len() > budget.max_units;
    let mut text = document
        .units
        .into_iter()
        .take(budget.max_units)
        .collect::<Vec<_>>()
        .join("\n");

    if let Some((cut, _)) = text.char_indices().nth(budget.max_chars) {
        text.truncate(cut);
        truncated = true;
    }

    BudgetedText { text, truncated }
}
