//! Upload type detection.
//!
//! Content is sniffed first. The declared part content type and the filename
//! extension then disambiguate ZIP containers and gate plain text: text is
//! only accepted when nothing about the upload names another format.

use std::fmt;

const PDF_MAGIC: &[u8] = b"%PDF-";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const MIME_OCTET_STREAM: &str = "application/octet-stream";

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TXT: &str = "text/plain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Pdf,
    Doc,
    Docx,
    Txt,
}

impl DocumentType {
    pub fn mime(self) -> &'static str {
        match self {
            DocumentType::Pdf => MIME_PDF,
            DocumentType::Doc => MIME_DOC,
            DocumentType::Docx => MIME_DOCX,
            DocumentType::Txt => MIME_TXT,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Doc => "doc",
            DocumentType::Docx => "docx",
            DocumentType::Txt => "txt",
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime_essence(mime) {
            MIME_PDF => Some(DocumentType::Pdf),
            MIME_DOC => Some(DocumentType::Doc),
            MIME_DOCX => Some(DocumentType::Docx),
            MIME_TXT => Some(DocumentType::Txt),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Determines the document type of an upload, or `None` if it is not one of
/// the accepted formats.
pub fn detect_document_type(
    bytes: &[u8],
    declared_mime: Option<&str>,
    file_name: Option<&str>,
) -> Option<DocumentType> {
    if bytes.is_empty() {
        return None;
    }
    if bytes.starts_with(PDF_MAGIC) {
        return Some(DocumentType::Pdf);
    }
    if bytes.starts_with(OLE2_MAGIC) {
        return Some(DocumentType::Doc);
    }
    if bytes.starts_with(ZIP_MAGIC) {
        // Word documents renamed to .doc are still OOXML containers.
        return hinted_type(declared_mime, file_name)
            .filter(|t| matches!(t, DocumentType::Docx | DocumentType::Doc))
            .map(|_| DocumentType::Docx);
    }
    if looks_like_text(bytes) && text_allowed(declared_mime, file_name) {
        return Some(DocumentType::Txt);
    }
    None
}

fn mime_essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or_default().trim()
}

/// SVG, HTML, JSON and friends sniff as text too; they are only taken as
/// plain text when neither the declared type nor the filename says otherwise.
fn text_allowed(declared_mime: Option<&str>, file_name: Option<&str>) -> bool {
    let declared = declared_mime.map(mime_essence).filter(|m| !m.is_empty());
    match declared {
        Some(m) if m.eq_ignore_ascii_case(MIME_TXT) => true,
        Some(m) if !m.eq_ignore_ascii_case(MIME_OCTET_STREAM) => false,
        _ => file_name
            .and_then(|name| mime_guess::from_path(name).first_raw())
            .map_or(true, |guessed| guessed == MIME_TXT),
    }
}

fn hinted_type(declared_mime: Option<&str>, file_name: Option<&str>) -> Option<DocumentType> {
    declared_mime
        .and_then(DocumentType::from_mime)
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .and_then(DocumentType::from_mime)
        })
}

fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}
