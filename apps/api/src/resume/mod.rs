pub mod detect;
pub mod extract;
pub mod handlers;

pub use detect::{detect_document_type, DocumentType};
pub use extract::{DocumentExtractor, ExtractedDocument, ExtractionBudget, LibraryExtractor};
