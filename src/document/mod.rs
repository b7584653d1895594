// Document loading
// Extracts per-page text from PDF files


use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::ChatError;

/// PDF files may carry junk before the header, but it has to appear within the first KiB
const HEADER_SEARCH_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Text of a single page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number within the source document
    pub page_number: usize,
    pub text: String,
}

/// Load a PDF from disk and extract the text of every page in order.
///
/// Pages whose content cannot be decoded are kept as empty pages so that page
/// numbers stay aligned with the source document.
#[inline]
pub fn load_pdf(path: &Path) -> Result<Vec<PageText>, ChatError> {
    debug!("Loading PDF from {}", path.display());

    let bytes = std::fs::read(path).map_err(|e| {
        ChatError::DocumentLoad(format!("Cannot read file {}: {}", path.display(), e))
    })?;

    let pages = load_pdf_bytes(&bytes)?;

    info!(
        "Loaded {} pages from {}",
        pages.len(),
        path.file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
    );

    Ok(pages)
}

/// Extract page texts from an in-memory PDF
#[inline]
pub fn load_pdf_bytes(bytes: &[u8]) -> Result<Vec<PageText>, ChatError> {
    if !has_pdf_header(bytes) {
        return Err(ChatError::DocumentLoad(
            "Unsupported format: the file is not a PDF document".to_string(),
        ));
    }

    let document = Document::load_mem(bytes)
        .map_err(|e| ChatError::DocumentLoad(format!("Corrupt or unreadable PDF: {}", e)))?;

    if document.is_encrypted() {
        return Err(ChatError::DocumentLoad(
            "Encrypted PDF documents are not supported".to_string(),
        ));
    }

    Ok(extract_pages(&document))
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window
        .windows(PDF_MAGIC.len())
        .any(|candidate| candidate == PDF_MAGIC)
}

fn extract_pages(document: &Document) -> Vec<PageText> {
    document
        .get_pages()
        .keys()
        .map(|&page_number| {
            let text = match document.extract_text(&[page_number]) {
                Ok(text) => text.trim_end().to_string(),
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", page_number, e);
                    String::new()
                }
            };
            PageText {
                page_number: page_number as usize,
                text,
            }
        })
        .collect()
}
