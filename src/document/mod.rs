// Document loading
// PDFs are read page by page with lopdf; anything else is treated as UTF-8 text with
// pages separated by form feeds


use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::{RagError, Result};

const PAGE_BREAK: char = '\x0c';

/// Text of one page of the source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub text: String,
    /// Zero-based page number
    pub number: usize,
    pub total: usize,
    pub source: String,
}

/// Load every page of a document, failing if none of them contain text
#[inline]
pub fn load(path: &Path) -> Result<Vec<Page>> {
    if !path.is_file() {
        return Err(RagError::Document(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let pages = if is_pdf {
        load_pdf(path)?
    } else {
        load_text(path)?
    };

    if pages.iter().all(|page| page.text.trim().is_empty()) {
        return Err(RagError::Document(format!(
            "No extractable text in {}",
            path.display()
        )));
    }

    info!("Loaded {} pages from {}", pages.len(), path.display());
    Ok(pages)
}

fn load_pdf(path: &Path) -> Result<Vec<Page>> {
    let document = lopdf::Document::load(path).map_err(|e| {
        RagError::Document(format!("Failed to read PDF {}: {}", path.display(), e))
    })?;

    let source = path.display().to_string();
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let total = page_numbers.len();
    debug!("PDF {} has {} pages", source, total);

    Ok(page_numbers
        .into_iter()
        .enumerate()
        .map(|(index, number)| {
            let text = document.extract_text(&[number]).unwrap_or_else(|e| {
                warn!("Failed to extract text from page {} of {}: {}", number, source, e);
                String::new()
            });
            Page {
                text,
                number: index,
                total,
                source: source.clone(),
            }
        })
        .collect())
}

fn load_text(path: &Path) -> Result<Vec<Page>> {
    let content = fs::read_to_string(path).map_err(|e| {
        RagError::Document(format!("Failed to read {}: {}", path.display(), e))
    })?;

    Ok(split_text_pages(&content, &path.display().to_string()))
}

/// Split plain text into pages on form feed characters
#[inline]
pub fn split_text_pages(content: &str, source: &str) -> Vec<Page> {
    let texts: Vec<&str> = content.split(PAGE_BREAK).collect();
    let total = texts.len();

    texts
        .into_iter()
        .enumerate()
        .map(|(number, text)| Page {
            text: text.to_string(),
            number,
            total,
            source: source.to_string(),
        })
        .collect()
}
