//! Page-set operations: combine, remove and extract
//!
//! All three build a fresh document and copy the wanted pages into it, so the
//! output never carries objects that only unwanted pages referenced.

use crate::document::PdfDocument;
use crate::error::{DocToolsError, Result};
use std::collections::BTreeSet;

/// Concatenate all pages of every input, in input order
pub fn combine_documents(inputs: &[&[u8]]) -> Result<Vec<u8>> {
    if inputs.is_empty() {
        return Err(DocToolsError::InvalidRequest("No documents to combine".into()));
    }

    let mut combined = PdfDocument::new();
    for (i, bytes) in inputs.iter().enumerate() {
        let source = PdfDocument::load(bytes).map_err(|e| match e {
            DocToolsError::InvalidDocument(msg) => {
                DocToolsError::InvalidDocument(format!("Document {}: {}", i + 1, msg))
            }
            other => other,
        })?;
        let indices: Vec<usize> = (0..source.page_count() as usize).collect();
        combined.copy_pages(&source, &indices)?;
        tracing::debug!(input = i + 1, pages = indices.len(), "appended document");
    }

    tracing::info!(
        inputs = inputs.len(),
        pages = combined.page_count(),
        "combined documents"
    );
    combined.save()
}

/// Drop the given 1-based pages. Numbers outside the document are ignored.
pub fn remove_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>> {
    let source = PdfDocument::load(bytes)?;
    let count = source.page_count();
    let removed: BTreeSet<u32> = pages.iter().copied().collect();
    let keep: Vec<usize> = (1..=count)
        .filter(|page| !removed.contains(page))
        .map(|page| page as usize - 1)
        .collect();

    let mut output = PdfDocument::new();
    output.copy_pages(&source, &keep)?;
    tracing::info!(
        original = count,
        kept = keep.len(),
        "removed pages"
    );
    output.save()
}

/// Keep only the given 1-based pages, in ascending order. Duplicates collapse
/// and numbers outside the document are ignored.
pub fn extract_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>> {
    let source = PdfDocument::load(bytes)?;
    let count = source.page_count();
    let wanted: Vec<usize> = pages
        .iter()
        .copied()
        .filter(|page| (1..=count).contains(page))
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .map(|page| page as usize - 1)
        .collect();

    let mut output = PdfDocument::new();
    output.copy_pages(&source, &wanted)?;
    tracing::info!(
        original = count,
        extracted = wanted.len(),
        "extracted pages"
    );
    output.save()
}

/// Parse PDF bytes and return page count
pub fn page_count(bytes: &[u8]) -> Result<u32> {
    Ok(PdfDocument::load(bytes)?.page_count())
}

/// Highest page number accepted when the document's page count is not known
pub const MAX_PAGE_NUMBER: u32 = 100_000;

/// Parse a page selection like "1-3, 5, 8-10" into sorted unique page numbers.
///
/// Pages above `max_page` (the document's page count, or [`MAX_PAGE_NUMBER`]
/// when `None`) are rejected, so a range never expands past a real document.
pub fn parse_page_selection(input: &str, max_page: Option<u32>) -> Result<Vec<u32>> {
    let limit = max_page.unwrap_or(MAX_PAGE_NUMBER);
    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_page_number(start, limit)?;
            let end = parse_page_number(end, limit)?;
            if start > end {
                return Err(DocToolsError::InvalidRequest(format!(
                    "Range {}-{} runs backwards",
                    start, end
                )));
            }
            pages.extend(start..=end);
        } else {
            pages.insert(parse_page_number(part, limit)?);
        }
    }

    Ok(pages.into_iter().collect())
}

fn parse_page_number(s: &str, limit: u32) -> Result<u32> {
    let s = s.trim();
    match s.parse::<u32>() {
        Ok(0) => Err(DocToolsError::InvalidRequest(
            "Page numbers start at 1".into(),
        )),
        Ok(page) if page > limit => Err(DocToolsError::InvalidRequest(format!(
            "Page {} is beyond the last page ({})",
            page, limit
        ))),
        Ok(page) => Ok(page),
        Err(_) => Err(DocToolsError::InvalidRequest(format!(
            "Invalid page number: '{}'",
            s
        ))),
    }
}
