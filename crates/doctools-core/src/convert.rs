//! Format conversion pipelines
//!
//! PDF → DOCX/EPUB go through text extraction; DOCX/EPUB → PDF parse the
//! package and re-flow its text onto fresh pages. None of them carry images,
//! tables or styling beyond bold and headings.

use crate::config::Config;
use crate::docx::{build_docx, parse_docx, DocxBlock, DOCX_MIME_TYPE};
use crate::epub::{build_epub, parse_epub, Chapter, EPUB_MIME_TYPE};
use crate::error::{DocToolsError, Result};
use crate::extract::{cluster_paragraphs, extract_document_text, join_page_text};
use crate::layout::render_blocks;
use serde::{Deserialize, Serialize};

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Produced document with its MIME type and suggested download name
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
}

impl OutputFile {
    pub fn pdf(bytes: Vec<u8>, file_name: String) -> Self {
        Self {
            bytes,
            mime_type: PDF_MIME_TYPE,
            file_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionKind {
    PdfToDocx,
    DocxToPdf,
    PdfToEpub,
    EpubToPdf,
}

impl ConversionKind {
    pub fn source_format(&self) -> &'static str {
        match self {
            ConversionKind::PdfToDocx | ConversionKind::PdfToEpub => "PDF",
            ConversionKind::DocxToPdf => "DOCX",
            ConversionKind::EpubToPdf => "EPUB",
        }
    }

    pub fn target_format(&self) -> &'static str {
        match self {
            ConversionKind::PdfToDocx => "DOCX",
            ConversionKind::PdfToEpub => "EPUB",
            ConversionKind::DocxToPdf | ConversionKind::EpubToPdf => "PDF",
        }
    }

    fn target_extension(&self) -> &'static str {
        match self {
            ConversionKind::PdfToDocx => "docx",
            ConversionKind::PdfToEpub => "epub",
            ConversionKind::DocxToPdf | ConversionKind::EpubToPdf => "pdf",
        }
    }

    fn target_mime_type(&self) -> &'static str {
        match self {
            ConversionKind::PdfToDocx => DOCX_MIME_TYPE,
            ConversionKind::PdfToEpub => EPUB_MIME_TYPE,
            ConversionKind::DocxToPdf | ConversionKind::EpubToPdf => PDF_MIME_TYPE,
        }
    }

    /// Run the conversion. Any failure is reported as
    /// "Failed to convert {source} to {target}: {cause}".
    pub fn convert(self, bytes: &[u8], file_name: &str, config: &Config) -> Result<OutputFile> {
        let converted = match self {
            ConversionKind::PdfToDocx => pdf_to_docx_bytes(bytes, config),
            ConversionKind::PdfToEpub => pdf_to_epub_bytes(bytes, &file_stem(file_name), config),
            ConversionKind::DocxToPdf => {
                parse_docx(bytes).and_then(|blocks| render_blocks(&blocks, &config.layout))
            }
            ConversionKind::EpubToPdf => {
                parse_epub(bytes).and_then(|blocks| render_blocks(&blocks, &config.layout))
            }
        };
        let bytes = converted.map_err(|e| DocToolsError::Conversion {
            from: self.source_format(),
            to: self.target_format(),
            source: Box::new(e),
        })?;
        tracing::info!(
            from = self.source_format(),
            to = self.target_format(),
            bytes = bytes.len(),
            "converted document"
        );
        Ok(OutputFile {
            bytes,
            mime_type: self.target_mime_type(),
            file_name: format!("{}.{}", file_stem(file_name), self.target_extension()),
        })
    }
}

/// File name without its last extension; `document` when nothing is left
pub fn file_stem(file_name: &str) -> String {
    let base = file_name.rsplit(&['/', '\\'][..]).next().unwrap_or(file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    if stem.trim().is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}

fn pdf_to_docx_bytes(bytes: &[u8], config: &Config) -> Result<Vec<u8>> {
    let pages = extract_document_text(bytes, &config.extraction)?;
    let threshold = config.extraction.paragraph_threshold;
    let mut blocks = Vec::new();
    for (index, fragments) in pages.iter().enumerate() {
        if index > 0 {
            blocks.push(DocxBlock::PageBreak);
        }
        blocks.extend(
            cluster_paragraphs(fragments, threshold)
                .into_iter()
                .map(DocxBlock::Paragraph),
        );
    }
    build_docx(&blocks)
}

fn pdf_to_epub_bytes(bytes: &[u8], title: &str, config: &Config) -> Result<Vec<u8>> {
    let pages = extract_document_text(bytes, &config.extraction)?;
    let mut chapters = Vec::new();
    for (index, fragments) in pages.iter().enumerate() {
        let text = join_page_text(fragments);
        if text.is_empty() {
            tracing::debug!(page = index + 1, "page has no text, no chapter");
            continue;
        }
        chapters.push(Chapter::new(format!("Page {}", index + 1), text));
    }
    if chapters.is_empty() {
        return Err(DocToolsError::EmptyDocument(
            "No text content found in PDF".into(),
        ));
    }
    build_epub(&chapters, title)
}

/// PDF → DOCX: one paragraph per vertical text cluster, a page break between pages
pub fn pdf_to_docx(bytes: &[u8], file_name: &str, config: &Config) -> Result<OutputFile> {
    ConversionKind::PdfToDocx.convert(bytes, file_name, config)
}

/// DOCX → PDF: paragraphs re-flowed onto A4 pages
pub fn docx_to_pdf(bytes: &[u8], file_name: &str, config: &Config) -> Result<OutputFile> {
    ConversionKind::DocxToPdf.convert(bytes, file_name, config)
}

/// PDF → EPUB: one chapter per page that has text, titled by the file stem
pub fn pdf_to_epub(bytes: &[u8], file_name: &str, config: &Config) -> Result<OutputFile> {
    ConversionKind::PdfToEpub.convert(bytes, file_name, config)
}

/// EPUB → PDF: content documents in reading order, re-flowed onto A4 pages
pub fn epub_to_pdf(bytes: &[u8], file_name: &str, config: &Config) -> Result<OutputFile> {
    ConversionKind::EpubToPdf.convert(bytes, file_name, config)
}
