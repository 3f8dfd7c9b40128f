//! Document toolkit core
//!
//! Client-side PDF page operations, text overlays and text-based conversion
//! between PDF, DOCX and EPUB. Everything works on in-memory byte buffers; no
//! function touches the filesystem except [`config::Config::from_file`].
//!
//! - [`pages`]: combine / remove / extract pages
//! - [`annotate`]: draw text onto existing pages
//! - [`convert`]: PDF ⇄ DOCX and PDF ⇄ EPUB
//! - [`command`]: tagged commands mirroring the tool actions

mod archive;
mod cmap;

pub mod annotate;
pub mod command;
pub mod config;
pub mod convert;
pub mod document;
pub mod docx;
pub mod epub;
pub mod error;
pub mod extract;
pub mod fonts;
pub mod layout;
pub mod pages;

pub use annotate::{annotate_text, RgbColor, TextAnnotation};
pub use command::{execute, process, DocCommand, ProcessMetrics, ProcessResult};
pub use config::{Config, PARAGRAPH_Y_THRESHOLD};
pub use convert::{
    docx_to_pdf, epub_to_pdf, pdf_to_docx, pdf_to_epub, ConversionKind, OutputFile,
    PDF_MIME_TYPE,
};
pub use document::PdfDocument;
pub use docx::{build_docx, parse_docx, DocxBlock, DOCX_MIME_TYPE};
pub use epub::{build_epub, parse_epub, Chapter, EPUB_MIME_TYPE};
pub use error::{DocToolsError, Result};
pub use extract::{
    cluster_paragraphs, extract_document_text, extract_page_text, join_page_text, looks_garbled,
    TextFragment,
};
pub use layout::{render_blocks, wrap_words, FlowBlock, FlowWriter};
pub use pages::{
    combine_documents, extract_pages, page_count, parse_page_selection, remove_pages,
    MAX_PAGE_NUMBER,
};
