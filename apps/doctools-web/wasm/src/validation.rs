//! Upload checks run before a tool accepts a file
//!
//! `quick_validate` only looks at magic bytes and the trailer so the UI can
//! reject obviously wrong files instantly; `validate_pdf` parses the document.

use doctools_core::fonts::decode_win_ansi;
use doctools_core::PdfDocument;
use lopdf::{Dictionary, Object};
use serde::Serialize;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// What an uploaded file looks like from its first bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    Pdf,
    /// A ZIP container; DOCX and EPUB both start this way
    Package,
    Unknown,
}

pub fn sniff_kind(bytes: &[u8]) -> FileKind {
    if bytes.starts_with(b"%PDF-") {
        FileKind::Pdf
    } else if bytes.starts_with(ZIP_MAGIC) {
        FileKind::Package
    } else {
        FileKind::Unknown
    }
}

/// PDF file information shown next to an upload
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PdfInfo {
    pub page_count: u32,
    /// Header version, e.g. "1.7"
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    /// Size of the first page in points
    pub first_page_size: Option<(f32, f32)>,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Parse a PDF and collect what the tools need to know about it
pub fn validate_pdf(bytes: &[u8]) -> Result<PdfInfo, String> {
    quick_validate(bytes)?;

    let doc = PdfDocument::load(bytes).map_err(|e| format!("Failed to parse PDF: {}", e))?;
    let page_count = doc.page_count();
    if page_count == 0 {
        return Err("PDF has no pages".to_string());
    }

    let inner = doc.inner();
    let info = info_dictionary(&doc);
    Ok(PdfInfo {
        page_count,
        version: header_version(bytes),
        encrypted: inner.is_encrypted(),
        size_bytes: bytes.len(),
        first_page_size: doc.page_size(0).ok(),
        title: info.and_then(|d| info_string(d, b"Title")),
        author: info.and_then(|d| info_string(d, b"Author")),
    })
}

/// Version from a `%PDF-1.7` header, "1.4" when unreadable
fn header_version(bytes: &[u8]) -> String {
    bytes
        .get(5..8)
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "1.4".to_string())
}

fn info_dictionary(doc: &PdfDocument) -> Option<&Dictionary> {
    let inner = doc.inner();
    let id = inner.trailer.get(b"Info").ok()?.as_reference().ok()?;
    inner.get_object(id).ok()?.as_dict().ok()
}

fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = match info.get(key).ok()? {
        Object::String(bytes, _) => bytes,
        _ => return None,
    };
    let text = match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => decode_win_ansi(bytes),
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Cheap structural check without parsing
pub fn quick_validate(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < 8 {
        return Err("File too small to be a valid PDF".to_string());
    }
    if sniff_kind(bytes) != FileKind::Pdf {
        return Err("Not a valid PDF file (missing %PDF- header)".to_string());
    }

    let tail = &bytes[bytes.len().saturating_sub(1024)..];
    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err("PDF appears truncated (missing %%EOF marker)".to_string());
    }
    Ok(())
}

/// Cheap check for DOCX and EPUB uploads
pub fn quick_validate_package(bytes: &[u8], kind: &str) -> Result<(), String> {
    if sniff_kind(bytes) != FileKind::Package {
        return Err(format!("Not a valid {} file", kind));
    }
    Ok(())
}
