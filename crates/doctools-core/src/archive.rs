//! ZIP package plumbing shared by the DOCX and EPUB builders and parsers

use crate::error::{DocToolsError, Result};
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// In-memory ZIP writer
pub(crate) struct PackageWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl PackageWriter {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Add an uncompressed entry
    pub fn add_stored(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add(name, data, CompressionMethod::Stored)
    }

    pub fn add_deflated(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add(name, data, CompressionMethod::Deflated)
    }

    fn add(&mut self, name: &str, data: &[u8], method: CompressionMethod) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(method);
        self.zip.start_file(name, options)?;
        self.zip.write_all(data)?;
        tracing::debug!(entry = name, bytes = data.len(), "wrote archive entry");
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(self.zip.finish()?.into_inner())
    }
}

/// Read access to a ZIP package held in memory
pub(crate) struct PackageReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> PackageReader<'a> {
    /// `kind` names the expected format in the error for non-ZIP input
    pub fn open(bytes: &'a [u8], kind: &str) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            DocToolsError::InvalidDocument(format!("Not a valid {} file: {}", kind, e))
        })?;
        Ok(Self { archive })
    }

    /// Text of an entry, or `None` when the package has no such entry
    pub fn read_text(&mut self, name: &str) -> Result<Option<String>> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let text = String::from_utf8_lossy(&data);
        Ok(Some(text.trim_start_matches('\u{FEFF}').to_string()))
    }
}

/// Escape text for XML content or attribute values, dropping characters XML 1.0 cannot carry
pub(crate) fn escape_xml(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}

/// Decode `%XX` escapes in a package-relative URL
pub(crate) fn percent_decode(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Resolve `href` against the directory of `base` (a path inside the package),
/// normalising `.` and `..` segments and dropping any fragment
pub(crate) fn resolve_href(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let href = percent_decode(href);
    let mut segments: Vec<&str> = match base.rfind('/') {
        Some(idx) => base[..idx].split('/').collect(),
        None => Vec::new(),
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
