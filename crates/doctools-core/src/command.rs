use crate::annotate::{annotate_text, TextAnnotation};
use crate::config::Config;
use crate::convert::{file_stem, ConversionKind, OutputFile};
use crate::error::{DocToolsError, Result};
use crate::pages::{combine_documents, extract_pages, page_count, remove_pages};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One tool invocation
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum DocCommand {
    Combine {
        files: Vec<Vec<u8>>,
    },
    RemovePages {
        file: Vec<u8>,
        file_name: String,
        pages: Vec<u32>,
    },
    ExtractPages {
        file: Vec<u8>,
        file_name: String,
        pages: Vec<u32>,
    },
    AnnotateText {
        file: Vec<u8>,
        file_name: String,
        annotations: Vec<TextAnnotation>,
    },
    Convert {
        file: Vec<u8>,
        file_name: String,
        target: ConversionKind,
    },
}

impl DocCommand {
    /// Parse a command from its JSON form, e.g. `{"type":"Combine","files":[...]}`
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DocToolsError::InvalidRequest(format!("unrecognized command: {}", e)))
    }

    fn input_size(&self) -> usize {
        match self {
            DocCommand::Combine { files } => files.iter().map(Vec::len).sum(),
            DocCommand::RemovePages { file, .. }
            | DocCommand::ExtractPages { file, .. }
            | DocCommand::AnnotateText { file, .. }
            | DocCommand::Convert { file, .. } => file.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Base64-encoded output document
    pub data: Option<String>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    /// Pages in the output; 0 for non-PDF output
    pub page_count: u32,
    pub processing_time_ms: u64,
}

/// Name for an output derived from the input name, e.g. `scan.pdf` → `scan_edited.pdf`
fn suffixed_name(file_name: &str, suffix: &str) -> String {
    format!("{}_{}.pdf", file_stem(file_name), suffix)
}

/// Run a command, enforcing the same preconditions the tool UI does
pub fn execute(command: &DocCommand, config: &Config) -> Result<OutputFile> {
    match command {
        DocCommand::Combine { files } => {
            if files.len() < 2 {
                return Err(DocToolsError::InvalidRequest(
                    "Select at least two PDF files to combine".into(),
                ));
            }
            let inputs: Vec<&[u8]> = files.iter().map(Vec::as_slice).collect();
            let bytes = combine_documents(&inputs)?;
            Ok(OutputFile::pdf(bytes, "combined.pdf".into()))
        }
        DocCommand::RemovePages {
            file,
            file_name,
            pages,
        } => {
            if pages.is_empty() {
                return Err(DocToolsError::InvalidRequest(
                    "Select at least one page to remove".into(),
                ));
            }
            let bytes = remove_pages(file, pages)?;
            Ok(OutputFile::pdf(bytes, suffixed_name(file_name, "edited")))
        }
        DocCommand::ExtractPages {
            file,
            file_name,
            pages,
        } => {
            if pages.is_empty() {
                return Err(DocToolsError::InvalidRequest(
                    "Select at least one page to extract".into(),
                ));
            }
            let bytes = extract_pages(file, pages)?;
            Ok(OutputFile::pdf(bytes, suffixed_name(file_name, "extracted")))
        }
        DocCommand::AnnotateText {
            file,
            file_name,
            annotations,
        } => {
            if annotations.is_empty() {
                return Err(DocToolsError::InvalidRequest(
                    "Add at least one text annotation".into(),
                ));
            }
            let bytes = annotate_text(file, annotations)?;
            Ok(OutputFile::pdf(bytes, suffixed_name(file_name, "edited")))
        }
        DocCommand::Convert {
            file,
            file_name,
            target,
        } => target.convert(file, file_name, config),
    }
}

/// Run a command and package the outcome with timing and size metrics.
///
/// Uses `std::time::Instant`, so it is for native callers; the browser binding
/// calls the operations directly.
pub fn process(command: &DocCommand, config: &Config) -> ProcessResult {
    let start = Instant::now();
    let input_size = command.input_size();

    match execute(command, config) {
        Ok(output) => {
            let page_count = if output.mime_type == crate::convert::PDF_MIME_TYPE {
                page_count(&output.bytes).unwrap_or(0)
            } else {
                0
            };
            ProcessResult {
                success: true,
                data: Some(STANDARD.encode(&output.bytes)),
                mime_type: Some(output.mime_type.to_string()),
                file_name: Some(output.file_name),
                error: None,
                metrics: Some(ProcessMetrics {
                    input_size_bytes: input_size,
                    output_size_bytes: output.bytes.len(),
                    page_count,
                    processing_time_ms: start.elapsed().as_millis() as u64,
                }),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            ProcessResult {
                success: false,
                data: None,
                mime_type: None,
                file_name: None,
                error: Some(e.to_string()),
                metrics: None,
            }
        }
    }
}
