//! WASM bindings for the document tools
//!
//! Every export is a single stateless call: bytes in, bytes out. The page
//! holds the selected files and passes them in when the user clicks the
//! tool's action button.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { combinePdfs, extractPages, addText, pdfToEpub } from './pkg/doctools_wasm.js';
//!
//! await init();
//!
//! const combined = combinePdfs([bytesA, bytesB]);
//! const excerpt = extractPages(bytes, parsePageSelection("1-3, 5", getPageCount(bytes)));
//! const stamped = addText(bytes, [{ page: 1, text: "Approved", x: 72, y: 72, fontSize: 18 }]);
//!
//! const epub = pdfToEpub(bytes, "report.pdf");
//! downloadBlob(epub.bytes, epub.fileName, epub.mimeType);
//! ```

pub mod validation;

use doctools_core::{Config, ConversionKind, DocCommand, OutputFile, TextAnnotation};
use wasm_bindgen::prelude::*;

pub use validation::{FileKind, PdfInfo};

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_uint8_array(bytes: &[u8]) -> js_sys::Uint8Array {
    let array = js_sys::Uint8Array::new_with_length(bytes.len() as u32);
    array.copy_from(bytes);
    array
}

/// A converted document ready for download
#[wasm_bindgen]
pub struct ConvertedFile {
    output: OutputFile,
}

#[wasm_bindgen]
impl ConvertedFile {
    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> js_sys::Uint8Array {
        to_uint8_array(&self.output.bytes)
    }

    #[wasm_bindgen(getter, js_name = mimeType)]
    pub fn mime_type(&self) -> String {
        self.output.mime_type.to_string()
    }

    #[wasm_bindgen(getter, js_name = fileName)]
    pub fn file_name(&self) -> String {
        self.output.file_name.clone()
    }
}

/// Get the library version
#[wasm_bindgen(js_name = getVersion)]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Quick validation check for a PDF file
/// Returns Ok(()) if valid, Err with message if not
#[wasm_bindgen(js_name = quickValidate)]
pub fn quick_validate(bytes: &[u8]) -> Result<(), JsValue> {
    validation::quick_validate(bytes).map_err(|e| JsValue::from_str(&e))
}

/// Quick check that a DOCX or EPUB upload is at least a ZIP container
#[wasm_bindgen(js_name = quickValidatePackage)]
pub fn quick_validate_package(bytes: &[u8], kind: &str) -> Result<(), JsValue> {
    validation::quick_validate_package(bytes, kind).map_err(|e| JsValue::from_str(&e))
}

/// Get detailed PDF info for the file list
#[wasm_bindgen(js_name = getPdfInfo)]
pub fn get_pdf_info(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = validation::validate_pdf(bytes).map_err(|e| JsValue::from_str(&e))?;

    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen(js_name = getPageCount)]
pub fn get_page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    doctools_core::page_count(bytes).map_err(js_error)
}

/// "1-3, 5" → [1, 2, 3, 5]. Pass the document's page count to reject
/// pages past its end.
#[wasm_bindgen(js_name = parsePageSelection)]
pub fn parse_page_selection(input: &str, page_count: Option<u32>) -> Result<Vec<u32>, JsValue> {
    doctools_core::parse_page_selection(input, page_count).map_err(js_error)
}

/// Combine PDFs in the given order. `files` is an array of `Uint8Array`.
#[wasm_bindgen(js_name = combinePdfs)]
pub fn combine_pdfs(files: js_sys::Array) -> Result<js_sys::Uint8Array, JsValue> {
    let files: Vec<Vec<u8>> = files
        .iter()
        .map(|file| js_sys::Uint8Array::new(&file).to_vec())
        .collect();
    run(DocCommand::Combine { files })
}

#[wasm_bindgen(js_name = removePages)]
pub fn remove_pages(bytes: &[u8], pages: &[u32]) -> Result<js_sys::Uint8Array, JsValue> {
    let out = doctools_core::remove_pages(bytes, pages).map_err(js_error)?;
    Ok(to_uint8_array(&out))
}

#[wasm_bindgen(js_name = extractPages)]
pub fn extract_pages(bytes: &[u8], pages: &[u32]) -> Result<js_sys::Uint8Array, JsValue> {
    let out = doctools_core::extract_pages(bytes, pages).map_err(js_error)?;
    Ok(to_uint8_array(&out))
}

/// Draw text onto pages. `annotations` is an array of
/// `{ page, text, x, y, fontSize?, color?: { r, g, b } }`.
#[wasm_bindgen(js_name = addText)]
pub fn add_text(bytes: &[u8], annotations: JsValue) -> Result<js_sys::Uint8Array, JsValue> {
    let annotations: Vec<TextAnnotation> = serde_wasm_bindgen::from_value(annotations)
        .map_err(|e| JsValue::from_str(&format!("Invalid annotations: {}", e)))?;
    let out = doctools_core::annotate_text(bytes, &annotations).map_err(js_error)?;
    Ok(to_uint8_array(&out))
}

fn convert(kind: ConversionKind, bytes: &[u8], file_name: &str) -> Result<ConvertedFile, JsValue> {
    let output = kind
        .convert(bytes, file_name, &Config::default())
        .map_err(js_error)?;
    Ok(ConvertedFile { output })
}

#[wasm_bindgen(js_name = pdfToDocx)]
pub fn pdf_to_docx(bytes: &[u8], file_name: &str) -> Result<ConvertedFile, JsValue> {
    convert(ConversionKind::PdfToDocx, bytes, file_name)
}

#[wasm_bindgen(js_name = docxToPdf)]
pub fn docx_to_pdf(bytes: &[u8], file_name: &str) -> Result<ConvertedFile, JsValue> {
    convert(ConversionKind::DocxToPdf, bytes, file_name)
}

#[wasm_bindgen(js_name = pdfToEpub)]
pub fn pdf_to_epub(bytes: &[u8], file_name: &str) -> Result<ConvertedFile, JsValue> {
    convert(ConversionKind::PdfToEpub, bytes, file_name)
}

#[wasm_bindgen(js_name = epubToPdf)]
pub fn epub_to_pdf(bytes: &[u8], file_name: &str) -> Result<ConvertedFile, JsValue> {
    convert(ConversionKind::EpubToPdf, bytes, file_name)
}

/// Run a JSON-shaped command, e.g. `{ type: "ExtractPages", file, file_name, pages }`
#[wasm_bindgen(js_name = runCommand)]
pub fn run_command(command: JsValue) -> Result<ConvertedFile, JsValue> {
    let command: DocCommand = serde_wasm_bindgen::from_value(command)
        .map_err(|e| JsValue::from_str(&format!("Invalid command: {}", e)))?;
    let output = doctools_core::execute(&command, &Config::default()).map_err(js_error)?;
    Ok(ConvertedFile { output })
}

fn run(command: DocCommand) -> Result<js_sys::Uint8Array, JsValue> {
    let output = doctools_core::execute(&command, &Config::default()).map_err(js_error)?;
    Ok(to_uint8_array(&output.bytes))
}

/// Format bytes as human-readable string
#[wasm_bindgen(js_name = formatBytes)]
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}


// Tests that cross the JS boundary; run with `wasm-pack test --node`
#[cfg(test)]
#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use doctools_core::{render_blocks, FlowBlock};
    use wasm_bindgen_test::*;

    fn sample_pdf() -> Vec<u8> {
        render_blocks(&[FlowBlock::paragraph("Hello")], &Default::default()).unwrap()
    }

    #[wasm_bindgen_test]
    fn test_add_text_from_js_objects() {
        let annotations = js_sys::JSON::parse(
            r#"[{"page":1,"text":"Approved","x":72,"y":72,"fontSize":18,"color":{"r":1,"g":0,"b":0}}]"#,
        )
        .unwrap();
        let out = add_text(&sample_pdf(), annotations).unwrap();
        assert_eq!(get_page_count(&out.to_vec()).unwrap(), 1);
    }

    #[wasm_bindgen_test]
    fn test_add_text_out_of_range_is_js_string() {
        let annotations =
            js_sys::JSON::parse(r#"[{"page":4,"text":"x","x":0,"y":0}]"#).unwrap();
        let err = add_text(&sample_pdf(), annotations).unwrap_err();
        assert_eq!(
            err.as_string().unwrap(),
            "Page 4 is out of range (document has 1 pages)"
        );
    }

    #[wasm_bindgen_test]
    fn test_combine_requires_two_files() {
        let files = js_sys::Array::new();
        files.push(&to_uint8_array(&sample_pdf()));
        assert!(combine_pdfs(files.clone()).is_err());

        files.push(&to_uint8_array(&sample_pdf()));
        let out = combine_pdfs(files).unwrap();
        assert_eq!(get_page_count(&out.to_vec()).unwrap(), 2);
    }

    #[wasm_bindgen_test]
    fn test_page_selection_past_the_end_is_js_string() {
        let err = parse_page_selection("1-4000000000", Some(3)).unwrap_err();
        assert_eq!(
            err.as_string().unwrap(),
            "Invalid request: Page 4000000000 is beyond the last page (3)"
        );
    }

    #[wasm_bindgen_test]
    fn test_conversion_names_output() {
        let converted = pdf_to_epub(&sample_pdf(), "notes.pdf").unwrap();
        assert_eq!(converted.file_name(), "notes.epub");
        assert_eq!(converted.mime_type(), "application/epub+zip");

        let back = epub_to_pdf(&converted.bytes().to_vec(), &converted.file_name()).unwrap();
        assert_eq!(back.file_name(), "notes.pdf");
    }
}
