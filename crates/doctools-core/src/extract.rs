//! Positioned text extraction and the paragraph heuristics built on it
//!
//! Fragments are reported in content-stream order with their user-space
//! position (text matrix combined with the CTM). Strings are decoded through
//! the font selected by `Tf`, and form XObjects drawn with `Do` are walked
//! with their own matrix and resources. Nothing here attempts real layout
//! analysis: multi-column pages, tables and rotated text come out in stream
//! order.

use crate::cmap::{stream_bytes, FontDecoder};
use crate::config::ExtractionConfig;
use crate::document::PdfDocument;
use crate::error::{DocToolsError, Result};
use crate::fonts::{decode_win_ansi, StandardFont};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;

/// One text-showing operation on a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Nesting limit for form XObjects drawn inside form XObjects
const MAX_FORM_DEPTH: usize = 12;

/// `a × b` in PDF's row-vector convention
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn translation(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// The part of the graphics state saved by `q` that matters for text
#[derive(Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Rc<FontDecoder>>,
    font_size: f32,
    leading: f32,
}

/// Text and graphics state tracked while walking a content stream
struct TextState<'a> {
    doc: Option<&'a Document>,
    graphics: GraphicsState,
    saved: Vec<GraphicsState>,
    /// `Q` never pops below this depth; raised while a form is drawn
    floor: usize,
    text_matrix: Matrix,
    line_matrix: Matrix,
    fonts: HashMap<ObjectId, Rc<FontDecoder>>,
    /// Forms currently being drawn, innermost last
    forms: Vec<ObjectId>,
    fragments: Vec<TextFragment>,
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Entry `name` of resource category `category` (`/Font`, `/XObject`), unresolved
fn named_resource<'a>(
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    category: &[u8],
    name: &[u8],
) -> Option<&'a Object> {
    let entries = resolve_dict(doc, resources?.get(category).ok()?)?;
    entries.get(name).ok()
}

impl<'a> TextState<'a> {
    fn new(doc: Option<&'a Document>) -> Self {
        Self {
            doc,
            graphics: GraphicsState {
                ctm: IDENTITY,
                font: None,
                font_size: DEFAULT_FONT_SIZE,
                leading: 0.0,
            },
            saved: Vec::new(),
            floor: 0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            fonts: HashMap::new(),
            forms: Vec::new(),
            fragments: Vec::new(),
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translation(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.graphics.leading);
    }

    fn show(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let position = multiply(&self.text_matrix, &self.graphics.ctm);
        let scale = (self.text_matrix[2].powi(2) + self.text_matrix[3].powi(2)).sqrt();
        // Glyph widths of arbitrary fonts are unknown here; Helvetica is close enough to keep x plausible.
        let advance = StandardFont::Helvetica.width_of(&text, self.graphics.font_size);
        self.fragments.push(TextFragment {
            text,
            x: position[4],
            y: position[5],
            font_size: self.graphics.font_size * scale,
        });
        self.text_matrix = multiply(&translation(advance, 0.0), &self.text_matrix);
    }

    fn show_operand(&mut self, operand: Option<&Object>) {
        if let Some(text) = operand.and_then(|o| self.decode_operand(o)) {
            self.show(text);
        }
    }

    /// Decode a string operand (or a `TJ` array) to text. In `TJ` arrays a
    /// kerning adjustment below -100 is taken as a word gap.
    fn decode_operand(&self, operand: &Object) -> Option<String> {
        match operand {
            Object::String(bytes, _) => Some(self.decode_string(bytes)),
            Object::Array(items) => {
                let mut text = String::new();
                for item in items {
                    match item {
                        Object::String(bytes, _) => text.push_str(&self.decode_string(bytes)),
                        Object::Integer(n) if *n < -100 => text.push(' '),
                        Object::Real(n) if *n < -100.0 => text.push(' '),
                        _ => {}
                    }
                }
                Some(text)
            }
            _ => None,
        }
    }

    fn decode_string(&self, bytes: &[u8]) -> String {
        match &self.graphics.font {
            Some(font) => font.decode(bytes),
            None => decode_pdf_string(bytes),
        }
    }

    fn load_font(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) -> Option<Rc<FontDecoder>> {
        let doc = self.doc?;
        match named_resource(doc, resources, b"Font", name)? {
            Object::Reference(id) => {
                if let Some(font) = self.fonts.get(id) {
                    return Some(Rc::clone(font));
                }
                let font = Rc::new(FontDecoder::from_font(doc, doc.get_dictionary(*id).ok()?));
                self.fonts.insert(*id, Rc::clone(&font));
                Some(font)
            }
            Object::Dictionary(dict) => Some(Rc::new(FontDecoder::from_font(doc, dict))),
            _ => None,
        }
    }

    /// Walk a form XObject's content with its matrix and resources, then
    /// restore the graphics state
    fn draw_form(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) {
        let Some(doc) = self.doc else { return };
        let Some(Object::Reference(id)) = named_resource(doc, resources, b"XObject", name) else {
            return;
        };
        let id = *id;
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            return;
        };
        if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Form".as_slice()) {
            return;
        }
        if self.forms.contains(&id) || self.forms.len() >= MAX_FORM_DEPTH {
            tracing::warn!(form = ?id, depth = self.forms.len(), "skipping nested form XObject");
            return;
        }
        let content = match stream_bytes(stream).map(|raw| Content::decode(&raw)) {
            Some(Ok(content)) => content,
            _ => {
                tracing::warn!(form = ?id, "form XObject has no readable content");
                return;
            }
        };
        let form_matrix = stream
            .dict
            .get(b"Matrix")
            .and_then(Object::as_array)
            .ok()
            .and_then(|m| matrix(m))
            .unwrap_or(IDENTITY);
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve_dict(doc, r))
            .or(resources);

        let floor = self.floor;
        self.saved.push(self.graphics.clone());
        self.floor = self.saved.len();
        self.graphics.ctm = multiply(&form_matrix, &self.graphics.ctm);
        self.forms.push(id);
        self.run(&content.operations, form_resources);
        self.forms.pop();
        self.saved.truncate(self.floor);
        if let Some(graphics) = self.saved.pop() {
            self.graphics = graphics;
        }
        self.floor = floor;
    }

    fn run(&mut self, operations: &[Operation], resources: Option<&'a Dictionary>) {
        for op in operations {
            self.apply(op, resources);
        }
    }

    fn apply(&mut self, op: &Operation, resources: Option<&'a Dictionary>) {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => self.saved.push(self.graphics.clone()),
            "Q" => {
                if self.saved.len() > self.floor {
                    if let Some(graphics) = self.saved.pop() {
                        self.graphics = graphics;
                    }
                }
            }
            "cm" => {
                if let Some(m) = matrix(operands) {
                    self.graphics.ctm = multiply(&m, &self.graphics.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(size) = number(operands, 1) {
                    self.graphics.font_size = size;
                }
                self.graphics.font = operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .and_then(|name| self.load_font(resources, name));
            }
            "TL" => {
                if let Some(leading) = number(operands, 0) {
                    self.graphics.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                    self.graphics.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix(operands) {
                    self.line_matrix = m;
                    self.text_matrix = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" | "TJ" => self.show_operand(operands.first()),
            "'" => {
                self.next_line();
                self.show_operand(operands.first());
            }
            "\"" => {
                self.next_line();
                self.show_operand(operands.get(2));
            }
            "Do" => {
                if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                    self.draw_form(resources, name);
                }
            }
            _ => {}
        }
    }
}

fn number(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(|o| o.as_float().ok())
}

fn matrix(operands: &[Object]) -> Option<Matrix> {
    let mut m = [0.0; 6];
    for (i, slot) in m.iter_mut().enumerate() {
        *slot = number(operands, i)?;
    }
    Some(m)
}

/// Bytes shown without a resolvable font: UTF-16BE with BOM, then UTF-8,
/// then WinAnsi
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_win_ansi(bytes),
    }
}

/// Positioned text fragments of the page at a 0-based index
pub fn extract_page_text(doc: &PdfDocument, page_index: usize) -> Result<Vec<TextFragment>> {
    let page_id = doc.page_id(page_index)?;
    let raw = match doc.inner().get_page_content(page_id) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(page = page_index + 1, error = %e, "page has no readable content");
            return Ok(Vec::new());
        }
    };
    let content = Content::decode(&raw).map_err(|e| {
        DocToolsError::InvalidDocument(format!(
            "Page {} content stream: {}",
            page_index + 1,
            e
        ))
    })?;

    let resources = doc.inherited_dictionary(page_id, b"Resources");
    let mut state = TextState::new(Some(doc.inner()));
    state.run(&content.operations, resources);
    tracing::debug!(
        page = page_index + 1,
        fragments = state.fragments.len(),
        "extracted page text"
    );
    Ok(state.fragments)
}

/// Share of unmappable characters above which extracted text counts as garbage
const GARBAGE_THRESHOLD: f64 = 0.15;
/// Private-use characters usually mean a custom font encoding was not mapped
const PRIVATE_USE_THRESHOLD: f64 = 0.10;

/// True when `text` is dominated by replacement, private-use or control characters
pub fn looks_garbled(text: &str) -> bool {
    let mut total = 0usize;
    let mut garbage = 0usize;
    let mut private_use = 0usize;
    for c in text.chars() {
        total += 1;
        match c {
            '\u{FFFD}' => garbage += 1,
            '\u{E000}'..='\u{F8FF}' => {
                garbage += 1;
                private_use += 1;
            }
            c if c.is_control() && !matches!(c, '\n' | '\r' | '\t') => garbage += 1,
            _ => {}
        }
    }
    total > 0
        && (garbage as f64 / total as f64 > GARBAGE_THRESHOLD
            || private_use as f64 / total as f64 > PRIVATE_USE_THRESHOLD)
}

/// Vertical jump between plain-text paragraphs, far beyond any paragraph threshold
const PLAIN_TEXT_PARAGRAPH_GAP: f32 = 1000.0;

/// Fragments for one page of plain text: one per line, lines of a paragraph
/// share a y and a blank line moves far down
fn plain_text_fragments(page: &str) -> Vec<TextFragment> {
    let mut fragments = Vec::new();
    let mut y = 0.0;
    for line in page.lines() {
        let line = line.trim();
        if line.is_empty() {
            y -= PLAIN_TEXT_PARAGRAPH_GAP;
            continue;
        }
        fragments.push(TextFragment {
            text: line.to_string(),
            x: 0.0,
            y,
            font_size: DEFAULT_FONT_SIZE,
        });
    }
    fragments
}

/// Split plain text on form feeds into `page_count` pages. Without form feeds
/// everything lands on the first page.
fn plain_text_pages(text: &str, page_count: usize) -> Vec<Vec<TextFragment>> {
    let mut pages: Vec<Vec<TextFragment>> = text.split('\x0C').map(plain_text_fragments).collect();
    while pages.len() > page_count.max(1) && pages.last().is_some_and(|p| p.is_empty()) {
        pages.pop();
    }
    if pages.len() < page_count {
        pages.resize_with(page_count, Vec::new);
    }
    pages
}

/// Positioned text of every page, in page order.
///
/// When the text decoded through the page fonts is mostly unmappable (an
/// embedded font with a custom encoding and no ToUnicode map), the document is
/// re-read with `pdf-extract` unless `config.fallback_extractor` is off. The
/// fallback has no positions: its lines become fragments whose y values only
/// separate paragraphs.
pub fn extract_document_text(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<Vec<Vec<TextFragment>>> {
    let doc = PdfDocument::load(bytes)?;
    let pages = (0..doc.page_count() as usize)
        .map(|index| extract_page_text(&doc, index))
        .collect::<Result<Vec<_>>>()?;

    let text = pages
        .iter()
        .map(|fragments| join_page_text(fragments))
        .collect::<Vec<_>>()
        .join("\n");
    if !config.fallback_extractor || !looks_garbled(&text) {
        return Ok(pages);
    }

    tracing::warn!("text decoded through page fonts looks garbled, trying pdf-extract");
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(plain) if !plain.trim().is_empty() && !looks_garbled(&plain) => {
            Ok(plain_text_pages(&plain, pages.len()))
        }
        Ok(_) => {
            tracing::warn!("pdf-extract found no better text");
            Ok(pages)
        }
        Err(e) => {
            tracing::warn!(error = %e, "pdf-extract fallback failed");
            Ok(pages)
        }
    }
}

/// Group fragments into paragraphs by vertical position.
///
/// Whitespace-only fragments are skipped. A new paragraph starts whenever a
/// fragment's y differs from the previous kept fragment's y by more than
/// `threshold`. Fragment texts within a paragraph are joined with one space.
pub fn cluster_paragraphs(fragments: &[TextFragment], threshold: f32) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut last_y: Option<f32> = None;

    for fragment in fragments {
        let text = fragment.text.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(y) = last_y {
            if (fragment.y - y).abs() > threshold && !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        }
        current.push(text);
        last_y = Some(fragment.y);
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

/// All non-empty fragment texts of a page joined with spaces
pub fn join_page_text(fragments: &[TextFragment]) -> String {
    fragments
        .iter()
        .map(|f| f.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
