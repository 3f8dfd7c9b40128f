//! Text overlay annotation
//!
//! Annotations are drawn straight into the page content rather than added as
//! annotation dictionaries, so they print and flatten like the rest of the page.

use crate::document::PdfDocument;
use crate::error::{DocToolsError, Result};
use crate::fonts::{encode_win_ansi, StandardFont};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Leading between lines of a multi-line annotation, relative to the font size
const LINE_SPACING: f32 = 1.2;

/// RGB color with channels in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parse `#RRGGBB` or `RRGGBB`
    pub fn from_hex(color: &str) -> Result<Self> {
        let hex = color.trim().trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .map(|v| v as f32 / 255.0)
        };
        match (hex.len(), channel(0..2), channel(2..4), channel(4..6)) {
            (6, Some(r), Some(g), Some(b)) => Ok(RgbColor { r, g, b }),
            _ => Err(DocToolsError::InvalidRequest(format!(
                "Invalid color '{}', expected #RRGGBB",
                color
            ))),
        }
    }

    fn clamped(&self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| c.clamp(0.0, 1.0))
    }
}

/// Text to draw on a page. `y` is measured from the top of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnnotation {
    /// 1-based page number
    pub page: u32,
    pub text: String,
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<RgbColor>,
}

impl TextAnnotation {
    pub fn new(page: u32, text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            page,
            text: text.into(),
            x,
            y,
            font_size: None,
            color: None,
        }
    }

    pub fn font_size(&self) -> f32 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn color(&self) -> RgbColor {
        self.color.unwrap_or(RgbColor::BLACK)
    }
}

/// Draw each annotation on its page and return the saved document.
///
/// Every page number is checked before anything is drawn. Annotations land in
/// list order; existing page content is kept and isolated in its own graphics
/// state.
pub fn annotate_text(bytes: &[u8], annotations: &[TextAnnotation]) -> Result<Vec<u8>> {
    let mut doc = PdfDocument::load(bytes)?;
    let page_count = doc.page_count();

    let mut by_page: BTreeMap<u32, Vec<&TextAnnotation>> = BTreeMap::new();
    for annotation in annotations {
        if annotation.page == 0 || annotation.page > page_count {
            return Err(DocToolsError::PageOutOfRange {
                page: annotation.page,
                page_count,
            });
        }
        by_page.entry(annotation.page).or_default().push(annotation);
    }

    if !by_page.is_empty() {
        let font_id = doc
            .inner_mut()
            .add_object(StandardFont::Helvetica.dictionary());
        for (page, page_annotations) in &by_page {
            let page_id = doc.page_id(*page as usize - 1)?;
            overlay_page(&mut doc, page_id, font_id, page_annotations)?;
            tracing::debug!(page, count = page_annotations.len(), "annotated page");
        }
    }

    tracing::info!(
        annotations = annotations.len(),
        pages = by_page.len(),
        "applied text annotations"
    );
    doc.save()
}

fn overlay_page(
    doc: &mut PdfDocument,
    page_id: ObjectId,
    font_id: ObjectId,
    annotations: &[&TextAnnotation],
) -> Result<()> {
    doc.materialize_inherited(page_id)?;
    let (_, height) = doc.page_size_by_id(page_id);
    let font_name = register_font(doc, page_id, font_id)?;

    let mut operations = Vec::new();
    for annotation in annotations {
        operations.extend(text_operations(annotation, &font_name, height));
    }
    let overlay = Content { operations }
        .encode()
        .map_err(|e| DocToolsError::Operation(format!("Failed to encode overlay: {}", e)))?;
    append_overlay(doc, page_id, overlay)
}

fn text_operations(annotation: &TextAnnotation, font_name: &str, page_height: f32) -> Vec<Operation> {
    let size = annotation.font_size();
    let [r, g, b] = annotation.color().clamped();
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font_name.as_bytes().to_vec()), size.into()]),
        Operation::new("rg", vec![r.into(), g.into(), b.into()]),
        Operation::new("TL", vec![(size * LINE_SPACING).into()]),
        Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                annotation.x.into(),
                (page_height - annotation.y).into(),
            ],
        ),
    ];
    for (i, line) in annotation.text.split('\n').enumerate() {
        if i > 0 {
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

/// Add the overlay font to the page's own resources under an unused name
fn register_font(doc: &mut PdfDocument, page_id: ObjectId, font_id: ObjectId) -> Result<String> {
    let page = doc
        .inner()
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| DocToolsError::InvalidDocument(e.to_string()))?;
    let mut resources = page
        .get(b"Resources")
        .ok()
        .and_then(|r| doc.resolve(r).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|f| doc.resolve(f).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);

    let mut suffix = 0;
    let font_name = loop {
        let candidate = format!("DTHelv{}", suffix);
        if !fonts.has(candidate.as_bytes()) {
            break candidate;
        }
        suffix += 1;
    };
    fonts.set(font_name.clone(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(font_name)
}

/// Wrap the existing content in `q`/`Q` and append the overlay as a new stream
fn append_overlay(doc: &mut PdfDocument, page_id: ObjectId, overlay: Vec<u8>) -> Result<()> {
    let existing: Vec<Object> = {
        let page = doc
            .inner()
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| DocToolsError::InvalidDocument(e.to_string()))?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.inner().get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let inner = doc.inner_mut();
    let mut contents = Vec::with_capacity(existing.len() + 2);
    let mut overlay_data = b"\n".to_vec();
    if !existing.is_empty() {
        let push_id = inner.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.push(Object::Reference(push_id));
        contents.extend(existing);
        overlay_data.extend_from_slice(b"Q\n");
    }
    overlay_data.extend(overlay);
    let overlay_id = inner.add_object(Stream::new(Dictionary::new(), overlay_data));
    contents.push(Object::Reference(overlay_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

fn page_dict_mut(doc: &mut PdfDocument, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.inner_mut()
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| DocToolsError::Operation(e.to_string()))
}
