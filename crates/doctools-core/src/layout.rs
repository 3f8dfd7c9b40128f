//! Re-flowing plain text into new PDF pages
//!
//! [`FlowWriter`] lays out paragraphs and headings top to bottom on fixed-size
//! pages, wrapping with [`wrap_words`] and starting a new page whenever the
//! cursor drops below the bottom limit.

use crate::config::LayoutConfig;
use crate::document::PdfDocument;
use crate::error::{DocToolsError, Result};
use crate::fonts::{encode_win_ansi, StandardFont};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, ObjectId, StringFormat};
use serde::Serialize;

/// A unit of text to lay out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FlowBlock {
    Paragraph { text: String, bold: bool },
    Heading { level: u8, text: String },
    /// Blank line
    Spacer,
}

impl FlowBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        FlowBlock::Paragraph {
            text: text.into(),
            bold: false,
        }
    }
}

/// Greedy word wrap.
///
/// Words are separated by any whitespace and joined with single spaces. A line
/// is flushed before the word that would make it wider than `max_width`; a word
/// is never split, so a single over-long word gets a line of its own.
pub fn wrap_words<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if measure(&candidate) > max_width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

const REGULAR_FONT_NAME: &str = "F1";
const BOLD_FONT_NAME: &str = "F2";

/// Writes blocks of text onto a fresh document, page by page
pub struct FlowWriter<'a> {
    layout: &'a LayoutConfig,
    doc: PdfDocument,
    resources_id: ObjectId,
    operations: Vec<Operation>,
    y: f32,
}

impl<'a> FlowWriter<'a> {
    pub fn new(layout: &'a LayoutConfig) -> Self {
        let mut doc = PdfDocument::new();
        let inner = doc.inner_mut();
        let regular_id = inner.add_object(StandardFont::Helvetica.dictionary());
        let bold_id = inner.add_object(StandardFont::HelveticaBold.dictionary());
        let resources_id = inner.add_object(dictionary! {
            "Font" => dictionary! {
                REGULAR_FONT_NAME => Object::Reference(regular_id),
                BOLD_FONT_NAME => Object::Reference(bold_id),
            },
        });
        Self {
            layout,
            doc,
            resources_id,
            operations: Vec::new(),
            y: layout.start_y,
        }
    }

    /// Baseline the next line will be drawn at
    pub fn cursor(&self) -> f32 {
        self.y
    }

    pub fn write(&mut self, block: &FlowBlock) -> Result<()> {
        match block {
            FlowBlock::Paragraph { text, bold } => self.paragraph(text, *bold),
            FlowBlock::Heading { text, .. } => self.heading(text),
            FlowBlock::Spacer => {
                self.spacer();
                Ok(())
            }
        }
    }

    /// Body text at the body size; wrapped lines advance one line height, the
    /// paragraph as a whole one and a half.
    pub fn paragraph(&mut self, text: &str, bold: bool) -> Result<()> {
        let font = if bold {
            StandardFont::HelveticaBold
        } else {
            StandardFont::Helvetica
        };
        self.write_wrapped(text, font, self.layout.body_font_size, 1.0, 1.5)
    }

    /// Bold text at the heading size; wrapped lines advance one and a half
    /// line heights, the heading as a whole two.
    pub fn heading(&mut self, text: &str) -> Result<()> {
        self.write_wrapped(
            text,
            StandardFont::HelveticaBold,
            self.layout.heading_font_size,
            1.5,
            2.0,
        )
    }

    pub fn spacer(&mut self) {
        self.y -= self.layout.line_height;
    }

    fn write_wrapped(
        &mut self,
        text: &str,
        font: StandardFont,
        size: f32,
        wrap_step: f32,
        block_step: f32,
    ) -> Result<()> {
        let lines = wrap_words(text, self.layout.text_width(), |line| {
            font.width_of(line, size)
        });
        let last = lines.len().saturating_sub(1);
        for (i, line) in lines.iter().enumerate() {
            self.draw_line(line, font, size)?;
            let step = if i == last { block_step } else { wrap_step };
            self.y -= self.layout.line_height * step;
        }
        Ok(())
    }

    fn draw_line(&mut self, line: &str, font: StandardFont, size: f32) -> Result<()> {
        if self.y < self.layout.bottom_limit() {
            self.flush_page()?;
        }
        let font_name = match font {
            StandardFont::Helvetica => REGULAR_FONT_NAME,
            StandardFont::HelveticaBold => BOLD_FONT_NAME,
        };
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("g", vec![0.into()]),
            Operation::new("Tf", vec![font_name.into(), size.into()]),
            Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    self.layout.margin.into(),
                    self.y.into(),
                ],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    /// Emit the current page and reset the cursor to the top
    fn flush_page(&mut self) -> Result<()> {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let bytes = content
            .encode()
            .map_err(|e| DocToolsError::Operation(format!("Failed to encode page: {}", e)))?;
        self.doc.add_page(
            self.layout.page_width,
            self.layout.page_height,
            Object::Reference(self.resources_id),
            bytes,
        )?;
        self.y = self.layout.start_y;
        Ok(())
    }

    /// Emit the last page (always at least one) and serialize the document
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush_page()?;
        tracing::debug!(pages = self.doc.page_count(), "re-flowed document");
        self.doc.save()
    }
}

/// Lay out `blocks` in order onto new pages
pub fn render_blocks(blocks: &[FlowBlock], layout: &LayoutConfig) -> Result<Vec<u8>> {
    let mut writer = FlowWriter::new(layout);
    for block in blocks {
        writer.write(block)?;
    }
    writer.finish()
}
