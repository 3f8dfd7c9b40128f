//! Minimal WordprocessingML packages
//!
//! [`build_docx`] writes the smallest package Word and LibreOffice open without
//! repair prompts; [`parse_docx`] reads paragraph text, headings and bold back
//! out of any DOCX.

use crate::archive::{escape_xml, PackageReader, PackageWriter};
use crate::error::{DocToolsError, Result};
use crate::layout::FlowBlock;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Paragraph emitted when there is no text to write
pub const EMPTY_DOCX_PLACEHOLDER: &str = "(No text content found in PDF)";

const DOCUMENT_PART: &str = "word/document.xml";

/// A block of the generated document body
#[derive(Debug, Clone, PartialEq)]
pub enum DocxBlock {
    Paragraph(String),
    PageBreak,
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#;

/// A4 with one-inch margins, in twentieths of a point
const SECTION_PROPERTIES: &str = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr>"#;

fn core_properties() -> String {
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dc:creator>doctools</dc:creator>
  <dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>
  <dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>
</cp:coreProperties>"#
    )
}

fn text_paragraph(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape_xml(text)
    )
}

fn document_xml(blocks: &[DocxBlock]) -> String {
    let has_text = blocks
        .iter()
        .any(|b| matches!(b, DocxBlock::Paragraph(text) if !text.trim().is_empty()));

    let mut body = String::new();
    if has_text {
        for block in blocks {
            match block {
                DocxBlock::Paragraph(text) if text.trim().is_empty() => {}
                DocxBlock::Paragraph(text) => body.push_str(&text_paragraph(text)),
                DocxBlock::PageBreak => {
                    body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#)
                }
            }
        }
    } else {
        body.push_str(&text_paragraph(EMPTY_DOCX_PLACEHOLDER));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}{SECTION_PROPERTIES}</w:body></w:document>"#
    )
}

/// Build a DOCX package from paragraphs and page breaks.
///
/// When no block carries text the body holds exactly one placeholder paragraph.
pub fn build_docx(blocks: &[DocxBlock]) -> Result<Vec<u8>> {
    let mut package = PackageWriter::new();
    package.add_deflated("[Content_Types].xml", CONTENT_TYPES.as_bytes())?;
    package.add_deflated("_rels/.rels", PACKAGE_RELS.as_bytes())?;
    package.add_deflated("docProps/core.xml", core_properties().as_bytes())?;
    package.add_deflated(DOCUMENT_PART, document_xml(blocks).as_bytes())?;
    package.add_deflated("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes())?;
    let bytes = package.finish()?;
    tracing::debug!(blocks = blocks.len(), bytes = bytes.len(), "built DOCX");
    Ok(bytes)
}

/// Value of a `w:val`-style attribute, matched by local name
fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Heading level implied by a paragraph style id such as `Heading2` or `Title`
fn heading_level(style: &str) -> Option<u8> {
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return Some(1);
    }
    let rest = lower.strip_prefix("heading")?;
    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    Some(digits.parse::<u8>().unwrap_or(1).clamp(1, 6))
}

#[derive(Default)]
struct ParagraphState {
    text: String,
    bold: bool,
    heading: Option<u8>,
}

impl ParagraphState {
    fn into_block(self) -> Option<FlowBlock> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        Some(match self.heading {
            Some(level) => FlowBlock::Heading {
                level,
                text: text.to_string(),
            },
            None => FlowBlock::Paragraph {
                text: text.to_string(),
                bold: self.bold,
            },
        })
    }

    /// Properties shared by `Start` and `Empty` elements
    fn apply_property(&mut self, e: &BytesStart) {
        match e.local_name().as_ref() {
            b"b" => {
                let off = matches!(
                    attribute(e, "val").as_deref(),
                    Some("0") | Some("false") | Some("off")
                );
                if !off {
                    self.bold = true;
                }
            }
            b"pStyle" => {
                if let Some(style) = attribute(e, "val") {
                    self.heading = heading_level(&style);
                }
            }
            // tab stops in w:tabs carry a position; only run-level tabs are text
            b"tab" if attribute(e, "pos").is_none() => self.text.push('\t'),
            b"br" | b"cr" => self.text.push(' '),
            _ => {}
        }
    }
}

/// Read the paragraphs of a DOCX package as flow blocks
pub fn parse_docx(bytes: &[u8]) -> Result<Vec<FlowBlock>> {
    let mut package = PackageReader::open(bytes, "DOCX")?;
    let xml = package.read_text(DOCUMENT_PART)?.ok_or_else(|| {
        DocToolsError::MalformedContainer(format!("{} not found", DOCUMENT_PART))
    })?;

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(false);

    let mut buf = Vec::new();
    let mut blocks = Vec::new();
    // Text boxes nest whole paragraphs inside a run of the outer one. Each
    // open paragraph keeps the index its block goes to so the outer paragraph
    // still comes before the ones nested in it.
    let mut open: Vec<(usize, ParagraphState)> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => open.push((blocks.len(), ParagraphState::default())),
                b"t" => in_text = true,
                _ => {
                    if let Some((_, state)) = open.last_mut() {
                        state.apply_property(e);
                    }
                }
            },
            Ok(Event::Empty(ref e)) => {
                if let Some((_, state)) = open.last_mut() {
                    state.apply_property(e);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some((slot, state)) = open.pop() {
                        if let Some(block) = state.into_block() {
                            blocks.insert(slot, block);
                        }
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    if let Some((_, state)) = open.last_mut() {
                        state.text.push_str(&e.unescape().unwrap_or_default());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocToolsError::MalformedContainer(format!(
                    "{}: {}",
                    DOCUMENT_PART, e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    tracing::debug!(blocks = blocks.len(), "parsed DOCX");
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Read};

    fn entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut package = PackageWriter::new();
        package.add_deflated(DOCUMENT_PART, xml.as_bytes()).unwrap();
        package.finish().unwrap()
    }

    #[test]
    fn test_build_docx_has_required_parts() {
        let bytes = build_docx(&[DocxBlock::Paragraph("Hello".into())]).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/core.xml",
                "word/_rels/document.xml.rels",
                "word/document.xml",
            ]
        );
        let document = entry(&bytes, DOCUMENT_PART);
        assert_eq!(document.matches("<w:sectPr>").count(), 1);
        assert!(document.contains(r#"<w:t xml:space="preserve">Hello</w:t>"#));
    }

    #[test]
    fn test_empty_blocks_get_placeholder() {
        let bytes = build_docx(&[]).unwrap();
        let document = entry(&bytes, DOCUMENT_PART);
        assert_eq!(document.matches("<w:p>").count(), 1);
        assert!(document.contains(EMPTY_DOCX_PLACEHOLDER));

        let only_breaks = build_docx(&[DocxBlock::PageBreak, DocxBlock::Paragraph("  ".into())]).unwrap();
        let document = entry(&only_breaks, DOCUMENT_PART);
        assert_eq!(document.matches("<w:p>").count(), 1);
        assert!(!document.contains(r#"w:type="page""#));
    }

    #[test]
    fn test_page_break_and_escaping() {
        let bytes = build_docx(&[
            DocxBlock::Paragraph("Fish & <Chips>".into()),
            DocxBlock::PageBreak,
            DocxBlock::Paragraph("Next".into()),
        ])
        .unwrap();
        let document = entry(&bytes, DOCUMENT_PART);
        assert!(document.contains("Fish &amp; &lt;Chips&gt;"));
        assert_eq!(document.matches(r#"<w:br w:type="page"/>"#).count(), 1);
    }

    #[test]
    fn test_parse_round_trip() {
        let bytes = build_docx(&[
            DocxBlock::Paragraph("First paragraph".into()),
            DocxBlock::PageBreak,
            DocxBlock::Paragraph("A & B".into()),
        ])
        .unwrap();
        assert_eq!(
            parse_docx(&bytes).unwrap(),
            vec![
                FlowBlock::paragraph("First paragraph"),
                FlowBlock::paragraph("A & B"),
            ]
        );
    }

    #[test]
    fn test_parse_runs_bold_and_headings() {
        let bytes = docx_with_body(concat!(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>world</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:rPr><w:b w:val="0"/></w:rPr><w:t>plain</w:t><w:tab/><w:t>tabbed</w:t></w:r></w:p>"#,
            r#"<w:p/>"#,
            r#"<w:p><w:r><w:t>   </w:t></w:r></w:p>"#,
        ));
        assert_eq!(
            parse_docx(&bytes).unwrap(),
            vec![
                FlowBlock::Heading {
                    level: 2,
                    text: "Intro".into()
                },
                FlowBlock::Paragraph {
                    text: "Hello world".into(),
                    bold: true
                },
                FlowBlock::Paragraph {
                    text: "plain\ttabbed".into(),
                    bold: false
                },
            ]
        );
    }

    #[test]
    fn test_text_box_paragraph_keeps_outer_text() {
        let bytes = docx_with_body(concat!(
            r#"<w:p><w:r><w:t xml:space="preserve">Before </w:t></w:r>"#,
            r#"<w:r><w:pict><w:txbxContent><w:p><w:r><w:t>Inner</w:t></w:r></w:p></w:txbxContent></w:pict></w:r>"#,
            r#"<w:r><w:t>After</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>Next</w:t></w:r></w:p>"#,
        ));
        assert_eq!(
            parse_docx(&bytes).unwrap(),
            vec![
                FlowBlock::paragraph("Before After"),
                FlowBlock::paragraph("Inner"),
                FlowBlock::paragraph("Next"),
            ]
        );
    }

    #[test]
    fn test_nested_heading_style_stays_with_inner_paragraph() {
        let bytes = docx_with_body(concat!(
            r#"<w:p><w:r><w:t>Body</w:t></w:r><w:r><w:txbxContent>"#,
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Boxed title</w:t></w:r></w:p>"#,
            r#"</w:txbxContent></w:r></w:p>"#,
        ));
        assert_eq!(
            parse_docx(&bytes).unwrap(),
            vec![
                FlowBlock::paragraph("Body"),
                FlowBlock::Heading {
                    level: 1,
                    text: "Boxed title".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_missing_document_part() {
        let mut package = PackageWriter::new();
        package.add_deflated("word/other.xml", b"<x/>").unwrap();
        let bytes = package.finish().unwrap();
        assert!(matches!(
            parse_docx(&bytes),
            Err(DocToolsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_parse_not_a_zip() {
        assert!(matches!(
            parse_docx(b"%PDF-1.7"),
            Err(DocToolsError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_heading_level() {
        assert_eq!(heading_level("Heading1"), Some(1));
        assert_eq!(heading_level("heading 3"), Some(3));
        assert_eq!(heading_level("Title"), Some(1));
        assert_eq!(heading_level("Normal"), None);
    }
}
