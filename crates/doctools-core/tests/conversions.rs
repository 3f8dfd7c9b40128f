//! End-to-end conversions between PDF, DOCX and EPUB

mod common;

use common::{create_cid_font_pdf, create_form_xobject_pdf, create_text_pdf, page_texts};
use doctools_core::fonts::StandardFont;
use doctools_core::{
    build_docx, build_epub, docx_to_pdf, epub_to_pdf, parse_docx, pdf_to_docx, pdf_to_epub,
    wrap_words, Chapter, Config, DocToolsError, FlowBlock, DOCX_MIME_TYPE, EPUB_MIME_TYPE,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::io::{Cursor, Read};

fn zip_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut text = String::new();
    file.read_to_string(&mut text).unwrap();
    text
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn pdf_to_docx_clusters_lines_into_paragraphs() {
    // 20pt line spacing is above the 5pt threshold, so each line is its own paragraph
    let pdf = create_text_pdf(&[lines(&["Quarterly report", "Revenue grew"]), lines(&["Appendix"])]);
    let out = pdf_to_docx(&pdf, "q3.pdf", &Config::default()).unwrap();
    assert_eq!(out.file_name, "q3.docx");
    assert_eq!(out.mime_type, DOCX_MIME_TYPE);

    let document = zip_entry(&out.bytes, "word/document.xml");
    assert_eq!(document.matches(r#"<w:br w:type="page"/>"#).count(), 1);
    assert_eq!(
        parse_docx(&out.bytes).unwrap(),
        vec![
            FlowBlock::paragraph("Quarterly report"),
            FlowBlock::paragraph("Revenue grew"),
            FlowBlock::paragraph("Appendix"),
        ]
    );
}

#[test]
fn pdf_with_cid_font_converts_through_to_unicode() {
    let pdf = create_cid_font_pdf(&["Résumé of work", "Naïve café"]);
    let out = pdf_to_docx(&pdf, "cv.pdf", &Config::default()).unwrap();
    assert_eq!(
        parse_docx(&out.bytes).unwrap(),
        vec![
            FlowBlock::paragraph("Résumé of work"),
            FlowBlock::paragraph("Naïve café"),
        ]
    );
}

#[test]
fn pdf_with_text_in_form_xobject_converts_to_epub() {
    let pdf = create_form_xobject_pdf("Stamped body text");
    let out = pdf_to_epub(&pdf, "stamped.pdf", &Config::default()).unwrap();
    let chapter = zip_entry(&out.bytes, "OEBPS/chapter-1.xhtml");
    assert!(chapter.contains("<p>Stamped body text</p>"));
    assert_eq!(page_texts(&pdf), vec!["Stamped body text"]);
}

#[test]
fn pdf_to_docx_with_wide_threshold_merges_lines() {
    let mut config = Config::default();
    config.extraction.paragraph_threshold = 25.0;
    let pdf = create_text_pdf(&[lines(&["one", "two", "three"])]);
    let out = pdf_to_docx(&pdf, "m.pdf", &config).unwrap();
    assert_eq!(
        parse_docx(&out.bytes).unwrap(),
        vec![FlowBlock::paragraph("one two three")]
    );
}

#[test]
fn empty_docx_has_single_placeholder_paragraph() {
    let bytes = build_docx(&[]).unwrap();
    let document = zip_entry(&bytes, "word/document.xml");
    assert_eq!(document.matches("<w:p>").count(), 1);
    assert!(document.contains("(No text content found in PDF)"));
}

#[test]
fn epub_mimetype_is_first_and_stored() {
    let bytes = build_epub(&[Chapter::new("Page 1", "text")], "Book").unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
    let mut first = archive.by_index(0).unwrap();
    assert_eq!(first.name(), "mimetype");
    assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    let mut content = Vec::new();
    first.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"application/epub+zip");
}

#[test]
fn pdf_to_epub_skips_pages_without_text() {
    let pdf = create_text_pdf(&[lines(&["Intro"]), vec![], lines(&["Ending", "now"])]);
    let out = pdf_to_epub(&pdf, "novel.pdf", &Config::default()).unwrap();
    assert_eq!(out.file_name, "novel.epub");
    assert_eq!(out.mime_type, EPUB_MIME_TYPE);

    let opf = zip_entry(&out.bytes, "OEBPS/content.opf");
    assert!(opf.contains("<dc:title>novel</dc:title>"));
    assert_eq!(opf.matches("<itemref ").count(), 2);
    let second = zip_entry(&out.bytes, "OEBPS/chapter-2.xhtml");
    assert!(second.contains("<h1>Page 3</h1>"));
    assert!(second.contains("<p>Ending now</p>"));
}

#[test]
fn pdf_to_epub_without_text_is_empty_document() {
    let pdf = create_text_pdf(&[vec![], vec![]]);
    let err = pdf_to_epub(&pdf, "blank.pdf", &Config::default()).unwrap_err();
    assert!(matches!(err.root(), DocToolsError::EmptyDocument(_)));
    assert_eq!(
        err.to_string(),
        "Failed to convert PDF to EPUB: No text content found in PDF"
    );
}

#[test]
fn pdf_epub_pdf_round_trip_keeps_text() {
    let pdf = create_text_pdf(&[lines(&["Call me Ishmael."]), lines(&["Some years ago"])]);
    let epub = pdf_to_epub(&pdf, "moby.pdf", &Config::default()).unwrap();
    let back = epub_to_pdf(&epub.bytes, &epub.file_name, &Config::default()).unwrap();
    assert_eq!(back.file_name, "moby.pdf");
    let text = page_texts(&back.bytes).join(" ");
    assert_eq!(text, "Page 1 Call me Ishmael. Page 2 Some years ago");
}

#[test]
fn pdf_docx_pdf_round_trip_keeps_text() {
    let pdf = create_text_pdf(&[lines(&["Dear reader,", "Thank you."])]);
    let docx = pdf_to_docx(&pdf, "letter.pdf", &Config::default()).unwrap();
    let back = docx_to_pdf(&docx.bytes, &docx.file_name, &Config::default()).unwrap();
    assert_eq!(page_texts(&back.bytes), vec!["Dear reader, Thank you."]);
}

#[test]
fn long_docx_flows_onto_more_pages() {
    let paragraph = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(20);
    let blocks: Vec<doctools_core::DocxBlock> = (0..20)
        .map(|_| doctools_core::DocxBlock::Paragraph(paragraph.clone()))
        .collect();
    let docx = build_docx(&blocks).unwrap();
    let out = docx_to_pdf(&docx, "long.docx", &Config::default()).unwrap();
    let pages = page_texts(&out.bytes);
    assert!(pages.len() > 1);
    assert!(pages.iter().all(|p| !p.is_empty()));
}

#[test]
fn corrupt_inputs_report_the_conversion() {
    let config = Config::default();
    let err = pdf_to_docx(b"not a pdf", "x.pdf", &config).unwrap_err();
    assert!(err.to_string().starts_with("Failed to convert PDF to DOCX: "));
    assert!(matches!(err.root(), DocToolsError::InvalidDocument(_)));

    let no_container = build_docx(&[]).unwrap();
    let err = epub_to_pdf(&no_container, "x.epub", &config).unwrap_err();
    assert!(matches!(err.root(), DocToolsError::MalformedContainer(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn wrap_never_splits_words(words in prop::collection::vec("[a-z]{1,12}", 0..40), width in 5.0f32..60.0) {
        let text = words.join(" ");
        let wrapped = wrap_words(&text, width, |s| s.chars().count() as f32);
        let rejoined: Vec<&str> = wrapped.iter().flat_map(|line| line.split(' ')).collect();
        prop_assert_eq!(rejoined, words.iter().map(String::as_str).collect::<Vec<_>>());
        for line in &wrapped {
            prop_assert!(line.chars().count() as f32 <= width || !line.contains(' '));
        }
    }

    #[test]
    fn wrap_with_font_metrics_fits_page(words in prop::collection::vec("[A-Za-z]{1,10}", 1..60)) {
        let text = words.join(" ");
        let font = StandardFont::Helvetica;
        for line in wrap_words(&text, 495.0, |s| font.width_of(s, 12.0)) {
            prop_assert!(font.width_of(&line, 12.0) <= 495.0);
        }
    }
}
