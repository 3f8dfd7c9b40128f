//! EPUB 3 packages
//!
//! [`build_epub`] writes one XHTML document per chapter plus a navigation
//! document. [`parse_epub`] follows `META-INF/container.xml` to the package
//! document and reads the spine in reading order.

use crate::archive::{escape_xml, resolve_href, PackageReader, PackageWriter};
use crate::error::{DocToolsError, Result};
use crate::layout::FlowBlock;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

pub const EPUB_MIME_TYPE: &str = "application/epub+zip";

const CONTAINER_PATH: &str = "META-INF/container.xml";
const PACKAGE_PATH: &str = "OEBPS/content.opf";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const CHAPTER_STYLE: &str = "body { font-family: serif; margin: 1em; line-height: 1.6; }
h1 { font-size: 1.5em; margin-bottom: 1em; }
p { margin-bottom: 1em; text-align: justify; }";

/// One chapter of a generated book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Plain text; each line becomes a paragraph
    pub content: String,
}

impl Chapter {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

fn chapter_file_name(index: usize) -> String {
    format!("chapter-{}.xhtml", index + 1)
}

fn chapter_xhtml(chapter: &Chapter) -> String {
    let title = escape_xml(&chapter.title);
    let paragraphs: String = chapter
        .content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("  <p>{}</p>\n", escape_xml(line)))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <style>
{CHAPTER_STYLE}
  </style>
</head>
<body>
  <h1>{title}</h1>
{paragraphs}</body>
</html>"#
    )
}

fn nav_xhtml(chapters: &[Chapter], book_title: &str) -> String {
    let entries: String = chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| {
            format!(
                "      <li><a href=\"{}\">{}</a></li>\n",
                chapter_file_name(i),
                escape_xml(&chapter.title)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
<head>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{entries}    </ol>
  </nav>
</body>
</html>"#,
        title = escape_xml(book_title),
    )
}

fn package_opf(chapters: &[Chapter], book_title: &str) -> String {
    let identifier = uuid::Uuid::new_v4();
    let modified = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let mut manifest = String::from(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    let mut spine = String::new();
    for i in 0..chapters.len() {
        manifest.push_str(&format!(
            "    <item id=\"chapter-{n}\" href=\"{file}\" media-type=\"application/xhtml+xml\"/>\n",
            n = i + 1,
            file = chapter_file_name(i)
        ));
        spine.push_str(&format!("    <itemref idref=\"chapter-{}\"/>\n", i + 1));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">urn:uuid:{identifier}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>"#,
        title = escape_xml(book_title),
    )
}

/// Build an EPUB 3 book with one XHTML document per chapter.
///
/// The `mimetype` entry is written first and stored uncompressed.
pub fn build_epub(chapters: &[Chapter], title: &str) -> Result<Vec<u8>> {
    if chapters.is_empty() {
        return Err(DocToolsError::EmptyDocument(
            "An EPUB needs at least one chapter".into(),
        ));
    }

    let mut package = PackageWriter::new();
    package.add_stored("mimetype", EPUB_MIME_TYPE.as_bytes())?;
    package.add_deflated(CONTAINER_PATH, CONTAINER_XML.as_bytes())?;
    package.add_deflated(PACKAGE_PATH, package_opf(chapters, title).as_bytes())?;
    package.add_deflated("OEBPS/nav.xhtml", nav_xhtml(chapters, title).as_bytes())?;
    for (i, chapter) in chapters.iter().enumerate() {
        let path = format!("OEBPS/{}", chapter_file_name(i));
        package.add_deflated(&path, chapter_xhtml(chapter).as_bytes())?;
    }
    let bytes = package.finish()?;
    tracing::debug!(chapters = chapters.len(), bytes = bytes.len(), "built EPUB");
    Ok(bytes)
}

fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_reader(xml: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    reader.check_end_names(false);
    reader
}

/// `full-path` of the first rootfile in the container document
fn rootfile_path(container: &str) -> Result<String> {
    let mut reader = xml_reader(container);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                if let Some(path) = attribute(e, "full-path") {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocToolsError::MalformedContainer(format!(
                    "{}: {}",
                    CONTAINER_PATH, e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Err(DocToolsError::MalformedContainer(format!(
        "{} names no package document",
        CONTAINER_PATH
    )))
}

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    is_nav: bool,
}

impl ManifestItem {
    fn is_content(&self) -> bool {
        let href = self.href.to_ascii_lowercase();
        self.media_type == "application/xhtml+xml"
            || self.media_type == "text/html"
            || href.ends_with(".xhtml")
            || href.ends_with(".html")
            || href.ends_with(".htm")
    }
}

/// Content document paths of the package in reading order
fn reading_order(opf_path: &str, opf: &str) -> Result<Vec<String>> {
    let mut reader = xml_reader(opf);
    let mut buf = Vec::new();
    let mut manifest = Vec::new();
    let mut spine = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"item" => {
                    if let (Some(id), Some(href)) = (attribute(e, "id"), attribute(e, "href")) {
                        manifest.push(ManifestItem {
                            id,
                            href,
                            media_type: attribute(e, "media-type").unwrap_or_default(),
                            is_nav: attribute(e, "properties")
                                .map(|p| p.split_whitespace().any(|v| v == "nav"))
                                .unwrap_or(false),
                        });
                    }
                }
                b"itemref" => {
                    if let Some(idref) = attribute(e, "idref") {
                        spine.push(idref);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocToolsError::MalformedContainer(format!(
                    "{}: {}",
                    opf_path, e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    let items: Vec<&ManifestItem> = if spine.is_empty() {
        manifest.iter().filter(|item| !item.is_nav).collect()
    } else {
        spine
            .iter()
            .filter_map(|idref| manifest.iter().find(|item| &item.id == idref))
            .collect()
    };
    Ok(items
        .into_iter()
        .filter(|item| item.is_content())
        .map(|item| resolve_href(opf_path, &item.href))
        .collect())
}

/// Resolve character references one at a time, keeping any that are
/// unknown or malformed exactly as written
fn unescape_lenient(raw: &str) -> String {
    if let Ok(text) = unescape(raw) {
        return text.into_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail[1..]
            .find(|c| c == '&' || c == ';')
            .map(|i| i + 1)
            .filter(|&i| tail.as_bytes()[i] == b';');
        match end {
            Some(end) => {
                let reference = &tail[..=end];
                match unescape(reference) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "blockquote", "section", "article", "aside", "header",
    "footer", "nav", "main", "figure", "figcaption", "table", "tr", "td", "th", "pre", "dt",
    "dd", "dl", "hr", "body",
];

const IGNORED_ELEMENTS: &[&str] = &["script", "style", "head", "title"];

/// Collects flow blocks from one XHTML content document
#[derive(Default)]
struct HtmlCollector {
    blocks: Vec<FlowBlock>,
    inline: String,
    heading: Option<(u8, String)>,
    ignored_depth: usize,
    in_body: bool,
}

impl HtmlCollector {
    fn flush_paragraph(&mut self) {
        let text = normalize_whitespace(&self.inline);
        self.inline.clear();
        if !text.is_empty() {
            self.blocks.push(FlowBlock::paragraph(text));
        }
    }

    fn start(&mut self, name: &str) {
        if IGNORED_ELEMENTS.contains(&name) {
            self.ignored_depth += 1;
            return;
        }
        if name == "body" {
            self.in_body = true;
        }
        if let Some(level) = heading_tag(name) {
            self.flush_paragraph();
            self.heading = Some((level, String::new()));
        } else if name == "br" || BLOCK_ELEMENTS.contains(&name) {
            self.flush_paragraph();
        }
    }

    fn end(&mut self, name: &str) {
        if IGNORED_ELEMENTS.contains(&name) {
            self.ignored_depth = self.ignored_depth.saturating_sub(1);
            return;
        }
        if heading_tag(name).is_some() {
            if let Some((level, raw)) = self.heading.take() {
                let text = normalize_whitespace(&raw);
                if !text.is_empty() {
                    self.blocks.push(FlowBlock::Spacer);
                    self.blocks.push(FlowBlock::Heading { level, text });
                    self.blocks.push(FlowBlock::Spacer);
                }
            }
        } else if BLOCK_ELEMENTS.contains(&name) {
            self.flush_paragraph();
        }
        if name == "body" {
            self.in_body = false;
        }
    }

    fn text(&mut self, text: &str) {
        if self.ignored_depth > 0 || !self.in_body {
            return;
        }
        match self.heading.as_mut() {
            Some((_, heading)) => heading.push_str(text),
            None => self.inline.push_str(text),
        }
    }
}

fn heading_tag(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flow blocks of one XHTML content document. Headings become
/// `Spacer, Heading, Spacer`; block elements and `br` end a paragraph.
fn html_blocks(path: &str, html: &str) -> Result<Vec<FlowBlock>> {
    let mut reader = xml_reader(html);
    let mut buf = Vec::new();
    let mut collector = HtmlCollector::default();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                collector.start(&name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                if name == "br" || name == "hr" {
                    collector.start(&name);
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                collector.end(&name);
            }
            Ok(Event::Text(e)) => {
                collector.text(&unescape_lenient(&String::from_utf8_lossy(&e)));
            }
            Ok(Event::CData(e)) => {
                collector.text(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocToolsError::MalformedContainer(format!("{}: {}", path, e)));
            }
            _ => {}
        }
        buf.clear();
    }
    collector.flush_paragraph();
    Ok(collector.blocks)
}

/// Read an EPUB's content documents, in reading order, as flow blocks
pub fn parse_epub(bytes: &[u8]) -> Result<Vec<FlowBlock>> {
    let mut package = PackageReader::open(bytes, "EPUB")?;
    let container = package.read_text(CONTAINER_PATH)?.ok_or_else(|| {
        DocToolsError::MalformedContainer(format!("{} not found", CONTAINER_PATH))
    })?;
    let opf_path = rootfile_path(&container)?;
    let opf = package.read_text(&opf_path)?.ok_or_else(|| {
        DocToolsError::MalformedContainer(format!("Package document {} not found", opf_path))
    })?;

    let mut blocks = Vec::new();
    for path in reading_order(&opf_path, &opf)? {
        let Some(html) = package.read_text(&path)? else {
            tracing::warn!(path = %path, "content document listed but missing, skipping");
            continue;
        };
        let chapter_blocks = html_blocks(&path, &html)?;
        tracing::debug!(path = %path, blocks = chapter_blocks.len(), "read content document");
        blocks.extend(chapter_blocks);
    }
    Ok(blocks)
}
