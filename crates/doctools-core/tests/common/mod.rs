//! Shared fixtures for the integration tests

#![allow(dead_code)]

use lopdf::{
    content::Content, content::Operation, dictionary, Dictionary, Document, Object, Stream,
    StringFormat,
};

/// A Letter-sized PDF whose page `n` shows `"{prefix}-Page-{n}"` at (100, 700).
/// Every page has its own resources and MediaBox.
pub fn create_test_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
    let lines: Vec<Vec<String>> = (1..=num_pages)
        .map(|n| vec![format!("{}-Page-{}", prefix, n)])
        .collect();
    create_text_pdf(&lines)
}

/// One page per entry; each string of an entry is drawn 20pt below the previous one
pub fn create_text_pdf(pages: &[Vec<String>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("TL", vec![20.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
        }
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => pages.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn single_page_pdf(doc: &mut Document, resources: Dictionary, operations: Vec<Operation>) -> Vec<u8> {
    let pages_id = doc.new_object_id();
    let content = Content { operations }.encode().unwrap();
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources,
        "Contents" => Object::Reference(content_id),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => 1,
            "Kids" => vec![Object::Reference(page_id)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// One page drawing `lines` 20pt apart with a Type0 Identity-H font, the way
/// word processors export. Glyph ids are assigned per distinct character and
/// only the ToUnicode CMap maps them back to text.
pub fn create_cid_font_pdf(lines: &[&str]) -> Vec<u8> {
    let mut glyphs: Vec<char> = Vec::new();
    let mut encoded = Vec::new();
    for line in lines {
        let mut bytes = Vec::new();
        for c in line.chars() {
            let gid = match glyphs.iter().position(|&g| g == c) {
                Some(i) => i + 1,
                None => {
                    glyphs.push(c);
                    glyphs.len()
                }
            };
            bytes.extend((gid as u16).to_be_bytes());
        }
        encoded.push(bytes);
    }

    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    cmap.push_str(&format!("{} beginbfchar\n", glyphs.len()));
    for (i, c) in glyphs.iter().enumerate() {
        let mut units = [0u16; 2];
        let hex: String = c
            .encode_utf16(&mut units)
            .iter()
            .map(|u| format!("{:04X}", u))
            .collect();
        cmap.push_str(&format!("<{:04X}> <{}>\n", i + 1, hex));
    }
    cmap.push_str("endbfchar\nendcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");

    let mut doc = Document::with_version("1.7");
    let cmap_id = doc.add_object(Stream::new(Dictionary::new(), cmap.into_bytes()));
    let descendant_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "ABCDEF+Calibri",
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
    });
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "ABCDEF+Calibri",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(descendant_id)],
        "ToUnicode" => Object::Reference(cmap_id),
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("TL", vec![20.into()]),
        Operation::new("Td", vec![100.into(), 700.into()]),
    ];
    for (i, bytes) in encoded.into_iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(bytes, StringFormat::Hexadecimal)],
        ));
    }
    operations.push(Operation::new("ET", vec![]));

    let resources = dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
    };
    single_page_pdf(&mut doc, resources, operations)
}

/// One page whose only content is `/Fm1 Do`; the form draws `text` in Helvetica
pub fn create_form_xobject_pdf(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let form = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        },
        form.encode().unwrap(),
    ));
    let resources = dictionary! {
        "XObject" => dictionary! { "Fm1" => Object::Reference(form_id) },
    };
    single_page_pdf(
        &mut doc,
        resources,
        vec![Operation::new("Do", vec!["Fm1".into()])],
    )
}

/// Raw (undecoded) content stream bytes of every page, in page order
pub fn raw_page_streams(bytes: &[u8]) -> Vec<Vec<u8>> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            doc.get_page_contents(page_id)
                .into_iter()
                .flat_map(|id| {
                    doc.get_object(id)
                        .and_then(Object::as_stream)
                        .map(|s| s.content.clone())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

/// The text shown on every page, fragments joined with spaces
pub fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = doctools_core::PdfDocument::load(bytes).unwrap();
    (0..doc.page_count() as usize)
        .map(|i| doctools_core::join_page_text(&doctools_core::extract_page_text(&doc, i).unwrap()))
        .collect()
}
