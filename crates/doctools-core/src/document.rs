//! Document model adapter over lopdf
//!
//! Every page-level operation in this crate goes through [`PdfDocument`].
//! Page indices are 0-based here; the 1-based page numbers used by the
//! public operations are converted at their entry points.

use crate::error::{DocToolsError, Result};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{HashMap, HashSet};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// US Letter, used when a page carries no MediaBox at all
pub const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// An in-memory PDF owned by a single operation
#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: Document,
}

impl PdfDocument {
    /// Create an empty document with a catalog and an empty page tree
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        Self { inner: doc }
    }

    /// Parse PDF bytes
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let inner =
            Document::load_mem(bytes).map_err(|e| DocToolsError::InvalidDocument(e.to_string()))?;
        if inner.trailer.get(b"Root").is_err() {
            return Err(DocToolsError::InvalidDocument(
                "Document has no catalog".into(),
            ));
        }
        Ok(Self { inner })
    }

    pub fn inner(&self) -> &Document {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Document {
        &mut self.inner
    }

    pub fn page_count(&self) -> u32 {
        self.inner.get_pages().len() as u32
    }

    /// Page object ids in page order
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.inner.get_pages().values().copied().collect()
    }

    /// Object id of the page at a 0-based index
    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        let count = self.page_count();
        self.page_ids()
            .get(index)
            .copied()
            .ok_or(DocToolsError::PageOutOfRange {
                page: index as u32 + 1,
                page_count: count,
            })
    }

    /// Width and height of the page at a 0-based index, from its (possibly inherited) MediaBox
    pub fn page_size(&self, index: usize) -> Result<(f32, f32)> {
        let page_id = self.page_id(index)?;
        Ok(self.page_size_by_id(page_id))
    }

    pub(crate) fn page_size_by_id(&self, page_id: ObjectId) -> (f32, f32) {
        let Some(media_box) = self.inherited_attribute(page_id, b"MediaBox") else {
            return DEFAULT_PAGE_SIZE;
        };
        let Ok(values) = self.resolve(&media_box).as_array() else {
            return DEFAULT_PAGE_SIZE;
        };
        let numbers: Vec<f32> = values
            .iter()
            .filter_map(|v| self.resolve(v).as_float().ok())
            .collect();
        if numbers.len() < 4 {
            return DEFAULT_PAGE_SIZE;
        }
        ((numbers[2] - numbers[0]).abs(), (numbers[3] - numbers[1]).abs())
    }

    /// Follow a reference one level, returning the object itself otherwise
    pub(crate) fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.inner.get_object(*id).unwrap_or(obj),
            _ => obj,
        }
    }

    /// Look up a page attribute on the page or, failing that, its ancestors
    pub(crate) fn inherited_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<Object> {
        self.inherited_entry(page_id, key).cloned()
    }

    fn inherited_entry(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = Some(page_id);
        let mut visited = HashSet::new();
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let dict = self.inner.get_object(id).ok()?.as_dict().ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }

    /// Inherited dictionary-valued attribute such as `/Resources`, resolved
    pub(crate) fn inherited_dictionary(&self, page_id: ObjectId, key: &[u8]) -> Option<&Dictionary> {
        self.resolve(self.inherited_entry(page_id, key)?).as_dict().ok()
    }

    /// Copy inherited attributes onto the page dictionary itself
    pub(crate) fn materialize_inherited(&mut self, page_id: ObjectId) -> Result<()> {
        let mut inherited = Vec::new();
        for key in INHERITABLE_KEYS {
            if let Some(value) = self.inherited_attribute(page_id, key) {
                inherited.push((key, value));
            }
        }
        let page = self
            .inner
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| DocToolsError::Operation(e.to_string()))?;
        for (key, value) in inherited {
            if !page.has(key) {
                page.set(key.to_vec(), value);
            }
        }
        Ok(())
    }

    /// Object id of the root Pages node
    fn pages_root_id(&self) -> Result<ObjectId> {
        let catalog_id = self
            .inner
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| DocToolsError::Operation("No Root in trailer".into()))?;

        self.inner
            .get_object(catalog_id)
            .and_then(Object::as_dict)
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(|_| DocToolsError::Operation("Catalog has no Pages reference".into()))
    }

    /// Append page objects (already present in `objects`) to the root page tree
    fn append_to_page_tree(&mut self, new_pages: &[ObjectId]) -> Result<()> {
        let pages_id = self.pages_root_id()?;
        let pages_dict = self
            .inner
            .get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| DocToolsError::Operation("Invalid pages dictionary".into()))?;

        let mut kids = match pages_dict.get(b"Kids") {
            Ok(Object::Array(kids)) => kids.clone(),
            _ => Vec::new(),
        };
        let count = pages_dict
            .get(b"Count")
            .and_then(Object::as_i64)
            .unwrap_or(kids.len() as i64);

        kids.extend(new_pages.iter().map(|&id| Object::Reference(id)));
        pages_dict.set("Kids", Object::Array(kids));
        pages_dict.set("Count", Object::Integer(count + new_pages.len() as i64));
        Ok(())
    }

    /// Copy pages from another document, appending them in the given order.
    ///
    /// Each copied page gets its inherited attributes materialized and every
    /// object it references copied once. References into the source page tree
    /// or to pages that are not being copied are replaced with `null`, so
    /// nothing from unselected pages ends up in this document. Content streams
    /// are copied as-is.
    pub fn copy_pages(&mut self, source: &PdfDocument, indices: &[usize]) -> Result<()> {
        let source_pages = source.page_ids();
        let mut selected = Vec::with_capacity(indices.len());
        for &index in indices {
            let page_id = source_pages.get(index).copied().ok_or(
                DocToolsError::PageOutOfRange {
                    page: index as u32 + 1,
                    page_count: source_pages.len() as u32,
                },
            )?;
            if selected.contains(&page_id) {
                return Err(DocToolsError::InvalidRequest(format!(
                    "Page {} selected more than once",
                    index + 1
                )));
            }
            selected.push(page_id);
        }

        let mut blocked = source.page_tree_nodes();
        blocked.extend(source_pages.iter().filter(|id| !selected.contains(*id)));

        let mut copier = ObjectCopier {
            source: &source.inner,
            map: HashMap::new(),
            blocked,
        };

        let mut new_ids = Vec::with_capacity(selected.len());
        for &page_id in &selected {
            let new_id = self.inner.new_object_id();
            copier.map.insert(page_id, new_id);
            new_ids.push(new_id);
        }

        let dest_pages_id = self.pages_root_id()?;
        for (&page_id, &new_id) in selected.iter().zip(&new_ids) {
            let mut page = source
                .inner
                .get_object(page_id)
                .and_then(Object::as_dict)
                .map_err(|e| DocToolsError::InvalidDocument(e.to_string()))?
                .clone();
            for key in INHERITABLE_KEYS {
                if !page.has(key) {
                    if let Some(value) = source.inherited_attribute(page_id, key) {
                        page.set(key.to_vec(), value);
                    }
                }
            }
            page.remove(b"Parent");

            let mut imported = copier.import_dict(&mut self.inner, &page);
            imported.set("Parent", Object::Reference(dest_pages_id));
            self.inner
                .objects
                .insert(new_id, Object::Dictionary(imported));
        }

        tracing::debug!(
            copied = new_ids.len(),
            objects = copier.map.len(),
            "copied pages"
        );
        self.append_to_page_tree(&new_ids)
    }

    /// Append a new page with the given size, resources and content stream
    pub fn add_page(
        &mut self,
        width: f32,
        height: f32,
        resources: Object,
        content: Vec<u8>,
    ) -> Result<ObjectId> {
        let pages_id = self.pages_root_id()?;
        let content_id = self.inner.add_object(Stream::new(Dictionary::new(), content));
        let page_id = self.inner.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width),
                Object::Real(height),
            ],
            "Resources" => resources,
            "Contents" => Object::Reference(content_id),
        });
        self.append_to_page_tree(&[page_id])?;
        Ok(page_id)
    }

    /// Ids of every Pages node plus the catalog of this document
    fn page_tree_nodes(&self) -> HashSet<ObjectId> {
        let mut nodes: HashSet<ObjectId> = self
            .inner
            .objects
            .iter()
            .filter(|(_, obj)| {
                obj.as_dict()
                    .and_then(|d| d.get(b"Type"))
                    .and_then(Object::as_name)
                    .map(|name| name == b"Pages")
                    .unwrap_or(false)
            })
            .map(|(&id, _)| id)
            .collect();
        if let Ok(root) = self.inner.trailer.get(b"Root").and_then(Object::as_reference) {
            nodes.insert(root);
        }
        nodes
    }

    /// Serialize the document
    pub fn save(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.inner
            .save_to(&mut buffer)
            .map_err(|e| DocToolsError::Operation(format!("Save failed: {}", e)))?;
        Ok(buffer)
    }
}

impl Default for PdfDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-copies objects from one document into another with fresh ids
struct ObjectCopier<'a> {
    source: &'a Document,
    map: HashMap<ObjectId, ObjectId>,
    blocked: HashSet<ObjectId>,
}

impl ObjectCopier<'_> {
    fn import(&mut self, dest: &mut Document, obj: &Object) -> Object {
        match obj {
            Object::Reference(id) => self.import_reference(dest, *id),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.import(dest, item)).collect())
            }
            Object::Dictionary(dict) => Object::Dictionary(self.import_dict(dest, dict)),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.import_dict(dest, &stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn import_dict(&mut self, dest: &mut Document, dict: &Dictionary) -> Dictionary {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            let imported = self.import(dest, value);
            out.set(key.clone(), imported);
        }
        out
    }

    fn import_reference(&mut self, dest: &mut Document, id: ObjectId) -> Object {
        if let Some(&new_id) = self.map.get(&id) {
            return Object::Reference(new_id);
        }
        if self.blocked.contains(&id) {
            return Object::Null;
        }
        let source = self.source;
        let Ok(object) = source.get_object(id) else {
            return Object::Null;
        };
        let new_id = dest.new_object_id();
        self.map.insert(id, new_id);
        let imported = self.import(dest, object);
        dest.objects.insert(new_id, imported);
        Object::Reference(new_id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory PDFs for tests

    use lopdf::{
        content::Content, content::Operation, dictionary, Dictionary, Document, Object, Stream,
    };

    /// A PDF with `num_pages` Letter pages, each showing `"{prefix}-Page-{n}"`.
    /// Resources and MediaBox live on the Pages node so pages inherit them.
    pub fn create_test_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut page_ids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![100.into(), 700.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("{}-Page-{}", prefix, i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Contents" => Object::Reference(content_id),
            });
            page_ids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => num_pages as i64,
                "Kids" => page_ids,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
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

    /// Decoded content of every page, in page order
    pub fn page_contents(bytes: &[u8]) -> Vec<Vec<u8>> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| doc.get_page_content(id).unwrap())
            .collect()
    }

    /// The `Tj` strings of every page, in page order
    pub fn page_labels(bytes: &[u8]) -> Vec<String> {
        page_contents(bytes)
            .iter()
            .map(|content| {
                let content = Content::decode(content).unwrap();
                content
                    .operations
                    .iter()
                    .filter(|op| op.operator == "Tj")
                    .filter_map(|op| op.operands.first())
                    .filter_map(|o| o.as_str().ok())
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_document_is_empty_and_saves() {
        let mut doc = PdfDocument::new();
        assert_eq!(doc.page_count(), 0);
        let bytes = doc.save().unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_load_invalid_bytes_fails() {
        let result = PdfDocument::load(b"definitely not a pdf");
        assert!(matches!(result, Err(DocToolsError::InvalidDocument(_))));
    }

    #[test]
    fn test_page_size_is_inherited() {
        let doc = PdfDocument::load(&create_test_pdf(2, "Size")).unwrap();
        assert_eq!(doc.page_size(1).unwrap(), (612.0, 792.0));
    }

    #[test]
    fn test_page_size_out_of_range() {
        let doc = PdfDocument::load(&create_test_pdf(2, "Size")).unwrap();
        assert!(matches!(
            doc.page_size(2),
            Err(DocToolsError::PageOutOfRange {
                page: 3,
                page_count: 2
            })
        ));
    }

    #[test]
    fn test_copy_pages_materializes_inherited_attributes() {
        let source = PdfDocument::load(&create_test_pdf(3, "Src")).unwrap();
        let mut dest = PdfDocument::new();
        dest.copy_pages(&source, &[2, 0]).unwrap();

        let bytes = dest.save().unwrap();
        assert_eq!(page_labels(&bytes), vec!["Src-Page-3", "Src-Page-1"]);

        let reloaded = PdfDocument::load(&bytes).unwrap();
        let page_id = reloaded.page_id(0).unwrap();
        let page = reloaded.inner().get_object(page_id).unwrap().as_dict().unwrap();
        assert!(page.has(b"Resources"));
        assert!(page.has(b"MediaBox"));
    }

    #[test]
    fn test_copy_pages_does_not_carry_unselected_pages() {
        let source = PdfDocument::load(&create_test_pdf(4, "Src")).unwrap();
        let mut dest = PdfDocument::new();
        dest.copy_pages(&source, &[1]).unwrap();
        let bytes = dest.save().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Src-Page-2"));
        assert!(!text.contains("Src-Page-1"));
        assert!(!text.contains("Src-Page-4"));
    }

    #[test]
    fn test_copy_same_page_twice_rejected() {
        let source = PdfDocument::load(&create_test_pdf(2, "Src")).unwrap();
        let mut dest = PdfDocument::new();
        assert!(matches!(
            dest.copy_pages(&source, &[0, 0]),
            Err(DocToolsError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_add_page_sets_size() {
        let mut doc = PdfDocument::new();
        doc.add_page(595.0, 842.0, Object::Dictionary(Dictionary::new()), Vec::new())
            .unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.page_size(0).unwrap(), (595.0, 842.0));
    }
}
