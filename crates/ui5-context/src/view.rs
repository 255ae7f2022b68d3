//
// view.rs
//
// XML view / fragment parsing into an owned syntax tree, and collection of
// control ids declared in it
//

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ContextError;

const VIEW_SUFFIXES: &[&str] = &[".view.xml", ".fragment.xml"];

/// Zero-based line/column position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlAttribute {
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
    pub value_position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlElement {
    pub name: String,
    pub namespace: Option<String>,
    pub position: Position,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.find_attribute(name).map(|attr| attr.value.as_str())
    }

    pub fn find_attribute(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes
            .iter()
            .find(|attr| attr.namespace.is_none() && attr.name == name)
    }

    /// Pre-order traversal of this element and its descendants.
    pub fn walk(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(element) = stack.pop() {
            out.push(element);
            stack.extend(element.children.iter().rev());
        }
        out
    }
}

/// Parsed view or fragment document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentAst {
    pub path: PathBuf,
    pub root: XmlElement,
}

/// Declaration site of a control id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ControlIdLocation {
    pub path: PathBuf,
    pub position: Position,
}

/// Control id -> every location declaring it, in document order
pub type ControlIdMap = IndexMap<String, Vec<ControlIdLocation>>;

pub fn is_view_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| VIEW_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
        .unwrap_or(false)
}

/// Parse a view document. When `content` is `None` the file is read from disk.
pub fn parse_document(path: &Path, content: Option<&str>) -> Result<DocumentAst, ContextError> {
    let owned;
    let text = match content {
        Some(text) => text,
        None => {
            owned = std::fs::read_to_string(path).map_err(|e| ContextError::io(path, e))?;
            owned.as_str()
        }
    };

    let doc = roxmltree::Document::parse(text).map_err(|e| ContextError::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(DocumentAst {
        path: path.to_path_buf(),
        root: convert_element(&doc, doc.root_element()),
    })
}

fn convert_element(doc: &roxmltree::Document<'_>, node: roxmltree::Node<'_, '_>) -> XmlElement {
    XmlElement {
        name: node.tag_name().name().to_string(),
        namespace: node.tag_name().namespace().map(str::to_string),
        position: position_at(doc, node.range().start),
        attributes: node
            .attributes()
            .map(|attr| XmlAttribute {
                name: attr.name().to_string(),
                namespace: attr.namespace().map(str::to_string),
                value: attr.value().to_string(),
                value_position: position_at(doc, attr.range_value().start),
            })
            .collect(),
        children: node
            .children()
            .filter(|child| child.is_element())
            .map(|child| convert_element(doc, child))
            .collect(),
    }
}

fn position_at(doc: &roxmltree::Document<'_>, offset: usize) -> Position {
    let pos = doc.text_pos_at(offset);
    Position {
        line: pos.row.saturating_sub(1),
        column: pos.col.saturating_sub(1),
    }
}

/// Collect every `id` attribute of the document, keyed by id value.
pub fn collect_control_ids(ast: &DocumentAst) -> ControlIdMap {
    let mut ids = ControlIdMap::new();
    for element in ast.root.walk() {
        let Some(attr) = element.find_attribute("id") else {
            continue;
        };
        if attr.value.is_empty() {
            continue;
        }
        ids.entry(attr.value.clone())
            .or_default()
            .push(ControlIdLocation {
                path: ast.path.clone(),
                position: attr.value_position,
            });
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: &str = r#"<mvc:View controllerName="app.controller.Main"
    xmlns:mvc="sap.ui.core.mvc" xmlns="sap.m">
  <Page id="page" title="Orders">
    <content>
      <Button id="save" text="Save"/>
      <Button id="cancel" text="Cancel"/>
      <Text id="save"/>
    </content>
  </Page>
</mvc:View>"#;

    #[test]
    fn test_is_view_file() {
        assert!(is_view_file(Path::new("/app/webapp/view/Main.view.xml")));
        assert!(is_view_file(Path::new("/app/webapp/view/Dialog.fragment.xml")));
        assert!(!is_view_file(Path::new("/app/webapp/annotations/annotation.xml")));
        assert!(!is_view_file(Path::new("/app/webapp/manifest.json")));
    }

    #[test]
    fn test_parse_document_tree() {
        let ast = parse_document(Path::new("/app/Main.view.xml"), Some(VIEW)).unwrap();
        assert_eq!(ast.root.name, "View");
        assert_eq!(ast.root.namespace.as_deref(), Some("sap.ui.core.mvc"));
        assert_eq!(ast.root.attribute("controllerName"), Some("app.controller.Main"));
        let page = &ast.root.children[0];
        assert_eq!(page.name, "Page");
        assert_eq!(page.position, Position { line: 2, column: 2 });
    }

    #[test]
    fn test_parse_error_is_xml_error() {
        let err = parse_document(Path::new("/app/Broken.view.xml"), Some("<mvc:View")).unwrap_err();
        assert!(matches!(err, ContextError::Xml { .. }));
    }

    #[test]
    fn test_collect_control_ids_multi_value() {
        let ast = parse_document(Path::new("/app/Main.view.xml"), Some(VIEW)).unwrap();
        let ids = collect_control_ids(&ast);
        assert_eq!(
            ids.keys().cloned().collect::<Vec<_>>(),
            vec!["page", "save", "cancel"]
        );
        let save = &ids["save"];
        assert_eq!(save.len(), 2);
        assert_eq!(save[0].position.line, 4);
        assert_eq!(save[1].position.line, 6);
        assert_eq!(ids["page"][0].position, Position { line: 2, column: 12 });
    }
}
