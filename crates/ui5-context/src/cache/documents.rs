//
// cache/documents.rs
//
// Arena of parsed view documents keyed by (app root, document path), and the
// per-app control id index derived from it
//

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::ContextError;
use crate::view::{collect_control_ids, parse_document, ControlIdMap, DocumentAst};

pub type DocumentKey = (PathBuf, PathBuf);

/// What happened to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOperation {
    Create,
    Delete,
}

/// Per-document slices plus their merged view for one app root
#[derive(Debug, Default)]
struct ControlIndex {
    slices: BTreeMap<PathBuf, ControlIdMap>,
    merged: ControlIdMap,
}

impl ControlIndex {
    fn remerge(&mut self) {
        self.merged = merge_slices(self.slices.values());
    }
}

/// Fold document slices into one map; duplicate locations are dropped.
fn merge_slices<'a>(slices: impl Iterator<Item = &'a ControlIdMap>) -> ControlIdMap {
    let mut merged = ControlIdMap::new();
    for slice in slices {
        for (id, locations) in slice {
            let entry = merged.entry(id.clone()).or_default();
            for location in locations {
                if !entry.contains(location) {
                    entry.push(location.clone());
                }
            }
        }
    }
    merged
}

/// Lock order is always `documents` before `control_ids`.
#[derive(Debug, Default)]
pub struct DocumentArena {
    documents: RwLock<HashMap<DocumentKey, Arc<DocumentAst>>>,
    control_ids: RwLock<HashMap<PathBuf, ControlIndex>>,
}

impl DocumentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_document(&self, app_root: &Path, document: &Path) -> Option<Arc<DocumentAst>> {
        let key = (app_root.to_path_buf(), document.to_path_buf());
        self.documents.read().ok()?.get(&key).cloned()
    }

    /// Cached document paths of an app root, sorted.
    pub fn document_paths(&self, app_root: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .documents
            .read()
            .map(|guard| {
                guard
                    .keys()
                    .filter(|(root, _)| root == app_root)
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// True once the app has documents or an index, even an empty one.
    pub fn has_app(&self, app_root: &Path) -> bool {
        let indexed = self
            .control_ids
            .read()
            .map(|guard| guard.contains_key(app_root))
            .unwrap_or(false);
        indexed
            || self
                .documents
                .read()
                .map(|guard| guard.keys().any(|(root, _)| root == app_root))
                .unwrap_or(false)
    }

    /// Record an app as indexed without documents.
    pub fn mark_indexed(&self, app_root: &Path) {
        if let Ok(mut guard) = self.control_ids.write() {
            guard.entry(app_root.to_path_buf()).or_default();
        }
    }

    /// Insert an already parsed document.
    pub fn insert_document(&self, app_root: &Path, ast: DocumentAst) {
        if let Ok(mut guard) = self.documents.write() {
            guard.insert((app_root.to_path_buf(), ast.path.clone()), Arc::new(ast));
        }
    }

    /// Re-derive (`Create`) or drop (`Delete`) one document artifact.
    ///
    /// Parsing happens before the lock is taken; a parse error is returned
    /// and leaves the previous entry untouched.
    pub fn set_document_artifact(
        &self,
        app_root: &Path,
        document: &Path,
        operation: DocumentOperation,
        content: Option<&str>,
    ) -> Result<(), ContextError> {
        match operation {
            DocumentOperation::Create => {
                let ast = parse_document(document, content)?;
                self.insert_document(app_root, ast);
            }
            DocumentOperation::Delete => {
                if let Ok(mut guard) = self.documents.write() {
                    guard.remove(&(app_root.to_path_buf(), document.to_path_buf()));
                }
            }
        }
        Ok(())
    }

    /// Refresh one document's slice of the app's control id index.
    ///
    /// `Create` reads the currently cached artifact, so it must run after
    /// `set_document_artifact`. When the app has no index yet, the whole index
    /// is rebuilt from every cached document of the app.
    pub fn set_control_index_for_document(
        &self,
        app_root: &Path,
        document: &Path,
        operation: DocumentOperation,
    ) {
        let Ok(documents) = self.documents.read() else {
            return;
        };
        let Ok(mut indexes) = self.control_ids.write() else {
            return;
        };

        match operation {
            DocumentOperation::Create => {
                if let Some(index) = indexes.get_mut(app_root) {
                    let key = (app_root.to_path_buf(), document.to_path_buf());
                    match documents.get(&key) {
                        Some(ast) => {
                            index
                                .slices
                                .insert(document.to_path_buf(), collect_control_ids(ast));
                        }
                        None => {
                            index.slices.remove(document);
                        }
                    }
                    index.remerge();
                } else {
                    let mut index = ControlIndex::default();
                    for ((root, doc), ast) in documents.iter() {
                        if root == app_root {
                            index.slices.insert(doc.clone(), collect_control_ids(ast));
                        }
                    }
                    index.remerge();
                    log::trace!(
                        "Built control id index for {} from {} documents",
                        app_root.display(),
                        index.slices.len()
                    );
                    indexes.insert(app_root.to_path_buf(), index);
                }
            }
            DocumentOperation::Delete => {
                if let Some(index) = indexes.get_mut(app_root) {
                    if index.slices.remove(document).is_some() {
                        index.remerge();
                    }
                }
            }
        }
    }

    /// Merged control id index of an app root.
    pub fn control_ids(&self, app_root: &Path) -> Option<ControlIdMap> {
        self.control_ids
            .read()
            .ok()?
            .get(app_root)
            .map(|index| index.merged.clone())
    }

    /// Control ids contributed by one document.
    pub fn control_ids_for_document(&self, app_root: &Path, document: &Path) -> Option<ControlIdMap> {
        self.control_ids
            .read()
            .ok()?
            .get(app_root)?
            .slices
            .get(document)
            .cloned()
    }

    /// Drop every document and the index of an app root.
    pub fn delete_app(&self, app_root: &Path) {
        if let Ok(mut guard) = self.documents.write() {
            guard.retain(|(root, _), _| root != app_root);
        }
        if let Ok(mut guard) = self.control_ids.write() {
            guard.remove(app_root);
        }
    }

    pub fn clear(&self) {
        let documents = self.documents.write();
        let control_ids = self.control_ids.write();
        if let Ok(mut guard) = documents {
            guard.clear();
        }
        if let Ok(mut guard) = control_ids {
            guard.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = r#"<mvc:View xmlns:mvc="sap.ui.core.mvc" xmlns="sap.m">
  <Button id="save"/>
  <Button id="shared"/>
</mvc:View>"#;

    const DIALOG: &str = r#"<core:FragmentDefinition xmlns:core="sap.ui.core" xmlns="sap.m">
  <Dialog id="shared"/>
</core:FragmentDefinition>"#;

    fn app() -> PathBuf {
        PathBuf::from("/ws/app")
    }

    fn main_view() -> PathBuf {
        PathBuf::from("/ws/app/webapp/view/Main.view.xml")
    }

    fn dialog() -> PathBuf {
        PathBuf::from("/ws/app/webapp/view/Dialog.fragment.xml")
    }

    #[test]
    fn test_document_artifact_create_and_delete() {
        let arena = DocumentArena::new();
        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some(MAIN))
            .unwrap();
        assert!(arena.get_document(&app(), &main_view()).is_some());
        assert!(arena.get_document(Path::new("/ws/other"), &main_view()).is_none());

        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Delete, None)
            .unwrap();
        assert!(arena.get_document(&app(), &main_view()).is_none());
    }

    #[test]
    fn test_parse_failure_keeps_previous_artifact() {
        let arena = DocumentArena::new();
        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some(MAIN))
            .unwrap();
        let err = arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some("<broken"))
            .unwrap_err();
        assert!(matches!(err, ContextError::Xml { .. }));
        assert!(arena.get_document(&app(), &main_view()).is_some());
    }

    #[test]
    fn test_first_create_builds_full_index() {
        let arena = DocumentArena::new();
        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some(MAIN))
            .unwrap();
        arena
            .set_document_artifact(&app(), &dialog(), DocumentOperation::Create, Some(DIALOG))
            .unwrap();

        arena.set_control_index_for_document(&app(), &main_view(), DocumentOperation::Create);

        let merged = arena.control_ids(&app()).unwrap();
        assert_eq!(merged["shared"].len(), 2);
        assert!(merged.contains_key("save"));
        assert!(arena.control_ids_for_document(&app(), &dialog()).is_some());
    }

    #[test]
    fn test_slice_update_and_delete() {
        let arena = DocumentArena::new();
        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some(MAIN))
            .unwrap();
        arena
            .set_document_artifact(&app(), &dialog(), DocumentOperation::Create, Some(DIALOG))
            .unwrap();
        arena.set_control_index_for_document(&app(), &main_view(), DocumentOperation::Create);

        let edited = r#"<mvc:View xmlns:mvc="sap.ui.core.mvc"><Page id="page"/></mvc:View>"#;
        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some(edited))
            .unwrap();
        arena.set_control_index_for_document(&app(), &main_view(), DocumentOperation::Create);

        let merged = arena.control_ids(&app()).unwrap();
        assert!(!merged.contains_key("save"));
        assert_eq!(merged["shared"].len(), 1);
        assert!(merged.contains_key("page"));

        arena.set_control_index_for_document(&app(), &dialog(), DocumentOperation::Delete);
        let merged = arena.control_ids(&app()).unwrap();
        assert!(!merged.contains_key("shared"));
    }

    #[test]
    fn test_mark_indexed_without_documents() {
        let arena = DocumentArena::new();
        assert!(!arena.has_app(&app()));
        arena.mark_indexed(&app());
        assert!(arena.has_app(&app()));
        assert!(arena.document_paths(&app()).is_empty());
        assert_eq!(arena.control_ids(&app()), Some(ControlIdMap::new()));

        arena.delete_app(&app());
        assert!(!arena.has_app(&app()));
    }

    #[test]
    fn test_delete_app_and_clear() {
        let arena = DocumentArena::new();
        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some(MAIN))
            .unwrap();
        arena.set_control_index_for_document(&app(), &main_view(), DocumentOperation::Create);
        assert!(arena.has_app(&app()));

        arena.delete_app(&app());
        assert!(!arena.has_app(&app()));
        assert!(arena.control_ids(&app()).is_none());

        arena
            .set_document_artifact(&app(), &main_view(), DocumentOperation::Create, Some(MAIN))
            .unwrap();
        arena.clear();
        assert!(arena.document_paths(&app()).is_empty());
    }
}
