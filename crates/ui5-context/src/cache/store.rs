//
// cache/store.rs
//
// Process-wide store of derived artifacts. Each category is independent;
// the store holds no derivation logic.
//

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::category::{Category, LruCategory};
use crate::cache::documents::{DocumentArena, DocumentOperation};
use crate::error::ContextError;
use crate::manifest::Manifest;
use crate::project::cds::CompiledServices;
use crate::project::types::{App, Project};
use crate::semantic_model::SemanticModel;
use crate::version::framework::Framework;
use crate::version::version_map::VersionMap;
use crate::yaml::YamlDetails;

/// Default number of semantic models kept in memory
pub const DEFAULT_MODEL_CACHE_CAPACITY: usize = 8;

/// Key of a remembered negotiation outcome
pub type VersionMemoKey = (Framework, String);

#[derive(Debug)]
pub struct CacheStore {
    /// manifest.json path -> parsed manifest
    pub manifests: Category<PathBuf, Arc<Manifest>>,
    /// app root -> app
    pub apps: Category<PathBuf, Arc<App>>,
    /// project root -> project
    pub projects: Category<PathBuf, Arc<Project>>,
    /// CAP project root -> compiled services
    pub cap_services: Category<PathBuf, Arc<CompiledServices>>,
    /// ui5.yaml path -> framework details
    pub yaml: Category<PathBuf, YamlDetails>,
    /// `framework:version` -> model
    pub semantic_models: LruCategory<String, Arc<SemanticModel>>,
    pub version_maps: Category<Framework, Arc<VersionMap>>,
    /// (framework, requested) -> resolved version
    pub version_memo: Category<VersionMemoKey, String>,
    /// (framework, version) -> sap-ui-version.json
    pub version_infos: Category<VersionMemoKey, Arc<serde_json::Value>>,
    pub documents: DocumentArena,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_CACHE_CAPACITY)
    }
}

impl CacheStore {
    pub fn new(model_capacity: usize) -> Self {
        Self {
            manifests: Category::new(),
            apps: Category::new(),
            projects: Category::new(),
            cap_services: Category::new(),
            yaml: Category::new(),
            semantic_models: LruCategory::with_capacity(model_capacity),
            version_maps: Category::new(),
            version_memo: Category::new(),
            version_infos: Category::new(),
            documents: DocumentArena::new(),
        }
    }

    /// YamlDetails governing `document`: the cached ui5.yaml whose folder is
    /// the longest prefix of the document path.
    pub fn yaml_details_for(&self, document: &Path) -> Option<YamlDetails> {
        self.yaml
            .entries_where(|yaml_path, _| {
                yaml_path
                    .parent()
                    .map(|dir| document.starts_with(dir))
                    .unwrap_or(false)
            })
            .into_iter()
            .max_by_key(|(yaml_path, _)| yaml_path.components().count())
            .map(|(_, details)| details)
    }

    /// Re-parse (`Create`) or drop (`Delete`) a view document artifact.
    pub fn set_document_artifact(
        &self,
        app_root: &Path,
        document: &Path,
        operation: DocumentOperation,
        content: Option<&str>,
    ) -> Result<(), ContextError> {
        self.documents
            .set_document_artifact(app_root, document, operation, content)
    }

    /// Refresh a document's slice of the app's control id index. Run after
    /// `set_document_artifact` for the same document.
    pub fn set_control_index_for_document(
        &self,
        app_root: &Path,
        document: &Path,
        operation: DocumentOperation,
    ) {
        self.documents
            .set_control_index_for_document(app_root, document, operation)
    }

    /// Clear every category. All category locks are taken before anything is
    /// cleared so no reader observes a half-reset store.
    pub fn reset(&self) {
        let manifests = self.manifests.lock();
        let apps = self.apps.lock();
        let projects = self.projects.lock();
        let cap_services = self.cap_services.lock();
        let yaml = self.yaml.lock();
        let semantic_models = self.semantic_models.lock();
        let version_maps = self.version_maps.lock();
        let version_memo = self.version_memo.lock();
        let version_infos = self.version_infos.lock();

        if let Some(mut guard) = manifests {
            guard.clear();
        }
        if let Some(mut guard) = apps {
            guard.clear();
        }
        if let Some(mut guard) = projects {
            guard.clear();
        }
        if let Some(mut guard) = cap_services {
            guard.clear();
        }
        if let Some(mut guard) = yaml {
            guard.clear();
        }
        if let Some(mut guard) = semantic_models {
            guard.clear();
        }
        if let Some(mut guard) = version_maps {
            guard.clear();
        }
        if let Some(mut guard) = version_memo {
            guard.clear();
        }
        if let Some(mut guard) = version_infos {
            guard.clear();
        }
        self.documents.clear();

        log::info!("Cache store reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::types::test_app;
    use proptest::prelude::*;

    fn yaml(version: &str) -> YamlDetails {
        YamlDetails {
            framework: Framework::SapUi5,
            version: Some(version.to_string()),
        }
    }

    #[test]
    fn test_yaml_longest_prefix() {
        let store = CacheStore::default();
        store.yaml.set(PathBuf::from("/a/ui5.yaml"), yaml("1.71.0"));
        store.yaml.set(PathBuf::from("/a/b/ui5.yaml"), yaml("1.120.0"));

        let details = store
            .yaml_details_for(Path::new("/a/b/c/x.xml"))
            .unwrap();
        assert_eq!(details.version.as_deref(), Some("1.120.0"));

        let details = store.yaml_details_for(Path::new("/a/other/x.xml")).unwrap();
        assert_eq!(details.version.as_deref(), Some("1.71.0"));

        // prefix matching is per path component
        assert!(store.yaml_details_for(Path::new("/ab/x.xml")).is_none());
    }

    proptest! {
        #[test]
        fn prop_deepest_yaml_wins(depth in 1usize..6, extra in 0usize..4) {
            let store = CacheStore::default();
            let mut dir = PathBuf::from("/ws");
            for level in 0..depth {
                dir.push(format!("d{level}"));
                store.yaml.set(dir.join("ui5.yaml"), yaml(&format!("1.{level}.0")));
            }
            let mut doc = dir.clone();
            for level in 0..extra {
                doc.push(format!("x{level}"));
            }
            doc.push("Main.view.xml");
            let found = store.yaml_details_for(&doc).unwrap();
            let expected = format!("1.{}.0", depth - 1);
            prop_assert_eq!(found.version.as_deref(), Some(expected.as_str()));
        }
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = CacheStore::default();
        store
            .manifests
            .set(PathBuf::from("/ws/app/webapp/manifest.json"), Arc::new(Manifest::default()));
        store
            .apps
            .set(PathBuf::from("/ws/app"), test_app("/ws/app", "/ws/app"));
        store.yaml.set(PathBuf::from("/ws/app/ui5.yaml"), yaml("1.120.0"));
        store
            .version_memo
            .set((Framework::SapUi5, "1.104.0".into()), "1.105.0".into());
        store
            .semantic_models
            .set("SAPUI5:1.120.0".into(), Arc::new(SemanticModel::default()));
        store
            .set_document_artifact(
                Path::new("/ws/app"),
                Path::new("/ws/app/webapp/view/Main.view.xml"),
                DocumentOperation::Create,
                Some("<View id=\"v\"/>"),
            )
            .unwrap();

        store.reset();

        assert!(store.manifests.is_empty());
        assert!(store.apps.is_empty());
        assert!(store.yaml.is_empty());
        assert!(store.version_memo.is_empty());
        assert!(store.semantic_models.is_empty());
        assert!(store.documents.document_paths(Path::new("/ws/app")).is_empty());
    }

    #[test]
    fn test_round_trip_control_index() {
        let store = CacheStore::default();
        let app = Path::new("/ws/app");
        let doc = Path::new("/ws/app/webapp/view/Main.view.xml");
        let content = r#"<View xmlns="sap.ui.core.mvc"><Button id="b1"/><Button id="b2"/></View>"#;

        store
            .set_document_artifact(app, doc, DocumentOperation::Create, Some(content))
            .unwrap();
        store.set_control_index_for_document(app, doc, DocumentOperation::Create);

        let ast = store.documents.get_document(app, doc).unwrap();
        let direct = crate::view::collect_control_ids(&ast);
        assert_eq!(store.documents.control_ids_for_document(app, doc), Some(direct.clone()));
        assert_eq!(store.documents.control_ids(app), Some(direct));
    }
}
