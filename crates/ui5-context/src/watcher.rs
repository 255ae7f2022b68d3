//
// watcher.rs
//
// Change reactor: per file category invalidation and recompute policy applied
// to the cache store when watched files change
//

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::documents::DocumentOperation;
use crate::cache::store::CacheStore;
use crate::error::ContextError;
use crate::manifest::MANIFEST_FILE;
use crate::project::discovery::{find_project_root, is_cds_file, is_project_descriptor};
use crate::project::loader::{locate_app, ProjectLoader};
use crate::project::types::Project;
use crate::version::framework::Framework;
use crate::view::is_view_file;
use crate::yaml::{read_yaml, UI5_YAML_FILE};

/// Change type codes as sent by the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created = 1,
    Changed = 2,
    Deleted = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Watched file categories, one reaction each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedFile {
    Manifest,
    Cds,
    Yaml,
    Xml,
    ProjectDescriptor,
}

impl WatchedFile {
    pub fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name == MANIFEST_FILE {
            Some(Self::Manifest)
        } else if name == UI5_YAML_FILE {
            Some(Self::Yaml)
        } else if is_project_descriptor(path) {
            Some(Self::ProjectDescriptor)
        } else if is_cds_file(path) {
            Some(Self::Cds)
        } else if name.ends_with(".xml") {
            Some(Self::Xml)
        } else {
            None
        }
    }
}

pub struct ChangeReactor {
    store: Arc<CacheStore>,
    loader: Arc<ProjectLoader>,
    default_framework: Framework,
}

impl ChangeReactor {
    pub fn new(store: Arc<CacheStore>, loader: Arc<ProjectLoader>, default_framework: Framework) -> Self {
        Self {
            store,
            loader,
            default_framework,
        }
    }

    /// Route one notification batch to the category reactions. CDS changes of
    /// the batch are handled together so they coalesce per project.
    pub async fn react(&self, changes: Vec<FileChange>) {
        let mut cds = Vec::new();
        for change in changes {
            match WatchedFile::classify(&change.path) {
                Some(WatchedFile::Manifest) => self.on_manifest_changes(&[change]).await,
                Some(WatchedFile::Yaml) => self.on_yaml_changes(&[change]).await,
                Some(WatchedFile::Xml) => self.on_xml_changes(&[change]).await,
                Some(WatchedFile::ProjectDescriptor) => self.on_project_descriptor_changes(&[change]),
                Some(WatchedFile::Cds) => cds.push(change),
                None => log::trace!("Ignoring change of {}", change.path.display()),
            }
        }
        if !cds.is_empty() {
            self.on_cds_changes(&cds).await;
        }
    }

    /// Drop the project cached at `root` together with every app it holds.
    fn evict_project(&self, root: &Path) -> Option<Arc<Project>> {
        let project = self.store.projects.get(&root.to_path_buf())?;
        for app_root in project.app_roots() {
            self.store.apps.delete(&app_root);
        }
        self.store.projects.delete(&root.to_path_buf());
        log::debug!("Evicted project {}", root.display());
        Some(project)
    }

    /// Evict the project owning `changed` and resolve it again.
    ///
    /// Former apps are re-resolved through their manifests so a CAP project
    /// keeps every app that still resolves.
    async fn cascade(&self, changed: &Path, reresolve_changed: bool) {
        let Some(project_root) = find_project_root(changed) else {
            return;
        };
        let Some(previous) = self.evict_project(&project_root) else {
            log::trace!("No cached project at {}", project_root.display());
            return;
        };

        let mut targets: BTreeSet<PathBuf> = match previous.as_ref() {
            Project::Ui5(project) => BTreeSet::from([project.app.manifest_path.clone()]),
            Project::Cap(project) => project
                .apps()
                .values()
                .map(|app| app.manifest_path.clone())
                .collect(),
        };
        if reresolve_changed {
            targets.insert(changed.to_path_buf());
        } else {
            targets.remove(changed);
        }

        for manifest_path in targets.iter().filter(|path| path.is_file()) {
            self.loader.get_project_app(manifest_path).await.into_option();
        }
    }

    /// Manifest created, changed or deleted: full cascade on the owning project.
    pub async fn on_manifest_changes(&self, changes: &[FileChange]) {
        for change in changes {
            self.store.manifests.delete(&change.path);
            log::trace!("Manifest {} {:?}", change.path.display(), change.kind);
            self.cascade(&change.path, change.kind != FileChangeKind::Deleted)
                .await;
        }
    }

    /// Service definitions changed: recompile once per affected CAP project
    /// and rebuild its apps.
    pub async fn on_cds_changes(&self, changes: &[FileChange]) {
        let roots: BTreeSet<PathBuf> = changes
            .iter()
            .filter_map(|change| find_project_root(&change.path))
            .collect();

        for root in roots {
            self.store.cap_services.delete(&root);
            let Some(project) = self.store.projects.get(&root) else {
                continue;
            };
            let Project::Cap(cap) = project.as_ref() else {
                continue;
            };
            for app_root in cap.apps().keys() {
                self.store.apps.delete(app_root);
            }
            let rebuilt = self.loader.rebuild_cap_project(cap).await;
            log::debug!(
                "Rebuilt CAP project {} with {} app(s)",
                root.display(),
                rebuilt.app_roots().len()
            );
        }
    }

    /// ui5.yaml: overwrite or drop the entry for that exact path.
    pub async fn on_yaml_changes(&self, changes: &[FileChange]) {
        for change in changes {
            if change.kind == FileChangeKind::Deleted {
                self.store.yaml.delete(&change.path);
                continue;
            }
            match read_yaml(&change.path, self.default_framework).await {
                Ok(Some(details)) => self.store.yaml.set(change.path.clone(), details),
                Ok(None) => {
                    self.store.yaml.delete(&change.path);
                }
                Err(e) => {
                    log::warn!("{}", e);
                    self.store.yaml.delete(&change.path);
                }
            }
        }
    }

    /// XML files: registered metadata or annotation sources cascade like a
    /// manifest change; view documents are re-parsed individually.
    pub async fn on_xml_changes(&self, changes: &[FileChange]) {
        for change in changes {
            let Some(location) = locate_app(&change.path) else {
                continue;
            };
            if self.is_registered_source(&location.app_root, &change.path) {
                log::debug!(
                    "Service source {} changed, invalidating {}",
                    change.path.display(),
                    location.app_root.display()
                );
                self.cascade(&location.manifest_path, true).await;
                continue;
            }
            if is_view_file(&change.path) {
                self.refresh_document(&location.app_root, change).await;
            }
        }
    }

    fn is_registered_source(&self, app_root: &Path, path: &Path) -> bool {
        self.store
            .apps
            .get(&app_root.to_path_buf())
            .map(|app| {
                app.manifest
                    .registered_sources(app.manifest_dir())
                    .iter()
                    .any(|source| source == path)
            })
            .unwrap_or(false)
    }

    async fn refresh_document(&self, app_root: &Path, change: &FileChange) {
        // an app whose views were never indexed is indexed in full on first use
        if !self.store.documents.has_app(app_root) {
            return;
        }
        let content = match change.kind {
            FileChangeKind::Deleted => None,
            FileChangeKind::Created | FileChangeKind::Changed => {
                match tokio::fs::read_to_string(&change.path).await {
                    Ok(content) => Some(content),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        log::trace!("{} is gone, dropping it", change.path.display());
                        None
                    }
                    Err(e) => {
                        log::warn!("{}", ContextError::io(&change.path, e));
                        return;
                    }
                }
            }
        };
        let operation = match content {
            Some(_) => DocumentOperation::Create,
            None => DocumentOperation::Delete,
        };
        if let Err(e) = self.store.set_document_artifact(
            app_root,
            &change.path,
            operation,
            content.as_deref(),
        ) {
            log::warn!("{}", e);
            return;
        }
        self.store
            .set_control_index_for_document(app_root, &change.path, operation);
    }

    /// package.json / .cdsrc.json: evict every cached project at or above the
    /// descriptor's folder. Nothing is resolved again until the next request.
    pub fn on_project_descriptor_changes(&self, changes: &[FileChange]) {
        for change in changes {
            for dir in change.path.ancestors().skip(1) {
                self.store.cap_services.delete(&dir.to_path_buf());
                self.evict_project(dir);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::CacheStore;
    use crate::test_utils::fixture_workspace::{catalog_services, CATALOG_SERVICE_PATH};
    use crate::test_utils::{write_cap_project, write_ui5_app, StaticCompiler};
    use tempfile::TempDir;

    fn reactor(compiler: Arc<StaticCompiler>) -> (ChangeReactor, Arc<ProjectLoader>, Arc<CacheStore>) {
        let store = Arc::new(CacheStore::default());
        let loader = Arc::new(ProjectLoader::new(store.clone(), compiler));
        (
            ChangeReactor::new(store.clone(), loader.clone(), Framework::SapUi5),
            loader,
            store,
        )
    }

    #[test]
    fn test_classify() {
        assert_eq!(WatchedFile::classify(Path::new("/a/webapp/manifest.json")), Some(WatchedFile::Manifest));
        assert_eq!(WatchedFile::classify(Path::new("/a/ui5.yaml")), Some(WatchedFile::Yaml));
        assert_eq!(WatchedFile::classify(Path::new("/a/srv/cat.cds")), Some(WatchedFile::Cds));
        assert_eq!(WatchedFile::classify(Path::new("/a/package.json")), Some(WatchedFile::ProjectDescriptor));
        assert_eq!(WatchedFile::classify(Path::new("/a/.cdsrc.json")), Some(WatchedFile::ProjectDescriptor));
        assert_eq!(WatchedFile::classify(Path::new("/a/view/Main.view.xml")), Some(WatchedFile::Xml));
        assert_eq!(WatchedFile::classify(Path::new("/a/Component.js")), None);
    }

    #[tokio::test]
    async fn test_manifest_change_replaces_project() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", None);
        let (reactor, loader, store) = reactor(Arc::new(StaticCompiler::new()));

        let before = loader.get_project(&fixture.main_view).await.into_option().unwrap();
        let before_app = store.apps.get(&fixture.root).unwrap();

        reactor
            .on_manifest_changes(&[FileChange::new(&fixture.manifest, FileChangeKind::Changed)])
            .await;

        let after = store.projects.get(&fixture.root).unwrap();
        let after_app = store.apps.get(&fixture.root).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(!Arc::ptr_eq(&before_app, &after_app));
    }

    #[tokio::test]
    async fn test_manifest_without_cached_project_only_drops_manifest() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", None);
        let (reactor, loader, store) = reactor(Arc::new(StaticCompiler::new()));
        loader.get_manifest(&fixture.manifest).await.into_option().unwrap();

        reactor
            .on_manifest_changes(&[FileChange::new(&fixture.manifest, FileChangeKind::Changed)])
            .await;

        assert!(!store.manifests.contains(&fixture.manifest));
        assert!(store.projects.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_manifest_is_not_resolved_again() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", None);
        let (reactor, loader, store) = reactor(Arc::new(StaticCompiler::new()));
        loader.get_project(&fixture.main_view).await.into_option().unwrap();

        std::fs::remove_file(&fixture.manifest).unwrap();
        reactor
            .on_manifest_changes(&[FileChange::new(&fixture.manifest, FileChangeKind::Deleted)])
            .await;

        assert!(store.projects.is_empty());
        assert!(store.apps.is_empty());
    }

    #[tokio::test]
    async fn test_cds_batch_compiles_once() {
        let dir = TempDir::new().unwrap();
        let cap = write_cap_project(dir.path(), "bookshop", &["admin", "browse"]);
        let compiler = Arc::new(StaticCompiler::new());
        compiler.set(&cap.root, catalog_services());
        let (reactor, loader, store) = reactor(compiler.clone());

        for (_, _, view) in &cap.apps {
            loader.get_project_app(view).await.into_option().unwrap();
        }
        assert_eq!(compiler.calls(), 1);

        let second = cap.root.join("srv/admin-service.cds");
        std::fs::write(&second, "service AdminService {}\n").unwrap();
        reactor
            .react(vec![
                FileChange::new(&cap.service_definition, FileChangeKind::Changed),
                FileChange::new(&second, FileChangeKind::Created),
            ])
            .await;

        assert_eq!(compiler.calls(), 2);
        let project = store.projects.get(&cap.root).unwrap();
        assert_eq!(project.app_roots().len(), 2);
        for app_root in project.app_roots() {
            assert!(store
                .apps
                .get(&app_root)
                .unwrap()
                .service(CATALOG_SERVICE_PATH)
                .is_some());
        }
    }

    #[tokio::test]
    async fn test_yaml_overwrite_and_delete() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", Some("1.108.0"));
        let (reactor, _, store) = reactor(Arc::new(StaticCompiler::new()));

        reactor
            .on_yaml_changes(&[FileChange::new(&fixture.yaml, FileChangeKind::Created)])
            .await;
        assert_eq!(
            store.yaml.get(&fixture.yaml).unwrap().version.as_deref(),
            Some("1.108.0")
        );

        std::fs::write(
            &fixture.yaml,
            "specVersion: \"3.0\"\nframework:\n  name: OpenUI5\n  version: \"1.120.0\"\n",
        )
        .unwrap();
        reactor
            .on_yaml_changes(&[FileChange::new(&fixture.yaml, FileChangeKind::Changed)])
            .await;
        let details = store.yaml.get(&fixture.yaml).unwrap();
        assert_eq!(details.framework, Framework::OpenUi5);
        assert_eq!(details.version.as_deref(), Some("1.120.0"));

        reactor
            .on_yaml_changes(&[FileChange::new(&fixture.yaml, FileChangeKind::Deleted)])
            .await;
        assert!(store.yaml.is_empty());
    }

    #[tokio::test]
    async fn test_view_change_does_not_touch_project() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", None);
        let (reactor, loader, store) = reactor(Arc::new(StaticCompiler::new()));
        let project = loader.get_project(&fixture.main_view).await.into_option().unwrap();

        store
            .set_document_artifact(&fixture.root, &fixture.main_view, DocumentOperation::Create, None)
            .unwrap();
        store.set_control_index_for_document(&fixture.root, &fixture.main_view, DocumentOperation::Create);

        std::fs::write(
            &fixture.main_view,
            "<mvc:View xmlns:mvc=\"sap.ui.core.mvc\" xmlns=\"sap.m\">\n  <Page id=\"renamed\"/>\n</mvc:View>\n",
        )
        .unwrap();
        reactor
            .on_xml_changes(&[FileChange::new(&fixture.main_view, FileChangeKind::Changed)])
            .await;

        let ids = store.documents.control_ids(&fixture.root).unwrap();
        assert!(ids.contains_key("renamed"));
        assert!(!ids.contains_key("page"));
        assert!(Arc::ptr_eq(&project, &store.projects.get(&fixture.root).unwrap()));
    }

    #[tokio::test]
    async fn test_view_missing_on_change_is_dropped() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", None);
        let (reactor, _, store) = reactor(Arc::new(StaticCompiler::new()));
        for view in [&fixture.main_view, &fixture.custom_view] {
            store
                .set_document_artifact(&fixture.root, view, DocumentOperation::Create, None)
                .unwrap();
        }
        store.set_control_index_for_document(&fixture.root, &fixture.main_view, DocumentOperation::Create);

        // removed again before the change notification was handled
        std::fs::remove_file(&fixture.custom_view).unwrap();
        reactor
            .on_xml_changes(&[FileChange::new(&fixture.custom_view, FileChangeKind::Changed)])
            .await;

        assert_eq!(store.documents.document_paths(&fixture.root), vec![fixture.main_view.clone()]);
        let ids = store.documents.control_ids(&fixture.root).unwrap();
        assert!(!ids.contains_key("customPanel"));
        assert!(ids.contains_key("save"));
    }

    #[tokio::test]
    async fn test_view_created_in_app_without_views() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", None);
        let (reactor, _, store) = reactor(Arc::new(StaticCompiler::new()));
        store.documents.mark_indexed(&fixture.root);

        let created = fixture.root.join("webapp/view/Detail.view.xml");
        std::fs::write(&created, "<mvc:View xmlns:mvc=\"sap.ui.core.mvc\"><Page id=\"detail\"/></mvc:View>").unwrap();
        reactor
            .on_xml_changes(&[FileChange::new(&created, FileChangeKind::Created)])
            .await;

        assert_eq!(store.documents.document_paths(&fixture.root), vec![created]);
        assert!(store.documents.control_ids(&fixture.root).unwrap().contains_key("detail"));
    }

    #[tokio::test]
    async fn test_annotation_change_cascades() {
        let dir = TempDir::new().unwrap();
        let fixture = write_ui5_app(dir.path(), "sales", None);
        let (reactor, loader, store) = reactor(Arc::new(StaticCompiler::new()));
        let before = loader.get_project(&fixture.main_view).await.into_option().unwrap();

        std::fs::write(
            &fixture.annotation,
            crate::test_utils::fixture_workspace::SALES_ANNOTATIONS.replace("\"Amount\"", "\"Total\""),
        )
        .unwrap();
        reactor
            .on_xml_changes(&[FileChange::new(&fixture.annotation, FileChangeKind::Changed)])
            .await;

        let after = store.projects.get(&fixture.root).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        let service = store.apps.get(&fixture.root).unwrap().main_service().unwrap().clone();
        assert_eq!(
            service.converted_metadata.annotations["SalesService.Orders/amount"]["Common.Label"],
            "Total"
        );
    }

    #[tokio::test]
    async fn test_descriptor_change_evicts_lazily() {
        let dir = TempDir::new().unwrap();
        let cap = write_cap_project(dir.path(), "bookshop", &["admin"]);
        let compiler = Arc::new(StaticCompiler::new());
        compiler.set(&cap.root, catalog_services());
        let (reactor, loader, store) = reactor(compiler.clone());
        loader.get_project_app(&cap.apps[0].2).await.into_option().unwrap();

        reactor.on_project_descriptor_changes(&[FileChange::new(&cap.package_json, FileChangeKind::Changed)]);

        assert!(store.projects.is_empty());
        assert!(store.apps.is_empty());
        assert!(store.cap_services.is_empty());
        assert_eq!(compiler.calls(), 1);
    }
}
