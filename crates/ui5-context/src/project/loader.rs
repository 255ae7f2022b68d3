//
// project/loader.rs
//
// Classifies the project owning a document and assembles its App records.
// Every step memoizes through the cache store; only successes are cached.
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;

use crate::cache::locks::KeyedLocks;
use crate::cache::store::CacheStore;
use crate::error::{ContextError, Resolved};
use crate::manifest::{app_root_for_manifest, find_manifest_path, read_manifest, Manifest};
use crate::project::cds::{CompiledServices, ServiceCompiler};
use crate::project::discovery::{classify_project, find_project_root, unify_service_path};
use crate::project::types::{App, CapKind, CapProject, Project, ProjectInfo, ProjectKind, Ui5Project};
use crate::service_metadata::{parse_and_merge_service, ServiceInput};

/// Location of the app a document belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLocation {
    pub app_root: PathBuf,
    pub manifest_path: PathBuf,
}

/// Nearest manifest and its app root for a document.
pub fn locate_app(document: &Path) -> Option<AppLocation> {
    let manifest_path = find_manifest_path(document)?;
    let app_root = app_root_for_manifest(&manifest_path)?;
    Some(AppLocation {
        app_root,
        manifest_path,
    })
}

pub struct ProjectLoader {
    store: Arc<CacheStore>,
    compiler: Arc<dyn ServiceCompiler>,
    project_locks: KeyedLocks<PathBuf>,
    app_locks: KeyedLocks<PathBuf>,
    service_locks: KeyedLocks<PathBuf>,
}

impl ProjectLoader {
    pub fn new(store: Arc<CacheStore>, compiler: Arc<dyn ServiceCompiler>) -> Self {
        Self {
            store,
            compiler,
            project_locks: KeyedLocks::new(),
            app_locks: KeyedLocks::new(),
            service_locks: KeyedLocks::new(),
        }
    }

    /// Parsed manifest, cached by path.
    pub async fn get_manifest(&self, manifest_path: &Path) -> Resolved<Arc<Manifest>> {
        if let Some(manifest) = self.store.manifests.get(&manifest_path.to_path_buf()) {
            return Resolved::Found(manifest);
        }
        let resolved: Resolved<Manifest> = read_manifest(manifest_path).await.into();
        let resolved = resolved.map(Arc::new);
        if let Resolved::Found(manifest) = &resolved {
            self.store
                .manifests
                .set(manifest_path.to_path_buf(), manifest.clone());
        }
        resolved
    }

    /// Project owning `document`. A cached project is returned without
    /// re-validation.
    pub async fn get_project(&self, document: &Path) -> Resolved<Arc<Project>> {
        let Some(project_root) = find_project_root(document) else {
            log::trace!("No project root above {}", document.display());
            return Resolved::Absent;
        };
        if let Some(project) = self.store.projects.get(&project_root) {
            return Resolved::Found(project);
        }
        let Some(location) = locate_app(document) else {
            log::trace!("No manifest above {}", document.display());
            return Resolved::Absent;
        };

        let _guard = self.project_locks.lock(&project_root).await;
        if let Some(project) = self.store.projects.get(&project_root) {
            return Resolved::Found(project);
        }
        self.resolve_project(&project_root, &location).await
    }

    async fn resolve_project(&self, project_root: &Path, location: &AppLocation) -> Resolved<Arc<Project>> {
        let _timing = crate::perf::TimingGuard::with_threshold("project_resolution", 1_000)
            .detail(project_root.display());
        crate::perf::increment_project_resolutions();

        let manifest = match self.get_manifest(&location.manifest_path).await {
            Resolved::Found(manifest) => manifest,
            Resolved::Absent => return Resolved::Absent,
            Resolved::SoftFailure(e) => return Resolved::SoftFailure(e),
        };
        let info = ProjectInfo {
            root: project_root.to_path_buf(),
            kind: classify_project(project_root),
        };

        let project = match info.kind {
            ProjectKind::Cap(CapKind::Java) => {
                log::info!(
                    "Java CAP project at {} is not supported",
                    project_root.display()
                );
                return Resolved::Absent;
            }
            ProjectKind::Cap(kind @ CapKind::NodeJs) => {
                let app = match self.get_app(&info, location, manifest).await {
                    Resolved::Found(app) => app,
                    Resolved::Absent => return Resolved::Absent,
                    Resolved::SoftFailure(e) => return Resolved::SoftFailure(e),
                };
                let mut project = CapProject::new(project_root.to_path_buf(), kind);
                project.insert_app(app);
                Project::Cap(project)
            }
            ProjectKind::Ui5 => {
                let app = match self.get_app(&info, location, manifest).await {
                    Resolved::Found(app) => app,
                    Resolved::Absent => return Resolved::Absent,
                    Resolved::SoftFailure(e) => return Resolved::SoftFailure(e),
                };
                Project::Ui5(Ui5Project {
                    root: project_root.to_path_buf(),
                    app,
                })
            }
        };

        let project = Arc::new(project);
        self.store
            .projects
            .set(project_root.to_path_buf(), project.clone());
        log::debug!(
            "Resolved {:?} project at {} with {} app(s)",
            project.kind(),
            project_root.display(),
            project.app_roots().len()
        );
        Resolved::Found(project)
    }

    /// App at `location`, cached by app root.
    ///
    /// An app without a main service is `Absent`. An app whose service
    /// metadata cannot be obtained or parsed is still built, with no services.
    pub async fn get_app(
        &self,
        info: &ProjectInfo,
        location: &AppLocation,
        manifest: Arc<Manifest>,
    ) -> Resolved<Arc<App>> {
        if let Some(app) = self.store.apps.get(&location.app_root) {
            return Resolved::Found(app);
        }
        let _guard = self.app_locks.lock(&location.app_root).await;
        if let Some(app) = self.store.apps.get(&location.app_root) {
            return Resolved::Found(app);
        }

        let Some(service_name) = manifest.main_service_name() else {
            log::trace!("{} declares no main service", location.manifest_path.display());
            return Resolved::Absent;
        };
        let Some(service_uri) = manifest
            .data_source(&service_name)
            .and_then(|source| source.uri.clone())
        else {
            log::trace!("Data source {} has no uri", service_name);
            return Resolved::Absent;
        };
        let service_path = unify_service_path(&service_uri);
        let manifest_dir = location
            .manifest_path
            .parent()
            .unwrap_or(&location.app_root)
            .to_path_buf();

        let annotation_contents =
            read_annotation_files(manifest.annotation_paths(&service_name, &manifest_dir)).await;

        let metadata_content = match info.kind {
            ProjectKind::Cap(_) => match self.get_compiled_services(&info.root).await {
                Resolved::Found(compiled) => compiled.metadata_for(&service_path).map(str::to_string),
                other => {
                    other.into_option();
                    None
                }
            },
            ProjectKind::Ui5 => match manifest.local_metadata_path(&service_name, &manifest_dir) {
                Some(path) => read_optional(&path).await,
                None => None,
            },
        };

        let mut local_services = BTreeMap::new();
        if metadata_content.is_some() {
            let details = parse_and_merge_service(ServiceInput {
                path: &service_path,
                metadata_content: metadata_content.as_deref(),
                annotation_contents: &annotation_contents,
            });
            match details {
                Some(details) => {
                    local_services.insert(service_path.clone(), Arc::new(details));
                }
                None => log::debug!("No usable metadata for {}", service_path),
            }
        } else {
            log::debug!(
                "No metadata available for {} of {}",
                service_path,
                location.app_root.display()
            );
        }

        let app = Arc::new(App {
            app_root: location.app_root.clone(),
            project_root: info.root.clone(),
            manifest_path: location.manifest_path.clone(),
            manifest_details: manifest.details(),
            manifest,
            local_services,
        });
        self.store
            .apps
            .set(location.app_root.clone(), app.clone());
        Resolved::Found(app)
    }

    /// Compiled CDS services of a CAP project, compiled once and shared by
    /// all apps of the project. Failures are not cached.
    pub async fn get_compiled_services(&self, project_root: &Path) -> Resolved<Arc<CompiledServices>> {
        let key = project_root.to_path_buf();
        if let Some(compiled) = self.store.cap_services.get(&key) {
            return Resolved::Found(compiled);
        }
        let _guard = self.service_locks.lock(&key).await;
        if let Some(compiled) = self.store.cap_services.get(&key) {
            return Resolved::Found(compiled);
        }
        match self.compiler.compile(project_root).await {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                self.store.cap_services.set(key, compiled.clone());
                Resolved::Found(compiled)
            }
            Err(e) => Resolved::SoftFailure(e),
        }
    }

    /// App owning `document`. When the cached CAP project does not contain
    /// the document's app yet, the app is built and the project replaced by
    /// one that includes it.
    pub async fn get_project_app(&self, document: &Path) -> Resolved<Arc<App>> {
        let project = match self.get_project(document).await {
            Resolved::Found(project) => project,
            Resolved::Absent => return Resolved::Absent,
            Resolved::SoftFailure(e) => return Resolved::SoftFailure(e),
        };
        let Some(location) = locate_app(document) else {
            return Resolved::Absent;
        };
        if let Some(app) = project.app(&location.app_root) {
            return Resolved::Found(app.clone());
        }
        let Project::Cap(_) = project.as_ref() else {
            return Resolved::Absent;
        };

        let manifest = match self.get_manifest(&location.manifest_path).await {
            Resolved::Found(manifest) => manifest,
            Resolved::Absent => return Resolved::Absent,
            Resolved::SoftFailure(e) => return Resolved::SoftFailure(e),
        };
        let info = ProjectInfo {
            root: project.root().to_path_buf(),
            kind: project.kind(),
        };
        let app = match self.get_app(&info, &location, manifest).await {
            Resolved::Found(app) => app,
            other => return other,
        };

        let _guard = self.project_locks.lock(&info.root).await;
        // the project may have been replaced or evicted while the app was built
        if let Some(current) = self.store.projects.get(&info.root) {
            if let Project::Cap(cap) = current.as_ref() {
                let extended = Arc::new(Project::Cap(cap.with_app(app.clone())));
                self.store.projects.set(info.root.clone(), extended);
                log::debug!(
                    "Added app {} to CAP project {}",
                    location.app_root.display(),
                    info.root.display()
                );
            }
        }
        Resolved::Found(app)
    }

    /// Rebuild every app of a CAP project after its service model changed.
    ///
    /// The caller deletes the compiled services and the old apps first. The
    /// first app rebuild recompiles the services; the others reuse them.
    /// Manifests come from the manifest cache, so an edited or deleted
    /// manifest is picked up. Apps that no longer resolve are dropped from the
    /// project.
    pub async fn rebuild_cap_project(&self, previous: &CapProject) -> Arc<Project> {
        let info = ProjectInfo {
            root: previous.root().to_path_buf(),
            kind: ProjectKind::Cap(previous.kind()),
        };
        let _guard = self.project_locks.lock(&info.root).await;

        let mut rebuilt = CapProject::new(info.root.clone(), previous.kind());
        for (app_root, old_app) in previous.apps() {
            let location = AppLocation {
                app_root: app_root.clone(),
                manifest_path: old_app.manifest_path.clone(),
            };
            let manifest = match self.get_manifest(&location.manifest_path).await {
                Resolved::Found(manifest) => manifest,
                other => {
                    other.into_option();
                    log::debug!("Dropping app {} without manifest", app_root.display());
                    continue;
                }
            };
            match self.get_app(&info, &location, manifest).await {
                Resolved::Found(app) => {
                    rebuilt.insert_app(app);
                }
                other => {
                    other.into_option();
                    log::debug!("Dropping app {} from {}", app_root.display(), info.root.display());
                }
            }
        }

        let project = Arc::new(Project::Cap(rebuilt));
        self.store.projects.set(info.root.clone(), project.clone());
        project
    }
}

async fn read_optional(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::trace!("{} does not exist", path.display());
            None
        }
        Err(e) => {
            log::warn!("{}", ContextError::io(path, e));
            None
        }
    }
}

/// Read annotation files concurrently, keeping declaration order and
/// skipping unreadable ones.
async fn read_annotation_files(paths: Vec<PathBuf>) -> Vec<(PathBuf, String)> {
    let contents = join_all(paths.iter().map(|path| read_optional(path))).await;
    paths
        .into_iter()
        .zip(contents)
        .filter_map(|(path, content)| content.map(|content| (path, content)))
        .collect()
}
