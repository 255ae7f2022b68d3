//
// project/types.rs
//
// App and Project records produced by the project loader
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::manifest::{Manifest, ManifestDetails};
use crate::project::discovery::unify_service_path;
use crate::service_metadata::ServiceDetails;

/// Backend runtime of a CAP project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CapKind {
    Java,
    NodeJs,
}

/// Classification of a project root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProjectKind {
    Ui5,
    Cap(CapKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub root: PathBuf,
    pub kind: ProjectKind,
}

/// One UI5 application with its locally resolved services
#[derive(Debug, Clone)]
pub struct App {
    pub app_root: PathBuf,
    pub project_root: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: Arc<Manifest>,
    pub manifest_details: ManifestDetails,
    /// Unified service path -> service model
    pub local_services: BTreeMap<String, Arc<ServiceDetails>>,
}

impl App {
    /// Folder holding the manifest; local URIs resolve against it.
    pub fn manifest_dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or(&self.app_root)
    }

    pub fn service(&self, path: &str) -> Option<&Arc<ServiceDetails>> {
        self.local_services.get(&unify_service_path(path))
    }

    pub fn main_service(&self) -> Option<&Arc<ServiceDetails>> {
        self.manifest_details
            .main_service_path
            .as_deref()
            .and_then(|path| self.service(path))
    }
}

#[derive(Debug, Clone)]
pub struct Ui5Project {
    pub root: PathBuf,
    pub app: Arc<App>,
}

/// A CAP project: one backend model, any number of apps.
///
/// Fields are private so the app map can only hold apps of this root.
#[derive(Debug, Clone)]
pub struct CapProject {
    root: PathBuf,
    kind: CapKind,
    apps: BTreeMap<PathBuf, Arc<App>>,
}

impl CapProject {
    pub fn new(root: PathBuf, kind: CapKind) -> Self {
        Self {
            root,
            kind,
            apps: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind(&self) -> CapKind {
        self.kind
    }

    pub fn apps(&self) -> &BTreeMap<PathBuf, Arc<App>> {
        &self.apps
    }

    pub fn app(&self, app_root: &Path) -> Option<&Arc<App>> {
        self.apps.get(app_root)
    }

    /// Add or replace an app. Returns false (and leaves the map untouched)
    /// when the app belongs to a different project root.
    pub fn insert_app(&mut self, app: Arc<App>) -> bool {
        if app.project_root != self.root {
            log::warn!(
                "Refusing to add app {} of project {} to project {}",
                app.app_root.display(),
                app.project_root.display(),
                self.root.display()
            );
            return false;
        }
        self.apps.insert(app.app_root.clone(), app);
        true
    }

    pub fn with_app(&self, app: Arc<App>) -> Self {
        let mut next = self.clone();
        next.insert_app(app);
        next
    }
}

#[derive(Debug, Clone)]
pub enum Project {
    Ui5(Ui5Project),
    Cap(CapProject),
}

impl Project {
    pub fn root(&self) -> &Path {
        match self {
            Project::Ui5(project) => &project.root,
            Project::Cap(project) => project.root(),
        }
    }

    pub fn kind(&self) -> ProjectKind {
        match self {
            Project::Ui5(_) => ProjectKind::Ui5,
            Project::Cap(project) => ProjectKind::Cap(project.kind()),
        }
    }

    pub fn app(&self, app_root: &Path) -> Option<&Arc<App>> {
        match self {
            Project::Ui5(project) => (project.app.app_root == app_root).then_some(&project.app),
            Project::Cap(project) => project.app(app_root),
        }
    }

    pub fn app_roots(&self) -> Vec<PathBuf> {
        match self {
            Project::Ui5(project) => vec![project.app.app_root.clone()],
            Project::Cap(project) => project.apps().keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_app(project_root: &str, app_root: &str) -> Arc<App> {
    Arc::new(App {
        app_root: PathBuf::from(app_root),
        project_root: PathBuf::from(project_root),
        manifest_path: PathBuf::from(app_root).join("webapp/manifest.json"),
        manifest: Arc::new(Manifest::default()),
        manifest_details: ManifestDetails::default(),
        local_services: BTreeMap::new(),
    })
}
