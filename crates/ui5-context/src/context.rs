//
// context.rs
//
// Context assembler: composes manifest, yaml, framework model, services and
// view information for one document
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cache::documents::DocumentOperation;
use crate::cache::locks::KeyedLocks;
use crate::cache::store::CacheStore;
use crate::error::{ContextError, Resolved};
use crate::manifest::{find_manifest_path, ManifestDetails};
use crate::project::loader::{locate_app, ProjectLoader};
use crate::semantic_model::SemanticModel;
use crate::service_metadata::ServiceDetails;
use crate::version::framework::Framework;
use crate::version::negotiator::VersionNegotiator;
use crate::view::{is_view_file, parse_document, ControlIdMap, DocumentAst};
use crate::yaml::{find_yaml_path, read_yaml, YamlDetails};

/// Folders never searched for view files
const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "target"];

/// Everything editor features need to know about one document
#[derive(Debug, Clone)]
pub struct Context {
    pub document_path: PathBuf,
    pub manifest_details: ManifestDetails,
    pub yaml_details: YamlDetails,
    pub semantic_model: Arc<SemanticModel>,
    /// Unified service path -> service model of the owning app
    pub services: BTreeMap<String, Arc<ServiceDetails>>,
    /// `<appId>.<dotted path>` when the document is a registered custom view, else empty
    pub custom_view_id: String,
    pub view_files: Vec<PathBuf>,
    pub control_ids: ControlIdMap,
}

pub type ContextResult = Result<Context, ContextError>;

pub fn is_context(result: &ContextResult) -> bool {
    result.is_ok()
}

pub struct ContextAssembler {
    store: Arc<CacheStore>,
    loader: Arc<ProjectLoader>,
    negotiator: Arc<VersionNegotiator>,
    default_framework: Framework,
    index_locks: KeyedLocks<PathBuf>,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<CacheStore>,
        loader: Arc<ProjectLoader>,
        negotiator: Arc<VersionNegotiator>,
        default_framework: Framework,
    ) -> Self {
        Self {
            store,
            loader,
            negotiator,
            default_framework,
            index_locks: KeyedLocks::new(),
        }
    }

    pub async fn get_context(&self, document: &Path) -> ContextResult {
        if !document.is_absolute() {
            return Err(ContextError::InvalidPath(document.display().to_string()));
        }
        let result = self.assemble(document).await;
        if let Err(e) = &result {
            log::error!("Failed to assemble context for {}: {}", document.display(), e);
        }
        result
    }

    async fn assemble(&self, document: &Path) -> ContextResult {
        let manifest_details = match find_manifest_path(document) {
            Some(manifest_path) => match self.loader.get_manifest(&manifest_path).await {
                Resolved::Found(manifest) => manifest.details(),
                Resolved::Absent => ManifestDetails::default(),
                Resolved::SoftFailure(e) => return Err(e),
            },
            None => ManifestDetails::default(),
        };

        let yaml_details = self.yaml_details(document).await;
        let requested = yaml_details
            .version
            .clone()
            .or_else(|| manifest_details.min_ui5_version.clone());
        let semantic_model = self
            .negotiator
            .get_semantic_model(yaml_details.framework, requested.as_deref())
            .await;

        let services = self
            .loader
            .get_project_app(document)
            .await
            .into_option()
            .map(|app| app.local_services.clone())
            .unwrap_or_default();

        let (custom_view_id, view_files, control_ids) = match locate_app(document) {
            Some(location) => {
                self.ensure_views_indexed(&location.app_root).await;
                let manifest_dir = location
                    .manifest_path
                    .parent()
                    .unwrap_or(&location.app_root)
                    .to_path_buf();
                (
                    custom_view_id(document, &manifest_dir, &manifest_details).unwrap_or_default(),
                    self.store.documents.document_paths(&location.app_root),
                    self.store
                        .documents
                        .control_ids(&location.app_root)
                        .unwrap_or_default(),
                )
            }
            None => (String::new(), Vec::new(), ControlIdMap::new()),
        };

        Ok(Context {
            document_path: document.to_path_buf(),
            manifest_details,
            yaml_details,
            semantic_model,
            services,
            custom_view_id,
            view_files,
            control_ids,
        })
    }

    /// Yaml details for a document. The nearest ui5.yaml is cached first so
    /// the longest-prefix lookup can see it.
    pub async fn yaml_details(&self, document: &Path) -> YamlDetails {
        if let Some(yaml_path) = find_yaml_path(document) {
            if !self.store.yaml.contains(&yaml_path) {
                match read_yaml(&yaml_path, self.default_framework).await {
                    Ok(Some(details)) => self.store.yaml.set(yaml_path, details),
                    Ok(None) => {}
                    Err(e) => log::warn!("{}", e),
                }
            }
        }
        self.store
            .yaml_details_for(document)
            .unwrap_or_else(|| YamlDetails {
                framework: self.default_framework,
                version: None,
            })
    }

    /// Parse every view and fragment of an app once and build its control id
    /// index. Later edits are applied per document by the change reactor.
    async fn ensure_views_indexed(&self, app_root: &Path) {
        if self.store.documents.has_app(app_root) {
            return;
        }
        let _guard = self.index_locks.lock(&app_root.to_path_buf()).await;
        if self.store.documents.has_app(app_root) {
            return;
        }

        let _timing = crate::perf::TimingGuard::new("view_indexing").detail(app_root.display());
        let root = app_root.to_path_buf();
        let parsed = match tokio::task::spawn_blocking(move || parse_view_files(&root)).await {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("View indexing task failed: {}", e);
                return;
            }
        };

        self.store.documents.delete_app(app_root);
        let first = parsed.first().map(|ast| ast.path.clone());
        for ast in parsed {
            self.store.documents.insert_document(app_root, ast);
        }
        match first {
            // no index exists after delete_app, so this builds it from every document
            Some(first) => self
                .store
                .set_control_index_for_document(app_root, &first, DocumentOperation::Create),
            None => self.store.documents.mark_indexed(app_root),
        }
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Parse all view files below `app_root` in parallel. Unparseable files are
/// logged and left out.
fn parse_view_files(app_root: &Path) -> Vec<DocumentAst> {
    let paths: Vec<PathBuf> = WalkDir::new(app_root)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_view_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    let mut parsed: Vec<DocumentAst> = paths
        .par_iter()
        .filter_map(|path| match parse_document(path, None) {
            Ok(ast) => Some(ast),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        })
        .collect();
    parsed.sort_by(|a, b| a.path.cmp(&b.path));
    parsed
}

/// `<appId>.<path relative to the manifest folder, dotted>` when that name is
/// registered as a custom view in the manifest.
pub fn custom_view_id(document: &Path, manifest_dir: &Path, details: &ManifestDetails) -> Option<String> {
    if details.app_id.is_empty() || !is_view_file(document) {
        return None;
    }
    let relative = document.strip_prefix(manifest_dir).ok()?;
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|component| component.as_os_str().to_str().map(str::to_string))
        .collect();
    let file = segments.pop()?;
    let stem = file
        .strip_suffix(".view.xml")
        .or_else(|| file.strip_suffix(".fragment.xml"))?;
    segments.push(stem.to_string());

    let id = format!("{}.{}", details.app_id, segments.join("."));
    details.custom_views.contains_key(&id).then_some(id)
}
