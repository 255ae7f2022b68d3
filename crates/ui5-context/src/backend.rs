//
// backend.rs
//
// Language server glue: configuration, watched-file routing and the
// ui5/context request
//

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::config::ContextConfig;
use crate::context::{Context, ContextResult};
use crate::state::WorldState;
use crate::version::framework::Framework;
use crate::watcher::{FileChange, FileChangeKind};

/// Glob patterns registered for `workspace/didChangeWatchedFiles`
const WATCHED_GLOBS: &[&str] = &[
    "**/manifest.json",
    "**/ui5.yaml",
    "**/*.cds",
    "**/*.xml",
    "**/package.json",
    "**/.cdsrc.json",
];

/// Parse the engine configuration from LSP settings.
///
/// Reads the top-level `ui5Context` section. Keys that are absent keep their
/// defaults. Returns `None` when the section is missing.
pub fn parse_context_config(settings: &serde_json::Value) -> Option<ContextConfig> {
    let section = settings.get("ui5Context")?;
    let mut config = ContextConfig::default();

    if let Some(v) = section.get("defaultFramework").and_then(|v| v.as_str()) {
        match Framework::parse(v) {
            Some(framework) => config.default_framework = framework,
            None => log::warn!("Unknown framework '{}', keeping {}", v, config.default_framework),
        }
    }
    if let Some(v) = section.get("cachePath") {
        // null or "" disables the disk cache
        config.cache_path = v
            .as_str()
            .filter(|s| !s.is_empty() && !s.contains('\0'))
            .map(PathBuf::from);
    }
    if let Some(v) = section.get("sapui5Url").and_then(|v| v.as_str()) {
        config.sapui5_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = section.get("openui5Url").and_then(|v| v.as_str()) {
        config.openui5_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = section.get("fetchTimeoutMs").and_then(|v| v.as_u64()) {
        config.fetch_timeout_ms = v;
    }
    if let Some(v) = section.get("offline").and_then(|v| v.as_bool()) {
        config.offline = v;
    }
    if let Some(v) = section.get("modelCacheCapacity").and_then(|v| v.as_u64()) {
        config.model_cache_capacity = (v as usize).max(1);
    }
    if let Some(v) = section.get("cdsCommand").and_then(|v| v.as_str()) {
        if !v.is_empty() && !v.contains('\0') {
            config.cds_command = PathBuf::from(v);
        }
    }
    if let Some(v) = section.get("cdsTimeoutMs").and_then(|v| v.as_u64()) {
        config.cds_timeout_ms = v;
    }

    log::info!("UI5 context configuration loaded from LSP settings:");
    log::info!("  default_framework: {}", config.default_framework);
    log::info!("  cache_path: {:?}", config.cache_path);
    log::info!("  sapui5_url: {}", config.sapui5_url);
    log::info!("  openui5_url: {}", config.openui5_url);
    log::info!("  fetch_timeout_ms: {}", config.fetch_timeout_ms);
    log::info!("  offline: {}", config.offline);
    log::info!("  model_cache_capacity: {}", config.model_cache_capacity);
    log::info!("  cds_command: {}", config.cds_command.display());
    log::info!("  cds_timeout_ms: {}", config.cds_timeout_ms);

    Some(config)
}

/// Parameters of the ui5/context request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextParams {
    pub uri: Url,
}

/// JSON summary of a context returned to the editor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub app_id: String,
    pub framework: Framework,
    pub version: String,
    pub is_fallback: bool,
    pub is_incorrect_version: bool,
    pub service_paths: Vec<String>,
    pub custom_view_id: String,
    pub view_file_count: usize,
    pub control_id_count: usize,
}

impl From<&Context> for ContextSummary {
    fn from(context: &Context) -> Self {
        let model = &context.semantic_model;
        Self {
            app_id: context.manifest_details.app_id.clone(),
            framework: model.framework,
            version: model.version.clone(),
            is_fallback: model.is_fallback,
            is_incorrect_version: model.is_incorrect_version,
            service_paths: context.services.keys().cloned().collect(),
            custom_view_id: context.custom_view_id.clone(),
            view_file_count: context.view_files.len(),
            control_id_count: context.control_ids.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextResponse {
    Context(ContextSummary),
    Error { error: String },
}

impl From<ContextResult> for ContextResponse {
    fn from(result: ContextResult) -> Self {
        match result {
            Ok(context) => ContextResponse::Context(ContextSummary::from(&context)),
            Err(e) => ContextResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

/// Translate one LSP file event; unknown change types and non-file URIs are dropped.
fn file_change(event: &FileEvent) -> Option<FileChange> {
    let kind = match event.typ {
        FileChangeType::CREATED => FileChangeKind::Created,
        FileChangeType::CHANGED => FileChangeKind::Changed,
        FileChangeType::DELETED => FileChangeKind::Deleted,
        _ => return None,
    };
    let path = event.uri.to_file_path().ok()?;
    Some(FileChange::new(path, kind))
}

pub struct Backend {
    client: Client,
    state: Arc<RwLock<WorldState>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(WorldState::new(ContextConfig::default()))),
        }
    }

    async fn handle_context_request(&self, params: ContextParams) -> Result<ContextResponse> {
        let assembler = self.state.read().await.assembler.clone();
        let Ok(path) = params.uri.to_file_path() else {
            return Ok(ContextResponse::Error {
                error: format!("not a file URI: {}", params.uri),
            });
        };
        Ok(assembler.get_context(&path).await.into())
    }

    async fn register_watchers(&self) {
        let watchers = WATCHED_GLOBS
            .iter()
            .map(|glob| FileSystemWatcher {
                glob_pattern: GlobPattern::String(glob.to_string()),
                kind: None,
            })
            .collect();
        let options = DidChangeWatchedFilesRegistrationOptions { watchers };
        let registration = Registration {
            id: String::from("ui5-context-watched-files"),
            method: String::from("workspace/didChangeWatchedFiles"),
            register_options: serde_json::to_value(options).ok(),
        };
        if let Err(e) = self.client.register_capability(vec![registration]).await {
            log::warn!("Failed to register file watchers: {}", e);
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        log::info!("Initializing ui5-context");

        if let Some(folders) = &params.workspace_folders {
            for folder in folders {
                log::info!("Workspace folder: {}", folder.uri);
            }
        }
        if let Some(config) = params
            .initialization_options
            .as_ref()
            .and_then(parse_context_config)
        {
            self.state.write().await.apply_config(config);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: String::from("ui5-context"),
                version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("ui5-context initialized");
        self.register_watchers().await;
    }

    async fn shutdown(&self) -> Result<()> {
        crate::perf::log_summary();
        log::info!("ui5-context shutting down");
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Some(config) = parse_context_config(&params.settings) else {
            log::trace!("No ui5Context section in settings, keeping configuration");
            return;
        };
        let reset = self.state.write().await.apply_config(config);
        if reset {
            log::info!("Cache settings changed; workspace caches reset");
        }
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        log::info!(
            "Workspace folders changed (+{} -{}); resetting caches",
            params.event.added.len(),
            params.event.removed.len()
        );
        self.state.read().await.reset();
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        log::trace!(
            "Received watched files change: {} changes",
            params.changes.len()
        );
        let changes: Vec<FileChange> = params.changes.iter().filter_map(file_change).collect();
        if changes.is_empty() {
            return;
        }
        let reactor = self.state.read().await.reactor.clone();
        reactor.react(changes).await;
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method("ui5/context", Backend::handle_context_request)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestDetails;
    use crate::semantic_model::SemanticModel;
    use crate::yaml::YamlDetails;
    use serde_json::json;

    #[test]
    fn test_parse_context_config() {
        let settings = json!({
            "ui5Context": {
                "defaultFramework": "OpenUI5",
                "cachePath": null,
                "sapui5Url": "https://mirror.example/",
                "offline": true,
                "modelCacheCapacity": 0,
                "cdsCommand": "/usr/local/bin/cds"
            }
        });
        let config = parse_context_config(&settings).unwrap();
        assert_eq!(config.default_framework, Framework::OpenUi5);
        assert_eq!(config.cache_path, None);
        assert_eq!(config.sapui5_url, "https://mirror.example");
        assert!(config.offline);
        assert_eq!(config.model_cache_capacity, 1);
        assert_eq!(config.cds_command, PathBuf::from("/usr/local/bin/cds"));
        assert_eq!(config.fetch_timeout_ms, ContextConfig::default().fetch_timeout_ms);
    }

    #[test]
    fn test_missing_section_is_none() {
        assert!(parse_context_config(&json!({"other": {}})).is_none());
    }

    #[test]
    fn test_file_change_translation() {
        let event = FileEvent {
            uri: Url::parse("file:///ws/app/webapp/manifest.json").unwrap(),
            typ: FileChangeType::DELETED,
        };
        let change = file_change(&event).unwrap();
        assert_eq!(change.kind, FileChangeKind::Deleted);
        assert_eq!(change.path, PathBuf::from("/ws/app/webapp/manifest.json"));

        let remote = FileEvent {
            uri: Url::parse("https://example.com/manifest.json").unwrap(),
            typ: FileChangeType::CHANGED,
        };
        assert!(file_change(&remote).is_none());
    }

    #[test]
    fn test_context_response_shape() {
        let context = Context {
            document_path: PathBuf::from("/ws/app/webapp/view/Main.view.xml"),
            manifest_details: ManifestDetails {
                app_id: "sales.app".to_string(),
                ..Default::default()
            },
            yaml_details: YamlDetails::default(),
            semantic_model: Arc::new(SemanticModel {
                version: "1.120.4".to_string(),
                is_incorrect_version: true,
                ..Default::default()
            }),
            services: Default::default(),
            custom_view_id: String::new(),
            view_files: vec![PathBuf::from("/ws/app/webapp/view/Main.view.xml")],
            control_ids: Default::default(),
        };
        let value = serde_json::to_value(ContextResponse::from(Ok(context))).unwrap();
        assert_eq!(value["appId"], "sales.app");
        assert_eq!(value["version"], "1.120.4");
        assert_eq!(value["isIncorrectVersion"], true);
        assert_eq!(value["viewFileCount"], 1);

        let error = ContextResponse::from(Err(crate::error::ContextError::InvalidPath("x".into())));
        let value = serde_json::to_value(error).unwrap();
        assert!(value["error"].as_str().unwrap().contains('x'));
    }
}
