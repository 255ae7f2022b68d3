//
// manifest.rs
//
// Application descriptor (manifest.json) model and field extraction
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::version::version_map::coerce;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Parsed `manifest.json`, restricted to the sections the context engine reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Manifest {
    #[serde(rename = "sap.app", default)]
    pub sap_app: SapApp,
    #[serde(rename = "sap.ui5", default)]
    pub sap_ui5: SapUi5,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SapApp {
    pub id: Option<String>,
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DataSource {
    pub uri: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub settings: DataSourceSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceSettings {
    pub local_uri: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
    pub odata_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SapUi5 {
    pub flex_enabled: Option<bool>,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub routing: Routing,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Dependencies {
    #[serde(rename = "minUI5Version")]
    pub min_ui5_version: Option<MinUi5Version>,
}

/// `minUI5Version` may be a single version or one version per major line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MinUi5Version {
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub data_source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Routing {
    #[serde(default)]
    pub targets: BTreeMap<String, RoutingTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RoutingTarget {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TargetOptions {
    #[serde(default)]
    pub settings: TargetSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSettings {
    pub view_name: Option<String>,
    pub entity_set: Option<String>,
    pub context_path: Option<String>,
}

/// Custom (extension) view registered in the routing targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomView {
    pub entity_set: Option<String>,
    pub context_path: Option<String>,
}

/// Fields of the manifest that the editor features consume directly
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDetails {
    pub app_id: String,
    pub flex_enabled: bool,
    pub min_ui5_version: Option<String>,
    pub main_service_path: Option<String>,
    pub custom_views: BTreeMap<String, CustomView>,
}

impl Manifest {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ContextError> {
        serde_json::from_str(content).map_err(|e| ContextError::json(path, e))
    }

    /// Name of the data source bound to the default model.
    ///
    /// Falls back to a data source literally named `mainService`, the
    /// convention of the Fiori generators.
    pub fn main_service_name(&self) -> Option<String> {
        let bound = self
            .sap_ui5
            .models
            .get("")
            .and_then(|model| model.data_source.clone())
            .filter(|name| self.sap_app.data_sources.contains_key(name));
        bound.or_else(|| {
            self.sap_app
                .data_sources
                .contains_key("mainService")
                .then(|| String::from("mainService"))
        })
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.sap_app.data_sources.get(name)
    }

    /// Local metadata file of a service, resolved against the manifest folder.
    pub fn local_metadata_path(&self, service: &str, manifest_dir: &Path) -> Option<PathBuf> {
        let local_uri = self.data_source(service)?.settings.local_uri.as_deref()?;
        Some(resolve_local_uri(manifest_dir, local_uri))
    }

    /// Local annotation files declared for a service, in declaration order.
    pub fn annotation_paths(&self, service: &str, manifest_dir: &Path) -> Vec<PathBuf> {
        let Some(source) = self.data_source(service) else {
            return Vec::new();
        };
        source
            .settings
            .annotations
            .iter()
            .filter_map(|name| self.data_source(name))
            .filter_map(|annotation| annotation.settings.local_uri.as_deref())
            .map(|local_uri| resolve_local_uri(manifest_dir, local_uri))
            .collect()
    }

    /// Every local file registered as metadata or annotation source of any data source.
    pub fn registered_sources(&self, manifest_dir: &Path) -> Vec<PathBuf> {
        self.sap_app
            .data_sources
            .values()
            .filter(|source| {
                matches!(
                    source.kind.as_deref(),
                    None | Some("OData") | Some("ODataAnnotation")
                )
            })
            .filter_map(|source| source.settings.local_uri.as_deref())
            .map(|local_uri| resolve_local_uri(manifest_dir, local_uri))
            .collect()
    }

    /// Lowest declared `minUI5Version`.
    pub fn min_ui5_version(&self) -> Option<String> {
        match self.sap_ui5.dependencies.min_ui5_version.as_ref()? {
            MinUi5Version::Single(version) => Some(version.clone()),
            MinUi5Version::Many(versions) => versions
                .iter()
                .filter_map(|v| coerce(v).map(|c| (c.to_version(), v)))
                .min_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, v)| v.clone()),
        }
    }

    pub fn details(&self) -> ManifestDetails {
        let main_service_path = self
            .main_service_name()
            .and_then(|name| self.data_source(&name)?.uri.clone());

        let custom_views = self
            .sap_ui5
            .routing
            .targets
            .values()
            .filter_map(|target| {
                let settings = &target.options.settings;
                let view_name = settings.view_name.clone()?;
                Some((
                    view_name,
                    CustomView {
                        entity_set: settings.entity_set.clone(),
                        context_path: settings.context_path.clone(),
                    },
                ))
            })
            .collect();

        ManifestDetails {
            app_id: self.sap_app.id.clone().unwrap_or_default(),
            flex_enabled: self.sap_ui5.flex_enabled.unwrap_or(false),
            min_ui5_version: self.min_ui5_version(),
            main_service_path,
            custom_views,
        }
    }
}

/// Read and parse a manifest; a missing file is `Ok(None)`.
pub async fn read_manifest(path: &Path) -> Result<Option<Manifest>, ContextError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Manifest::parse(&content, path).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ContextError::io(path, e)),
    }
}

/// Nearest `manifest.json` at or above the document's folder.
pub fn find_manifest_path(document: &Path) -> Option<PathBuf> {
    let start = if document.is_dir() {
        document
    } else {
        document.parent()?
    };
    start
        .ancestors()
        .map(|dir| dir.join(MANIFEST_FILE))
        .find(|candidate| candidate.is_file())
}

/// The app root is the folder above the one holding the manifest (`<app>/webapp/manifest.json`).
pub fn app_root_for_manifest(manifest_path: &Path) -> Option<PathBuf> {
    let manifest_dir = manifest_path.parent()?;
    Some(
        manifest_dir
            .parent()
            .unwrap_or(manifest_dir)
            .to_path_buf(),
    )
}

fn resolve_local_uri(manifest_dir: &Path, local_uri: &str) -> PathBuf {
    let mut resolved = manifest_dir.to_path_buf();
    for segment in local_uri.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    resolved
}
