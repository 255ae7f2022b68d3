//
// version/framework.rs
//
// UI5 framework flavours and their distribution endpoints
//

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version used when nothing else can be negotiated.
pub const DEFAULT_UI5_VERSION: &str = "1.71.61";

/// Folder under the cache root that holds downloaded descriptors.
pub const RESOURCES_CACHE_NAMESPACE: &str = "ui5-resources-cache";

/// Per-version library index published next to the framework resources.
pub const VERSION_INFO_FILE: &str = "sap-ui-version.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Framework {
    #[default]
    #[serde(rename = "SAPUI5")]
    SapUi5,
    #[serde(rename = "OpenUI5")]
    OpenUi5,
}

impl Framework {
    pub fn name(&self) -> &'static str {
        match self {
            Framework::SapUi5 => "SAPUI5",
            Framework::OpenUi5 => "OpenUI5",
        }
    }

    /// Parse a framework name as written in `ui5.yaml` or settings (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sapui5" => Some(Framework::SapUi5),
            "openui5" => Some(Framework::OpenUi5),
            _ => None,
        }
    }

    /// Cache key of a semantic model: `framework:version`.
    pub fn model_key(&self, version: &str) -> String {
        format!("{}:{}", self.name(), version)
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// URL builder for one framework's distribution server.
#[derive(Debug, Clone)]
pub struct FrameworkEndpoints {
    base_url: String,
}

impl FrameworkEndpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn version_map_url(&self) -> String {
        format!("{}/version.json", self.base_url)
    }

    pub fn version_info_url(&self, version: &str) -> String {
        format!("{}/{}/resources/{}", self.base_url, version, VERSION_INFO_FILE)
    }

    /// `sap.m` is published under `test-resources/sap/m/designtime/api.json`.
    pub fn library_url(&self, version: &str, library: &str) -> String {
        format!(
            "{}/{}/test-resources/{}/designtime/api.json",
            self.base_url,
            version,
            library.replace('.', "/")
        )
    }
}
