//
// config.rs
//
// Configuration for the context engine
//

use std::path::PathBuf;

use crate::version::framework::Framework;

/// Context engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Framework assumed when no `ui5.yaml` names one
    pub default_framework: Framework,
    /// Root of the on-disk descriptor cache (disabled when `None`)
    pub cache_path: Option<PathBuf>,
    /// Distribution server for SAPUI5
    pub sapui5_url: String,
    /// Distribution server for OpenUI5
    pub openui5_url: String,
    /// Timeout for a single network fetch in milliseconds
    pub fetch_timeout_ms: u64,
    /// Never touch the network; only the disk cache is consulted
    pub offline: bool,
    /// Number of semantic models kept in memory
    pub model_cache_capacity: usize,
    /// CDS command line used to compile CAP service models
    pub cds_command: PathBuf,
    /// Timeout for one CDS compiler invocation in milliseconds
    pub cds_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_framework: Framework::SapUi5,
            cache_path: default_cache_path(),
            sapui5_url: String::from("https://ui5.sap.com"),
            openui5_url: String::from("https://sdk.openui5.org"),
            fetch_timeout_ms: 30_000,
            offline: false,
            model_cache_capacity: 8,
            cds_command: PathBuf::from("cds"),
            cds_timeout_ms: 60_000,
        }
    }
}

impl ContextConfig {
    pub fn framework_url(&self, framework: Framework) -> &str {
        match framework {
            Framework::SapUi5 => &self.sapui5_url,
            Framework::OpenUi5 => &self.openui5_url,
        }
    }

    /// Check if settings that change what the caches contain differ between two configs
    pub fn cache_settings_changed(&self, other: &Self) -> bool {
        self.cache_path != other.cache_path
            || self.sapui5_url != other.sapui5_url
            || self.openui5_url != other.openui5_url
            || self.offline != other.offline
            || self.default_framework != other.default_framework
    }
}

#[cfg(unix)]
fn default_cache_path() -> Option<PathBuf> {
    xdg::BaseDirectories::with_prefix("ui5-context")
        .ok()
        .map(|dirs| dirs.get_cache_home())
}

#[cfg(not(unix))]
fn default_cache_path() -> Option<PathBuf> {
    None
}
