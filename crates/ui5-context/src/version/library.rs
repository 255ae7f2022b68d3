//
// version/library.rs
//
// Parallel retrieval of per-library api.json descriptors for one resolved
// framework version
//

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use crate::cache::disk::{CachedDescriptor, DiskCache};
use crate::version::fetch::Fetcher;
use crate::version::framework::{Framework, FrameworkEndpoints};

/// Outcome of loading one library descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryOutcome {
    Loaded(Value),
    /// 404 now or earlier; a placeholder is on disk
    KnownAbsent,
    /// Transport or decoding failure; nothing cached, retried next time
    Failed,
}

/// Library names listed in a `sap-ui-version.json` document.
pub fn library_names(version_info: &Value) -> Vec<String> {
    version_info
        .get("libraries")
        .and_then(Value::as_array)
        .map(|libraries| {
            libraries
                .iter()
                .filter_map(|lib| lib.get("name").and_then(Value::as_str))
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub struct LibraryLoader {
    fetcher: Arc<dyn Fetcher>,
    disk: DiskCache,
}

impl LibraryLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, disk: DiskCache) -> Self {
        Self { fetcher, disk }
    }

    pub async fn load(
        &self,
        framework: Framework,
        endpoints: &FrameworkEndpoints,
        version: &str,
        library: &str,
    ) -> LibraryOutcome {
        match self.disk.read_library(framework, version, library).await {
            CachedDescriptor::Present(value) => return LibraryOutcome::Loaded(value),
            CachedDescriptor::KnownAbsent => {
                log::trace!("{} {} known absent for {}", framework, library, version);
                return LibraryOutcome::KnownAbsent;
            }
            CachedDescriptor::Missing => {}
        }

        let url = endpoints.library_url(version, library);
        crate::perf::increment_descriptor_fetches();
        let response = match self.fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Failed to fetch {} descriptor: {}", library, e);
                return LibraryOutcome::Failed;
            }
        };

        if response.is_not_found() {
            log::debug!("{} has no descriptor for {} ({})", library, version, url);
            self.disk
                .write_library_placeholder(framework, version, library)
                .await;
            return LibraryOutcome::KnownAbsent;
        }
        if !response.is_ok() {
            log::warn!("Fetching {} returned status {}", url, response.status);
            return LibraryOutcome::Failed;
        }

        match response.json::<Value>(&url) {
            Ok(value) => {
                self.disk
                    .write_library(framework, version, library, &value)
                    .await;
                LibraryOutcome::Loaded(value)
            }
            Err(e) => {
                log::warn!("{}", e);
                LibraryOutcome::Failed
            }
        }
    }

    /// Load every library concurrently and keep the ones that loaded.
    ///
    /// A failing library never affects the others.
    pub async fn load_all(
        &self,
        framework: Framework,
        endpoints: &FrameworkEndpoints,
        version: &str,
        libraries: &[String],
    ) -> Vec<(String, Value)> {
        let outcomes = join_all(
            libraries
                .iter()
                .map(|library| self.load(framework, endpoints, version, library)),
        )
        .await;

        libraries
            .iter()
            .zip(outcomes)
            .filter_map(|(library, outcome)| match outcome {
                LibraryOutcome::Loaded(value) => Some((library.clone(), value)),
                LibraryOutcome::KnownAbsent | LibraryOutcome::Failed => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockFetcher;
    use serde_json::json;
    use tempfile::TempDir;

    const BASE: &str = "https://ui5.example";

    #[test]
    fn test_library_names() {
        let info = json!({
            "name": "SAPUI5 Distribution",
            "libraries": [{"name": "sap.m"}, {"name": ""}, {"version": "1"}, {"name": "sap.ui.core"}]
        });
        assert_eq!(library_names(&info), vec!["sap.m", "sap.ui.core"]);
        assert!(library_names(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_load_all_isolates_failures() {
        let endpoints = FrameworkEndpoints::new(BASE);
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_json(
            &endpoints.library_url("1.120.0", "sap.m"),
            json!({"symbols": [{"kind": "class", "name": "sap.m.Button"}]}),
        );
        fetcher.respond_json(
            &endpoints.library_url("1.120.0", "sap.ui.core"),
            json!({"symbols": []}),
        );
        fetcher.respond_status(&endpoints.library_url("1.120.0", "sap.ui.comp"), 404);

        let dir = TempDir::new().unwrap();
        let disk = DiskCache::new(Some(dir.path().to_path_buf()));
        let loader = LibraryLoader::new(fetcher.clone(), disk.clone());
        let libraries = vec!["sap.m".to_string(), "sap.ui.comp".to_string(), "sap.ui.core".to_string()];

        let loaded = loader
            .load_all(Framework::SapUi5, &endpoints, "1.120.0", &libraries)
            .await;
        let names: Vec<_> = loaded.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["sap.m", "sap.ui.core"]);
        assert_eq!(
            disk.read_library(Framework::SapUi5, "1.120.0", "sap.ui.comp").await,
            CachedDescriptor::KnownAbsent
        );

        // second run is served from disk, the 404 is not retried
        let requests_before = fetcher.requests().len();
        loader
            .load_all(Framework::SapUi5, &endpoints, "1.120.0", &libraries)
            .await;
        assert_eq!(fetcher.requests().len(), requests_before);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_cached() {
        let endpoints = FrameworkEndpoints::new(BASE);
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_status(&endpoints.library_url("1.120.0", "sap.f"), 503);

        let dir = TempDir::new().unwrap();
        let disk = DiskCache::new(Some(dir.path().to_path_buf()));
        let loader = LibraryLoader::new(fetcher, disk.clone());

        let outcome = loader
            .load(Framework::SapUi5, &endpoints, "1.120.0", "sap.f")
            .await;
        assert_eq!(outcome, LibraryOutcome::Failed);
        assert_eq!(
            disk.read_library(Framework::SapUi5, "1.120.0", "sap.f").await,
            CachedDescriptor::Missing
        );
    }
}
