//
// version/negotiator.rs
//
// Resolves a loosely specified framework version to a concrete, fetchable
// release and builds the semantic model for it
//

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cache::disk::DiskCache;
use crate::cache::locks::KeyedLocks;
use crate::cache::store::CacheStore;
use crate::config::ContextConfig;
use crate::semantic_model::{build_semantic_model, ModelInput, SemanticModel};
use crate::version::fetch::Fetcher;
use crate::version::framework::{Framework, FrameworkEndpoints, DEFAULT_UI5_VERSION};
use crate::version::library::{library_names, LibraryLoader};
use crate::version::version_map::{coerce, VersionMap};

/// Outcome of a negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiatedVersion {
    pub version: String,
    /// No version was requested, or the version map could not be fetched
    pub is_fallback: bool,
    /// The resolved version differs from the requested one
    pub is_incorrect_version: bool,
}

impl NegotiatedVersion {
    fn new(version: impl Into<String>, is_fallback: bool, is_incorrect_version: bool) -> Self {
        Self {
            version: version.into(),
            is_fallback,
            is_incorrect_version,
        }
    }
}

pub struct VersionNegotiator {
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    disk: DiskCache,
    sapui5: FrameworkEndpoints,
    openui5: FrameworkEndpoints,
    model_locks: KeyedLocks<String>,
    map_locks: KeyedLocks<Framework>,
}

impl VersionNegotiator {
    pub fn new(store: Arc<CacheStore>, fetcher: Arc<dyn Fetcher>, config: &ContextConfig) -> Self {
        Self {
            store,
            fetcher,
            disk: DiskCache::new(config.cache_path.clone()),
            sapui5: FrameworkEndpoints::new(config.framework_url(Framework::SapUi5)),
            openui5: FrameworkEndpoints::new(config.framework_url(Framework::OpenUi5)),
            model_locks: KeyedLocks::new(),
            map_locks: KeyedLocks::new(),
        }
    }

    fn endpoints(&self, framework: Framework) -> &FrameworkEndpoints {
        match framework {
            Framework::SapUi5 => &self.sapui5,
            Framework::OpenUi5 => &self.openui5,
        }
    }

    /// Map a requested version (possibly absent or loose) to a concrete one.
    pub async fn negotiate(&self, framework: Framework, requested: Option<&str>) -> NegotiatedVersion {
        let Some(requested) = requested.map(str::trim).filter(|v| !v.is_empty()) else {
            return NegotiatedVersion::new(DEFAULT_UI5_VERSION, true, false);
        };

        let memo_key = (framework, requested.to_string());
        if let Some(resolved) = self.store.version_memo.get(&memo_key) {
            let incorrect = resolved != requested;
            return NegotiatedVersion::new(resolved, false, incorrect);
        }

        let negotiated = self.resolve_uncached(framework, requested).await;
        log::debug!(
            "Negotiated {} {} -> {} (fallback: {}, incorrect: {})",
            framework,
            requested,
            negotiated.version,
            negotiated.is_fallback,
            negotiated.is_incorrect_version
        );
        // a fallback answer is retried on the next call
        if !negotiated.is_fallback {
            self.store
                .version_memo
                .set(memo_key, negotiated.version.clone());
        }
        negotiated
    }

    async fn resolve_uncached(&self, framework: Framework, requested: &str) -> NegotiatedVersion {
        if self.version_info(framework, requested).await.is_some() {
            return NegotiatedVersion::new(requested, false, false);
        }

        let (map, is_fallback) = self.version_map(framework).await;

        let Some(coerced) = coerce(requested) else {
            return NegotiatedVersion::new(map.latest(), is_fallback, true);
        };

        if let Some(pinned) = coerced
            .major_minor()
            .and_then(|major_minor| map.pinned(&major_minor).map(str::to_string))
        {
            if self.version_info(framework, &pinned).await.is_some() {
                let incorrect = pinned != requested;
                return NegotiatedVersion::new(pinned, is_fallback, incorrect);
            }
        }

        let version = map
            .max_satisfying(&coerced)
            .unwrap_or_else(|| map.latest().to_string());
        NegotiatedVersion::new(version, is_fallback, true)
    }

    /// Cached or freshly fetched version map. A synthesized fallback map is
    /// returned (and not cached) when the fetch fails.
    pub async fn version_map(&self, framework: Framework) -> (Arc<VersionMap>, bool) {
        if let Some(map) = self.store.version_maps.get(&framework) {
            return (map, false);
        }
        let _guard = self.map_locks.lock(&framework).await;
        if let Some(map) = self.store.version_maps.get(&framework) {
            return (map, false);
        }

        let url = self.endpoints(framework).version_map_url();
        let fetched = match self.fetcher.fetch(&url).await {
            Ok(response) if response.is_ok() => response
                .json::<Value>(&url)
                .map_err(|e| e.to_string())
                .and_then(|value| {
                    VersionMap::from_json(&value).ok_or_else(|| "no latest entry".to_string())
                }),
            Ok(response) => Err(format!("status {}", response.status)),
            Err(e) => Err(e.to_string()),
        };

        match fetched {
            Ok(map) => {
                let map = Arc::new(map);
                self.store.version_maps.set(framework, map.clone());
                (map, false)
            }
            Err(message) => {
                log::warn!(
                    "Could not load {} version map ({}), falling back to {}",
                    framework,
                    message,
                    DEFAULT_UI5_VERSION
                );
                (Arc::new(VersionMap::fallback()), true)
            }
        }
    }

    /// `sap-ui-version.json` of a version from memory, disk or network.
    /// `None` means the version is not resolvable.
    pub async fn version_info(&self, framework: Framework, version: &str) -> Option<Arc<Value>> {
        let key = (framework, version.to_string());
        if let Some(info) = self.store.version_infos.get(&key) {
            return Some(info);
        }

        if let Some(info) = self.disk.read_version_info(framework, version).await {
            let info = Arc::new(info);
            self.store.version_infos.set(key, info.clone());
            return Some(info);
        }

        let url = self.endpoints(framework).version_info_url(version);
        let response = match self.fetcher.fetch(&url).await {
            Ok(response) if response.is_ok() => response,
            Ok(response) => {
                log::trace!("{} not resolvable: status {}", url, response.status);
                return None;
            }
            Err(e) => {
                log::debug!("{} not resolvable: {}", url, e);
                return None;
            }
        };
        let info = match response.json::<Value>(&url) {
            Ok(info) => info,
            Err(e) => {
                log::debug!("{}", e);
                return None;
            }
        };

        self.disk.write_version_info(framework, version, &info).await;
        let info = Arc::new(info);
        self.store.version_infos.set(key, info.clone());
        Some(info)
    }

    /// Semantic model for a framework and requested version, built at most
    /// once per key. The key is `framework:requested`, or `framework:default`
    /// when no version was requested, so the flags always match the request.
    pub async fn get_semantic_model(
        &self,
        framework: Framework,
        requested: Option<&str>,
    ) -> Arc<SemanticModel> {
        let requested = requested.map(str::trim).filter(|v| !v.is_empty());
        let key = framework.model_key(requested.unwrap_or("default"));
        if let Some(model) = self.store.semantic_models.get(&key) {
            return model;
        }
        let _guard = self.model_locks.lock(&key).await;
        if let Some(model) = self.store.semantic_models.get(&key) {
            return model;
        }

        let _timing = crate::perf::TimingGuard::with_threshold("semantic_model_build", 2_000)
            .detail(&key);
        let negotiated = self.negotiate(framework, requested).await;
        let libraries = self
            .version_info(framework, &negotiated.version)
            .await
            .map(|info| library_names(&info))
            .unwrap_or_default();

        let loader = LibraryLoader::new(self.fetcher.clone(), self.disk.clone());
        let descriptors = loader
            .load_all(
                framework,
                self.endpoints(framework),
                &negotiated.version,
                &libraries,
            )
            .await;

        let model = Arc::new(build_semantic_model(ModelInput {
            framework,
            version: negotiated.version,
            is_fallback: negotiated.is_fallback,
            is_incorrect_version: negotiated.is_incorrect_version,
            descriptors,
        }));
        // a fallback for an explicit request is rebuilt once the map loads
        if !(model.is_fallback && requested.is_some()) {
            self.store.semantic_models.set(key, model.clone());
        }
        model
    }
}
