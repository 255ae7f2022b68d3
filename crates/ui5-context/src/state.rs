//
// state.rs
//
// Composition root: one cache store shared by the negotiator, the loader, the
// change reactor and the context assembler
//

use std::sync::Arc;
use std::time::Duration;

use crate::cache::store::CacheStore;
use crate::config::ContextConfig;
use crate::context::ContextAssembler;
use crate::project::cds::{CdsCompiler, ServiceCompiler};
use crate::project::loader::ProjectLoader;
use crate::version::fetch::{Fetcher, HttpFetcher, OfflineFetcher};
use crate::version::negotiator::VersionNegotiator;
use crate::watcher::ChangeReactor;

pub struct WorldState {
    pub config: ContextConfig,
    pub store: Arc<CacheStore>,
    pub negotiator: Arc<VersionNegotiator>,
    pub loader: Arc<ProjectLoader>,
    pub reactor: Arc<ChangeReactor>,
    pub assembler: Arc<ContextAssembler>,
}

/// Network fetcher for a configuration; offline mode, or a client that cannot
/// be built, yields a fetcher that always fails.
fn default_fetcher(config: &ContextConfig) -> Arc<dyn Fetcher> {
    if config.offline {
        return Arc::new(OfflineFetcher);
    }
    match HttpFetcher::new(Duration::from_millis(config.fetch_timeout_ms)) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            log::warn!("{}; continuing offline", e);
            Arc::new(OfflineFetcher)
        }
    }
}

fn default_compiler(config: &ContextConfig) -> Arc<dyn ServiceCompiler> {
    Arc::new(CdsCompiler::new(
        config.cds_command.clone(),
        Duration::from_millis(config.cds_timeout_ms),
    ))
}

impl WorldState {
    pub fn new(config: ContextConfig) -> Self {
        let fetcher = default_fetcher(&config);
        let compiler = default_compiler(&config);
        Self::with_collaborators(config, fetcher, compiler)
    }

    pub fn with_collaborators(
        config: ContextConfig,
        fetcher: Arc<dyn Fetcher>,
        compiler: Arc<dyn ServiceCompiler>,
    ) -> Self {
        let store = Arc::new(CacheStore::new(config.model_cache_capacity));
        Self::assemble(config, store, fetcher, compiler)
    }

    fn assemble(
        config: ContextConfig,
        store: Arc<CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        compiler: Arc<dyn ServiceCompiler>,
    ) -> Self {
        let negotiator = Arc::new(VersionNegotiator::new(store.clone(), fetcher, &config));
        let loader = Arc::new(ProjectLoader::new(store.clone(), compiler));
        let reactor = Arc::new(ChangeReactor::new(
            store.clone(),
            loader.clone(),
            config.default_framework,
        ));
        let assembler = Arc::new(ContextAssembler::new(
            store.clone(),
            loader.clone(),
            negotiator.clone(),
            config.default_framework,
        ));
        Self {
            config,
            store,
            negotiator,
            loader,
            reactor,
            assembler,
        }
    }

    /// Drop every cached artifact.
    pub fn reset(&self) {
        self.store.reset();
    }

    /// Apply a new configuration. Components are rebuilt around the same
    /// store; the store is reset when the change affects what it holds.
    /// Returns whether a reset happened.
    pub fn apply_config(&mut self, config: ContextConfig) -> bool {
        let reset = self.config.cache_settings_changed(&config);
        if reset {
            self.store.reset();
        }
        if config.model_cache_capacity != self.config.model_cache_capacity {
            self.store
                .semantic_models
                .resize(config.model_cache_capacity);
        }
        let fetcher = default_fetcher(&config);
        let compiler = default_compiler(&config);
        *self = Self::assemble(config, self.store.clone(), fetcher, compiler);
        reset
    }
}
