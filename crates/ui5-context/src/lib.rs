// lib.rs - Context engine for UI5 editor tooling.
//
// The binary entry point lives in main.rs and only starts the language
// server; everything else is exposed here for embedding and integration tests.

pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod manifest;
pub mod perf;
pub mod project;
pub mod semantic_model;
pub mod service_metadata;
pub mod state;
pub mod version;
pub mod view;
pub mod watcher;
pub mod yaml;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use cache::CacheStore;
pub use config::ContextConfig;
pub use context::{is_context, Context, ContextAssembler, ContextResult};
pub use error::{ContextError, Resolved};
pub use project::ProjectLoader;
pub use state::WorldState;
pub use version::VersionNegotiator;
pub use watcher::{ChangeReactor, FileChange, FileChangeKind};
