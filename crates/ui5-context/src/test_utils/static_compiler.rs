//! Scripted [`ServiceCompiler`] returning fixed services per project root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ContextError;
use crate::project::cds::{CompiledServices, ServiceCompiler};

#[derive(Debug, Default)]
pub struct StaticCompiler {
    services: Mutex<HashMap<PathBuf, CompiledServices>>,
    calls: AtomicUsize,
}

impl StaticCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, project_root: &Path, services: CompiledServices) {
        self.services
            .lock()
            .unwrap()
            .insert(project_root.to_path_buf(), services);
    }

    /// Number of `compile` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceCompiler for StaticCompiler {
    async fn compile(&self, project_root: &Path) -> Result<CompiledServices, ContextError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.services
            .lock()
            .unwrap()
            .get(project_root)
            .cloned()
            .ok_or_else(|| ContextError::Compile {
                root: project_root.to_path_buf(),
                message: "no scripted services".to_string(),
            })
    }
}
