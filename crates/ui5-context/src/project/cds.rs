// cds.rs - CDS service compilation for CAP projects
//
// Runs the CDS command line tool to list the services of a CAP project and
// compile each one to EDMX. The result is cached per project root by the
// loader and shared by every app of the project.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::ContextError;
use crate::project::discovery::unify_service_path;

/// EDMX of every service a CAP project exposes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledServices {
    /// Unified service path -> EDMX document
    pub services: BTreeMap<String, String>,
}

impl CompiledServices {
    pub fn metadata_for(&self, service_path: &str) -> Option<&str> {
        self.services
            .get(&unify_service_path(service_path))
            .map(String::as_str)
    }
}

#[async_trait]
pub trait ServiceCompiler: Send + Sync {
    async fn compile(&self, project_root: &Path) -> Result<CompiledServices, ContextError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfo {
    name: String,
    url_path: Option<String>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    path: Option<String>,
}

impl ServiceInfo {
    fn path(&self) -> Option<&str> {
        self.url_path
            .as_deref()
            .or_else(|| self.endpoints.iter().find_map(|e| e.path.as_deref()))
    }
}

/// Subprocess based compiler invoking `cds compile`
#[derive(Debug, Clone)]
pub struct CdsCompiler {
    command: PathBuf,
    timeout: Duration,
}

impl CdsCompiler {
    pub fn new(command: PathBuf, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    async fn run(&self, project_root: &Path, args: &[&str]) -> Result<String, ContextError> {
        let compile_error = |message: String| ContextError::Compile {
            root: project_root.to_path_buf(),
            message,
        };

        let mut cmd = Command::new(&self.command);
        cmd.arg("compile")
            .arg(project_root)
            .args(args)
            .current_dir(project_root)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| compile_error(format!("failed to spawn {}: {e}", self.command.display())))?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| compile_error(format!("failed to run cds: {e}")))?,
            Err(_) => return Err(compile_error(format!("cds timed out after {:?}", self.timeout))),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(compile_error(format!(
                "cds exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ServiceCompiler for CdsCompiler {
    async fn compile(&self, project_root: &Path) -> Result<CompiledServices, ContextError> {
        let _guard = crate::perf::TimingGuard::with_threshold("cds_compile", 5_000)
            .detail(project_root.display());
        crate::perf::increment_service_compilations();

        let listing = self.run(project_root, &["--to", "serviceinfo"]).await?;
        let infos: Vec<ServiceInfo> =
            serde_json::from_str(&listing).map_err(|e| ContextError::Compile {
                root: project_root.to_path_buf(),
                message: format!("unexpected serviceinfo output: {e}"),
            })?;

        let mut compiled = CompiledServices::default();
        for info in &infos {
            let Some(path) = info.path() else {
                log::trace!("Service {} has no url path, skipping", info.name);
                continue;
            };
            match self
                .run(project_root, &["--service", &info.name, "--to", "edmx"])
                .await
            {
                Ok(edmx) => {
                    compiled.services.insert(unify_service_path(path), edmx);
                }
                Err(e) => log::warn!("Failed to compile service {}: {}", info.name, e),
            }
        }
        log::debug!(
            "Compiled {} services for {}",
            compiled.services.len(),
            project_root.display()
        );
        Ok(compiled)
    }
}
