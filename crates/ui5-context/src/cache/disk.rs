//
// cache/disk.rs
//
// On-disk cache for downloaded framework descriptors
//
// Layout: <root>/ui5-resources-cache/<framework>/<version>/<library>.json
//         <root>/ui5-resources-cache/<framework>/<version>/sap-ui-version.json
//
// A missing or unreadable file is a cache miss, never an error.
//

use std::path::{Path, PathBuf};

use crate::version::framework::{Framework, RESOURCES_CACHE_NAMESPACE, VERSION_INFO_FILE};

/// Result of looking up a library descriptor on disk
#[derive(Debug, Clone, PartialEq)]
pub enum CachedDescriptor {
    /// Nothing on disk; the caller should fetch
    Missing,
    /// An empty placeholder written after a 404; do not retry
    KnownAbsent,
    Present(serde_json::Value),
}

#[derive(Debug, Clone, Default)]
pub struct DiskCache {
    root: Option<PathBuf>,
}

impl DiskCache {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    fn version_dir(&self, framework: Framework, version: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        if !is_safe_segment(version) {
            log::trace!("Refusing to build cache path for version {:?}", version);
            return None;
        }
        Some(
            root.join(RESOURCES_CACHE_NAMESPACE)
                .join(framework.name())
                .join(version),
        )
    }

    pub fn version_info_path(&self, framework: Framework, version: &str) -> Option<PathBuf> {
        self.version_dir(framework, version)
            .map(|dir| dir.join(VERSION_INFO_FILE))
    }

    pub fn library_path(&self, framework: Framework, version: &str, library: &str) -> Option<PathBuf> {
        if !is_safe_segment(library) {
            return None;
        }
        self.version_dir(framework, version)
            .map(|dir| dir.join(format!("{library}.json")))
    }

    pub async fn read_version_info(&self, framework: Framework, version: &str) -> Option<serde_json::Value> {
        let path = self.version_info_path(framework, version)?;
        match read_json(&path).await? {
            value if is_placeholder(&value) => None,
            value => Some(value),
        }
    }

    pub async fn write_version_info(&self, framework: Framework, version: &str, value: &serde_json::Value) {
        if let Some(path) = self.version_info_path(framework, version) {
            write_json(&path, value).await;
        }
    }

    pub async fn read_library(&self, framework: Framework, version: &str, library: &str) -> CachedDescriptor {
        let Some(path) = self.library_path(framework, version, library) else {
            return CachedDescriptor::Missing;
        };
        match read_json(&path).await {
            None => CachedDescriptor::Missing,
            Some(value) if is_placeholder(&value) => CachedDescriptor::KnownAbsent,
            Some(value) => CachedDescriptor::Present(value),
        }
    }

    pub async fn write_library(&self, framework: Framework, version: &str, library: &str, value: &serde_json::Value) {
        if let Some(path) = self.library_path(framework, version, library) {
            write_json(&path, value).await;
        }
    }

    /// Persist the "known absent" marker for a library that returned 404.
    pub async fn write_library_placeholder(&self, framework: Framework, version: &str, library: &str) {
        self.write_library(framework, version, library, &placeholder())
            .await;
    }
}

fn placeholder() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn is_placeholder(value: &serde_json::Value) -> bool {
    value.as_object().map(|o| o.is_empty()).unwrap_or(false)
}

/// Versions and library names become path segments; keep them inside the cache root.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && !segment.contains("..")
        && !segment.contains('/')
        && !segment.contains('\\')
        && !segment.contains('\0')
}

async fn read_json(path: &Path) -> Option<serde_json::Value> {
    let content = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::debug!("Failed to read cache file {}: {}", path.display(), e);
            }
            return None;
        }
    };
    match serde_json::from_slice(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Ignoring corrupt cache file {}: {}", path.display(), e);
            None
        }
    }
}

async fn write_json(path: &Path, value: &serde_json::Value) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            log::warn!("Failed to create cache folder {}: {}", parent.display(), e);
            return;
        }
    }
    let bytes = match serde_json::to_vec(value) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("Failed to serialize cache entry {}: {}", path.display(), e);
            return;
        }
    };
    if let Err(e) = tokio::fs::write(path, bytes).await {
        log::warn!("Failed to write cache file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let cache = DiskCache::new(Some(PathBuf::from("/cache")));
        assert_eq!(
            cache.library_path(Framework::SapUi5, "1.120.0", "sap.m"),
            Some(PathBuf::from("/cache/ui5-resources-cache/SAPUI5/1.120.0/sap.m.json"))
        );
        assert_eq!(
            cache.version_info_path(Framework::OpenUi5, "1.120.0"),
            Some(PathBuf::from(
                "/cache/ui5-resources-cache/OpenUI5/1.120.0/sap-ui-version.json"
            ))
        );
    }

    #[test]
    fn test_rejects_traversal_segments() {
        let cache = DiskCache::new(Some(PathBuf::from("/cache")));
        assert_eq!(cache.version_info_path(Framework::SapUi5, "../../etc"), None);
        assert_eq!(cache.library_path(Framework::SapUi5, "1.120.0", "a/b"), None);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let cache = DiskCache::disabled();
        cache
            .write_library(Framework::SapUi5, "1.120.0", "sap.m", &json!({"symbols": []}))
            .await;
        assert_eq!(
            cache.read_library(Framework::SapUi5, "1.120.0", "sap.m").await,
            CachedDescriptor::Missing
        );
    }

    #[tokio::test]
    async fn test_library_write_then_read() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(Some(dir.path().to_path_buf()));
        let descriptor = json!({"library": "sap.m", "symbols": []});
        cache
            .write_library(Framework::SapUi5, "1.120.0", "sap.m", &descriptor)
            .await;
        assert_eq!(
            cache.read_library(Framework::SapUi5, "1.120.0", "sap.m").await,
            CachedDescriptor::Present(descriptor)
        );
    }

    #[tokio::test]
    async fn test_placeholder_reads_as_known_absent() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(Some(dir.path().to_path_buf()));
        cache
            .write_library_placeholder(Framework::SapUi5, "1.120.0", "sap.ui.comp")
            .await;
        assert_eq!(
            cache.read_library(Framework::SapUi5, "1.120.0", "sap.ui.comp").await,
            CachedDescriptor::KnownAbsent
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(Some(dir.path().to_path_buf()));
        let path = cache.version_info_path(Framework::SapUi5, "1.120.0").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(cache
            .read_version_info(Framework::SapUi5, "1.120.0")
            .await
            .is_none());
    }
}
