//
// project/discovery.rs
//
// Project root detection and classification
//

use std::path::{Path, PathBuf};

use crate::project::types::{CapKind, ProjectKind};

pub const PACKAGE_JSON: &str = "package.json";
pub const CDSRC_FILE: &str = ".cdsrc.json";
const POM_XML: &str = "pom.xml";
const JAVA_APPLICATION_YAML: &str = "srv/src/main/resources/application.yaml";
const CDS_PACKAGES: &[&str] = &["@sap/cds", "@sap/cds-dk"];

/// Project root for a document: the nearest folder with a `package.json`,
/// promoted to an enclosing CAP project when there is one.
pub fn find_project_root(document: &Path) -> Option<PathBuf> {
    let start = if document.is_dir() {
        document
    } else {
        document.parent()?
    };
    let nearest = start
        .ancestors()
        .find(|dir| dir.join(PACKAGE_JSON).is_file())?;

    if is_cap_root(nearest) {
        return Some(nearest.to_path_buf());
    }
    let promoted = nearest
        .ancestors()
        .skip(1)
        .find(|dir| dir.join(PACKAGE_JSON).is_file() && is_cap_root(dir));
    Some(promoted.unwrap_or(nearest).to_path_buf())
}

/// A folder is a CAP root when its package.json configures or depends on CDS,
/// or when it carries a `.cdsrc.json`.
pub fn is_cap_root(root: &Path) -> bool {
    if root.join(CDSRC_FILE).is_file() {
        return true;
    }
    let Ok(content) = std::fs::read_to_string(root.join(PACKAGE_JSON)) else {
        return false;
    };
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(package) => package_declares_cds(&package),
        Err(e) => {
            log::debug!("Ignoring malformed {} in {}: {}", PACKAGE_JSON, root.display(), e);
            false
        }
    }
}

fn package_declares_cds(package: &serde_json::Value) -> bool {
    if package.get("cds").is_some() {
        return true;
    }
    ["dependencies", "devDependencies"].iter().any(|section| {
        package
            .get(*section)
            .and_then(|deps| deps.as_object())
            .map(|deps| CDS_PACKAGES.iter().any(|name| deps.contains_key(*name)))
            .unwrap_or(false)
    })
}

pub fn classify_project(root: &Path) -> ProjectKind {
    if !is_cap_root(root) {
        return ProjectKind::Ui5;
    }
    if root.join(POM_XML).is_file() || root.join(JAVA_APPLICATION_YAML).is_file() {
        ProjectKind::Cap(CapKind::Java)
    } else {
        ProjectKind::Cap(CapKind::NodeJs)
    }
}

/// Canonical `/segment/.../` form of a service route.
pub fn unify_service_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

pub fn is_cds_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("cds")
}

pub fn is_project_descriptor(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|name| name.to_str()),
        Some(PACKAGE_JSON) | Some(CDSRC_FILE)
    )
}
