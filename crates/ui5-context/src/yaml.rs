//
// yaml.rs
//
// Framework pinning declared in ui5.yaml
//

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::version::framework::Framework;

pub const UI5_YAML_FILE: &str = "ui5.yaml";

/// Framework and pinned version a folder subtree declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YamlDetails {
    pub framework: Framework,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ui5YamlDocument {
    #[serde(default)]
    framework: Option<FrameworkSection>,
}

#[derive(Debug, Deserialize)]
struct FrameworkSection {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<VersionScalar>,
}

/// `version: 1.96` is a YAML number, `version: 1.96.0` a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VersionScalar {
    Text(String),
    Number(serde_yaml::Number),
}

impl VersionScalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Number(number) => number.to_string(),
        }
    }
}

/// Extract `framework.name` / `framework.version` from ui5.yaml content.
///
/// The first document that declares a top-level `framework` section wins.
/// Documents that are empty or not mappings are skipped.
pub fn parse_yaml_details(content: &str, default_framework: Framework) -> Result<YamlDetails, serde_yaml::Error> {
    let mut details = YamlDetails {
        framework: default_framework,
        version: None,
    };

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if !value.is_mapping() {
            continue;
        }
        let Some(section) = serde_yaml::from_value::<Ui5YamlDocument>(value)?.framework else {
            continue;
        };
        if let Some(name) = section.name.as_deref() {
            match Framework::parse(name) {
                Some(framework) => details.framework = framework,
                None => log::debug!("Unknown framework name '{}' in ui5.yaml", name),
            }
        }
        details.version = section
            .version
            .map(VersionScalar::into_string)
            .filter(|version| !version.is_empty());
        break;
    }

    Ok(details)
}

/// Read a ui5.yaml file; a missing file is `Ok(None)`.
pub async fn read_yaml(path: &Path, default_framework: Framework) -> Result<Option<YamlDetails>, ContextError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => parse_yaml_details(&content, default_framework)
            .map(Some)
            .map_err(|source| ContextError::Yaml {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ContextError::io(path, e)),
    }
}

/// Nearest `ui5.yaml` at or above the document's folder.
pub fn find_yaml_path(document: &Path) -> Option<PathBuf> {
    let start = if document.is_dir() {
        document
    } else {
        document.parent()?
    };
    start
        .ancestors()
        .map(|dir| dir.join(UI5_YAML_FILE))
        .find(|candidate| candidate.is_file())
}
