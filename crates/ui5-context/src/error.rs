//
// error.rs
//
// Error taxonomy for context assembly
//

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by collaborators (disk, network, parsers, CDS compiler).
///
/// Expected "not found" outcomes are never represented here; they travel as
/// `None` or [`Resolved::Absent`].
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid XML in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("request to {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("service compilation failed for {root}: {message}")]
    Compile { root: PathBuf, message: String },

    #[error("invalid document path: {0}")]
    InvalidPath(String),
}

impl ContextError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Outcome of a resolution step that must never abort its caller.
///
/// `Absent` is the silent "nothing to resolve here" state. `SoftFailure`
/// carries a collaborator error that the caller logs and then treats like
/// `Absent`, so one broken app never blocks its siblings.
#[derive(Debug)]
pub enum Resolved<T> {
    Found(T),
    Absent,
    SoftFailure(ContextError),
}

impl<T> Resolved<T> {
    /// Convert to `Option`, logging soft failures.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent => None,
            Self::SoftFailure(err) => {
                log::warn!("{}", err);
                None
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Self::Found(value) => Resolved::Found(f(value)),
            Self::Absent => Resolved::Absent,
            Self::SoftFailure(err) => Resolved::SoftFailure(err),
        }
    }
}

impl<T> From<Option<T>> for Resolved<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Found(v),
            None => Self::Absent,
        }
    }
}

impl<T> From<Result<Option<T>, ContextError>> for Resolved<T> {
    fn from(value: Result<Option<T>, ContextError>) -> Self {
        match value {
            Ok(Some(v)) => Self::Found(v),
            Ok(None) => Self::Absent,
            Err(err) if err.is_not_found() => Self::Absent,
            Err(err) => Self::SoftFailure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_io_error_is_absent() {
        let err = ContextError::io(
            "/missing/manifest.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let resolved: Resolved<()> = Err(err).into();
        assert!(matches!(resolved, Resolved::Absent));
    }

    #[test]
    fn test_other_io_error_is_soft_failure() {
        let err = ContextError::io(
            "/locked/manifest.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let resolved: Resolved<()> = Err(err).into();
        assert!(matches!(resolved, Resolved::SoftFailure(_)));
        assert!(resolved.into_option().is_none());
    }

    #[test]
    fn test_map_preserves_variant() {
        let found = Resolved::Found(2).map(|v| v * 2);
        assert!(matches!(found, Resolved::Found(4)));
        let absent: Resolved<i32> = Resolved::Absent;
        assert!(matches!(absent.map(|v| v + 1), Resolved::Absent));
    }
}
