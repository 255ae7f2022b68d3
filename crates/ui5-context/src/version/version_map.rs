//
// version/version_map.rs
//
// Supported-version index of a framework and loose version coercion
//

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use semver::{Version, VersionReq};

use super::framework::DEFAULT_UI5_VERSION;

/// A version string reduced to its numeric `major[.minor[.patch]]` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoercedVersion {
    pub major: u64,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
}

impl CoercedVersion {
    /// `major.minor` key used by the version map, when the minor part was given.
    pub fn major_minor(&self) -> Option<String> {
        self.minor.map(|minor| format!("{}.{}", self.major, minor))
    }

    /// Full version with missing parts filled with zero.
    pub fn to_version(&self) -> Version {
        Version::new(self.major, self.minor.unwrap_or(0), self.patch.unwrap_or(0))
    }

    /// Caret requirement against the version as written (patch-less stays patch-less).
    pub fn caret(&self) -> Option<VersionReq> {
        let req = match (self.minor, self.patch) {
            (Some(minor), Some(patch)) => format!("^{}.{}.{}", self.major, minor, patch),
            (Some(minor), None) => format!("^{}.{}", self.major, minor),
            _ => format!("^{}", self.major),
        };
        VersionReq::parse(&req).ok()
    }
}

/// Extract the first `major[.minor[.patch]]` run of a loosely written version.
///
/// Returns `None` when the string holds no number at all.
pub fn coerce(raw: &str) -> Option<CoercedVersion> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").ok())
        .as_ref()?;
    let caps = re.captures(raw)?;
    let part = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(CoercedVersion {
        major: part(1)?,
        minor: part(2),
        patch: part(3),
    })
}

/// Index of supported `major.minor` lines to their latest patch, plus a `latest` pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMap {
    latest: String,
    entries: BTreeMap<String, String>,
}

impl VersionMap {
    pub fn new(latest: impl Into<String>, entries: BTreeMap<String, String>) -> Self {
        Self {
            latest: latest.into(),
            entries,
        }
    }

    /// Map used when the remote index cannot be fetched.
    pub fn fallback() -> Self {
        Self::new(DEFAULT_UI5_VERSION, BTreeMap::new())
    }

    /// Parse the published `version.json` shape:
    /// `{ "latest": { "version": "1.120.1" }, "1.120": { "version": "1.120.1" }, ... }`.
    ///
    /// Entries without a string `version` field are ignored; a map without
    /// `latest` is rejected.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut latest = None;
        let mut entries = BTreeMap::new();
        for (key, entry) in object {
            let Some(version) = entry.get("version").and_then(|v| v.as_str()) else {
                continue;
            };
            if key == "latest" {
                latest = Some(version.to_string());
            } else {
                entries.insert(key.clone(), version.to_string());
            }
        }
        Some(Self::new(latest?, entries))
    }

    pub fn latest(&self) -> &str {
        &self.latest
    }

    /// Pinned patch version of an exact `major.minor` line.
    pub fn pinned(&self, major_minor: &str) -> Option<&str> {
        self.entries.get(major_minor).map(String::as_str)
    }

    /// Highest known version satisfying a caret match against `requested`.
    pub fn max_satisfying(&self, requested: &CoercedVersion) -> Option<String> {
        let req = requested.caret()?;
        self.entries
            .values()
            .chain(std::iter::once(&self.latest))
            .filter_map(|raw| Version::parse(raw).ok())
            .filter(|version| req.matches(version))
            .max()
            .map(|version| version.to_string())
    }
}
