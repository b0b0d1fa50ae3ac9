use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Prefix marking a filesystem-addressable base.
pub const FILE_SCHEME: &str = "file:";
/// Prefix accepted as an already-qualified network base.
pub const SECURE_SCHEME: &str = "https:";
/// Transport prepended to bare remote bases.
pub const DEFAULT_TRANSPORT: &str = "https://";

/// One candidate distribution base, in priority order within a resolved list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "base", rename_all = "lowercase")]
pub enum LocationSpec {
    Remote(String),
    Local(PathBuf),
}

impl LocationSpec {
    /// Classifies a base the way it is written in deployment requests.
    pub fn parse(base: &str) -> Self {
        match base.strip_prefix(FILE_SCHEME) {
            Some(path) => LocationSpec::Local(PathBuf::from(path)),
            None if base.starts_with(SECURE_SCHEME) => LocationSpec::Remote(base.to_string()),
            None => LocationSpec::Remote(format!("{DEFAULT_TRANSPORT}{base}")),
        }
    }

    /// Same kind of location, one path segment deeper.
    pub fn join(&self, segment: &str) -> Self {
        match self {
            LocationSpec::Remote(base) => LocationSpec::Remote(join_url(base, segment)),
            LocationSpec::Local(path) => LocationSpec::Local(path.join(segment)),
        }
    }

    /// Address of a named resource under this base.
    pub fn resource(&self, name: &str) -> String {
        self.join(name).to_string()
    }
}

impl fmt::Display for LocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSpec::Remote(url) => write!(f, "{url}"),
            LocationSpec::Local(path) => write!(f, "{FILE_SCHEME}{}", path.display()),
        }
    }
}

fn join_url(base: &str, segment: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{segment}")
    } else {
        format!("{base}/{segment}")
    }
}
