use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use super::settings::BootstrapSettings;

/// Payload name that is materialized as the node credential.
pub const PROXY_PAYLOAD: &str = "proxy";

static ENV_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env name pattern"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid payload name '{name}': {reason}")]
    InvalidPayloadName { name: String, reason: String },

    #[error("Invalid environment variable name '{name}'")]
    InvalidEnvName { name: String },

    #[error("Invalid environment assignment '{0}', expected KEY=VALUE")]
    InvalidEnvAssignment(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported request format: {0}")]
    UnsupportedFormat(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A named file to embed in the bootstrap script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    pub name: String,
    pub content: Vec<u8>,
}

impl PayloadEntry {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Reads a file and names the entry after its base name.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ConfigError::InvalidPayloadName {
                name: path.display().to_string(),
                reason: "path has no file name".to_string(),
            })?;
        let content = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { name, content })
    }

    /// Reads a credential file and stores it under the reserved proxy name.
    pub fn proxy_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(PROXY_PAYLOAD, content))
    }

    pub fn is_proxy(&self) -> bool {
        self.name == PROXY_PAYLOAD
    }
}

/// Everything needed to render one bootstrap script.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    pub payload: BTreeMap<String, PayloadEntry>,
    pub options: String,
    pub exec_dir: Option<String>,
    pub env: BTreeMap<String, String>,
    pub remote_locations: Vec<String>,
    pub local_cache_roots: Vec<String>,
    pub settings: BootstrapSettings,
}

impl BootstrapConfig {
    pub fn new(options: impl Into<String>) -> Self {
        Self {
            options: options.into(),
            ..Self::default()
        }
    }

    /// Adds a payload entry, replacing any previous entry with the same name.
    pub fn with_payload(mut self, entry: PayloadEntry) -> Self {
        self.payload.insert(entry.name.clone(), entry);
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_exec_dir(mut self, dir: impl Into<String>) -> Self {
        self.exec_dir = Some(dir.into());
        self
    }

    pub fn with_remote_location(mut self, base: impl Into<String>) -> Self {
        self.remote_locations.push(base.into());
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<String>) -> Self {
        self.local_cache_roots.push(root.into());
        self
    }

    pub fn with_settings(mut self, settings: BootstrapSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn has_proxy(&self) -> bool {
        self.payload.values().any(PayloadEntry::is_proxy)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, entry) in &self.payload {
            validate_payload_name(name)?;
            if name != &entry.name {
                return Err(ConfigError::InvalidPayloadName {
                    name: entry.name.clone(),
                    reason: format!("registered under '{name}'"),
                });
            }
        }
        validate_env_names(self.env.keys(), &self.settings)
    }
}

/// Payload names must be a single plain path component so the file lands
/// directly inside the working directory.
pub fn validate_payload_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name == "." || name == ".." {
        Some("reserved directory name")
    } else if name.contains(['/', '\\', '\0']) || !is_single_component(name) {
        Some("must be a plain file name")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ConfigError::InvalidPayloadName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// True when `name` is exactly one normal path component.
pub fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(first)), None) if first == name
    )
}

/// Checks variable names for the workload plus the names the settings reserve.
pub fn validate_env_names<'a, I>(names: I, settings: &BootstrapSettings) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a String>,
{
    let check = |name: &String| {
        if ENV_NAME.is_match(name) {
            Ok(())
        } else {
            Err(ConfigError::InvalidEnvName { name: name.clone() })
        }
    };
    for name in names {
        check(name)?;
    }
    check(&settings.stamp_env)?;
    check(&settings.proxy_env)
}

/// Parses a `KEY=VALUE` assignment as given on the command line.
pub fn parse_env_assignment(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ConfigError::InvalidEnvAssignment(raw.to_string())),
    }
}

/// Deployment request as written to disk by the submitting side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapRequest {
    pub options: String,
    pub exec_dir: Option<String>,
    pub env: BTreeMap<String, String>,
    pub payload_files: Vec<PathBuf>,
    pub proxy_file: Option<PathBuf>,
    /// Remote bases; entries may also be comma-separated lists.
    pub locations: Vec<String>,
    pub cache_roots: Vec<String>,
    pub settings: BootstrapSettings,
}

impl BootstrapRequest {
    /// Loads a request, picking YAML or JSON from the file extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Reads the referenced payload files and produces a validated config.
    pub fn into_config(self) -> Result<BootstrapConfig, ConfigError> {
        let mut config = BootstrapConfig {
            options: self.options,
            exec_dir: self.exec_dir.filter(|d| !d.is_empty()),
            env: self.env,
            remote_locations: split_locations(&self.locations),
            local_cache_roots: self.cache_roots,
            settings: self.settings,
            ..BootstrapConfig::default()
        };

        for path in &self.payload_files {
            let entry = PayloadEntry::from_file(path)?;
            config.payload.insert(entry.name.clone(), entry);
        }
        if let Some(proxy) = &self.proxy_file {
            let entry = PayloadEntry::proxy_from_file(proxy)?;
            config.payload.insert(entry.name.clone(), entry);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Flattens comma-separated location lists, dropping blanks and spaces.
pub fn split_locations<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|item| item.as_ref().split(','))
        .map(|loc| loc.replace(' ', ""))
        .filter(|loc| !loc.is_empty())
        .collect()
}
