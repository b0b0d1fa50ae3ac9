use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Names of the three resources every distribution location serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleLayout {
    pub manifest: String,
    pub descriptor: String,
    pub archive: String,
    /// Path segment appended to each remote base for the secondary candidate.
    pub location_suffix: String,
}

impl Default for BundleLayout {
    fn default() -> Self {
        Self {
            manifest: "checksums.sha512".to_string(),
            descriptor: "pilot.json".to_string(),
            archive: "pilot.tar".to_string(),
            location_suffix: "pilot".to_string(),
        }
    }
}

impl BundleLayout {
    /// Resources in the order they are fetched from a candidate.
    pub fn resources(&self) -> [&str; 3] {
        [&self.manifest, &self.descriptor, &self.archive]
    }
}

/// Runtime knobs shared by the generated script and the native executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub fetch_timeout_secs: u64,
    pub layout: BundleLayout,
    pub entry_point: String,
    /// Interpreter for the entry point; discovered on the node when unset.
    pub interpreter: Option<String>,
    pub stamp_env: String,
    pub proxy_env: String,
    pub project_flag: String,
    pub project_sentinel: String,
    pub project_suffix: String,
    pub workdir_prefix: String,
    pub workdir_suffix: String,
    pub validate_certs: bool,
    /// Last-resort base used verbatim when a request lists no cache roots,
    /// e.g. `file:/cvmfs/dirac.egi.eu/pilot`.
    pub default_cache_location: Option<String>,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            layout: BundleLayout::default(),
            entry_point: "dirac-pilot.py".to_string(),
            interpreter: None,
            stamp_env: "DIRAC_PILOT_STAMP".to_string(),
            proxy_env: "X509_USER_PROXY".to_string(),
            project_flag: "-l".to_string(),
            project_sentinel: "dirac".to_string(),
            project_suffix: "dirac".to_string(),
            workdir_prefix: "DIRAC_".to_string(),
            workdir_suffix: "pilot".to_string(),
            validate_certs: true,
            default_cache_location: None,
        }
    }
}

impl BootstrapSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Interpreters probed in order when none is configured.
    pub fn interpreter_candidates() -> &'static [&'static str] {
        &["python", "python3", "python2"]
    }
}
