//! Compiled form of a bootstrap configuration.
//!
//! A plan carries payload already encoded, locations already resolved and the
//! settings the node needs. The script assembler renders it and the native
//! runtime executes it.

use crate::codec::{self, CodecError};
use crate::resolver::LocationResolver;
use crate::types::config::{
    validate_env_names, validate_payload_name, BootstrapConfig, ConfigError, PROXY_PAYLOAD,
};
use crate::types::location::LocationSpec;
use crate::types::settings::BootstrapSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to encode payload '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: CodecError,
    },
    #[error("Failed to read plan {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapPlan {
    /// Sorted by name.
    pub payload: Vec<EncodedPayload>,
    pub options: String,
    pub exec_dir: Option<String>,
    pub env: BTreeMap<String, String>,
    pub locations: Vec<LocationSpec>,
    pub settings: BootstrapSettings,
}

impl BootstrapPlan {
    pub fn compile(config: &BootstrapConfig) -> Result<Self, PlanError> {
        config.validate()?;

        let payload = config
            .payload
            .values()
            .map(|entry| {
                codec::encode(&entry.content)
                    .map(|token| EncodedPayload {
                        name: entry.name.clone(),
                        token,
                    })
                    .map_err(|source| PlanError::Encode {
                        name: entry.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let locations = LocationResolver::new(&config.settings).resolve(
            &config.remote_locations,
            &config.local_cache_roots,
            &config.options,
        );

        Ok(Self {
            payload,
            options: config.options.clone(),
            exec_dir: config.exec_dir.clone().filter(|d| !d.is_empty()),
            env: config.env.clone(),
            locations,
            settings: config.settings.clone(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let plan: Self = serde_json::from_str(&content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Applies the configuration checks to a plan that did not come from
    /// [`BootstrapPlan::compile`].
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.payload {
            validate_payload_name(&entry.name)?;
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::InvalidPayloadName {
                    name: entry.name.clone(),
                    reason: "duplicate payload name".to_string(),
                }
                .into());
            }
        }
        validate_env_names(self.env.keys(), &self.settings)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The option string split with shell rules.
    pub fn option_words(&self) -> Result<Vec<String>, shell_words::ParseError> {
        shell_words::split(&self.options)
    }

    pub fn has_proxy(&self) -> bool {
        self.payload.iter().any(|p| p.name == PROXY_PAYLOAD)
    }

    /// Variables the delegated workload receives on top of the inherited
    /// environment, including the credential path when a proxy is staged.
    pub fn workload_env(&self, workdir: &Path) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        if self.has_proxy() {
            env.insert(
                self.settings.proxy_env.clone(),
                workdir.join(PROXY_PAYLOAD).display().to_string(),
            );
        }
        env
    }
}
