use std::path::PathBuf;
use thiserror::Error;

use super::extract::ExtractError;
use super::fetch::FetchError;
use super::launch::LaunchError;
use super::verify::IntegrityError;
use crate::codec::CodecError;

/// Process exit codes of a bootstrap run.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const WORKLOAD_FAILURE: i32 = 1;
    pub const WORKDIR_FAILURE: i32 = 2;
    pub const PAYLOAD_FAILURE: i32 = 3;
    pub const RETRIEVAL_EXHAUSTED: i32 = 4;
    pub const INTEGRITY_FAILURE: i32 = 5;
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Cannot stage working directory: {0}")]
    Workdir(#[source] std::io::Error),

    #[error("Payload staging failed: {0}")]
    Payload(#[from] PayloadError),

    #[error("None of the {attempts} locations of the pilot files is reachable")]
    RetrievalExhausted { attempts: usize },

    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Invalid workload options '{options}': {reason}")]
    InvalidOptions { options: String, reason: String },

    #[error("Workload launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("Workload exited with code {code}")]
    WorkloadFailed { code: i32 },

    #[error("Fetcher setup failed: {0}")]
    Setup(#[from] FetchError),
}

impl BootstrapError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Workdir(_) => exit_codes::WORKDIR_FAILURE,
            BootstrapError::Payload(_) => exit_codes::PAYLOAD_FAILURE,
            BootstrapError::RetrievalExhausted { .. } => exit_codes::RETRIEVAL_EXHAUSTED,
            BootstrapError::Integrity(_) => exit_codes::INTEGRITY_FAILURE,
            BootstrapError::InvalidOptions { .. }
            | BootstrapError::Launch(_)
            | BootstrapError::WorkloadFailed { .. }
            | BootstrapError::Setup(_) => exit_codes::WORKLOAD_FAILURE,
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Payload name '{0}' is not a plain file name")]
    InvalidName(String),

    #[error("Cannot decode payload '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: CodecError,
    },

    #[error("Cannot write payload file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why one candidate location did not yield a usable bundle.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("fetching {resource} failed: {source}")]
    Fetch {
        resource: String,
        #[source]
        source: FetchError,
    },

    #[error("storing {resource} failed: {source}")]
    Store {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
}
