//! Bundle archive extraction: built-in tar reader first, `tar` command second.

use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Stdio;
use tar::Archive;
use tokio::task;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TAR error: {0}")]
    Tar(String),
    #[error("'{command}' exited with {status}")]
    Command { command: String, status: String },
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unpacks `archive` into `dest`.
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError>;
}

/// In-process extraction with the `tar` crate.
pub struct TarExtractor;

impl TarExtractor {
    fn extract_sync(archive: &Path, dest: &Path) -> Result<usize, ExtractError> {
        let reader = BufReader::new(File::open(archive)?);
        let mut archive = Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);

        let mut extracted = 0;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            if entry.unpack_in(dest)? {
                extracted += 1;
            } else {
                tracing::warn!("Skipping unsafe path: {:?}", path);
            }
        }
        Ok(extracted)
    }
}

#[async_trait]
impl Extractor for TarExtractor {
    fn name(&self) -> &'static str {
        "tarfile"
    }

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        let count = task::spawn_blocking(move || Self::extract_sync(&archive, &dest))
            .await
            .map_err(|e| ExtractError::Tar(format!("Task join error: {e}")))??;
        tracing::debug!("Extracted {} entries", count);
        Ok(())
    }
}

/// Extraction through the system `tar` binary, run inside `dest`.
pub struct CommandExtractor {
    program: String,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandExtractor {
    fn default() -> Self {
        Self::new("tar")
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    fn name(&self) -> &'static str {
        "tar command"
    }

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
        let output = tokio::process::Command::new(&self.program)
            .arg("-xvf")
            .arg(archive)
            .current_dir(dest)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            tracing::debug!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
            Ok(())
        } else {
            Err(ExtractError::Command {
                command: format!("{} -xvf {}", self.program, archive.display()),
                status: output.status.to_string(),
            })
        }
    }
}
