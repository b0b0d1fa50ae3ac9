//! Materializes embedded payload files in the working directory.

use crate::codec;
use crate::plan::EncodedPayload;
use crate::types::config::is_single_component;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::error::PayloadError;
use super::logger::Logger;

/// Mode at creation: owner read/write.
pub const STAGING_MODE: u32 = 0o600;
/// Mode once the content is complete: owner read/write/execute.
pub const FINAL_MODE: u32 = 0o700;

/// Decodes every entry into `workdir/<name>`. Stops at the first failure.
pub async fn unpack(
    workdir: &Path,
    payload: &[EncodedPayload],
    logger: &mut Logger,
) -> Result<Vec<PathBuf>, PayloadError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    logger.info("Unpacking payload files");
    let mut written = Vec::with_capacity(payload.len());
    for entry in payload {
        let path = unpack_entry(workdir, entry).await?;
        logger.debug(format!("Unpacked {}", path.display()));
        written.push(path);
    }
    Ok(written)
}

async fn unpack_entry(workdir: &Path, entry: &EncodedPayload) -> Result<PathBuf, PayloadError> {
    if !is_single_component(&entry.name) {
        return Err(PayloadError::InvalidName(entry.name.clone()));
    }
    let content = codec::decode(&entry.token).map_err(|source| PayloadError::Decode {
        name: entry.name.clone(),
        source,
    })?;

    let path = workdir.join(&entry.name);
    let write_err = |source| PayloadError::Write {
        path: path.clone(),
        source,
    };

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(STAGING_MODE);

    let mut file = options.open(&path).await.map_err(write_err)?;
    file.write_all(&content).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(FINAL_MODE))
            .await
            .map_err(write_err)?;
    }

    Ok(path)
}
