//! SHA-512 manifest verification of the retrieved bundle.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::logger::Logger;

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    Mismatch {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("Malformed manifest record at line {line}: '{record}'")]
    Malformed { line: usize, record: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One `<hex digest>  <file name>` manifest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub expected: String,
    pub file_name: String,
}

/// Parses manifest text. Blank lines are ignored; any other line lacking the
/// two-space separator, a hex digest or a file name is rejected.
pub fn parse_manifest(text: &str) -> Result<Vec<ChecksumEntry>, IntegrityError> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let record = raw.trim_end_matches('\r');
        if record.trim().is_empty() {
            continue;
        }
        let malformed = || IntegrityError::Malformed {
            line: index + 1,
            record: record.to_string(),
        };

        let (digest, name) = record.split_once("  ").ok_or_else(malformed)?;
        let digest = digest.trim();
        let name = name.trim();
        if digest.is_empty()
            || name.is_empty()
            || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(malformed());
        }

        entries.push(ChecksumEntry {
            expected: digest.to_string(),
            file_name: name.to_string(),
        });
    }
    Ok(entries)
}

/// Streams a file through SHA-512 and returns the lower-case hex digest.
pub async fn sha512_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = File::open(path).await?;
    let mut buffer = vec![0; 8192];
    let mut hasher = Sha512::new();
    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Checks every manifest entry present under `root`. Returns how many files
/// were hashed; entries naming absent files are skipped.
pub async fn verify_manifest(
    root: &Path,
    entries: &[ChecksumEntry],
    logger: &mut Logger,
) -> Result<usize, IntegrityError> {
    let mut verified = 0;
    for entry in entries {
        let path = root.join(&entry.file_name);
        if !tokio::fs::try_exists(&path).await? {
            logger.debug(format!("Skipping checksum of absent {}", entry.file_name));
            continue;
        }

        let actual = sha512_file(&path).await?;
        if !actual.eq_ignore_ascii_case(&entry.expected) {
            logger.error(format!("Checksum mismatch for {}", entry.file_name));
            return Err(IntegrityError::Mismatch {
                file: entry.file_name.clone(),
                expected: entry.expected.clone(),
                actual,
            });
        }
        logger.debug(format!("Checksum of {} OK", entry.file_name));
        verified += 1;
    }
    Ok(verified)
}
