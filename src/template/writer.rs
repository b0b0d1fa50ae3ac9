//! Persists generated scripts.

use std::io::Write;
use std::path::{Path, PathBuf};

use super::generator::{GeneratedScript, GeneratorError};

const SCRIPT_PREFIX: &str = "DIRAC_";
const SCRIPT_SUFFIX: &str = "_pilotwrapper.sh";

/// Writes exactly the script bytes to a fresh, uniquely named file and
/// returns its path. Uses the system temp directory when `dir` is `None`.
pub fn write_script(dir: Option<&Path>, script: &GeneratedScript) -> Result<PathBuf, GeneratorError> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&dir)?;

    let mut file = tempfile::Builder::new()
        .prefix(SCRIPT_PREFIX)
        .suffix(SCRIPT_SUFFIX)
        .tempfile_in(&dir)?;
    file.write_all(script.as_bytes())?;
    file.flush()?;

    let (_, path) = file.keep().map_err(|e| GeneratorError::Io(e.error))?;
    tracing::info!("Bootstrap script written to {}", path.display());
    Ok(path)
}

/// Writes a companion file next to a script, e.g. the compiled plan.
pub fn write_companion(script_path: &Path, extension: &str, content: &str) -> Result<PathBuf, GeneratorError> {
    let path = script_path.with_extension(extension);
    std::fs::write(&path, content)?;
    Ok(path)
}
