use crate::types::settings::BootstrapSettings;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Uniquely named directory owned by one bootstrap run.
///
/// Removed by [`WorkingDirectory::remove`], or on drop if the run unwinds.
#[derive(Debug)]
pub struct WorkingDirectory {
    dir: TempDir,
    path: PathBuf,
}

impl WorkingDirectory {
    /// Creates `<prefix><random><suffix>` under `base`, or under the current
    /// directory when no base is given, and resolves it to an absolute path.
    pub fn stage(base: Option<&Path>, settings: &BootstrapSettings) -> std::io::Result<Self> {
        let base = match base {
            Some(base) => base.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let dir = tempfile::Builder::new()
            .prefix(&settings.workdir_prefix)
            .suffix(&settings.workdir_suffix)
            .tempdir_in(&base)?;
        let path = std::fs::canonicalize(dir.path())?;
        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    pub fn remove(self) -> std::io::Result<()> {
        self.dir.close()
    }
}
