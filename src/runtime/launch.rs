//! Delegated workload launch.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::types::settings::BootstrapSettings;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully resolved workload command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

#[async_trait]
pub trait Launcher: Send + Sync {
    /// Runs the invocation to completion, writing `input` to its stdin, and
    /// returns its exit code.
    async fn launch(&self, invocation: &Invocation, input: Vec<u8>) -> Result<i32, LaunchError>;
}

/// Spawns the workload as a child process with inherited stdout and stderr.
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, invocation: &Invocation, input: Vec<u8>) -> Result<i32, LaunchError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(&invocation.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let feeder = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                // Dropping stdin at the end of the task closes the pipe.
                match stdin.write_all(&input).await {
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                    _ => Ok(()),
                }
            })
        });

        let status = child.wait().await?;
        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Err(e)) => tracing::warn!("Could not forward log buffer: {}", e),
                Err(e) => tracing::warn!("Log forwarding task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }

        // Killed by a signal: no code, report as a generic failure.
        Ok(status.code().unwrap_or(-1))
    }
}

/// The configured interpreter, or the first candidate found on `PATH`.
pub fn resolve_interpreter(settings: &BootstrapSettings) -> Option<String> {
    if let Some(explicit) = settings.interpreter.as_ref().filter(|i| !i.is_empty()) {
        return Some(explicit.clone());
    }
    BootstrapSettings::interpreter_candidates()
        .iter()
        .find_map(|candidate| which::which(candidate).ok())
        .map(|path| path.display().to_string())
}

/// Run identifier from the override variable, or a fresh UUID.
pub fn resolve_run_id(stamp_env: &str) -> String {
    match std::env::var(stamp_env) {
        Ok(stamp) if !stamp.is_empty() => stamp,
        _ => uuid::Uuid::new_v4().to_string(),
    }
}
