//! Native execution of a bootstrap plan on the target node.
//!
//! The protocol is strictly sequential:
//! `Init → StageWorkdir → UnpackPayload → Retrieve → Verify → Execute → Cleanup`.
//! Retrieval only runs when the plan carries locations and verification only
//! when a manifest was retrieved. Once the working directory exists, cleanup
//! runs on every path.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::plan::BootstrapPlan;
use crate::types::location::LocationSpec;
use crate::types::settings::BundleLayout;

use super::error::{AttemptError, BootstrapError};
use super::extract::{CommandExtractor, Extractor, TarExtractor};
use super::fetch::{DistributionFetcher, Fetcher};
use super::launch::{resolve_interpreter, resolve_run_id, Invocation, Launcher, ProcessLauncher};
use super::logger::Logger;
use super::payload;
use super::verify::{parse_manifest, verify_manifest, IntegrityError};
use super::workdir::WorkingDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    StageWorkdir,
    UnpackPayload,
    Retrieve,
    Verify,
    Execute,
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalAttempt {
    pub location: LocationSpec,
    pub outcome: AttemptOutcome,
}

/// What a successful run went through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub run_id: String,
    pub phases: Vec<Phase>,
    pub attempts: Vec<RetrievalAttempt>,
    pub verified_files: usize,
    pub workload_exit_code: Option<i32>,
}

impl BootstrapReport {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            phases: Vec::new(),
            attempts: Vec::new(),
            verified_files: 0,
            workload_exit_code: None,
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(?phase, "Entering bootstrap phase");
        self.phases.push(phase);
    }
}

pub struct BootstrapProtocol {
    plan: BootstrapPlan,
    fetcher: Box<dyn Fetcher>,
    primary: Box<dyn Extractor>,
    fallback: Box<dyn Extractor>,
    launcher: Box<dyn Launcher>,
    run_id: Option<String>,
    enter_workdir: bool,
}

impl BootstrapProtocol {
    /// Protocol with the network fetcher, tar extractors and process launcher.
    pub fn new(plan: BootstrapPlan) -> Result<Self, BootstrapError> {
        let fetcher = DistributionFetcher::new(&plan.settings)?;
        Ok(Self::with_components(
            plan,
            Box::new(fetcher),
            Box::new(TarExtractor),
            Box::new(CommandExtractor::default()),
            Box::new(ProcessLauncher),
        ))
    }

    pub fn with_components(
        plan: BootstrapPlan,
        fetcher: Box<dyn Fetcher>,
        primary: Box<dyn Extractor>,
        fallback: Box<dyn Extractor>,
        launcher: Box<dyn Launcher>,
    ) -> Self {
        Self {
            plan,
            fetcher,
            primary,
            fallback,
            launcher,
            run_id: None,
            enter_workdir: false,
        }
    }

    /// Fixes the run identifier instead of reading the stamp variable.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Makes the process change into the working directory while it runs.
    pub fn enter_workdir(mut self, enter: bool) -> Self {
        self.enter_workdir = enter;
        self
    }

    pub fn plan(&self) -> &BootstrapPlan {
        &self.plan
    }

    pub async fn run(&self, logger: &mut Logger) -> Result<BootstrapReport, BootstrapError> {
        let settings = &self.plan.settings;
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| resolve_run_id(&settings.stamp_env));
        let mut report = BootstrapReport::new(run_id);

        report.enter(Phase::Init);
        log_environment(logger);

        report.enter(Phase::StageWorkdir);
        let base = self.plan.exec_dir.as_deref().map(Path::new);
        let workdir = match WorkingDirectory::stage(base, settings) {
            Ok(workdir) => workdir,
            Err(e) => {
                logger.error(format!("Cannot create the working directory: {e}"));
                return Err(BootstrapError::Workdir(e));
            }
        };
        logger.info(format!("Working directory: {}", workdir.path().display()));

        let previous_dir = if self.enter_workdir {
            let previous = std::env::current_dir().ok();
            if let Err(e) = std::env::set_current_dir(workdir.path()) {
                logger.error(format!("Cannot enter the working directory: {e}"));
                return Err(BootstrapError::Workdir(e));
            }
            previous
        } else {
            None
        };

        let result = self.run_staged(&workdir, logger, &mut report).await;
        if let Err(e) = &result {
            logger.error(e.to_string());
        }

        report.enter(Phase::Cleanup);
        if let Some(previous) = previous_dir {
            if let Err(e) = std::env::set_current_dir(&previous) {
                logger.warn(format!("Cannot return to {}: {e}", previous.display()));
            }
        }
        let path = workdir.path().to_path_buf();
        if let Err(e) = workdir.remove() {
            logger.warn(format!("Cannot remove {}: {e}", path.display()));
        }
        let forwarded = logger.drain();
        tracing::debug!("Drained {} bootstrap log lines", forwarded.len());

        result.map(|()| report)
    }

    async fn run_staged(
        &self,
        workdir: &WorkingDirectory,
        logger: &mut Logger,
        report: &mut BootstrapReport,
    ) -> Result<(), BootstrapError> {
        let root = workdir.path();
        let layout = &self.plan.settings.layout;

        report.enter(Phase::UnpackPayload);
        payload::unpack(root, &self.plan.payload, logger).await?;

        let env = self.plan.workload_env(root);
        if !env.is_empty() {
            logger.info("Modifying the environment");
            for (name, value) in &env {
                logger.debug(format!("{name}={value}"));
            }
        }

        if !self.plan.locations.is_empty() {
            report.enter(Phase::Retrieve);
            self.retrieve(root, layout, logger, report).await?;

            let manifest = workdir.join(&layout.manifest);
            if tokio::fs::try_exists(&manifest)
                .await
                .map_err(IntegrityError::Io)?
            {
                report.enter(Phase::Verify);
                logger.info("Verifying checksums");
                let text = tokio::fs::read_to_string(&manifest)
                    .await
                    .map_err(IntegrityError::Io)?;
                let entries = parse_manifest(&text)?;
                report.verified_files = verify_manifest(root, &entries, logger).await?;
                logger.info(format!("{} files verified", report.verified_files));
            }
        }

        report.enter(Phase::Execute);
        let invocation = self.invocation(root, &report.run_id, env)?;
        logger.info(format!("Launching: {}", invocation.command_line()));
        let input = logger.contents().into_bytes();
        let code = self.launcher.launch(&invocation, input).await?;
        report.workload_exit_code = Some(code);

        if code == 0 {
            logger.info("Pilot finished successfully");
            Ok(())
        } else {
            Err(BootstrapError::WorkloadFailed { code })
        }
    }

    /// Tries each candidate in order until one yields the full bundle.
    async fn retrieve(
        &self,
        root: &Path,
        layout: &BundleLayout,
        logger: &mut Logger,
        report: &mut BootstrapReport,
    ) -> Result<(), BootstrapError> {
        logger.info("Getting the pilot files");
        for location in &self.plan.locations {
            logger.info(format!("Trying {location}"));
            purge_bundle(root, layout, logger).await;

            match self.try_candidate(location, root, layout, logger).await {
                Ok(()) => {
                    logger.info(format!("Pilot files retrieved from {location}"));
                    report.attempts.push(RetrievalAttempt {
                        location: location.clone(),
                        outcome: AttemptOutcome::Success,
                    });
                    return Ok(());
                }
                Err(e) => {
                    logger.warn(format!("{location} unusable: {e}"));
                    report.attempts.push(RetrievalAttempt {
                        location: location.clone(),
                        outcome: AttemptOutcome::Failure(e.to_string()),
                    });
                }
            }
        }

        Err(BootstrapError::RetrievalExhausted {
            attempts: report.attempts.len(),
        })
    }

    async fn try_candidate(
        &self,
        location: &LocationSpec,
        root: &Path,
        layout: &BundleLayout,
        logger: &mut Logger,
    ) -> Result<(), AttemptError> {
        for resource in layout.resources() {
            let content = self
                .fetcher
                .fetch(location, resource)
                .await
                .map_err(|source| AttemptError::Fetch {
                    resource: resource.to_string(),
                    source,
                })?;
            tokio::fs::write(root.join(resource), content)
                .await
                .map_err(|source| AttemptError::Store {
                    resource: resource.to_string(),
                    source,
                })?;
        }

        let archive = root.join(&layout.archive);
        if let Err(e) = self.primary.extract(&archive, root).await {
            logger.warn(format!(
                "{} extraction failed ({e}), trying {}",
                self.primary.name(),
                self.fallback.name()
            ));
            self.fallback.extract(&archive, root).await?;
        }
        Ok(())
    }

    fn invocation(
        &self,
        root: &Path,
        run_id: &str,
        env: std::collections::BTreeMap<String, String>,
    ) -> Result<Invocation, BootstrapError> {
        let settings = &self.plan.settings;
        let words = self
            .plan
            .option_words()
            .map_err(|e| BootstrapError::InvalidOptions {
                options: self.plan.options.clone(),
                reason: e.to_string(),
            })?;

        let mut args = Vec::with_capacity(words.len() + 3);
        let program = match resolve_interpreter(settings) {
            Some(interpreter) => {
                args.push(settings.entry_point.clone());
                interpreter
            }
            None => root.join(&settings.entry_point).display().to_string(),
        };
        args.extend(words);
        args.push("--pilotUUID".to_string());
        args.push(run_id.to_string());

        Ok(Invocation {
            program,
            args,
            cwd: root.to_path_buf(),
            env,
        })
    }
}

/// Removes bundle files a previous candidate may have left behind.
pub async fn purge_bundle(root: &Path, layout: &BundleLayout, logger: &mut Logger) {
    for resource in layout.resources() {
        match tokio::fs::remove_file(root.join(resource)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                logger.warn(format!("Cannot remove stale {resource}: {e}"));
            }
            _ => {}
        }
    }
}

fn log_environment(logger: &mut Logger) {
    match hostname::get() {
        Ok(name) => logger.info(format!("Running on {}", name.to_string_lossy())),
        Err(e) => logger.warn(format!("Cannot determine host name: {e}")),
    }
    logger.debug("Environment:");
    for (name, value) in std::env::vars_os() {
        logger.debug(format!("{}={}", name.to_string_lossy(), value.to_string_lossy()));
    }
}
