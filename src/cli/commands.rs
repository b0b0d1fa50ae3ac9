use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::cli::options::{GenerateArgs, RunArgs};
use crate::plan::{BootstrapPlan, PlanError};
use crate::runtime::{exit_codes, BootstrapProtocol, Logger};
use crate::template::{write_companion, write_script, GeneratorError, ScriptAssembler};
use crate::types::config::{
    parse_env_assignment, BootstrapConfig, BootstrapRequest, ConfigError,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("Generation error: {0}")]
    Generator(#[from] GeneratorError),
    #[error("Either a plan or a request file is required")]
    MissingSource,
}

/// Files produced by `generate`.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub script_path: PathBuf,
    pub plan_path: Option<PathBuf>,
}

/// Merges the request file, if any, with the command line flags.
/// Scalar flags replace request values; list flags are appended.
pub fn build_config(args: &GenerateArgs) -> Result<BootstrapConfig, ConfigError> {
    let mut request = match &args.request {
        Some(path) => BootstrapRequest::load(path)?,
        None => BootstrapRequest::default(),
    };

    if let Some(options) = &args.options {
        request.options = options.clone();
    }
    if let Some(exec_dir) = &args.exec_dir {
        request.exec_dir = Some(exec_dir.clone());
    }
    request.locations.extend(args.locations.iter().cloned());
    request.cache_roots.extend(args.cache_roots.iter().cloned());
    for raw in &args.env {
        let (name, value) = parse_env_assignment(raw)?;
        request.env.insert(name, value);
    }
    request.payload_files.extend(args.payloads.iter().cloned());
    if let Some(proxy) = &args.proxy {
        request.proxy_file = Some(proxy.clone());
    }
    if let Some(timeout) = args.timeout {
        request.settings.fetch_timeout_secs = timeout;
    }
    if args.insecure {
        request.settings.validate_certs = false;
    }

    request.into_config()
}

pub fn generate(args: &GenerateArgs) -> Result<GenerateOutcome, CliError> {
    let config = build_config(args)?;
    let plan = BootstrapPlan::compile(&config)?;
    let script = ScriptAssembler::new()?.assemble(&plan)?;
    let script_path = write_script(args.output_dir.as_deref(), &script)?;

    let plan_path = if args.emit_plan {
        let path = write_companion(&script_path, "json", &plan.to_json()?)?;
        info!("Plan written to {}", path.display());
        Some(path)
    } else {
        None
    };

    Ok(GenerateOutcome {
        script_path,
        plan_path,
    })
}

pub fn load_plan(args: &RunArgs) -> Result<BootstrapPlan, CliError> {
    match (&args.plan, &args.request) {
        (Some(path), _) => Ok(BootstrapPlan::load(path)?),
        (None, Some(path)) => {
            let config = BootstrapRequest::load(path)?.into_config()?;
            Ok(BootstrapPlan::compile(&config)?)
        }
        (None, None) => Err(CliError::MissingSource),
    }
}

/// Runs the protocol in this process and returns the process exit code.
pub async fn run(args: &RunArgs) -> Result<i32, CliError> {
    let plan = load_plan(args)?;
    let protocol = match BootstrapProtocol::new(plan) {
        Ok(protocol) => protocol.enter_workdir(true),
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(e.exit_code());
        }
    };

    let mut logger = Logger::new();
    match protocol.run(&mut logger).await {
        Ok(report) => {
            info!(
                "Bootstrap {} finished after {} retrieval attempt(s)",
                report.run_id,
                report.attempts.len()
            );
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => Ok(e.exit_code()),
    }
}
