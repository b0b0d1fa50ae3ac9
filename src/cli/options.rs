use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Pilot bootstrap generator and runtime
#[derive(Parser, Debug)]
#[command(name = "pilot-bootstrap")]
#[command(about = "Generate self-contained pilot bootstrap scripts and run the bootstrap protocol")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct PilotBootstrapCli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase diagnostic output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a bootstrap script for a compute node
    Generate(GenerateArgs),

    /// Execute the bootstrap protocol on this node
    Run(RunArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct GenerateArgs {
    /// Request file (YAML or JSON); flags extend or override it
    #[arg(short, long)]
    pub request: Option<PathBuf>,

    /// Option string passed to the pilot entry point
    #[arg(short, long, allow_hyphen_values = true)]
    pub options: Option<String>,

    /// Directory under which the working directory is created on the node
    #[arg(long)]
    pub exec_dir: Option<String>,

    /// Remote distribution base; repeatable or comma-separated
    #[arg(short, long = "location")]
    pub locations: Vec<String>,

    /// Local cache root holding per-project pilot files
    #[arg(long = "cache-root")]
    pub cache_roots: Vec<String>,

    /// Extra environment variable for the pilot (KEY=VALUE)
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// File embedded in the script under its base name
    #[arg(short, long = "payload")]
    pub payloads: Vec<PathBuf>,

    /// Credential file embedded as the proxy
    #[arg(long)]
    pub proxy: Option<PathBuf>,

    /// Per-request fetch timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip TLS certificate validation when fetching pilot files
    #[arg(long)]
    pub insecure: bool,

    /// Directory receiving the script (system temp dir by default)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Also write the compiled plan as JSON next to the script
    #[arg(long)]
    pub emit_plan: bool,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct RunArgs {
    /// Compiled plan JSON written by `generate --emit-plan`
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Request file compiled on the spot
    #[arg(short, long)]
    pub request: Option<PathBuf>,
}
