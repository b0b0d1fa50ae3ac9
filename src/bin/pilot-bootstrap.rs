use anyhow::Result;
use clap::Parser;
use pilot_bootstrap::cli::{generate, run, Commands, PilotBootstrapCli};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PilotBootstrapCli::parse();

    // Diagnostics go to stderr; stdout belongs to the bootstrap log.
    let level = match cli.verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    debug!("Starting pilot-bootstrap v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Generate(args) => {
            let outcome = generate(&args)?;
            if let Some(plan) = &outcome.plan_path {
                info!("Plan: {}", plan.display());
            }
            println!("{}", outcome.script_path.display());
            Ok(())
        }
        Commands::Run(args) => {
            let code = run(&args).await?;
            std::process::exit(code);
        }
    }
}
