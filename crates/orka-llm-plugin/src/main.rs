use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use orka_llm_plugin::config::Config;
use orka_llm_plugin::server;

/// Orka LLM plugin: serves Chat and Complete on a loopback RPC port.
#[derive(Parser)]
#[command(name = "orka-llm-plugin", version, about)]
struct Cli {
    /// TCP port for the RPC server (required)
    #[arg(short, long)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "Fatal startup error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::for_port(cli.port)?;

    tokio::select! {
        result = server::run(&config) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received interrupt, shutting down"),
    }
    Ok(())
}
