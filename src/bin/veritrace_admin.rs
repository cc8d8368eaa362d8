use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use veritrace_core::config::GatewayConfig;
use veritrace_root::Gateway;

#[derive(Parser)]
#[command(name = "veritrace_admin")]
#[command(about = "Operational checks for the Veritrace gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chain connectivity and signer account snapshot
    Status,

    /// Report which configuration variables are present
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let gateway = Gateway::from_env()?;
            let info = gateway.network_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Doctor => {
            // Requiredness comes from the same rules `from_env` enforces;
            // values are never printed, only presence.
            let mut missing_required = false;
            for report in GatewayConfig::describe_requirements() {
                let state = if report.set {
                    "set".to_string()
                } else if report.fatal {
                    missing_required = true;
                    "MISSING (required)".to_string()
                } else {
                    format!("unset ({})", report.note)
                };
                println!("{:<32} {state}", report.var);
            }
            if missing_required {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
