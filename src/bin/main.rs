use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::error;
use serde_json::{Map, Value};
use veritrace_root::{Gateway, GatewayError, GenerateRequest};

#[derive(Parser)]
#[command(name = "veritrace")]
#[command(about = "Verifiable LLM generation gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the safety consensus, generate, fingerprint, and commit on-chain
    Generate {
        /// Provider id (openai, grok, claude, gemini, deepseek)
        #[arg(long)]
        provider: String,

        /// Model name recorded alongside the response
        #[arg(long)]
        model: String,

        /// Prompt text
        prompt: String,

        /// Generation parameters as a JSON object
        #[arg(long)]
        parameters: Option<String>,

        /// Skip the on-chain commit
        #[arg(long)]
        no_commit: bool,

        /// Block until the commit transaction is confirmed
        #[arg(long)]
        wait: bool,
    },

    /// Reconstruct and verify a committed transaction hash
    Verify {
        tx_hash: String,
    },

    /// List the registered provider routes
    Models,
}

fn parse_parameters(raw: Option<String>) -> Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(raw) => match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => bail!("--parameters must be a JSON object"),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            provider,
            model,
            prompt,
            parameters,
            no_commit,
            wait,
        } => {
            let gateway = Gateway::from_env()?;
            let request = GenerateRequest {
                provider,
                model,
                prompt,
                parameters: parse_parameters(parameters)?,
                commit: !no_commit,
                wait_for_confirmation: wait,
            };
            match gateway.generate(request).await {
                Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                Err(GatewayError::ConsensusRejected(outcome)) => {
                    error!("{}", outcome.message());
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    std::process::exit(1);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Verify { tx_hash } => {
            let gateway = Gateway::from_env()?;
            let result = gateway.verify(&tx_hash).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.overall_verified {
                std::process::exit(1);
            }
        }
        Commands::Models => {
            for (provider, route) in veritrace_llm::openrouter::MODEL_ROUTES {
                println!("{provider:<10} {route}");
            }
        }
    }

    Ok(())
}
