use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pg_gateway::config::{PoolConfig, load_dotenv};
use pg_gateway::{Gateway, GatewayError, RowValues, prefix_public_schema};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and exercise the PG* pool configuration")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved pool configuration as JSON (password masked)
    Config,
    /// Print SQL text after schema prefixing
    Rewrite { sql: String },
    /// Check out a connection and run `SELECT 1`
    Ping,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), GatewayError> {
    match command {
        Command::Config => {
            load_dotenv();
            let config = PoolConfig::from_env()?;
            let json = serde_json::to_string_pretty(&config.redacted())
                .map_err(|e| GatewayError::ExecutionError(e.to_string()))?;
            println!("{json}");
        }
        Command::Rewrite { sql } => {
            println!("{}", prefix_public_schema(&sql));
        }
        Command::Ping => {
            let gateway = Gateway::from_env()?;
            let rows = gateway.query("SELECT 1 AS ok", &[]).await?;
            let ok = rows.first().and_then(|row| row.get("ok")).cloned();
            let status = gateway.status();
            info!(
                size = status.size,
                available = status.available,
                "pool status"
            );
            gateway.close();
            if ok != Some(RowValues::Int(1)) {
                return Err(GatewayError::ExecutionError(format!(
                    "unexpected ping result: {ok:?}"
                )));
            }
            println!("ok");
        }
    }
    Ok(())
}
