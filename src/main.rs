//! CreditLens - Main Entry Point

use clap::Parser;
use creditlens::cli::{cmd_lime, cmd_predict, cmd_serve, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creditlens=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, model } => {
            cmd_serve(host, port, model).await?;
        }
        Commands::Predict { model, input } => {
            cmd_predict(&model, &input)?;
        }
        Commands::Lime { model, input, seed } => {
            cmd_lime(&model, &input, seed)?;
        }
    }

    Ok(())
}
