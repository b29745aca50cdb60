//! ExoAI - Main Entry Point

use clap::Parser;
use exoai::cli::{cmd_info, cmd_predict, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exoai=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, mode, max_samples, seed, output } => {
            cmd_train(&data, &mode, max_samples, seed, &output)?;
        }
        Commands::Predict { data, output, models } => {
            cmd_predict(&data, output.as_deref(), &models)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
        Commands::Serve { port, host } => {
            cmd_serve(&host, port).await?;
        }
    }

    Ok(())
}
