//! recon-anomaly command-line entry point

use clap::Parser;
use recon_anomaly::cli::{cmd_config, cmd_info, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recon_anomaly=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, config, output, seed, epochs, batch_size, hidden } => {
            cmd_run(
                &data,
                config.as_deref(),
                output.as_deref(),
                seed,
                epochs,
                batch_size,
                &hidden,
            )?;
        }
        Commands::Info { data, config } => {
            cmd_info(&data, config.as_deref())?;
        }
        Commands::Config => {
            cmd_config()?;
        }
    }

    Ok(())
}
