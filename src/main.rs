mod cli;

use clap::Parser;
use cli::{Cli, Commands, ConfigArgs};
use filesyncer::app::App;
use filesyncer::config::{Config, ConfigError};
use filesyncer::observability;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

fn load_config(args: ConfigArgs) -> Result<Config, ConfigError> {
    match args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(args)?;
            observability::init_tracing(&config.telemetry);
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting filesyncer");

            App::build(config)?.run().await?;
        }
        Commands::CheckConfig(args) => {
            let config = load_config(args)?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
