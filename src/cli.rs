use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "filesyncer")]
#[command(about = "Copies model files between storage backends for the job manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the job manager and process tasks until interrupted
    Run(ConfigArgs),

    /// Validate the configuration and print it as TOML (secrets omitted)
    CheckConfig(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to $FILESYNCER_CONFIG or config/filesyncer.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_config() {
        let cli = Cli::parse_from(["filesyncer", "run", "--config", "/etc/filesyncer.toml"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("/etc/filesyncer.toml")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config_without_path() {
        let cli = Cli::parse_from(["filesyncer", "check-config"]);
        assert!(matches!(cli.command, Commands::CheckConfig(ConfigArgs { config: None })));
    }
}
