use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "voco-engine", about = "Voco cognitive engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the engine server (default).
    Serve,
    /// Inspect or validate the native config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the version.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Validate the config, exiting non-zero on errors.
    Validate,
    /// Print the effective config (file + env overrides).
    Show,
}
