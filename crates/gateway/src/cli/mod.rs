pub mod config;
pub mod doctor;
pub mod run;

use clap::{Parser, Subcommand};

/// A research-agent gateway: CLI entry point, HTTP surface for webhook
/// triggers, and the scheduler for cron-driven ones.
#[derive(Debug, Parser)]
#[command(name = "ra-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Send a single request to the research agent and print the report.
    Run {
        /// The research request.
        message: String,
        /// Thread id (defaults to "cli:run").
        #[arg(long, default_value = "cli:run")]
        thread: String,
        /// Output the full run outcome as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path specified by `RA_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(ra_domain::config::Config, String)> {
    let config_path = std::env::var("RA_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        ra_domain::config::Config::default()
    };

    Ok((config, config_path))
}
