//! Command routing logic for CLI

use std::path::Path;

use anyhow::Context;
use trellis_core::TrellisConfig;
use trellis_core::config::load_from_file;

use crate::args::{Cli, Commands};
use crate::{commands, logging};

/// Load the configuration the command refers to, install logging, dispatch.
pub async fn route(cli: Cli) -> anyhow::Result<()> {
    let config = match config_path(&cli.command) {
        Some(path) => load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => TrellisConfig::default(),
    };

    let mut logging_config = config.logging.clone();
    logging_config.merge(cli.log_level.clone(), cli.log_format.map(Into::into));
    logging::init(&logging_config);

    tracing::debug!(command = command_name(&cli.command), "dispatching");

    match cli.command {
        Commands::Validate(args) => commands::validate::execute(&args.config, &config),
        Commands::RateLimit(args) => commands::rate_limit::execute(&args, &config).await,
        Commands::Probe { group, .. } => commands::probe::execute(&config, group.as_deref()).await,
        Commands::Call(args) => commands::call::execute(&args, &config).await,
    }
}

fn config_path(command: &Commands) -> Option<&Path> {
    match command {
        Commands::Validate(args) => Some(&args.config),
        Commands::RateLimit(args) => args.config.as_deref(),
        Commands::Probe { config, .. } => Some(&config.config),
        Commands::Call(args) => Some(&args.config.config),
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Validate(_) => "validate",
        Commands::RateLimit(_) => "rate-limit",
        Commands::Probe { .. } => "probe",
        Commands::Call(_) => "call",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_config_path_per_command() {
        let cli = Cli::parse_from(["trellis", "validate", "-c", "custom.yaml"]);
        assert_eq!(config_path(&cli.command), Some(Path::new("custom.yaml")));

        let cli = Cli::parse_from(["trellis", "rate-limit"]);
        assert_eq!(config_path(&cli.command), None);

        let cli = Cli::parse_from(["trellis", "probe", "--group", "weather"]);
        assert_eq!(
            config_path(&cli.command).map(Path::to_path_buf),
            Some(PathBuf::from(crate::args::DEFAULT_CONFIG_FILE))
        );
        assert_eq!(command_name(&cli.command), "probe");
    }
}
