//! CLI argument definitions using clap
//!
//! - trellis validate --config trellis.toml
//! - trellis rate-limit --rate 5/minute --calls 20
//! - trellis probe --config trellis.toml
//! - trellis call --config trellis.toml --group weather --path /forecast

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use trellis_core::{CallerTier, LogFormat};

/// Default configuration file name used across all CLI commands.
pub const DEFAULT_CONFIG_FILE: &str = "trellis.toml";

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Trellis - circuit breakers, rate limits and API rotation for external services")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate a configuration file, then print a summary
    Validate(ConfigArgs),

    /// Run rate-limit decisions against the in-memory store
    RateLimit(RateLimitArgs),

    /// Health-check every endpoint of the configured rotation groups
    Probe {
        #[command(flatten)]
        config: ConfigArgs,

        /// Only probe this rotation group
        #[arg(long)]
        group: Option<String>,
    },

    /// Send one request through a rotation group
    Call(CallArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file (TOML, YAML or JSON)
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RateLimitArgs {
    /// Budget for the caller, e.g. "5/minute"
    #[arg(long, default_value = "5/minute")]
    pub rate: String,

    /// Extra requests allowed once the window is full
    #[arg(long, default_value_t = 10)]
    pub burst: u32,

    /// Number of calls to simulate
    #[arg(long, default_value_t = 20)]
    pub calls: u32,

    /// Count calls against this user id
    #[arg(long, conflicts_with = "ip")]
    pub user: Option<String>,

    /// Count calls against this client address
    #[arg(long)]
    pub ip: Option<String>,

    /// Tier of the user given with --user
    #[arg(long, value_enum, default_value = "user")]
    pub tier: TierArg,

    #[arg(long, default_value = "/api/v1/demo")]
    pub path: String,

    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Take endpoint overrides and prefixes from this config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Rotation group (category) to call through
    #[arg(long)]
    pub group: String,

    /// Request path relative to each endpoint's base URL
    #[arg(long)]
    pub path: String,

    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Query parameter as key=value; repeatable
    #[arg(long = "query", value_parser = parse_key_value)]
    pub query: Vec<(String, String)>,

    /// JSON request body
    #[arg(long)]
    pub body: Option<String>,

    /// Stop after this many endpoint attempts
    #[arg(long)]
    pub max_attempts: Option<usize>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierArg {
    User,
    Premium,
    Admin,
}

impl From<TierArg> for CallerTier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::User => CallerTier::User,
            TierArg::Premium => CallerTier::Premium,
            TierArg::Admin => CallerTier::Admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rate_limit_command() {
        let cli = Cli::parse_from([
            "trellis",
            "--log-level",
            "debug",
            "rate-limit",
            "--rate",
            "3/second",
            "--user",
            "alice",
            "--tier",
            "premium",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::RateLimit(args) => {
                assert_eq!(args.rate, "3/second");
                assert_eq!(args.user.as_deref(), Some("alice"));
                assert_eq!(args.tier, TierArg::Premium);
                assert_eq!(args.calls, 20);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_call_command() {
        let cli = Cli::parse_from([
            "trellis",
            "call",
            "--group",
            "weather",
            "--path",
            "/forecast",
            "--query",
            "q=lyon",
            "--max-attempts",
            "2",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.log_format, Some(LogFormatArg::Json));
        match cli.command {
            Commands::Call(args) => {
                assert_eq!(args.config.config, PathBuf::from(DEFAULT_CONFIG_FILE));
                assert_eq!(args.query, vec![("q".to_string(), "lyon".to_string())]);
                assert_eq!(args.max_attempts, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_key_value_parser() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
        assert_eq!(
            parse_key_value("units=metric").unwrap(),
            ("units".to_string(), "metric".to_string())
        );
    }
}
