//! Server configuration.
//!
//! Options come from the command line via `clap` and are turned into a
//! plain [`Config`] that the rest of the crate consumes.

use crate::storage::DEFAULT_SWEEP_INTERVAL;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::time::Duration;

/// Command-line arguments for the `tidekv` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "tidekv", about = "TideKV - in-memory Redis-compatible key-value server")]
#[command(version)]
pub struct Cli {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Milliseconds between two background expiry sweeps
    #[arg(
        long,
        default_value_t = DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reaper_interval_ms: u64,

    /// Log filter (overrides RUST_LOG), e.g. `debug` or `tidekv=trace`
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

/// Runtime configuration of a server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Interval of the background expiry sweeper
    pub reaper_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reaper_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            host: cli.host.clone(),
            port: cli.port,
            reaper_interval: Duration::from_millis(cli.reaper_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["tidekv"]).unwrap();
        let config = Config::from(&cli);

        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "tidekv",
            "--host",
            "0.0.0.0",
            "-p",
            "6380",
            "--reaper-interval-ms",
            "250",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = Config::from(&cli);

        assert_eq!(config.bind_address(), "0.0.0.0:6380");
        assert_eq!(config.reaper_interval, Duration::from_millis(250));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Cli::try_parse_from(["tidekv", "--reaper-interval-ms", "0"]).is_err());
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["tidekv", "--port", "70000"]).is_err());
    }
}
