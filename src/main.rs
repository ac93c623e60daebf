//! weatherwise CLI
//!
//! Runs one pipeline operation for a city and prints the result as JSON.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use weatherwise::{WeatherService, WeatherwiseConfig, WeatherwiseError};

#[derive(Parser)]
#[command(name = "weatherwise")]
#[command(author, version, about = "City weather history, forecasts and alerts", long_about = None)]
struct Cli {
    /// Configuration file (default: weatherwise.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recent daily observations
    History {
        /// City name, optionally followed by a province ("南阳,河南")
        #[arg(default_value = "")]
        city: String,

        #[arg(short, long, default_value_t = 30)]
        days: usize,
    },

    /// Daily forecast
    Forecast {
        #[arg(default_value = "")]
        city: String,

        #[arg(short, long, default_value_t = 7)]
        days: usize,
    },

    /// Risk assessment for each forecast day
    Alerts {
        #[arg(default_value = "")]
        city: String,

        #[arg(short, long, default_value_t = 7)]
        days: usize,
    },

    /// Forecast days that are high risk or extreme
    Summary {
        #[arg(default_value = "")]
        city: String,

        #[arg(short, long, default_value_t = 7)]
        days: usize,
    },

    /// Clothing suggestions for the next day
    Recommend {
        #[arg(default_value = "")]
        city: String,

        #[arg(short, long, default_value_t = 1)]
        days: usize,
    },

    /// Drop cached history and fetch it again
    Refresh {
        #[arg(default_value = "")]
        city: String,
    },

    /// Resolved coordinate and nearest named place
    Locate {
        /// City name; located from the public IP address when omitted
        #[arg(default_value = "")]
        city: String,
    },
}

/// Log filter override from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

fn init_tracing(config: &WeatherwiseConfig, verbose: u8) {
    let level = log_filter_from_verbosity(verbose).unwrap_or(config.logging.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{json}");
    Ok(())
}

/// One-line report, led by the friendly message of the underlying library error
fn describe_error(error: &anyhow::Error) -> String {
    match error
        .chain()
        .find_map(|cause| cause.downcast_ref::<WeatherwiseError>())
    {
        Some(cause) => format!("{} ({error:#})", cause.user_message()),
        None => format!("{error:#}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = WeatherwiseConfig::load_from_path(cli.config.clone())
        .context("Failed to load configuration")?;
    init_tracing(&config, cli.verbose);

    let service = WeatherService::new(&config).context("Failed to create weather service")?;
    let default_city = config.data.default_city.clone();
    let city = |name: String| if name.trim().is_empty() { default_city.clone() } else { name };

    match cli.command {
        Commands::History { city: name, days } => {
            print_json(&service.history(&city(name), days).await?)?;
        }
        Commands::Forecast { city: name, days } => {
            print_json(&service.forecast(&city(name), days).await?)?;
        }
        Commands::Alerts { city: name, days } => {
            print_json(&service.alerts(&city(name), days).await?)?;
        }
        Commands::Summary { city: name, days } => {
            print_json(&service.alerts_summary(&city(name), days).await?)?;
        }
        Commands::Recommend { city: name, days } => {
            print_json(&service.recommend(&city(name), days).await?)?;
        }
        Commands::Refresh { city: name } => {
            print_json(&service.refresh(&city(name)).await)?;
        }
        Commands::Locate { city: name } => {
            print_json(&service.locate(&name).await)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_subcommand_arguments() {
        let cli = Cli::parse_from(["weatherwise", "-vv", "forecast", "上海", "--days", "10"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Forecast { ref city, days: 10 } if city == "上海"));
    }

    #[test]
    fn test_error_report_uses_friendly_message() {
        let error = anyhow::Error::from(WeatherwiseError::validation("days must be between 1 and 14"))
            .context("Forecast failed");
        let report = describe_error(&error);
        assert!(report.starts_with("Invalid input: days must be between 1 and 14"));
        assert!(report.contains("Forecast failed"));

        let plain = anyhow::anyhow!("no such file");
        assert_eq!(describe_error(&plain), "no such file");
    }

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(log_filter_from_verbosity(0), None);
        assert_eq!(log_filter_from_verbosity(1), Some("debug"));
        assert_eq!(log_filter_from_verbosity(5), Some("trace"));
    }
}
