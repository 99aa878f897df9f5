pub mod commands;
pub mod config;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use cs_domain::item::TimeBucket;

/// contentsched: schedule, optimize and publish content items.
#[derive(Debug, Parser)]
#[command(name = "contentsched", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the occurrences of a recurrence rule.
    Occurrences {
        /// RRULE-style string (FREQ=WEEKLY;BYDAY=MO,WE) or a 5-field cron expression.
        #[arg(long)]
        rule: String,
        /// First occurrence (RFC 3339).
        #[arg(long)]
        start: DateTime<Utc>,
        /// IANA timezone the rule is evaluated in.
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Number of occurrences to print.
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Optimize a JSON array of items and print the result.
    Optimize {
        /// Path to a JSON array of items.
        #[arg(long)]
        items: PathBuf,
    },
    /// List free time slots around the items in a file.
    Slots {
        /// Path to a JSON array of items.
        #[arg(long)]
        items: Option<PathBuf>,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        /// Slot length in minutes.
        #[arg(long, default_value_t = 60)]
        duration: u32,
        /// Only keep slots in this time-of-day bucket.
        #[arg(long, value_enum)]
        bucket: Option<BucketArg>,
        /// Include slots outside working hours.
        #[arg(long)]
        any_time: bool,
    },
    /// Run the due-item poller until interrupted.
    Serve {
        /// Items to merge into the loaded set before starting.
        #[arg(long)]
        items: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BucketArg {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl From<BucketArg> for TimeBucket {
    fn from(arg: BucketArg) -> Self {
        match arg {
            BucketArg::Morning => TimeBucket::Morning,
            BucketArg::Afternoon => TimeBucket::Afternoon,
            BucketArg::Evening => TimeBucket::Evening,
            BucketArg::Night => TimeBucket::Night,
        }
    }
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `CS_CONFIG` (or `config.toml`). A missing
/// file yields the defaults. Returns the config and the path used.
pub fn load_config() -> anyhow::Result<(cs_domain::config::Config, String)> {
    let config_path = std::env::var("CS_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        cs_domain::config::Config::default()
    };

    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_occurrences_command() {
        let cli = Cli::try_parse_from([
            "contentsched",
            "occurrences",
            "--rule",
            "FREQ=DAILY",
            "--start",
            "2024-06-17T09:00:00Z",
            "--count",
            "3",
        ])
        .unwrap();
        match cli.command {
            Command::Occurrences {
                rule,
                count,
                timezone,
                ..
            } => {
                assert_eq!(rule, "FREQ=DAILY");
                assert_eq!(count, 3);
                assert_eq!(timezone, "UTC");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_slots_bucket() {
        let cli = Cli::try_parse_from([
            "contentsched",
            "slots",
            "--start",
            "2024-06-17T09:00:00Z",
            "--end",
            "2024-06-17T17:00:00Z",
            "--bucket",
            "afternoon",
        ])
        .unwrap();
        match cli.command {
            Command::Slots {
                bucket, duration, ..
            } => {
                assert!(matches!(bucket, Some(BucketArg::Afternoon)));
                assert_eq!(duration, 60);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
