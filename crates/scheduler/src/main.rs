use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cs_domain::config::ObservabilityConfig;
use cs_scheduler::cli::{commands, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { items } => {
            let (config, config_path) = cs_scheduler::cli::load_config()?;
            init_tracing(&config.observability);
            tracing::info!(config = %config_path, "configuration loaded");
            commands::serve(config, items.as_deref()).await
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cs_scheduler::cli::load_config()?;
            if !cs_scheduler::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cs_scheduler::cli::load_config()?;
            print!("{}", cs_scheduler::cli::config::render(&config)?);
            Ok(())
        }
        Command::Occurrences {
            rule,
            start,
            timezone,
            count,
        } => {
            init_cli_tracing();
            for line in commands::occurrences(&rule, start, &timezone, count)? {
                println!("{line}");
            }
            Ok(())
        }
        Command::Optimize { items } => {
            init_cli_tracing();
            let (config, _) = cs_scheduler::cli::load_config()?;
            println!("{}", commands::optimize(&config, &items)?);
            Ok(())
        }
        Command::Slots {
            items,
            start,
            end,
            duration,
            bucket,
            any_time,
        } => {
            init_cli_tracing();
            let (config, _) = cs_scheduler::cli::load_config()?;
            let out = commands::slots(
                config,
                items.as_deref(),
                start,
                end,
                duration,
                bucket.map(Into::into),
                any_time,
            )
            .await
            .context("searching for free slots")?;
            println!("{out}");
            Ok(())
        }
    }
}

/// Structured tracing for `serve`. `RUST_LOG` wins over the configured
/// filter.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if obs.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

/// Compact stderr-only tracing for one-shot commands, so stdout stays
/// machine-readable.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
