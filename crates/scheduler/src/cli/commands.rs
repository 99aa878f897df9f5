//! Subcommand bodies. Each returns what it prints so it can be tested.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use cs_domain::config::Config;
use cs_domain::item::{ScheduleItem, TimeBucket};

use crate::engine::{ImportMode, SchedulingEngine, SlotPreferences};
use crate::optimizer::optimize_schedule;
use crate::publish::LogPublisher;
use crate::recurrence::{self, from_rule_string, parse_tz};
use crate::validation::validate_timezone;

pub fn read_items(path: &Path) -> anyhow::Result<Vec<ScheduleItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// One line per occurrence: UTC instant, then local wall-clock time.
pub fn occurrences(
    rule: &str,
    start: DateTime<Utc>,
    timezone: &str,
    count: usize,
) -> anyhow::Result<Vec<String>> {
    validate_timezone(timezone).map_err(anyhow::Error::msg)?;
    let rule = from_rule_string(rule).context("parsing recurrence rule")?;
    let tz = parse_tz(timezone);
    let instants = recurrence::occurrences(&rule, start, tz, count)?;
    Ok(instants
        .into_iter()
        .map(|at| {
            format!(
                "{}  ({})",
                at.to_rfc3339(),
                at.with_timezone(&tz).format("%a %Y-%m-%d %H:%M %Z")
            )
        })
        .collect())
}

/// Run the optimizer over a file of items and render the result as JSON.
pub fn optimize(config: &Config, items: &Path) -> anyhow::Result<String> {
    let items = read_items(items)?;
    let result = optimize_schedule(&items, &config.schedule);
    for conflict in &result.conflicts {
        tracing::warn!(%conflict, "unresolved conflict");
    }
    serde_json::to_string_pretty(&result).context("serializing optimization result")
}

pub async fn slots(
    config: Config,
    items: Option<&Path>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration: u32,
    bucket: Option<TimeBucket>,
    any_time: bool,
) -> anyhow::Result<String> {
    let engine = SchedulingEngine::new(config, Arc::new(LogPublisher));
    if let Some(path) = items {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let report = engine.import_json(&json, ImportMode::Merge).await?;
        for skip in &report.skipped {
            tracing::warn!(item_id = %skip.id, reason = %skip.reason, "item skipped");
        }
    }
    let prefs = SlotPreferences {
        bucket,
        timezone: None,
        working_hours_only: !any_time,
    };
    let slots = engine
        .get_available_time_slots(start, end, duration, &prefs)
        .await?;
    serde_json::to_string_pretty(&slots).context("serializing slots")
}

/// Load, start the poller, wait for a shutdown signal, stop and flush.
pub async fn serve(config: Config, items: Option<&Path>) -> anyhow::Result<()> {
    let engine = SchedulingEngine::new(config, Arc::new(LogPublisher));
    let loaded = engine.initialize().await.context("loading items")?;
    tracing::info!(loaded, "contentsched starting");

    if let Some(path) = items {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let report = engine
            .import_json(&json, ImportMode::Merge)
            .await
            .context("importing items")?;
        tracing::info!(
            imported = report.imported,
            skipped = report.skipped.len(),
            "items merged"
        );
    }

    engine.start();
    shutdown_signal().await?;

    tracing::info!("stopping poller, flushing items...");
    engine.stop().await;
    engine.flush().await.context("flushing items")?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("registering SIGTERM handler")?;
        tokio::select! {
            res = ctrl_c => {
                res.context("waiting for ctrl-c")?;
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("waiting for ctrl-c")?;
        tracing::info!("received SIGINT, shutting down");
    }

    Ok(())
}
