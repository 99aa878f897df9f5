//! `config validate` and `config show`.

use std::fmt::Write as _;

use cs_domain::config::{Config, ConfigError, ConfigSeverity};

/// Sections of the config file, in the order they are reported.
const SECTIONS: [&str; 4] = ["schedule", "runner", "storage", "observability"];

/// Validation outcome rendered for the terminal.
#[derive(Debug, Clone)]
pub struct ConfigReport {
    pub ok: bool,
    pub text: String,
}

/// Check `config`, grouping issues under their config section. A clean
/// (or warnings-only) config also gets a one-line summary of the policy
/// it resolves to.
pub fn check(config: &Config, config_path: &str) -> ConfigReport {
    let issues = config.validate();
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    let mut text = String::new();

    for section in SECTIONS {
        let in_section: Vec<&ConfigError> = issues
            .iter()
            .filter(|i| i.field.split('.').next() == Some(section))
            .collect();
        if in_section.is_empty() {
            continue;
        }
        let _ = writeln!(text, "[{section}]");
        for issue in in_section {
            let _ = writeln!(text, "  {issue}");
        }
    }

    if errors == 0 {
        let schedule = &config.schedule;
        let days: Vec<&str> = schedule
            .working_hours
            .days
            .iter()
            .map(|d| d.ical_code())
            .collect();
        let _ = writeln!(
            text,
            "{config_path}: {} {}-{} on {}, buffer {}m, {} retries, poll every {}s",
            schedule.timezone,
            schedule.working_hours.start.format("%H:%M"),
            schedule.working_hours.end.format("%H:%M"),
            days.join(","),
            schedule.buffer_minutes,
            schedule.retry.max_retries,
            config.runner.poll_interval_secs,
        );
    }
    if !issues.is_empty() {
        let _ = writeln!(
            text,
            "{errors} error(s), {} warning(s) in {config_path}",
            issues.len() - errors
        );
    }

    ConfigReport {
        ok: errors == 0,
        text,
    }
}

/// Print the report. Returns `false` if the config has errors.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let report = check(config, config_path);
    print!("{}", report.text);
    report.ok
}

/// Render the resolved config (defaults filled in) as TOML.
pub fn render(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serializing config: {e}"))
}
