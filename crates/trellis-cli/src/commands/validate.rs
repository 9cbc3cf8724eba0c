//! `trellis validate`

use std::path::Path;

use anyhow::{Context, bail};
use trellis_core::TrellisConfig;

pub fn execute(path: &Path, config: &TrellisConfig) -> anyhow::Result<()> {
    if !path.exists() {
        bail!("configuration file not found: {}", path.display());
    }

    config
        .validate()
        .with_context(|| format!("{} is not a valid configuration", path.display()))?;

    tracing::info!(path = %path.display(), "configuration is valid");
    println!("{}", summary(config));
    Ok(())
}

/// Human-readable overview of what a configuration defines
pub fn summary(config: &TrellisConfig) -> String {
    let cb = &config.circuit_breaker;
    let rl = &config.rate_limit;

    let mut lines = vec![
        format!("logging: level={} format={}", config.logging.level, config.logging.format),
        format!(
            "circuit breaker: threshold={} failure_rate={:.0}% recovery={:?} half_open_calls={}",
            cb.failure_threshold,
            cb.failure_rate_threshold * 100.0,
            cb.recovery_timeout,
            cb.half_open_max_calls
        ),
    ];

    if rl.enabled {
        lines.push(format!(
            "rate limits: global={} premium={} admin={} burst={} per {:?}",
            rl.global, rl.premium, rl.admin, rl.burst_limit, rl.burst_window
        ));
        lines.extend(
            rl.endpoints
                .iter()
                .map(|endpoint| format!("  {} -> {}", endpoint.pattern, endpoint.rate)),
        );
        for (feature, audiences) in &rl.features {
            let limits: Vec<String> = audiences
                .iter()
                .map(|(audience, rate)| format!("{}={}", audience, rate))
                .collect();
            lines.push(format!("  feature {}: {}", feature, limits.join(", ")));
        }
    } else {
        lines.push("rate limits: disabled".to_string());
    }

    if config.rotation.is_empty() {
        lines.push("rotation groups: none".to_string());
    }
    for group in &config.rotation {
        lines.push(format!(
            "rotation group {} ({}, {} endpoints)",
            group.category,
            group.strategy,
            group.endpoints.len()
        ));
        lines.extend(group.endpoints.iter().map(|endpoint| {
            format!(
                "  {} priority={} weight={} {}{}",
                endpoint.name,
                endpoint.priority,
                endpoint.weight,
                endpoint.base_url,
                if endpoint.enabled { "" } else { " (disabled)" }
            )
        }));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trellis_core::config::load_from_file;

    #[test]
    fn test_summary_lists_groups_and_limits() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trellis.toml");
        std::fs::write(
            &path,
            r#"
[rate_limit]
global = "20/minute"

[[rotation]]
category = "weather"
strategy = "round_robin"

[[rotation.endpoints]]
name = "owm"
base_url = "https://api.openweathermap.org/data/2.5"

[[rotation.endpoints]]
name = "backup"
base_url = "https://backup.example.com"
enabled = false
"#,
        )
        .unwrap();

        let config = load_from_file(&path).unwrap();
        assert!(execute(&path, &config).is_ok());

        let text = summary(&config);
        assert!(text.contains("global=20/minute"));
        assert!(text.contains("rotation group weather (round_robin, 2 endpoints)"));
        assert!(text.contains("backup priority=1 weight=1 https://backup.example.com (disabled)"));
    }

    #[test]
    fn test_default_summary_is_one_fact_per_line() {
        let text = summary(&TrellisConfig::default());
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("logging: level="));
        assert!(lines[1].starts_with("circuit breaker: threshold=5"));
        assert_eq!(lines.last(), Some(&"rotation groups: none"));
        assert!(lines.iter().all(|line| !line.trim().is_empty()));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");
        let err = execute(&path, &TrellisConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let mut config = TrellisConfig::default();
        config.circuit_breaker.failure_rate_threshold = 2.0;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trellis.toml");
        std::fs::write(&path, "").unwrap();

        let err = execute(&path, &config).unwrap_err();
        assert!(format!("{:#}", err).contains("not a valid configuration"));
    }
}
