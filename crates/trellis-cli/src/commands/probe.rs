//! `trellis probe`

use std::collections::BTreeMap;

use anyhow::{Context, bail};
use futures::future::join_all;
use trellis_core::config::TrellisConfig;
use trellis_core::rotation::{RotationGroupConfig, RotationManager};
use trellis_core::{ApiHealth, HealthStatus};

type ProbeReport = BTreeMap<String, BTreeMap<String, ApiHealth>>;

pub async fn execute(config: &TrellisConfig, group: Option<&str>) -> anyhow::Result<()> {
    let report = probe(config, group).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let unhealthy = report
        .values()
        .flat_map(|endpoints| endpoints.values())
        .filter(|health| health.status == HealthStatus::Unhealthy)
        .count();
    if unhealthy > 0 {
        tracing::warn!(unhealthy, "some endpoints failed their health check");
    }
    Ok(())
}

/// Health of every endpoint, keyed by group then endpoint name
pub async fn probe(config: &TrellisConfig, group: Option<&str>) -> anyhow::Result<ProbeReport> {
    let registry = config.registry();
    let managers = select(config, group)?
        .into_iter()
        .map(|g| {
            RotationManager::from_config(g, registry.clone())
                .with_context(|| format!("building rotation group '{}'", g.category))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let reports = join_all(managers.iter().map(|m| m.health_check_all())).await;
    Ok(managers
        .iter()
        .map(|m| m.category().to_string())
        .zip(reports)
        .collect())
}

fn select<'a>(
    config: &'a TrellisConfig,
    group: Option<&str>,
) -> anyhow::Result<Vec<&'a RotationGroupConfig>> {
    match group {
        Some(name) => match config.rotation_group(name) {
            Some(g) => Ok(vec![g]),
            None => bail!("no rotation group named '{}'", name),
        },
        None => Ok(config.rotation.iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::rotation::EndpointConfig;

    fn config() -> TrellisConfig {
        let mut standby = EndpointConfig::new("standby", "http://127.0.0.1:1");
        standby.enabled = false;

        TrellisConfig {
            rotation: vec![
                RotationGroupConfig {
                    category: "weather".to_string(),
                    endpoints: vec![standby],
                    ..Default::default()
                },
                RotationGroupConfig {
                    category: "empty".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_select_groups() {
        let config = config();
        assert_eq!(select(&config, None).unwrap().len(), 2);
        assert_eq!(select(&config, Some("weather")).unwrap()[0].category, "weather");
        assert!(select(&config, Some("maps")).is_err());
    }

    #[tokio::test]
    async fn test_disabled_endpoints_are_not_contacted() {
        let report = probe(&config(), None).await.unwrap();

        assert_eq!(report["weather"]["standby"].status, HealthStatus::Disabled);
        assert!(report["empty"].is_empty());
    }
}
