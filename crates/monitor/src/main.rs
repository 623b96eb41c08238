//! `plantwatch-monitor` -- autonomous equipment monitoring daemon.
//!
//! Polls the plant hierarchy, raises anomaly cascades and logs every
//! published event as a JSON line. Without external services wired in it
//! runs against the built-in sample plant and the local work-order
//! service.
//!
//! # Environment variables
//!
//! | Variable                    | Required | Default     | Description                                   |
//! |-----------------------------|----------|-------------|-----------------------------------------------|
//! | `MONITOR_*`                 | no       | see config  | Thresholds and interval, see `MonitoringConfig::from_env` |
//! | `MONITOR_HIERARCHY_FILE`    | no       | --          | JSON file holding the equipment tree          |
//! | `MONITOR_SIMULATE`          | no       | --          | Comma-separated metrics to simulate at start (`temperature,speed,oee`) |

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plantwatch_core::equipment::EquipmentNode;
use plantwatch_core::monitoring::config::MonitoringConfig;
use plantwatch_core::monitoring::thresholds::Metric;
use plantwatch_monitor::adapters::{demo_plant, AutoWorkOrderService, InMemoryHierarchy};
use plantwatch_monitor::clock::{Clock, TokioClock};
use plantwatch_monitor::MonitoringEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plantwatch_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitoringConfig::from_env().context("invalid monitoring configuration")?;
    let plant = load_hierarchy()?;

    tracing::info!(
        site_id = %config.site_id,
        nodes = plant.node_count(),
        interval_ms = config.check_interval.as_millis() as u64,
        "Starting plantwatch-monitor",
    );

    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let engine = MonitoringEngine::with_clock(
        config,
        Arc::new(InMemoryHierarchy::new(plant)),
        Arc::new(AutoWorkOrderService::new(Arc::clone(&clock))),
        clock,
    )?;

    let _log = engine.subscribe(|event| match serde_json::to_string(event) {
        Ok(json) => tracing::info!(target: "plantwatch_monitor::events", "{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialise event"),
    });

    engine.start_monitoring();

    for metric in simulated_metrics() {
        engine.simulate_anomaly(metric);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    engine.shutdown().await;
    Ok(())
}

/// Tree from `MONITOR_HIERARCHY_FILE`, or the sample plant.
fn load_hierarchy() -> anyhow::Result<EquipmentNode> {
    let Ok(path) = std::env::var("MONITOR_HIERARCHY_FILE") else {
        return Ok(demo_plant());
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing equipment tree in {path}"))
}

fn simulated_metrics() -> Vec<Metric> {
    std::env::var("MONITOR_SIMULATE")
        .unwrap_or_default()
        .split(',')
        .filter_map(|name| match name.trim().to_ascii_lowercase().as_str() {
            "temperature" => Some(Metric::Temperature),
            "speed" => Some(Metric::Speed),
            "oee" => Some(Metric::Oee),
            "" => None,
            other => {
                tracing::warn!(metric = other, "Unknown metric in MONITOR_SIMULATE, ignoring");
                None
            }
        })
        .collect()
}
