//! Polling loop over the equipment hierarchy.
//!
//! [`run`] ticks every `check_interval`, fetches the site hierarchy from
//! the provider and hands every node's readings to the engine. A failed
//! fetch is logged and the tick skipped; the loop exits only when its
//! [`CancellationToken`] is cancelled. Cancellation also abandons a fetch
//! that is still in flight, so nothing is evaluated after a stop.

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use plantwatch_core::equipment::{location_path, EquipmentNode, NodeReadings};

use crate::cascade::AnomalySource;
use crate::engine::EngineInner;

/// Monitored readings of one node together with where it sits.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub source: AnomalySource,
    pub readings: NodeReadings,
}

/// Walk the tree depth-first, parents first, and collect every node that
/// carries at least one monitored metric.
pub fn collect_observations(root: &EquipmentNode) -> Vec<Observation> {
    let mut observations = Vec::new();
    root.walk(|node, ancestors| {
        let readings = node.readings();
        if readings.is_empty() {
            return;
        }
        observations.push(Observation {
            source: AnomalySource {
                equipment_id: node.id.clone(),
                equipment_name: node.name.clone(),
                location: location_path(node, ancestors),
            },
            readings,
        });
    });
    observations
}

/// Run the polling loop until `cancel` fires.
///
/// The first poll happens one full interval after start.
pub(crate) async fn run(engine: Arc<EngineInner>, cancel: CancellationToken) {
    let period = engine.config.check_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(interval_ms = period.as_millis() as u64, "Monitoring loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Monitoring loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                poll_once(&engine, &cancel).await;
            }
        }
    }
}

/// Fetch the hierarchy once and evaluate it, unless `cancel` fires first.
async fn poll_once(engine: &EngineInner, cancel: &CancellationToken) {
    let site_id = engine.config.site_id.as_str();

    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(site_id, "Hierarchy fetch abandoned, monitoring stopped");
            return;
        }
        fetched = engine.hierarchy.get_hierarchy(site_id) => fetched,
    };

    let root = match fetched {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!(site_id, error = %e, "Hierarchy fetch failed, skipping tick");
            return;
        }
    };

    if cancel.is_cancelled() {
        return;
    }

    let launched = engine.evaluate_hierarchy(&root);
    tracing::debug!(
        site_id,
        nodes = root.node_count(),
        cascades = launched.len(),
        "Monitoring tick complete",
    );
}
