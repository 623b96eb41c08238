use plantwatch_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Hierarchy unavailable for site {site_id}: {reason}")]
    HierarchyUnavailable { site_id: String, reason: String },

    #[error("Work order creation failed: {0}")]
    WorkOrderFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] CoreError),
}
