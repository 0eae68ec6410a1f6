//! HTTP ingestion surface and websocket fan-out listener.

pub mod http;
pub mod ws;

use std::sync::Arc;

use stride_pipeline::{Coordinator, PipelineMetrics};

/// Shared handles cloned into every connection handler.
#[derive(Clone)]
pub struct ServerContext {
    pub coordinator: Arc<Coordinator>,
    pub metrics: Arc<PipelineMetrics>,
}

impl ServerContext {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let metrics = coordinator.metrics();
        Self {
            coordinator,
            metrics,
        }
    }
}
