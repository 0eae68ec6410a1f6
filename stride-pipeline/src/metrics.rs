//! Prometheus metrics for the ingestion pipeline and fan-out.

use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, Registry};
use rust_decimal::prelude::ToPrimitive;
use stride_core::Meters;

/// Counters and gauges shared by the coordinator and the listeners.
pub struct PipelineMetrics {
    registry: Registry,
    events_ingested: IntCounter,
    events_accepted: IntCounter,
    events_rejected: IntCounterVec,
    events_ignored: IntCounter,
    snapshots_published: IntCounter,
    ws_subscribers: IntGauge,
    global_total_meters: Gauge,
    tracked_participants: IntGauge,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let events_ingested =
            IntCounter::new("events_ingested_total", "Movement events received").unwrap();
        let events_accepted =
            IntCounter::new("events_accepted_total", "Movement events recorded").unwrap();
        let events_rejected = IntCounterVec::new(
            prometheus::Opts::new("events_rejected_total", "Movement events rejected by rule"),
            &["reason"],
        )
        .unwrap();
        let events_ignored = IntCounter::new(
            "events_ignored_total",
            "Events dropped by the provider source lock",
        )
        .unwrap();
        let snapshots_published = IntCounter::new(
            "leaderboard_snapshots_total",
            "Snapshots pushed onto the fan-out bus",
        )
        .unwrap();
        let ws_subscribers = IntGauge::new(
            "stride_ws_subscribers",
            "Currently connected leaderboard subscribers",
        )
        .unwrap();
        let global_total_meters = Gauge::new(
            "stride_global_total_meters",
            "Community-wide cumulative distance in meters",
        )
        .unwrap();
        let tracked_participants = IntGauge::new(
            "stride_tracked_participants",
            "Participants currently present in the ranked view",
        )
        .unwrap();

        registry.register(Box::new(events_ingested.clone())).unwrap();
        registry.register(Box::new(events_accepted.clone())).unwrap();
        registry.register(Box::new(events_rejected.clone())).unwrap();
        registry.register(Box::new(events_ignored.clone())).unwrap();
        registry
            .register(Box::new(snapshots_published.clone()))
            .unwrap();
        registry.register(Box::new(ws_subscribers.clone())).unwrap();
        registry
            .register(Box::new(global_total_meters.clone()))
            .unwrap();
        registry
            .register(Box::new(tracked_participants.clone()))
            .unwrap();

        Self {
            registry,
            events_ingested,
            events_accepted,
            events_rejected,
            events_ignored,
            snapshots_published,
            ws_subscribers,
            global_total_meters,
            tracked_participants,
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn inc_ingested(&self) {
        self.events_ingested.inc();
    }

    pub fn inc_accepted(&self) {
        self.events_accepted.inc();
    }

    pub fn inc_rejected(&self, reason: &str) {
        self.events_rejected.with_label_values(&[reason]).inc();
    }

    pub fn inc_ignored(&self) {
        self.events_ignored.inc();
    }

    pub fn inc_snapshot(&self) {
        self.snapshots_published.inc();
    }

    pub fn inc_subscribers(&self) {
        self.ws_subscribers.inc();
    }

    pub fn dec_subscribers(&self) {
        self.ws_subscribers.dec();
    }

    pub fn set_global_total(&self, meters: Meters) {
        self.global_total_meters
            .set(meters.to_f64().unwrap_or(0.0));
    }

    pub fn set_tracked_participants(&self, count: usize) {
        self.tracked_participants.set(count as i64);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
