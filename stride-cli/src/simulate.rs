//! Ghost riders: synthetic movement traffic for demos and shakeouts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use stride_config::{AppConfig, SimulationConfig};
use stride_core::{ActivityEvent, Provider};
use stride_pipeline::{Coordinator, ShutdownSignal};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const GHOST_PROVIDERS: [Provider; 4] = [
    Provider::Strava,
    Provider::Garmin,
    Provider::Wahoo,
    Provider::Apple,
];

const GHOST_ACTIVITIES: [&str; 5] = ["running", "walking", "cycling", "hiking", "rowing"];

#[derive(Args)]
pub struct SimulateArgs {
    /// Base URL of a running backend
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub target: String,
    /// Number of distinct ghost riders (defaults to config.simulation.ghosts)
    #[arg(long)]
    pub ghosts: Option<usize>,
    /// Milliseconds between nudges (defaults to config.simulation.interval_ms)
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Stop after this many delivered events (runs until interrupted when omitted)
    #[arg(long)]
    pub events: Option<u64>,
}

/// Post ghost traffic at a remote backend over its ingestion endpoint.
pub async fn run(args: SimulateArgs, config: &AppConfig) -> Result<()> {
    let client = Client::builder()
        .build()
        .context("failed to build http client")?;
    let ghosts = args.ghosts.unwrap_or(config.simulation.ghosts).max(1);
    let interval = Duration::from_millis(
        args.interval_ms
            .unwrap_or(config.simulation.interval_ms)
            .max(1),
    );
    let ingest_url = format!("{}/ingest", args.target.trim_end_matches('/'));
    let shutdown = ShutdownSignal::new();
    let mut rng = StdRng::from_entropy();
    let mut delivered = 0u64;
    info!(target = %args.target, ghosts, interval_ms = interval.as_millis() as u64, "posting ghost traffic");

    loop {
        if let Some(limit) = args.events {
            if delivered >= limit {
                break;
            }
        }
        if !shutdown.sleep(interval).await {
            break;
        }
        let ghost = rng.gen_range(0..ghosts);
        let event = ghost_event(&mut rng, ghost, &config.simulation);
        let payload = json!({
            "userId": event.external_id,
            "source": event.provider.as_str(),
            "activityType": event.activity,
            "distanceMeters": event.distance_meters.to_f64().unwrap_or(0.0),
            "durationSeconds": event.duration_seconds,
        });
        match client.post(&ingest_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                delivered += 1;
                debug!(ghost, status = response.status().as_u16(), "ghost event delivered");
            }
            Ok(response) => {
                warn!(ghost, status = response.status().as_u16(), "ghost event refused");
            }
            Err(err) => warn!(error = %err, "failed to reach backend"),
        }
    }
    info!(delivered, "simulation finished");
    Ok(())
}

/// In-process ghost loop used by `serve --simulate`.
pub fn spawn_ghost_loop(
    coordinator: Arc<Coordinator>,
    config: SimulationConfig,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let ghosts = config.ghosts.max(1);
        let interval = Duration::from_millis(config.interval_ms.max(1));
        info!(ghosts, interval_ms = config.interval_ms, "ghost traffic enabled");
        while shutdown.sleep(interval).await {
            let ghost = rng.gen_range(0..ghosts);
            let event = ghost_event(&mut rng, ghost, &config);
            if let Err(err) = coordinator.ingest(event).await {
                warn!(error = %err, "ghost event failed");
            }
        }
    })
}

/// One plausible nudge for the given ghost. Each ghost sticks to one provider
/// so the source lock never turns its traffic away.
fn ghost_event(rng: &mut StdRng, ghost: usize, config: &SimulationConfig) -> ActivityEvent {
    let low = config.min_nudge_meters.min(config.max_nudge_meters);
    let high = config.max_nudge_meters.max(config.min_nudge_meters);
    let meters = rng.gen_range(low..=high);
    let speed = rng.gen_range(1.2..3.8_f64);
    let duration = (f64::from(meters) / speed).ceil() as i64 + 1;
    ActivityEvent {
        external_id: format!("ghost-{ghost}"),
        provider: GHOST_PROVIDERS[ghost % GHOST_PROVIDERS.len()],
        activity: GHOST_ACTIVITIES[ghost % GHOST_ACTIVITIES.len()].to_string(),
        distance_meters: Decimal::from(meters),
        duration_seconds: duration,
        event_id: None,
        received_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_validate::{MovementValidator, Verdict};

    #[test]
    fn ghost_events_always_pass_validation() {
        let mut rng = StdRng::seed_from_u64(99);
        let config = SimulationConfig::default();
        let validator = MovementValidator::default();
        for ghost in 0..40 {
            let event = ghost_event(&mut rng, ghost, &config);
            assert!(event.distance_meters >= Decimal::from(config.min_nudge_meters));
            assert!(event.distance_meters <= Decimal::from(config.max_nudge_meters));
            assert!(event.duration_seconds > 0);
            assert!(matches!(
                validator.assess(&event),
                Verdict::Accepted { .. }
            ));
        }
    }

    #[test]
    fn ghosts_keep_a_stable_provider() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = SimulationConfig::default();
        let first = ghost_event(&mut rng, 3, &config);
        let second = ghost_event(&mut rng, 3, &config);
        assert_eq!(first.provider, second.provider);
        assert_eq!(first.external_id, second.external_id);
    }
}
