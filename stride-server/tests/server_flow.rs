use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

use stride_identity::IdentityResolver;
use stride_ledger::DistanceLedger;
use stride_pipeline::{Coordinator, EventBus, PipelineMetrics, ShutdownSignal};
use stride_server::http::start_http;
use stride_server::ws::start_ws;
use stride_server::ServerContext;
use stride_validate::MovementValidator;

struct TestServer {
    http_addr: SocketAddr,
    ws_addr: SocketAddr,
    client: Client,
    _shutdown: ShutdownSignal,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.http_addr)
    }

    async fn post_event(
        &self,
        user: &str,
        source: &str,
        activity: &str,
        meters: f64,
        seconds: i64,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url("/ingest"))
            .json(&json!({
                "userId": user,
                "source": source,
                "activityType": activity,
                "distanceMeters": meters,
                "durationSeconds": seconds,
            }))
            .send()
            .await?;
        Ok(response)
    }
}

async fn start_test_server() -> Result<TestServer> {
    let ledger = Arc::new(DistanceLedger::open_in_memory()?);
    let resolver = Arc::new(IdentityResolver::with_seed(ledger.clone(), 11));
    let coordinator = Arc::new(Coordinator::new(
        ledger,
        resolver,
        MovementValidator::default(),
        Arc::new(EventBus::default()),
        Arc::new(PipelineMetrics::new()),
        10,
    ));
    coordinator.rebuild().await?;

    let ctx = ServerContext::new(coordinator);
    let shutdown = ShutdownSignal::unwired();
    let bind: SocketAddr = "127.0.0.1:0".parse()?;
    let (http_addr, _http) = start_http(bind, ctx.clone(), shutdown.clone()).await?;
    let (ws_addr, _ws) = start_ws(bind, ctx, shutdown.clone()).await?;
    Ok(TestServer {
        http_addr,
        ws_addr,
        client: Client::new(),
        _shutdown: shutdown,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_status_codes_follow_outcome() -> Result<()> {
    let server = start_test_server().await?;

    let accepted = server
        .post_event("runner-1", "strava", "running", 2500.0, 900)
        .await?;
    assert_eq!(accepted.status().as_u16(), 200);
    let body: Value = accepted.json().await?;
    assert_eq!(body["status"], "recorded");
    assert_eq!(body["newTotal"].as_f64(), Some(2500.0));

    let rejected = server
        .post_event("runner-1", "strava", "running", 5.0, 60)
        .await?;
    assert_eq!(rejected.status().as_u16(), 400);
    let body: Value = rejected.json().await?;
    assert_eq!(body["error"], "movement below threshold");

    let mismatched = server
        .post_event("runner-1", "garmin", "running", 3000.0, 1200)
        .await?;
    assert_eq!(mismatched.status().as_u16(), 200);
    let body: Value = mismatched.json().await?;
    assert_eq!(body["status"], "ignored");
    assert_eq!(body["reason"], "source_mismatch");

    let unknown_provider = server
        .post_event("runner-1", "fitbit", "running", 3000.0, 1200)
        .await?;
    assert_eq!(unknown_provider.status().as_u16(), 400);

    let malformed = server
        .client
        .post(server.url("/ingest"))
        .body("not json")
        .send()
        .await?;
    assert_eq!(malformed.status().as_u16(), 400);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn leaderboard_orders_and_formats_distances() -> Result<()> {
    let server = start_test_server().await?;
    server
        .post_event("first", "strava", "running", 5000.0, 1800)
        .await?;
    server
        .post_event("second", "garmin", "cycling", 2000.0, 600)
        .await?;
    server
        .post_event("third", "apple", "walking", 300.0, 400)
        .await?;

    let response = server.client.get(server.url("/leaderboard")).send().await?;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["globalTotalKm"], "7.30");
    let players = body["players"].as_array().context("players array")?;
    assert_eq!(players.len(), 3);
    assert_eq!(players[0]["distanceKm"], "5.00");
    assert_eq!(players[1]["distanceKm"], "2.00");
    assert_eq!(players[2]["distanceKm"], "0.30");
    assert!(players[0]["name"].as_str().is_some_and(|name| !name.is_empty()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn profile_switch_unlocks_new_source() -> Result<()> {
    let server = start_test_server().await?;
    server
        .post_event("switcher", "garmin", "running", 1000.0, 400)
        .await?;

    let ignored = server
        .post_event("switcher", "strava", "running", 1000.0, 400)
        .await?;
    let body: Value = ignored.json().await?;
    assert_eq!(body["status"], "ignored");

    let updated = server
        .client
        .put(server.url("/profile/switcher"))
        .json(&json!({"preferredProvider": "strava"}))
        .send()
        .await?;
    assert_eq!(updated.status().as_u16(), 200);
    let body: Value = updated.json().await?;
    assert_eq!(body["status"], "updated");
    assert_eq!(body["preferredProvider"], "strava");

    let recorded = server
        .post_event("switcher", "strava", "running", 1000.0, 400)
        .await?;
    let body: Value = recorded.json().await?;
    assert_eq!(body["status"], "recorded");
    assert_eq!(body["newTotal"].as_f64(), Some(2000.0));

    let missing = server
        .client
        .put(server.url("/profile/nobody"))
        .json(&json!({"preferredProvider": "strava"}))
        .send()
        .await?;
    assert_eq!(missing.status().as_u16(), 404);

    let invalid = server
        .client
        .put(server.url("/profile/switcher"))
        .json(&json!({"preferredProvider": "pigeon-post"}))
        .send()
        .await?;
    assert_eq!(invalid.status().as_u16(), 400);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn health_stats_and_metrics_respond() -> Result<()> {
    let server = start_test_server().await?;
    server
        .post_event("runner-1", "strava", "running", 4000.0, 1500)
        .await?;

    let health = server.client.get(server.url("/health")).send().await?;
    assert_eq!(health.status().as_u16(), 200);
    let body: Value = health.json().await?;
    assert_eq!(body["status"], "online");

    let stats = server.client.get(server.url("/stats")).send().await?;
    let body: Value = stats.json().await?;
    assert_eq!(body["globalOdometerKm"], "4.00");
    assert_eq!(body["activeParticipants"].as_u64(), Some(1));

    let metrics = server.client.get(server.url("/metrics")).send().await?;
    assert_eq!(metrics.status().as_u16(), 200);
    let text = metrics.text().await?;
    assert!(text.contains("events_ingested_total"));
    assert!(text.contains("stride_global_total_meters"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_clears_leaderboard() -> Result<()> {
    let server = start_test_server().await?;
    server
        .post_event("runner-1", "strava", "running", 4000.0, 1500)
        .await?;

    let reset = server
        .client
        .post(server.url("/admin/reset"))
        .send()
        .await?;
    assert_eq!(reset.status().as_u16(), 200);
    let body: Value = reset.json().await?;
    assert_eq!(body["status"], "reset");

    let response = server.client.get(server.url("/leaderboard")).send().await?;
    let body: Value = response.json().await?;
    assert_eq!(body["globalTotalKm"], "0.00");
    assert_eq!(body["players"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_get_snapshot_then_pushes() -> Result<()> {
    let server = start_test_server().await?;
    server
        .post_event("runner-1", "strava", "running", 1500.0, 600)
        .await?;

    let (mut socket, _) = connect_async(format!("ws://{}", server.ws_addr)).await?;
    let first = timeout(Duration::from_secs(1), socket.next())
        .await?
        .context("socket closed before initial snapshot")??;
    let snapshot: Value = serde_json::from_str(first.to_text()?)?;
    assert_eq!(snapshot["globalTotalKm"], "1.50");

    server
        .post_event("runner-1", "strava", "running", 500.0, 200)
        .await?;
    let pushed = timeout(Duration::from_secs(1), socket.next())
        .await?
        .context("socket closed before push")??;
    let snapshot: Value = serde_json::from_str(pushed.to_text()?)?;
    assert_eq!(snapshot["globalTotalKm"], "2.00");

    // A late subscriber starts from current state, not from history.
    let (mut late, _) = connect_async(format!("ws://{}", server.ws_addr)).await?;
    let first = timeout(Duration::from_secs(1), late.next())
        .await?
        .context("socket closed before initial snapshot")??;
    let snapshot: Value = serde_json::from_str(first.to_text()?)?;
    assert_eq!(snapshot["globalTotalKm"], "2.00");
    Ok(())
}
