//! REST endpoints for ingestion, queries and administration.

use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Result;
use chrono::Utc;
use hyper::body::{to_bytes, Bytes};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Encoder, TextEncoder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use stride_core::{meters_to_km_string, ActivityEvent, Provider};
use stride_ledger::LedgerError;
use stride_pipeline::{IngestError, Outcome, ShutdownSignal};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::ServerContext;

/// Normalized ingestion record as posted by provider webhooks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestPayload {
    user_id: String,
    source: String,
    activity_type: String,
    distance_meters: Decimal,
    duration_seconds: i64,
    #[serde(default)]
    event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilePayload {
    preferred_provider: String,
}

/// Bind the REST listener and serve until shutdown is requested.
///
/// Returns the bound address (port 0 resolves here) and the server task.
pub async fn start_http(
    addr: SocketAddr,
    ctx: ServerContext,
    shutdown: ShutdownSignal,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    std_listener.set_nonblocking(true)?;

    let make_svc = make_service_fn(move |_| {
        let ctx = ctx.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let ctx = ctx.clone();
                async move { Ok::<_, Infallible>(route(req, ctx).await) }
            }))
        }
    });
    let server = Server::from_tcp(std_listener)?.serve(make_svc);
    let handle = tokio::spawn(async move {
        let drained = async move { shutdown.wait().await };
        if let Err(err) = server.with_graceful_shutdown(drained).await {
            error!(error = %err, "http server exited with error");
        }
    });
    info!(addr = %local_addr, "http listener started");
    Ok((local_addr, handle))
}

async fn route(req: Request<Body>, ctx: ServerContext) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let body_bytes = match to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return bad_request(format!("failed to read request body: {err}"));
        }
    };

    match (method, path.as_str()) {
        (Method::POST, "/ingest") => handle_ingest(body_bytes, ctx).await,
        (Method::GET, "/leaderboard") => handle_leaderboard(&ctx),
        (Method::POST, "/admin/reset") => handle_reset(ctx).await,
        (Method::GET, "/health") => handle_health(ctx).await,
        (Method::GET, "/stats") => handle_stats(ctx).await,
        (Method::GET, "/metrics") => handle_metrics(&ctx),
        (Method::PUT, profile_path) => match profile_path.strip_prefix("/profile/") {
            Some(external_id) if !external_id.is_empty() => {
                handle_profile(external_id, body_bytes, ctx).await
            }
            _ => not_found(),
        },
        _ => not_found(),
    }
}

async fn handle_ingest(body: Bytes, ctx: ServerContext) -> Response<Body> {
    let payload: IngestPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => return bad_request(format!("invalid ingest payload: {err}")),
    };
    let provider: Provider = match payload.source.parse() {
        Ok(provider) => provider,
        Err(err) => return bad_request(err.to_string()),
    };
    let event = ActivityEvent {
        external_id: payload.user_id,
        provider,
        activity: payload.activity_type,
        distance_meters: payload.distance_meters,
        duration_seconds: payload.duration_seconds,
        event_id: payload.event_id,
        received_at: Utc::now(),
    };

    match ctx.coordinator.ingest(event).await {
        Ok(Outcome::Accepted { new_total }) => json_response(
            StatusCode::OK,
            json!({
                "status": "recorded",
                "newTotal": new_total.to_f64().unwrap_or(0.0),
            }),
        ),
        Ok(Outcome::IgnoredSourceMismatch) => json_response(
            StatusCode::OK,
            json!({"status": "ignored", "reason": "source_mismatch"}),
        ),
        Ok(Outcome::Rejected { reason }) => bad_request(reason.to_string()),
        Err(err) => {
            error!(error = %err, "ingestion failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "internal storage failure"}),
            )
        }
    }
}

fn handle_leaderboard(ctx: &ServerContext) -> Response<Body> {
    json_response(StatusCode::OK, json!(ctx.coordinator.snapshot()))
}

async fn handle_profile(external_id: &str, body: Bytes, ctx: ServerContext) -> Response<Body> {
    let payload: ProfilePayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => return bad_request(format!("invalid profile payload: {err}")),
    };
    let provider: Provider = match payload.preferred_provider.parse() {
        Ok(provider) => provider,
        Err(err) => return bad_request(err.to_string()),
    };

    match ctx.coordinator.switch_provider(external_id, provider).await {
        Ok(participant) => json_response(
            StatusCode::OK,
            json!({
                "status": "updated",
                "userId": participant.external_id,
                "preferredProvider": participant.preferred_provider.as_str(),
            }),
        ),
        Err(IngestError::Ledger(LedgerError::UnknownParticipant(_))) => json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "unknown participant"}),
        ),
        Err(err) => {
            error!(error = %err, "profile update failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "internal storage failure"}),
            )
        }
    }
}

async fn handle_reset(ctx: ServerContext) -> Response<Body> {
    match ctx.coordinator.reset().await {
        Ok(()) => json_response(StatusCode::OK, json!({"status": "reset"})),
        Err(err) => {
            error!(error = %err, "reset failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "internal storage failure"}),
            )
        }
    }
}

async fn handle_health(ctx: ServerContext) -> Response<Body> {
    match ctx.coordinator.ping().await {
        Ok(()) => json_response(
            StatusCode::OK,
            json!({"status": "online", "ledger": "reachable"}),
        ),
        Err(err) => {
            error!(error = %err, "health probe failed");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"status": "degraded", "ledger": "unreachable"}),
            )
        }
    }
}

async fn handle_stats(ctx: ServerContext) -> Response<Body> {
    let participants = match ctx.coordinator.participant_count().await {
        Ok(count) => count,
        Err(err) => {
            error!(error = %err, "stats query failed");
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "internal storage failure"}),
            );
        }
    };
    json_response(
        StatusCode::OK,
        json!({
            "globalOdometerKm": meters_to_km_string(ctx.coordinator.global_total()),
            "activeParticipants": participants,
        }),
    )
}

fn handle_metrics(ctx: &ServerContext) -> Response<Body> {
    let encoder = TextEncoder::new();
    let metric_families = ctx.metrics.registry().gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %err, "failed to encode Prometheus metrics");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "failed to encode metrics"}),
        );
    }
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(Body::from(buffer))
        .unwrap()
}

fn bad_request(msg: impl Into<String>) -> Response<Body> {
    json_response(StatusCode::BAD_REQUEST, json!({"error": msg.into()}))
}

fn not_found() -> Response<Body> {
    json_response(StatusCode::NOT_FOUND, json!({"error": "endpoint not found"}))
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
