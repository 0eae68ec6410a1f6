//! `serve` command: run the challenge backend until interrupted.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use stride_config::AppConfig;
use stride_identity::IdentityResolver;
use stride_ledger::DistanceLedger;
use stride_pipeline::{Coordinator, EventBus, PipelineMetrics, ShutdownSignal};
use stride_server::http::start_http;
use stride_server::ws::start_ws;
use stride_server::ServerContext;
use stride_validate::MovementValidator;
use tokio::task::JoinHandle;
use tracing::info;

use crate::simulate::spawn_ghost_loop;
use crate::telemetry::spawn_metrics_server;

#[derive(Args)]
pub struct ServeArgs {
    /// REST listener address (overrides config.server.http_addr)
    #[arg(long)]
    pub http_addr: Option<String>,
    /// Websocket fan-out address (overrides config.server.ws_addr)
    #[arg(long)]
    pub ws_addr: Option<String>,
    /// Dedicated Prometheus exporter address (overrides config.server.metrics_addr)
    #[arg(long)]
    pub metrics_addr: Option<String>,
    /// Ledger database path (overrides config.ledger.path)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Emit synthetic ghost traffic in-process
    #[arg(long, default_value_t = false)]
    pub simulate: bool,
    /// Mirror logs into a JSON file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl ServeArgs {
    pub fn resolved_log_path(&self, config: &AppConfig) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| config.server.log_file.clone())
    }

    fn resolved_http_addr(&self, config: &AppConfig) -> Result<SocketAddr> {
        let addr = self
            .http_addr
            .clone()
            .unwrap_or_else(|| config.server.http_addr.clone());
        addr.parse()
            .with_context(|| format!("invalid http address '{addr}'"))
    }

    fn resolved_ws_addr(&self, config: &AppConfig) -> Result<SocketAddr> {
        let addr = self
            .ws_addr
            .clone()
            .unwrap_or_else(|| config.server.ws_addr.clone());
        addr.parse()
            .with_context(|| format!("invalid websocket address '{addr}'"))
    }

    fn resolved_metrics_addr(&self, config: &AppConfig) -> Result<Option<SocketAddr>> {
        let addr = match self
            .metrics_addr
            .clone()
            .or_else(|| config.server.metrics_addr.clone())
        {
            Some(addr) => addr,
            None => return Ok(None),
        };
        let parsed = addr
            .parse()
            .with_context(|| format!("invalid metrics address '{addr}'"))?;
        Ok(Some(parsed))
    }

    fn resolved_db_path(&self, config: &AppConfig) -> PathBuf {
        self.db.clone().unwrap_or_else(|| config.ledger.path.clone())
    }
}

/// Everything `serve` keeps running; tests drive it directly.
pub struct RunningStack {
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    http_task: JoinHandle<()>,
    ws_task: JoinHandle<()>,
    metrics_task: Option<JoinHandle<()>>,
    ghost_task: Option<JoinHandle<()>>,
}

impl RunningStack {
    /// Wait for the listeners to drain, then stop the background tasks.
    pub async fn join(self) {
        let _ = self.http_task.await;
        let _ = self.ws_task.await;
        if let Some(handle) = self.ghost_task {
            let _ = handle.await;
        }
        if let Some(handle) = self.metrics_task {
            handle.abort();
        }
    }
}

/// Open the ledger, rebuild the ranked view and bring up every listener.
pub async fn start_stack(
    args: &ServeArgs,
    config: &AppConfig,
    shutdown: ShutdownSignal,
) -> Result<RunningStack> {
    let db_path = args.resolved_db_path(config);
    if let Some(dir) = db_path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create ledger directory {}", dir.display()))?;
        }
    }
    let ledger = Arc::new(
        DistanceLedger::open(&db_path)
            .with_context(|| format!("failed to open ledger at {}", db_path.display()))?,
    );
    let resolver = Arc::new(IdentityResolver::new(ledger.clone()));
    let validator = MovementValidator::new(config.validator.clone());
    let bus = Arc::new(EventBus::new(config.bus.capacity));
    let metrics = Arc::new(PipelineMetrics::new());
    let coordinator = Arc::new(Coordinator::new(
        ledger,
        resolver,
        validator,
        bus,
        metrics,
        config.board.top_n,
    ));
    let (tracked, global) = coordinator
        .rebuild()
        .await
        .context("failed to rebuild ranked view from ledger")?;
    info!(participants = tracked, global_meters = %global, ledger = %db_path.display(), "ledger replayed");

    let ctx = ServerContext::new(coordinator.clone());
    let (http_addr, http_task) =
        start_http(args.resolved_http_addr(config)?, ctx.clone(), shutdown.clone()).await?;
    let (ws_addr, ws_task) =
        start_ws(args.resolved_ws_addr(config)?, ctx.clone(), shutdown.clone()).await?;
    let metrics_task = args
        .resolved_metrics_addr(config)?
        .map(|addr| spawn_metrics_server(ctx.metrics.registry(), addr));
    let ghost_task = if args.simulate || config.simulation.enabled {
        Some(spawn_ghost_loop(
            coordinator,
            config.simulation.clone(),
            shutdown,
        ))
    } else {
        None
    };

    Ok(RunningStack {
        http_addr,
        ws_addr,
        http_task,
        ws_task,
        metrics_task,
        ghost_task,
    })
}

/// Variant of [`run`] that accepts a manually controlled shutdown signal.
pub async fn run_with_shutdown(
    args: ServeArgs,
    config: &AppConfig,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let stack = start_stack(&args, config, shutdown.clone()).await?;
    info!(http = %stack.http_addr, ws = %stack.ws_addr, "stride backend online");
    shutdown.wait().await;
    info!("shutdown requested; draining listeners");
    stack.join().await;
    Ok(())
}

pub async fn run(args: ServeArgs, config: &AppConfig) -> Result<()> {
    run_with_shutdown(args, config, ShutdownSignal::new()).await
}
