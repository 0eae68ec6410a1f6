//! Websocket fan-out: one snapshot on connect, then one per bus event.

use std::net::SocketAddr;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use stride_pipeline::ShutdownSignal;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info};

use crate::ServerContext;

/// Bind the fan-out listener and accept subscribers until shutdown.
pub async fn start_ws(
    addr: SocketAddr,
    ctx: ServerContext,
    shutdown: ShutdownSignal,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let ctx = ctx.clone();
                            tokio::spawn(async move {
                                if let Err(err) = handle_subscriber(stream, peer, ctx).await {
                                    debug!(%peer, error = %err, "subscriber connection ended with error");
                                }
                            });
                        }
                        Err(err) => {
                            error!(error = %err, "failed to accept websocket connection");
                            break;
                        }
                    }
                }
            }
        }
    });
    info!(addr = %local_addr, "websocket listener started");
    Ok((local_addr, handle))
}

async fn handle_subscriber(stream: TcpStream, peer: SocketAddr, ctx: ServerContext) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    ctx.metrics.inc_subscribers();
    let result = subscriber_loop(ws_stream, peer, &ctx).await;
    ctx.metrics.dec_subscribers();
    result
}

async fn subscriber_loop(
    stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
    ctx: &ServerContext,
) -> Result<()> {
    // Subscribe before reading the board so no update can fall between the
    // initial snapshot and the first forwarded event.
    let mut events = ctx.coordinator.subscribe();
    let (mut sink, mut source) = stream.split();
    let initial = serde_json::to_string(&ctx.coordinator.snapshot())?;
    sink.send(Message::Text(initial)).await?;
    debug!(%peer, "leaderboard subscriber connected");

    loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(Message::Ping(payload))) => sink.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(%peer, error = %err, "subscriber stream error");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let text = serde_json::to_string(event.snapshot())?;
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(lag)) => {
                    // The next push carries full state, so skipped frames
                    // heal themselves.
                    debug!(%peer, lag, "subscriber fell behind the fan-out bus");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!(%peer, "leaderboard subscriber disconnected");
    Ok(())
}
