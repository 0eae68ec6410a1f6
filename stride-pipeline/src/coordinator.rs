//! Aggregation coordinator: one logical unit per movement event.
//!
//! For every event the coordinator resolves identity, validates the claim,
//! commits the accepted distance to the ledger, advances the ranked view and
//! publishes a fresh snapshot. All storage-touching steps for one participant
//! are serialized through a per-participant lock; distinct participants
//! proceed concurrently. Whole-view rewrites (reset, rebuild) take an
//! exclusive gate that in-flight commit units hold shared, so a rewrite
//! never lands between a unit's ledger write and its board apply. Ledger
//! calls run on the blocking pool.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use stride_board::RankedBoard;
use stride_core::{
    ActivityEvent, ExternalId, LeaderboardSnapshot, Meters, Participant, Provider, RankEntry,
};
use stride_identity::{IdentityError, IdentityResolver, Resolution};
use stride_ledger::{DistanceLedger, LedgerError};
use stride_validate::{MovementValidator, RejectReason, Verdict};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, RwLock as AsyncRwLock};
use tracing::{debug, info, warn};

use crate::bus::{Event, EventBus, LeaderboardEvent};
use crate::metrics::PipelineMetrics;

/// Result alias for coordinator operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Failures that abort an ingestion. Validation rejections and source
/// mismatches are not errors; they are ordinary [`Outcome`] values.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How the pipeline disposed of one movement event.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The distance was recorded; carries the new cumulative total.
    Accepted { new_total: Meters },
    /// The event came from a non-preferred provider. No-op success.
    IgnoredSourceMismatch,
    /// The validator turned the claim away. Nothing was stored.
    Rejected { reason: RejectReason },
}

/// Shared pipeline state behind the ingestion and query surfaces.
pub struct Coordinator {
    ledger: Arc<DistanceLedger>,
    resolver: Arc<IdentityResolver>,
    validator: MovementValidator,
    board: Arc<RwLock<RankedBoard>>,
    bus: Arc<EventBus>,
    metrics: Arc<PipelineMetrics>,
    top_n: usize,
    participant_locks: AsyncMutex<HashMap<ExternalId, Arc<AsyncMutex<()>>>>,
    /// Commit units hold this shared; reset and rebuild hold it exclusively,
    /// so a unit's ledger write and board apply land as one piece.
    rewrite_gate: Arc<AsyncRwLock<()>>,
}

impl Coordinator {
    pub fn new(
        ledger: Arc<DistanceLedger>,
        resolver: Arc<IdentityResolver>,
        validator: MovementValidator,
        bus: Arc<EventBus>,
        metrics: Arc<PipelineMetrics>,
        top_n: usize,
    ) -> Self {
        Self {
            ledger,
            resolver,
            validator,
            board: Arc::new(RwLock::new(RankedBoard::new())),
            bus,
            metrics,
            top_n,
            participant_locks: AsyncMutex::new(HashMap::new()),
            rewrite_gate: Arc::new(AsyncRwLock::new(())),
        }
    }

    /// Run one movement event through the full pipeline.
    ///
    /// Once the ledger write has committed, the board update and the fan-out
    /// publish run inside a detached task, so a caller that vanishes mid-await
    /// cannot leave the view behind the ledger. The per-participant lock is
    /// moved into that task and held until it finishes.
    pub async fn ingest(&self, event: ActivityEvent) -> IngestResult<Outcome> {
        self.metrics.inc_ingested();
        let guard = self
            .participant_lock(&event.external_id)
            .await
            .lock_owned()
            .await;

        let resolver = self.resolver.clone();
        let external_id = event.external_id.clone();
        let provider = event.provider;
        let resolution =
            tokio::task::spawn_blocking(move || resolver.resolve(&external_id, provider)).await??;

        let participant = match resolution {
            Resolution::Linked(participant) => participant,
            Resolution::SourceMismatch(participant) => {
                debug!(
                    participant = %participant.id,
                    received = %event.provider,
                    preferred = %participant.preferred_provider,
                    "event ignored by source lock"
                );
                self.metrics.inc_ignored();
                return Ok(Outcome::IgnoredSourceMismatch);
            }
        };

        let sanitized = match self.validator.assess(&event) {
            Verdict::Accepted { sanitized_meters } => sanitized_meters,
            Verdict::Rejected { reason } => {
                debug!(
                    participant = %participant.id,
                    activity = %event.activity,
                    distance = %event.distance_meters,
                    duration = event.duration_seconds,
                    reason = %reason,
                    "movement claim rejected"
                );
                self.metrics.inc_rejected(reason.code());
                return Ok(Outcome::Rejected { reason });
            }
        };

        let ledger = self.ledger.clone();
        let board = self.board.clone();
        let bus = self.bus.clone();
        let metrics = self.metrics.clone();
        let top_n = self.top_n;
        let rewrite_gate = self.rewrite_gate.clone();
        let commit = tokio::spawn(async move {
            let _serialized = guard;
            // Held until the ledger write and the board apply have both
            // landed, so a reset cannot slip in between them.
            let _unit = rewrite_gate.read_owned().await;
            let participant_id = participant.id.clone();
            let new_total = tokio::task::spawn_blocking(move || {
                ledger.apply_delta(&participant_id, sanitized)
            })
            .await??;

            {
                let mut board = board.write().unwrap();
                board.apply(RankEntry {
                    participant_id: participant.id.clone(),
                    display_name: participant.display_name.clone(),
                    total_meters: new_total,
                    creation_seq: participant.creation_seq,
                });
                metrics.set_global_total(board.global_total());
                metrics.set_tracked_participants(board.len());
                let snapshot = board.snapshot(top_n);
                // Publishing under the board lock keeps the push stream in
                // board order.
                bus.publish(Event::Leaderboard(LeaderboardEvent { snapshot }));
            }
            metrics.inc_snapshot();
            info!(
                participant = %participant.id,
                name = %participant.display_name,
                meters = %sanitized,
                total = %new_total,
                "distance recorded"
            );
            Ok::<Meters, IngestError>(new_total)
        });

        let new_total = commit.await??;
        self.metrics.inc_accepted();
        Ok(Outcome::Accepted { new_total })
    }

    /// Reload the ranked view and global total from the ledger.
    ///
    /// Runs at startup before any traffic is accepted, and can repair the
    /// view after a crash between a ledger commit and the board update.
    /// In-flight commit units finish before the rebuild starts. Returns the
    /// tracked participant count and the global total.
    pub async fn rebuild(&self) -> IngestResult<(usize, Meters)> {
        let _exclusive = self.rewrite_gate.write().await;
        let ledger = self.ledger.clone();
        let participants = tokio::task::spawn_blocking(move || ledger.scan()).await??;

        let (tracked, global) = {
            let mut board = self.board.write().unwrap();
            board.rebuild(participants.into_iter().map(|participant| RankEntry {
                participant_id: participant.id,
                display_name: participant.display_name,
                total_meters: participant.total_meters,
                creation_seq: participant.creation_seq,
            }));
            self.metrics.set_global_total(board.global_total());
            self.metrics.set_tracked_participants(board.len());
            let snapshot = board.snapshot(self.top_n);
            self.bus
                .publish(Event::Leaderboard(LeaderboardEvent { snapshot }));
            (board.len(), board.global_total())
        };
        info!(participants = tracked, global_meters = %global, "ranked view rebuilt from ledger");
        Ok((tracked, global))
    }

    /// Administrative full reset: zero the ledger, clear the view, broadcast
    /// the zeroed snapshot. Participants and their names survive. Each
    /// in-flight commit unit lands wholly before or wholly after the reset,
    /// so the view never diverges from the ledger.
    pub async fn reset(&self) -> IngestResult<()> {
        let _exclusive = self.rewrite_gate.write().await;
        let ledger = self.ledger.clone();
        let zeroed = tokio::task::spawn_blocking(move || ledger.reset_totals()).await??;

        {
            let mut board = self.board.write().unwrap();
            board.clear();
            self.metrics.set_global_total(Decimal::ZERO);
            self.metrics.set_tracked_participants(0);
            let snapshot = board.snapshot(self.top_n);
            self.bus.publish(Event::Reset(LeaderboardEvent { snapshot }));
        }
        self.metrics.inc_snapshot();
        warn!(participants = zeroed, "challenge reset: all totals zeroed");
        Ok(())
    }

    /// Explicit profile operation switching a participant's source lock.
    /// Distances are untouched.
    pub async fn switch_provider(
        &self,
        external_id: &str,
        provider: Provider,
    ) -> IngestResult<Participant> {
        let lock = self.participant_lock(external_id).await;
        let _serialized = lock.lock().await;
        let ledger = self.ledger.clone();
        let external = external_id.to_string();
        let participant =
            tokio::task::spawn_blocking(move || ledger.set_preferred_provider(&external, provider))
                .await??;
        info!(
            participant = %participant.id,
            provider = %provider,
            "preferred provider switched"
        );
        Ok(participant)
    }

    /// Current top-N snapshot, served without touching the ledger.
    #[must_use]
    pub fn snapshot(&self) -> LeaderboardSnapshot {
        self.board.read().unwrap().snapshot(self.top_n)
    }

    /// Community-wide total as tracked by the live view.
    #[must_use]
    pub fn global_total(&self) -> Meters {
        self.board.read().unwrap().global_total()
    }

    /// Attach a fan-out subscriber.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Number of registered participants, straight from the ledger.
    pub async fn participant_count(&self) -> IngestResult<u64> {
        let ledger = self.ledger.clone();
        Ok(tokio::task::spawn_blocking(move || ledger.participant_count()).await??)
    }

    /// Storage liveness probe for the health endpoint.
    pub async fn ping(&self) -> IngestResult<()> {
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || ledger.ping()).await??;
        Ok(())
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    async fn participant_lock(&self, external_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.participant_locks.lock().await;
        locks
            .entry(external_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
