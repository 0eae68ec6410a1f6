use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use tempfile::tempdir;
use tokio::time::timeout;

use stride_core::{ActivityEvent, Provider};
use stride_identity::IdentityResolver;
use stride_ledger::DistanceLedger;
use stride_pipeline::{Coordinator, Event, EventBus, Outcome, PipelineMetrics};
use stride_validate::{MovementValidator, RejectReason, ValidatorConfig};

fn movement(external_id: &str, provider: Provider, meters: i64, seconds: i64) -> ActivityEvent {
    ActivityEvent {
        external_id: external_id.into(),
        provider,
        activity: "running".into(),
        distance_meters: Decimal::from(meters),
        duration_seconds: seconds,
        event_id: None,
        received_at: Utc::now(),
    }
}

fn coordinator_over(ledger: Arc<DistanceLedger>) -> Arc<Coordinator> {
    let resolver = Arc::new(IdentityResolver::with_seed(ledger.clone(), 7));
    Arc::new(Coordinator::new(
        ledger,
        resolver,
        MovementValidator::new(ValidatorConfig::default()),
        Arc::new(EventBus::default()),
        Arc::new(PipelineMetrics::new()),
        10,
    ))
}

#[tokio::test(flavor = "multi_thread")]
async fn hundred_concurrent_events_sum_exactly() -> Result<()> {
    let ledger = Arc::new(DistanceLedger::open_in_memory()?);
    let coordinator = coordinator_over(ledger.clone());

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .ingest(movement("runner-1", Provider::Strava, 10, 20))
                    .await
            })
        })
        .collect();
    for handle in handles {
        let outcome = handle.await??;
        assert!(matches!(outcome, Outcome::Accepted { .. }));
    }

    assert_eq!(ledger.sum_total_meters()?, Decimal::from(1000));
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.global_total_km, "1.00");
    assert_eq!(snapshot.players.len(), 1);
    assert_eq!(snapshot.players[0].distance_km, "1.00");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn source_mismatch_leaves_totals_untouched() -> Result<()> {
    let ledger = Arc::new(DistanceLedger::open_in_memory()?);
    let coordinator = coordinator_over(ledger.clone());

    let first = coordinator
        .ingest(movement("hiker-9", Provider::Garmin, 1200, 900))
        .await?;
    assert!(matches!(first, Outcome::Accepted { .. }));

    let second = coordinator
        .ingest(movement("hiker-9", Provider::Strava, 5000, 1800))
        .await?;
    assert_eq!(second, Outcome::IgnoredSourceMismatch);

    assert_eq!(ledger.sum_total_meters()?, Decimal::from(1200));
    assert_eq!(coordinator.global_total(), Decimal::from(1200));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_claim_stores_nothing() -> Result<()> {
    let ledger = Arc::new(DistanceLedger::open_in_memory()?);
    let coordinator = coordinator_over(ledger.clone());

    let outcome = coordinator
        .ingest(movement("stroller-3", Provider::Wahoo, 5, 60))
        .await?;
    assert_eq!(
        outcome,
        Outcome::Rejected {
            reason: RejectReason::MovementBelowThreshold
        }
    );

    // The participant registers on first contact even when the claim fails.
    assert_eq!(ledger.participant_count()?, 1);
    assert_eq!(ledger.sum_total_meters()?, Decimal::ZERO);
    assert!(coordinator.snapshot().players.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn every_accepted_event_pushes_a_snapshot() -> Result<()> {
    let ledger = Arc::new(DistanceLedger::open_in_memory()?);
    let coordinator = coordinator_over(ledger);
    let mut events = coordinator.subscribe();

    coordinator
        .ingest(movement("runner-1", Provider::Apple, 2500, 900))
        .await?;
    let pushed = timeout(Duration::from_secs(1), events.recv()).await??;
    match pushed {
        Event::Leaderboard(update) => {
            assert_eq!(update.snapshot.global_total_km, "2.50");
            assert_eq!(update.snapshot.players.len(), 1);
        }
        other => panic!("expected leaderboard push, got {other:?}"),
    }

    // A rejected claim must not produce a push.
    coordinator
        .ingest(movement("runner-1", Provider::Apple, 2, 60))
        .await?;
    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err()
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshots_publish_in_board_order() -> Result<()> {
    let ledger = Arc::new(DistanceLedger::open_in_memory()?);
    let coordinator = coordinator_over(ledger);
    let mut events = coordinator.subscribe();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .ingest(movement(&format!("pacer-{}", i % 4), Provider::Garmin, 100, 50))
                    .await
            })
        })
        .collect();
    for handle in handles {
        let outcome = handle.await??;
        assert!(matches!(outcome, Outcome::Accepted { .. }));
    }

    // Commits across participants run in parallel, yet every push must carry
    // a global total no older than the one before it.
    let mut last = Decimal::ZERO;
    for _ in 0..16 {
        let pushed = timeout(Duration::from_secs(1), events.recv()).await??;
        let km: Decimal = pushed.snapshot().global_total_km.parse()?;
        assert!(km >= last, "push regressed from {last} km to {km} km");
        last = km;
    }
    assert_eq!(last, Decimal::new(160, 2));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_zeroes_ledger_and_broadcasts() -> Result<()> {
    let ledger = Arc::new(DistanceLedger::open_in_memory()?);
    let coordinator = coordinator_over(ledger.clone());

    coordinator
        .ingest(movement("cyclist-4", Provider::Garmin, 8000, 1800))
        .await?;
    let mut events = coordinator.subscribe();

    coordinator.reset().await?;
    let pushed = timeout(Duration::from_secs(1), events.recv()).await??;
    match pushed {
        Event::Reset(update) => {
            assert_eq!(update.snapshot.global_total_km, "0.00");
            assert!(update.snapshot.players.is_empty());
        }
        other => panic!("expected reset broadcast, got {other:?}"),
    }

    assert_eq!(ledger.sum_total_meters()?, Decimal::ZERO);
    assert_eq!(ledger.participant_count()?, 1);
    assert!(coordinator.snapshot().players.is_empty());

    // Fresh distance after a reset accumulates from zero.
    let outcome = coordinator
        .ingest(movement("cyclist-4", Provider::Garmin, 500, 300))
        .await?;
    assert_eq!(
        outcome,
        Outcome::Accepted {
            new_total: Decimal::from(500)
        }
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_amid_live_traffic_keeps_view_and_ledger_agreeing() -> Result<()> {
    for _ in 0..3 {
        let ledger = Arc::new(DistanceLedger::open_in_memory()?);
        let coordinator = coordinator_over(ledger.clone());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .ingest(movement(&format!("racer-{}", i % 4), Provider::Strava, 100, 50))
                        .await
                })
            })
            .collect();
        coordinator.reset().await?;
        for handle in handles {
            handle.await??;
        }

        // Whatever interleaving the scheduler picked, the live view and the
        // durable ledger agree once every commit has landed.
        assert_eq!(coordinator.global_total(), ledger.sum_total_meters()?);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rebuild_restores_view_from_ledger() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("stride.db");

    let before = {
        let ledger = Arc::new(DistanceLedger::open(&path)?);
        let coordinator = coordinator_over(ledger);
        coordinator
            .ingest(movement("runner-1", Provider::Strava, 4200, 1500))
            .await?;
        coordinator
            .ingest(movement("walker-2", Provider::Apple, 1800, 2400))
            .await?;
        coordinator.snapshot()
    };

    let ledger = Arc::new(DistanceLedger::open(&path)?);
    let coordinator = coordinator_over(ledger);
    assert!(coordinator.snapshot().players.is_empty());

    let (tracked, global) = coordinator.rebuild().await?;
    assert_eq!(tracked, 2);
    assert_eq!(global, Decimal::from(6000));
    assert_eq!(coordinator.snapshot(), before);
    Ok(())
}
