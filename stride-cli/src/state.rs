//! Operator inspection of the persisted distance ledger.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::SecondsFormat;
use clap::Args;
use serde_json::to_string_pretty;
use stride_config::AppConfig;
use stride_core::{meters_to_km_string, Meters, Participant};
use stride_ledger::DistanceLedger;

const MAX_ROWS: usize = 20;

#[derive(Args)]
pub struct StateInspectArgs {
    /// Ledger database path (overrides config.ledger.path)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Dump rows as pretty-printed JSON
    #[arg(long, default_value_t = false)]
    pub raw: bool,
}

pub async fn inspect_ledger(args: StateInspectArgs, config: &AppConfig) -> Result<()> {
    let path = args
        .db
        .clone()
        .unwrap_or_else(|| config.ledger.path.clone());
    let ledger = DistanceLedger::open(&path)
        .with_context(|| format!("failed to open ledger at {}", path.display()))?;
    let participants = tokio::task::spawn_blocking(move || ledger.scan())
        .await
        .map_err(|err| anyhow!("ledger inspection task failed: {err}"))??;

    if args.raw {
        println!("{}", to_string_pretty(&participants)?);
        return Ok(());
    }
    print_summary(&path, &participants);
    Ok(())
}

fn print_summary(path: &Path, participants: &[Participant]) {
    println!("Ledger database: {}", path.display());
    println!("Participants ({} total):", participants.len());
    if participants.is_empty() {
        println!("  none");
        return;
    }
    for participant in participants.iter().take(MAX_ROWS) {
        println!(
            "  #{} {} [{}] {} km via {} since {}",
            participant.creation_seq,
            participant.display_name,
            participant.external_id,
            meters_to_km_string(participant.total_meters),
            participant.preferred_provider,
            participant
                .created_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    if participants.len() > MAX_ROWS {
        println!(
            "  ... {} additional participant(s) omitted",
            participants.len() - MAX_ROWS
        );
    }
    let total: Meters = participants.iter().map(|p| p.total_meters).sum();
    println!("Global odometer: {} km", meters_to_km_string(total));
}
