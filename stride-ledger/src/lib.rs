//! Durable distance ledger backed by SQLite.
//!
//! One row per participant, keyed by the external provider id. Totals are
//! stored as canonical `Decimal` strings and updated through a
//! read-modify-write transaction so accounting stays exact; SQLite arithmetic
//! on the column would silently coerce to floating point.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use stride_core::{Meters, Participant, Provider};
use thiserror::Error;
use tracing::debug;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-specific error type. Storage failures are loud by design: callers
/// surface them as internal errors rather than degrading silently.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The addressed participant does not exist.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),
    /// A candidate display name collided with an existing one.
    #[error("display name already taken: {0}")]
    NameTaken(String),
    /// Cumulative totals only ever grow; negative deltas are a caller bug.
    #[error("negative distance delta: {0}")]
    NegativeDelta(Meters),
    /// A stored row failed to parse back into domain types.
    #[error("corrupt row for participant {id}: {detail}")]
    CorruptRow { id: String, detail: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// SQLite-backed store of participants and their cumulative distances.
pub struct DistanceLedger {
    conn: Mutex<Connection>,
}

/// Column tuple read straight out of SQLite before domain conversion.
type RawRow = (i64, String, String, String, String, String, String);

impl DistanceLedger {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an ephemeral in-memory ledger. Used by tests and demo runs.
    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> LedgerResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS participants (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                external_id TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL UNIQUE,
                preferred_provider TEXT NOT NULL,
                total_meters TEXT NOT NULL DEFAULT '0',
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert-or-fetch a participant for the given external id.
    ///
    /// At most one row ever exists per external id; concurrent first contacts
    /// resolve to a single winner and the losers observe the stored row. The
    /// boolean reports whether this call created the row. A display name
    /// collision surfaces as [`LedgerError::NameTaken`] so the caller can
    /// retry with a fresh candidate.
    pub fn upsert_participant(
        &self,
        external_id: &str,
        provider: Provider,
        candidate_id: &str,
        candidate_name: &str,
    ) -> LedgerResult<(Participant, bool)> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                r#"
                INSERT INTO participants (id, external_id, display_name, preferred_provider, total_meters, created_at)
                VALUES (?1, ?2, ?3, ?4, '0', ?5)
                ON CONFLICT(external_id) DO NOTHING
                "#,
                params![
                    candidate_id,
                    external_id,
                    candidate_name,
                    provider.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|err| match err {
                rusqlite::Error::SqliteFailure(_, Some(ref message))
                    if message.contains("participants.display_name") =>
                {
                    LedgerError::NameTaken(candidate_name.to_string())
                }
                other => LedgerError::from(other),
            })?;

        let row = conn.query_row(
            "SELECT seq, id, external_id, display_name, preferred_provider, total_meters, created_at
             FROM participants WHERE external_id = ?1",
            params![external_id],
            Self::read_raw_row,
        )?;
        drop(conn);
        Ok((Self::row_to_participant(row)?, inserted == 1))
    }

    /// Fetch a participant by external id, if present.
    pub fn find_by_external_id(&self, external_id: &str) -> LedgerResult<Option<Participant>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT seq, id, external_id, display_name, preferred_provider, total_meters, created_at
                 FROM participants WHERE external_id = ?1",
                params![external_id],
                Self::read_raw_row,
            )
            .optional()?;
        drop(conn);
        row.map(Self::row_to_participant).transpose()
    }

    /// Add an accepted distance to a participant's cumulative total.
    ///
    /// The read and the write happen inside one transaction, which together
    /// with the connection mutex makes the increment atomic. Returns the new
    /// cumulative total.
    pub fn apply_delta(&self, participant_id: &str, delta: Meters) -> LedgerResult<Meters> {
        if delta < Decimal::ZERO {
            return Err(LedgerError::NegativeDelta(delta));
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let stored: String = tx
            .query_row(
                "SELECT total_meters FROM participants WHERE id = ?1",
                params![participant_id],
                |row| row.get(0),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    LedgerError::UnknownParticipant(participant_id.to_string())
                }
                other => LedgerError::from(other),
            })?;
        let current = Self::parse_total(participant_id, &stored)?;
        let next = current + delta;
        tx.execute(
            "UPDATE participants SET total_meters = ?1 WHERE id = ?2",
            params![next.to_string(), participant_id],
        )?;
        tx.commit()?;
        debug!(participant = %participant_id, delta = %delta, total = %next, "ledger delta applied");
        Ok(next)
    }

    /// Change the provider a participant accepts events from.
    pub fn set_preferred_provider(
        &self,
        external_id: &str,
        provider: Provider,
    ) -> LedgerResult<Participant> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE participants SET preferred_provider = ?1 WHERE external_id = ?2",
            params![provider.as_str(), external_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::UnknownParticipant(external_id.to_string()));
        }
        let row = conn.query_row(
            "SELECT seq, id, external_id, display_name, preferred_provider, total_meters, created_at
             FROM participants WHERE external_id = ?1",
            params![external_id],
            Self::read_raw_row,
        )?;
        drop(conn);
        Self::row_to_participant(row)
    }

    /// Every participant in creation order. This is the rebuild feed for the
    /// ranked live view.
    pub fn scan(&self) -> LedgerResult<Vec<Participant>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seq, id, external_id, display_name, preferred_provider, total_meters, created_at
             FROM participants ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], Self::read_raw_row)?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(Self::row_to_participant(row?)?);
        }
        Ok(participants)
    }

    /// Exact sum of all cumulative totals, computed in decimal space.
    pub fn sum_total_meters(&self) -> LedgerResult<Meters> {
        Ok(self
            .scan()?
            .iter()
            .map(|participant| participant.total_meters)
            .sum())
    }

    /// Number of registered participants.
    pub fn participant_count(&self) -> LedgerResult<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM participants", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Zero every cumulative total while keeping participants and names.
    /// Returns the number of affected rows.
    pub fn reset_totals(&self) -> LedgerResult<usize> {
        let conn = self.conn.lock().unwrap();
        let zeroed = conn.execute("UPDATE participants SET total_meters = '0'", [])?;
        Ok(zeroed)
    }

    /// Cheap liveness probe used by the health endpoint.
    pub fn ping(&self) -> LedgerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn row_to_participant(row: RawRow) -> LedgerResult<Participant> {
        let (seq, id, external_id, display_name, provider, total, created_at) = row;
        let preferred_provider: Provider =
            provider.parse().map_err(|_| LedgerError::CorruptRow {
                id: id.clone(),
                detail: format!("unknown provider {provider}"),
            })?;
        let total_meters = Self::parse_total(&id, &total)?;
        let created_at: DateTime<Utc> = created_at
            .parse::<DateTime<Utc>>()
            .map_err(|err| LedgerError::CorruptRow {
                id: id.clone(),
                detail: format!("bad created_at timestamp: {err}"),
            })?;
        Ok(Participant {
            id,
            external_id,
            display_name,
            preferred_provider,
            total_meters,
            creation_seq: seq,
            created_at,
        })
    }

    fn parse_total(id: &str, raw: &str) -> LedgerResult<Meters> {
        raw.parse::<Decimal>().map_err(|err| LedgerError::CorruptRow {
            id: id.to_string(),
            detail: format!("bad total_meters value {raw:?}: {err}"),
        })
    }
}
