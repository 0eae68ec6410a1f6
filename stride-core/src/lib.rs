//! Fundamental data types shared across the entire workspace.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Alias for exact distance accounting in meters.
pub type Meters = Decimal;
/// Stable internal participant identifier (UUID in string form).
pub type ParticipantId = String;
/// Provider-scoped external user identifier.
pub type ExternalId = String;

/// Raised when a wire token cannot be mapped onto a known enum variant.
#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

/// Fitness platforms that may push activity events into the system.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Strava,
    Garmin,
    Wahoo,
    Apple,
}

impl Provider {
    /// Stable lowercase token used in storage and on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strava => "strava",
            Self::Garmin => "garmin",
            Self::Wahoo => "wahoo",
            Self::Apple => "apple",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "strava" => Ok(Self::Strava),
            "garmin" => Ok(Self::Garmin),
            "wahoo" => Ok(Self::Wahoo),
            "apple" => Ok(Self::Apple),
            other => Err(ParseError {
                kind: "provider",
                value: other.to_string(),
            }),
        }
    }
}

/// Activity categories the challenge recognizes.
///
/// Incoming payloads carry the activity as free text; parsing failures are a
/// validation concern (out of scope), not a transport error.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Running,
    Walking,
    Cycling,
    Hiking,
    Swimming,
    Rowing,
    NordicSki,
}

impl ActivityKind {
    /// Every recognized activity, in declaration order.
    pub const ALL: [ActivityKind; 7] = [
        Self::Running,
        Self::Walking,
        Self::Cycling,
        Self::Hiking,
        Self::Swimming,
        Self::Rowing,
        Self::NordicSki,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Walking => "walking",
            Self::Cycling => "cycling",
            Self::Hiking => "hiking",
            Self::Swimming => "swimming",
            Self::Rowing => "rowing",
            Self::NordicSki => "nordic_ski",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().replace('-', "_").as_str() {
            "running" | "run" => Ok(Self::Running),
            "walking" | "walk" => Ok(Self::Walking),
            "cycling" | "ride" => Ok(Self::Cycling),
            "hiking" | "hike" => Ok(Self::Hiking),
            "swimming" | "swim" => Ok(Self::Swimming),
            "rowing" | "row" => Ok(Self::Rowing),
            "nordic_ski" | "nordicski" => Ok(Self::NordicSki),
            other => Err(ParseError {
                kind: "activity",
                value: other.to_string(),
            }),
        }
    }
}

/// Normalized movement claim produced by the ingestion endpoint.
///
/// Everything in here is untrusted until the validator has assessed it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ActivityEvent {
    pub external_id: ExternalId,
    pub provider: Provider,
    /// Raw activity label as supplied by the tracker.
    pub activity: String,
    pub distance_meters: Meters,
    pub duration_seconds: i64,
    /// Provider-side event identifier, carried for future redelivery checks.
    pub event_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Durable participant record owned by the ledger.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub external_id: ExternalId,
    pub display_name: String,
    pub preferred_provider: Provider,
    pub total_meters: Meters,
    /// Monotonic creation order, used to break distance ties deterministically.
    pub creation_seq: i64,
    pub created_at: DateTime<Utc>,
}

/// Convenience constructor for a fresh internal participant id.
#[must_use]
pub fn new_participant_id() -> ParticipantId {
    Uuid::new_v4().to_string()
}

/// One row of the ranked live view.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RankEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub total_meters: Meters,
    pub creation_seq: i64,
}

/// Wire representation of a ranked player inside a snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: ParticipantId,
    pub name: String,
    /// Kilometers rendered with exactly two decimal places.
    pub distance_km: String,
}

/// Full leaderboard state pushed to subscribers and served on query.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub global_total_km: String,
    pub players: Vec<PlayerSummary>,
}

impl LeaderboardSnapshot {
    /// Build the wire snapshot from ranked entries and the running global sum.
    #[must_use]
    pub fn from_entries(global_total: Meters, entries: &[RankEntry]) -> Self {
        Self {
            global_total_km: meters_to_km_string(global_total),
            players: entries
                .iter()
                .map(|entry| PlayerSummary {
                    id: entry.participant_id.clone(),
                    name: entry.display_name.clone(),
                    distance_km: meters_to_km_string(entry.total_meters),
                })
                .collect(),
        }
    }
}

/// Render meters as a kilometer string with exactly two decimals.
///
/// Rounding is half away from zero so `12.345` km displays as `12.35`.
#[must_use]
pub fn meters_to_km_string(meters: Meters) -> String {
    let km = (meters / Decimal::from(1000))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{km:.2}")
}
