//! Deterministic validation of untrusted movement claims.
//!
//! The validator is pure: no clock, no storage, no network. Given the same
//! claim and the same configuration it always returns the same verdict, which
//! keeps every rule unit-testable in isolation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stride_core::{ActivityEvent, ActivityKind, Meters};

/// Why a movement claim was turned away.
///
/// The display string is the stable reason reported to callers; `code` is the
/// snake_case form used for metric labels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectReason {
    InvalidDuration,
    ActivityNotInScope,
    MovementBelowThreshold,
    PaceTooSlow,
    SpeedExceedsLimit,
}

impl RejectReason {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidDuration => "invalid_duration",
            Self::ActivityNotInScope => "activity_not_in_scope",
            Self::MovementBelowThreshold => "movement_below_threshold",
            Self::PaceTooSlow => "pace_too_slow",
            Self::SpeedExceedsLimit => "speed_exceeds_limit",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InvalidDuration => "invalid duration",
            Self::ActivityNotInScope => "activity type not in scope",
            Self::MovementBelowThreshold => "movement below threshold",
            Self::PaceTooSlow => "pace too slow to be intentional",
            Self::SpeedExceedsLimit => "speed exceeds human limits",
        };
        f.write_str(text)
    }
}

/// Outcome of assessing a single claim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// The claim passed every rule. Acceptance never rescales the distance.
    Accepted { sanitized_meters: Meters },
    Rejected { reason: RejectReason },
}

/// Tunable thresholds for the rule pipeline.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ValidatorConfig {
    /// GPS jitter floor: claims below this distance are noise.
    #[serde(default = "default_min_distance_meters")]
    pub min_distance_meters: Meters,
    /// Slowest average speed still considered intentional movement.
    #[serde(default = "default_min_speed_mps")]
    pub min_speed_mps: Meters,
    /// Ceiling applied to activities without a dedicated entry below.
    #[serde(default = "default_max_speed_mps")]
    pub max_speed_mps: Meters,
    /// Per-activity speed ceilings in meters per second.
    #[serde(default = "default_activity_ceilings")]
    pub activity_ceilings: HashMap<ActivityKind, Meters>,
    /// Activities that count toward the challenge.
    #[serde(default = "default_allowed_activities")]
    pub allowed_activities: HashSet<ActivityKind>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_distance_meters: default_min_distance_meters(),
            min_speed_mps: default_min_speed_mps(),
            max_speed_mps: default_max_speed_mps(),
            activity_ceilings: default_activity_ceilings(),
            allowed_activities: default_allowed_activities(),
        }
    }
}

impl ValidatorConfig {
    /// Speed ceiling for the given activity, falling back to the global cap.
    #[must_use]
    pub fn ceiling_for(&self, kind: ActivityKind) -> Meters {
        self.activity_ceilings
            .get(&kind)
            .copied()
            .unwrap_or(self.max_speed_mps)
    }
}

/// Applies the movement rules in a fixed order; the first failure wins.
#[derive(Clone, Debug, Default)]
pub struct MovementValidator {
    config: ValidatorConfig,
}

impl MovementValidator {
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Assess one claim. Rule order matters: duration sanity first so the
    /// speed computation below can never divide by zero.
    #[must_use]
    pub fn assess(&self, event: &ActivityEvent) -> Verdict {
        if event.duration_seconds <= 0 {
            return Self::reject(RejectReason::InvalidDuration);
        }

        let kind = match event.activity.parse::<ActivityKind>() {
            Ok(kind) if self.config.allowed_activities.contains(&kind) => kind,
            _ => return Self::reject(RejectReason::ActivityNotInScope),
        };

        if event.distance_meters < self.config.min_distance_meters {
            return Self::reject(RejectReason::MovementBelowThreshold);
        }

        let speed = event.distance_meters / Decimal::from(event.duration_seconds);
        if speed < self.config.min_speed_mps {
            return Self::reject(RejectReason::PaceTooSlow);
        }
        if speed > self.config.ceiling_for(kind) {
            return Self::reject(RejectReason::SpeedExceedsLimit);
        }

        Verdict::Accepted {
            sanitized_meters: event.distance_meters,
        }
    }

    fn reject(reason: RejectReason) -> Verdict {
        Verdict::Rejected { reason }
    }
}

fn default_min_distance_meters() -> Meters {
    Decimal::from(10)
}

fn default_min_speed_mps() -> Meters {
    Decimal::new(3, 1)
}

fn default_max_speed_mps() -> Meters {
    Decimal::from(18)
}

fn default_activity_ceilings() -> HashMap<ActivityKind, Meters> {
    HashMap::from([
        (ActivityKind::Running, Decimal::from(12)),
        (ActivityKind::Cycling, Decimal::from(25)),
    ])
}

fn default_allowed_activities() -> HashSet<ActivityKind> {
    ActivityKind::ALL.iter().copied().collect()
}
