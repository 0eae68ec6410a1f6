//! Maps external provider ids onto stable internal participants.
//!
//! Display names never echo provider data; every participant gets a generated
//! `Adjective-Animal-NNNN` handle. The ledger's unique index is the source of
//! truth for name collisions, so the resolver simply retries with a fresh
//! candidate when the insert bounces.

use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};
use stride_core::{new_participant_id, Participant, Provider};
use stride_ledger::{DistanceLedger, LedgerError};
use thiserror::Error;
use tracing::{debug, info};

const ADJECTIVES: [&str; 8] = [
    "Silent", "Swift", "Patient", "Vibrant", "Steady", "Misty", "Bold", "Calm",
];
const ANIMALS: [&str; 8] = [
    "Fox", "Owl", "Bear", "Wolf", "Otter", "Deer", "Hawk", "Badger",
];

const MAX_NAME_ATTEMPTS: usize = 8;

/// Result alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The name space was exhausted for this request; practically unreachable
    /// outside tests with a pinned generator.
    #[error("could not allocate a unique display name after {0} attempts")]
    NameExhausted(usize),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// How an incoming event relates to the stored participant.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// The event's provider matches the participant's preferred source.
    Linked(Participant),
    /// The participant exists but listens to a different provider. The caller
    /// treats this as a no-op success, never as an error.
    SourceMismatch(Participant),
}

/// Draw an anonymous display name such as `Silent-Fox-4821`.
#[must_use]
pub fn anonymous_name(rng: &mut impl Rng) -> String {
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let animal = ANIMALS[rng.gen_range(0..ANIMALS.len())];
    let number: u32 = rng.gen_range(1000..10_000);
    format!("{adjective}-{animal}-{number}")
}

/// Resolves external ids to participants, creating them on first contact.
pub struct IdentityResolver {
    ledger: Arc<DistanceLedger>,
    rng: Mutex<StdRng>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(ledger: Arc<DistanceLedger>) -> Self {
        Self::with_rng(ledger, StdRng::from_entropy())
    }

    /// Pin the name generator, for deterministic tests and demo runs.
    #[must_use]
    pub fn with_seed(ledger: Arc<DistanceLedger>, seed: u64) -> Self {
        Self::with_rng(ledger, StdRng::seed_from_u64(seed))
    }

    fn with_rng(ledger: Arc<DistanceLedger>, rng: StdRng) -> Self {
        Self {
            ledger,
            rng: Mutex::new(rng),
        }
    }

    /// Resolve an external id, creating the participant on first contact.
    ///
    /// Creation adopts the incoming provider as the preferred source. For
    /// existing participants the provider lock is checked here; switching the
    /// lock is an explicit profile operation, never a side effect of an event.
    pub fn resolve(&self, external_id: &str, provider: Provider) -> IdentityResult<Resolution> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate_name = {
                let mut rng = self.rng.lock().unwrap();
                anonymous_name(&mut *rng)
            };
            let candidate_id = new_participant_id();
            match self
                .ledger
                .upsert_participant(external_id, provider, &candidate_id, &candidate_name)
            {
                Ok((participant, created)) => {
                    if created {
                        info!(
                            participant = %participant.id,
                            name = %participant.display_name,
                            provider = %provider,
                            "participant registered"
                        );
                        return Ok(Resolution::Linked(participant));
                    }
                    if participant.preferred_provider == provider {
                        return Ok(Resolution::Linked(participant));
                    }
                    debug!(
                        participant = %participant.id,
                        received = %provider,
                        preferred = %participant.preferred_provider,
                        "provider does not match preferred source"
                    );
                    return Ok(Resolution::SourceMismatch(participant));
                }
                Err(LedgerError::NameTaken(name)) => {
                    debug!(name = %name, "display name collision, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(IdentityError::NameExhausted(MAX_NAME_ATTEMPTS))
    }
}
