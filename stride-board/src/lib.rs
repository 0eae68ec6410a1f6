//! In-memory ranked view of participant distance totals.
//!
//! Entries are keyed by participant id; the display name is mutable payload
//! carried on the entry. Ordering is cumulative distance descending with ties
//! broken by earliest creation, so updates are `O(log n)` and reading the top
//! `k` is `O(k)`. The global total is maintained incrementally alongside the
//! entries and always equals the sum of every tracked total.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use stride_core::{LeaderboardSnapshot, Meters, ParticipantId, RankEntry};

/// Sort key: larger totals first, then earliest creation order.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct BoardKey {
    meters: Reverse<Meters>,
    creation_seq: i64,
}

impl BoardKey {
    fn new(meters: Meters, creation_seq: i64) -> Self {
        Self {
            meters: Reverse(meters),
            creation_seq,
        }
    }
}

/// Ranked live view over all participants with a positive total.
#[derive(Clone, Debug, Default)]
pub struct RankedBoard {
    entries: BTreeMap<BoardKey, RankEntry>,
    index: HashMap<ParticipantId, BoardKey>,
    global_total: Meters,
}

impl RankedBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a participant's new cumulative total.
    ///
    /// The global total advances by exactly the difference to the previously
    /// known total, so replaying the same cumulative value is a no-op and
    /// every delta is counted exactly once.
    pub fn apply(&mut self, entry: RankEntry) {
        let previous = match self.index.remove(&entry.participant_id) {
            Some(old_key) => self
                .entries
                .remove(&old_key)
                .map(|old| old.total_meters)
                .unwrap_or(Decimal::ZERO),
            None => Decimal::ZERO,
        };
        self.global_total += entry.total_meters - previous;

        let key = BoardKey::new(entry.total_meters, entry.creation_seq);
        self.index.insert(entry.participant_id.clone(), key);
        self.entries.insert(key, entry);
    }

    /// The first `k` entries in rank order.
    #[must_use]
    pub fn top(&self, k: usize) -> Vec<RankEntry> {
        self.entries.values().take(k).cloned().collect()
    }

    /// Running sum of every tracked cumulative total.
    #[must_use]
    pub fn global_total(&self) -> Meters {
        self.global_total
    }

    /// Number of tracked participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and zero the global total.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.global_total = Decimal::ZERO;
    }

    /// Reload the board from a ledger scan.
    ///
    /// Only participants who have covered any distance are admitted, which
    /// makes a rebuild right after an administrative reset come out empty.
    /// Rebuilding twice from the same scan produces an identical board.
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = RankEntry>,
    {
        self.clear();
        for entry in entries {
            if entry.total_meters > Decimal::ZERO {
                self.apply(entry);
            }
        }
    }

    /// Wire snapshot of the top `k` window plus the global total.
    #[must_use]
    pub fn snapshot(&self, k: usize) -> LeaderboardSnapshot {
        LeaderboardSnapshot::from_entries(self.global_total, &self.top(k))
    }
}
