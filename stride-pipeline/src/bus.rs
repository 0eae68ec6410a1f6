//! Broadcast bus carrying full leaderboard snapshots to subscribers.

use stride_core::LeaderboardSnapshot;
use tokio::sync::broadcast;

/// Payload for leaderboard pushes. Every event carries the complete state,
/// so a subscriber that lags and drops messages heals on the next receive.
#[derive(Clone, Debug)]
pub struct LeaderboardEvent {
    pub snapshot: LeaderboardSnapshot,
}

/// Events published by the coordinator.
#[derive(Clone, Debug)]
pub enum Event {
    /// State after an accepted movement event or a rebuild.
    Leaderboard(LeaderboardEvent),
    /// Zeroed state after an administrative reset.
    Reset(LeaderboardEvent),
}

impl Event {
    /// The snapshot carried by this event, whatever its kind.
    #[must_use]
    pub fn snapshot(&self) -> &LeaderboardSnapshot {
        match self {
            Self::Leaderboard(event) | Self::Reset(event) => &event.snapshot,
        }
    }
}

/// Fan-out bus built on a tokio broadcast channel.
///
/// Publishing never blocks and never fails ingestion: with no subscribers the
/// event is simply dropped, and slow subscribers observe a lag error on their
/// receiver rather than applying backpressure here.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of currently attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(2048)
    }
}
