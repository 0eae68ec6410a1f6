//! Event pipeline wiring identity, validation, ledger, board and fan-out.

pub mod bus;
pub mod coordinator;
pub mod metrics;
pub mod shutdown;

pub use bus::{Event, EventBus, LeaderboardEvent};
pub use coordinator::{Coordinator, IngestError, IngestResult, Outcome};
pub use metrics::PipelineMetrics;
pub use shutdown::ShutdownSignal;
