//! Stride aggregate crate that re-exports the main components for downstream users.

pub use stride_board as board;
pub use stride_config as config;
pub use stride_core as core;
pub use stride_identity as identity;
pub use stride_ledger as ledger;
pub use stride_pipeline as pipeline;
pub use stride_server as server;
pub use stride_validate as validate;

/// Convenience prelude to pull commonly used items into scope.
pub mod prelude {
    pub use stride_board::*;
    pub use stride_config::*;
    pub use stride_core::*;
    pub use stride_identity::*;
    pub use stride_ledger::*;
    pub use stride_pipeline::*;
    pub use stride_validate::*;
}
