pub mod app;
pub mod serve;
pub mod simulate;
pub mod state;
pub mod telemetry;

pub use app::run as run_app;
