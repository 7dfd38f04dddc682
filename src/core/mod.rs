//! Domain model and the polling loop, independent of any concrete provider

pub mod balance;
pub mod config;
pub mod log;
pub mod orchestrator;
pub mod record;
pub mod retry;
pub mod sink;
pub mod source;
pub mod valuation;

// Re-export main types for cleaner imports
pub use balance::Balance;
pub use orchestrator::{CycleOutcome, CycleState, CycleTrigger, Orchestrator, trigger_channel};
pub use record::{AssetValue, PortfolioTotal, Snapshot, TIMESTAMP_FORMAT};
pub use retry::{RetryError, RetryPolicy, with_retry};
pub use sink::{DisplaySink, SnapshotExporter, TelemetrySink};
pub use source::{BalanceSource, RateSource};
