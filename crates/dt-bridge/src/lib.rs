//! dt-bridge: File-level entry points around the masked filter
//!
//! - `exchange` - array files shared with the external optimizer
//! - `bridge` - `propagate` / `backprop` over those files
//! - `batch` - in-place preprocessing of a directory of waveforms
//! - `stats` - signal summaries for the logs

pub mod batch;
pub mod bridge;
pub mod exchange;
pub mod stats;

pub use batch::{BatchPreprocessor, BatchReport, ItemResult, ItemStatus};
pub use bridge::GradientBridge;
pub use exchange::{ArrayData, ExchangeFormat, read_array, write_array};
pub use stats::SignalStats;
