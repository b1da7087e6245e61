//! dt-core: Shared types for the Dompteur psychoacoustic filter
//!
//! This crate provides the foundational pieces used by every other crate:
//!
//! - `error` - the `DompteurError` taxonomy and `Result` alias
//! - `mode` - `FilterMode`, the tagged φ (identity vs. masked) switch
//! - `config` - serializable runtime configuration
//! - `table` - comma-separated float matrices (threshold and exchange files)
//! - `wav` - 16 kHz mono 16-bit PCM reading/writing
//! - `persist` - atomic file replacement

mod config;
mod error;
mod mode;
pub mod persist;
pub mod table;
pub mod wav;

pub use config::*;
pub use error::*;
pub use mode::*;

/// Fixed sample rate of every waveform handled by the filter
pub const SAMPLE_RATE: u32 = 16_000;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
