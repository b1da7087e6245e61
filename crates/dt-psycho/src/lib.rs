//! # dt-psycho
//!
//! Psychoacoustic masking filter with an explicit gradient pass.
//!
//! ## Features
//!
//! - **Transform**: 512/256 Hamming STFT with exact inverse and adjoints
//! - **Thresholds**: per-identifier hearing-threshold cache over an
//!   external estimator, with memory or directory storage
//! - **Masking**: binary keep/reject decision per bin at strength φ
//! - **Filter**: masked forward operator and its fixed-mask gradient
//!
//! ## Example
//!
//! ```rust,ignore
//! use dt_core::{DompteurConfig, FilterMode};
//! use dt_psycho::MaskedFilter;
//!
//! let config = DompteurConfig::default();
//! let filter = MaskedFilter::from_config(&config)?;
//!
//! let filtered = filter.forward(&samples, "utt_0001", FilterMode::Masked(0))?;
//! let grad_in = filter.backward(&grad_out, &samples, "utt_0001", FilterMode::Masked(0))?;
//! ```

pub mod cache;
pub mod estimator;
pub mod filter;
pub mod mask;
pub mod store;
pub mod surface;
pub mod transform;

pub use cache::ThresholdCache;
pub use estimator::{ExternalEstimator, ThresholdEstimator};
pub use filter::{FilterOutput, MaskedFilter};
pub use mask::{Mask, MaskBuilder, PolarSpectrum};
pub use store::{DirectoryStore, MemoryStore, SurfaceStore};
pub use surface::{AlignedSurface, ThresholdSurface};
pub use transform::{SpectralTransform, Spectrum};
