//! Masked forward operator and its gradient
//!
//! For a fixed mask M the filter is the real-linear map
//! `x ↦ inverse(M ⊙ forward(x))`. The gradient treats the mask as a
//! constant, so `backward` applies the transpose of that map:
//! `g ↦ forward_adjoint(M ⊙ inverse_adjoint(g))`.

use dt_core::{DompteurConfig, DompteurError, FilterMode, Result};

use crate::cache::ThresholdCache;
use crate::mask::{Mask, MaskBuilder};
use crate::surface::ThresholdSurface;
use crate::transform::{SpectralTransform, Spectrum};

/// Filtered signal plus what the mask did to it
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutput {
    pub signal: Vec<f64>,
    /// Bins zeroed by the mask
    pub rejected: usize,
    /// Fraction of bins kept, offset row included
    pub kept_ratio: f64,
}

impl FilterOutput {
    fn passthrough(signal: Vec<f64>) -> Self {
        Self {
            signal,
            rejected: 0,
            kept_ratio: 1.0,
        }
    }
}

#[derive(Debug)]
pub struct MaskedFilter {
    transform: SpectralTransform,
    builder: MaskBuilder,
    cache: ThresholdCache,
}

impl MaskedFilter {
    /// Single-threaded filter over `cache`
    pub fn new(cache: ThresholdCache) -> Self {
        Self {
            transform: SpectralTransform::new(),
            builder: MaskBuilder::new(),
            cache,
        }
    }

    /// Directory-backed filter with the configured estimator and thread count
    pub fn from_config(config: &DompteurConfig) -> Result<Self> {
        config.validate()?;
        let cache = ThresholdCache::from_config(config)?;
        let transform = SpectralTransform::with_threads(config.numeric_threads)?;
        Ok(Self::new(cache).with_transform(transform))
    }

    /// Builder pattern: replace the transform (e.g. a multi-threaded one)
    pub fn with_transform(mut self, transform: SpectralTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn cache(&self) -> &ThresholdCache {
        &self.cache
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FORWARD
    // ═══════════════════════════════════════════════════════════════════════

    /// Filter `signal`. Identity returns it unchanged without touching the
    /// transform or the cache.
    pub fn forward(&self, signal: &[f64], id: &str, mode: FilterMode) -> Result<Vec<f64>> {
        self.forward_detailed(signal, id, mode).map(|output| output.signal)
    }

    /// Filter `signal` against an explicit surface
    pub fn forward_with_surface(
        &self,
        signal: &[f64],
        surface: &ThresholdSurface,
        phi: i32,
    ) -> Result<FilterOutput> {
        let spectrum = self.transform.forward(signal)?;
        self.filter_spectrum(&spectrum, surface, phi, signal.len())
    }

    /// `forward` with diagnostics; identity reports nothing rejected
    pub fn forward_detailed(&self, signal: &[f64], id: &str, mode: FilterMode) -> Result<FilterOutput> {
        match mode {
            FilterMode::Identity => Ok(FilterOutput::passthrough(signal.to_vec())),
            FilterMode::Masked(phi) => {
                // Spectrum first: a signal the transform rejects never reaches the cache
                let spectrum = self.transform.forward(signal)?;
                let surface = self.cache.get_or_compute(id, signal)?;
                let output = self.filter_spectrum(&spectrum, &surface, phi, signal.len())?;
                log::debug!(
                    "{}: φ={} rejected {} bins, kept {:.1}%",
                    id,
                    phi,
                    output.rejected,
                    output.kept_ratio * 100.0
                );
                Ok(output)
            }
        }
    }

    fn filter_spectrum(
        &self,
        spectrum: &Spectrum,
        surface: &ThresholdSurface,
        phi: i32,
        length: usize,
    ) -> Result<FilterOutput> {
        let mask = self.builder.build(spectrum, surface, phi)?;
        let masked = mask.apply(spectrum)?;
        Ok(FilterOutput {
            signal: self.transform.inverse(&masked, length)?,
            rejected: mask.rejected(),
            kept_ratio: mask.kept_ratio(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BACKWARD
    // ═══════════════════════════════════════════════════════════════════════

    /// Gradient of the filter at `signal` applied to `grad_out`. The mask is
    /// recomputed from `signal` and held constant.
    pub fn backward(
        &self,
        grad_out: &[f64],
        signal: &[f64],
        id: &str,
        mode: FilterMode,
    ) -> Result<Vec<f64>> {
        check_lengths(grad_out, signal)?;
        match mode {
            FilterMode::Identity => Ok(grad_out.to_vec()),
            FilterMode::Masked(phi) => {
                let spectrum = self.transform.forward(signal)?;
                let surface = self.cache.get_or_compute(id, signal)?;
                let mask = self.builder.build(&spectrum, &surface, phi)?;
                self.masked_gradient(grad_out, &mask)
            }
        }
    }

    /// Gradient against an explicit surface
    pub fn backward_with_surface(
        &self,
        grad_out: &[f64],
        signal: &[f64],
        surface: &ThresholdSurface,
        phi: i32,
    ) -> Result<Vec<f64>> {
        check_lengths(grad_out, signal)?;
        let mask = self.mask(signal, surface, phi)?;
        self.masked_gradient(grad_out, &mask)
    }

    fn masked_gradient(&self, grad_out: &[f64], mask: &Mask) -> Result<Vec<f64>> {
        let grad_spectrum = self
            .transform
            .inverse_adjoint(grad_out, mask.num_frames())?;
        let grad_spectrum = mask.apply(&grad_spectrum)?;
        let grad_in = self.transform.forward_adjoint(&grad_spectrum, grad_out.len())?;

        log::debug!(
            "backward: {} samples, {} bins masked",
            grad_in.len(),
            mask.rejected()
        );
        Ok(grad_in)
    }

    /// The mask `forward` would apply to `signal`
    pub fn mask(&self, signal: &[f64], surface: &ThresholdSurface, phi: i32) -> Result<Mask> {
        let spectrum = self.transform.forward(signal)?;
        self.builder.build(&spectrum, surface, phi)
    }
}

fn check_lengths(grad_out: &[f64], signal: &[f64]) -> Result<()> {
    if grad_out.len() != signal.len() {
        return Err(DompteurError::shape(format!(
            "gradient has {} values, signal has {}",
            grad_out.len(),
            signal.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn panicking_cache() -> ThresholdCache {
        ThresholdCache::in_memory(|_: &Path, _: &Path| -> Result<ThresholdSurface> {
            panic!("estimator must not run")
        })
    }

    fn tone(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 16000.0).sin() * 8000.0)
            .collect()
    }

    #[test]
    fn test_identity_is_exact() {
        let filter = MaskedFilter::new(panicking_cache());
        let signal = vec![1.5, -2.25, 3.0e4, f64::MIN_POSITIVE];
        let grad = vec![0.1, 0.2, 0.3, 0.4];

        assert_eq!(filter.forward(&signal, "id", FilterMode::Identity).unwrap(), signal);
        assert_eq!(
            filter.backward(&grad, &signal, "id", FilterMode::Identity).unwrap(),
            grad
        );
        assert!(!filter.cache().contains("id"));
    }

    #[test]
    fn test_identity_accepts_empty_signal() {
        let filter = MaskedFilter::new(panicking_cache());
        assert!(filter.forward(&[], "id", FilterMode::Identity).unwrap().is_empty());
    }

    #[test]
    fn test_gradient_length_mismatch() {
        let filter = MaskedFilter::new(panicking_cache());
        let err = filter
            .backward(&[1.0, 2.0], &[1.0, 2.0, 3.0], "id", FilterMode::Masked(0))
            .unwrap_err();
        assert!(matches!(err, DompteurError::Shape(_)));
    }

    #[test]
    fn test_low_thresholds_pass_everything() {
        let filter = MaskedFilter::new(panicking_cache());
        let signal = tone(4000);
        let frames = filter.transform().num_frames(signal.len());
        let surface = ThresholdSurface::from_fn(frames + 8, 256, |_, _| -1000.0).unwrap();

        let out = filter.forward_with_surface(&signal, &surface, 0).unwrap();
        assert_eq!(out.rejected, 0);
        for (a, b) in out.signal.iter().zip(&signal) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_high_thresholds_leave_offset_only() {
        let filter = MaskedFilter::new(panicking_cache());
        let signal = tone(4000);
        let frames = filter.transform().num_frames(signal.len());
        let surface = ThresholdSurface::from_fn(frames + 8, 256, |_, _| 1000.0).unwrap();

        let out = filter.forward_with_surface(&signal, &surface, 0).unwrap();
        assert_eq!(out.rejected, 256 * frames);
        let energy_in: f64 = signal.iter().map(|x| x * x).sum();
        let energy_out: f64 = out.signal.iter().map(|x| x * x).sum();
        assert!(energy_out < 1e-3 * energy_in);
    }

    #[test]
    fn test_forward_computes_surface_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = ThresholdCache::in_memory(move |wav: &Path, _: &Path| -> Result<ThresholdSurface> {
            counter.fetch_add(1, Ordering::SeqCst);
            let len = dt_core::wav::read_pcm16(wav)?.len();
            ThresholdSurface::from_fn(1 + len / 256 + 8, 256, |_, _| 0.0)
        });
        let filter = MaskedFilter::new(cache);
        let signal = tone(3000);

        let a = filter.forward(&signal, "utt", FilterMode::Masked(-10)).unwrap();
        let b = filter.forward(&signal, "utt", FilterMode::Masked(-10)).unwrap();
        let g = filter
            .backward(&signal, &signal, "utt", FilterMode::Masked(-10))
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(g.len(), signal.len());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_signal_never_reaches_cache() {
        let filter = MaskedFilter::new(panicking_cache());

        let err = filter.forward(&[], "empty", FilterMode::Masked(0)).unwrap_err();
        assert!(matches!(err, DompteurError::Shape(_)));
        let err = filter
            .backward(&[], &[], "empty", FilterMode::Masked(0))
            .unwrap_err();
        assert!(matches!(err, DompteurError::Shape(_)));
        assert!(!filter.cache().contains("empty"));
    }
}
