//! Binary masking decision
//!
//! A bin survives when its level, relative to the loudest bin of the whole
//! signal, lies above the hearing threshold shifted by φ:
//!
//! ```text
//! S = 20·log10(|X| / max|X|)
//! H = threshold - 95 + φ
//! keep = !(S <= H)
//! ```
//!
//! The offset (DC) row is always kept. Comparisons with NaN keep the bin,
//! so a silent signal passes through unchanged.

use num_complex::Complex64;

use dt_core::{DompteurError, Result};

use crate::surface::{NUM_BANDS, ThresholdSurface};
use crate::transform::Spectrum;

/// Level the estimator's dB SPL values are referenced to
pub const REFERENCE_DB: f64 = 95.0;

// ═══════════════════════════════════════════════════════════════════════════════
// MASK
// ═══════════════════════════════════════════════════════════════════════════════

/// Keep/reject flag per spectral bin, addressed like `Spectrum`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mask {
    num_bins: usize,
    num_frames: usize,
    /// Frame-major: `keep[frame * num_bins + bin]`
    keep: Vec<bool>,
}

impl Mask {
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    #[inline]
    pub fn get(&self, bin: usize, frame: usize) -> bool {
        self.keep[frame * self.num_bins + bin]
    }

    /// 1.0 for kept bins, 0.0 for rejected ones
    #[inline]
    pub fn value(&self, bin: usize, frame: usize) -> f64 {
        if self.get(bin, frame) { 1.0 } else { 0.0 }
    }

    pub fn kept(&self) -> usize {
        self.keep.iter().filter(|&&k| k).count()
    }

    pub fn rejected(&self) -> usize {
        self.keep.len() - self.kept()
    }

    pub fn kept_ratio(&self) -> f64 {
        if self.keep.is_empty() {
            1.0
        } else {
            self.kept() as f64 / self.keep.len() as f64
        }
    }

    /// Zero every rejected bin (real and imaginary part alike)
    pub fn apply(&self, spectrum: &Spectrum) -> Result<Spectrum> {
        if spectrum.num_bins() != self.num_bins || spectrum.num_frames() != self.num_frames {
            return Err(DompteurError::shape(format!(
                "mask is {}x{}, spectrum is {}x{}",
                self.num_bins,
                self.num_frames,
                spectrum.num_bins(),
                spectrum.num_frames()
            )));
        }

        let mut masked = spectrum.clone();
        for frame in 0..self.num_frames {
            for (bin, value) in masked.frame_mut(frame).iter_mut().enumerate() {
                if !self.keep[frame * self.num_bins + bin] {
                    *value = Complex64::new(0.0, 0.0);
                }
            }
        }
        Ok(masked)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POLAR FORM
// ═══════════════════════════════════════════════════════════════════════════════

/// Magnitude and phase of the non-offset rows of a spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct PolarSpectrum {
    num_bands: usize,
    num_frames: usize,
    magnitude: Vec<f64>,
    phase: Vec<f64>,
}

impl PolarSpectrum {
    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    #[inline]
    pub fn magnitude(&self, band: usize, frame: usize) -> f64 {
        self.magnitude[frame * self.num_bands + band]
    }

    /// Phase in radians, (-π, π]
    #[inline]
    pub fn phase(&self, band: usize, frame: usize) -> f64 {
        self.phase[frame * self.num_bands + band]
    }

    /// Loudest bin of the whole signal
    pub fn max_magnitude(&self) -> f64 {
        self.magnitude.iter().copied().fold(0.0, f64::max)
    }

    /// Rebuild the complex value of one bin
    pub fn to_complex(&self, band: usize, frame: usize) -> Complex64 {
        Complex64::from_polar(self.magnitude(band, frame), self.phase(band, frame))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Derives masks from spectra and threshold surfaces. Stateless: the same
/// inputs always give the same mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskBuilder;

impl MaskBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Split off the offset row and decompose the remaining `NUM_BANDS` rows
    pub fn decompose(&self, spectrum: &Spectrum) -> Result<PolarSpectrum> {
        if spectrum.num_bins() != NUM_BANDS + 1 {
            return Err(DompteurError::shape(format!(
                "spectrum has {} bins, masking needs {} bands plus the offset row",
                spectrum.num_bins(),
                NUM_BANDS
            )));
        }

        let num_frames = spectrum.num_frames();
        let mut magnitude = Vec::with_capacity(NUM_BANDS * num_frames);
        let mut phase = Vec::with_capacity(NUM_BANDS * num_frames);

        for frame in 0..num_frames {
            for value in &spectrum.frame(frame)[1..] {
                magnitude.push(value.norm());
                phase.push(value.arg());
            }
        }

        Ok(PolarSpectrum {
            num_bands: NUM_BANDS,
            num_frames,
            magnitude,
            phase,
        })
    }

    /// Build the mask for `spectrum` at strength `phi`
    pub fn build(&self, spectrum: &Spectrum, surface: &ThresholdSurface, phi: i32) -> Result<Mask> {
        let polar = self.decompose(spectrum)?;
        let thresholds = surface.aligned(spectrum.num_frames())?;

        let max = polar.max_magnitude();
        let phi = phi as f64;
        let num_bins = spectrum.num_bins();
        let mut keep = Vec::with_capacity(num_bins * polar.num_frames());

        for frame in 0..polar.num_frames() {
            keep.push(true);
            for band in 0..NUM_BANDS {
                let level = 20.0 * (polar.magnitude(band, frame) / max).log10();
                let hearing = thresholds.get(band, frame) - REFERENCE_DB;
                let scaled = hearing + phi;
                keep.push(!(level <= scaled));
            }
        }

        Ok(Mask {
            num_bins,
            num_frames: polar.num_frames(),
            keep,
        })
    }
}
