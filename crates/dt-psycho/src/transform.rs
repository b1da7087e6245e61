//! Short-time Fourier transform pair
//!
//! Fixed configuration: 512-point frames, 256-sample hop, periodic Hamming
//! window, one-sided spectrum, frames centred by zero padding half a frame
//! on both edges. `inverse` undoes `forward` by weighted overlap-add with the
//! squared-window envelope, so the round trip is exact up to rounding for
//! any signal length.
//!
//! Both directions are real-linear, which is what makes the gradient of the
//! masked filter cheap: `forward_adjoint` and `inverse_adjoint` are their
//! transposes.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex64;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use dt_core::{DompteurError, Result};

/// Frame (and window) length in samples
pub const FFT_SIZE: usize = 512;

/// Hop between frames in samples
pub const HOP_SIZE: usize = 256;

/// Bins of the one-sided spectrum
pub const NUM_BINS: usize = FFT_SIZE / 2 + 1;

/// Envelope values below this are treated as uncovered
const ENVELOPE_FLOOR: f64 = 1e-11;

// ═══════════════════════════════════════════════════════════════════════════════
// SPECTRUM
// ═══════════════════════════════════════════════════════════════════════════════

/// One-sided complex spectrum, addressed by (bin, frame)
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    num_bins: usize,
    num_frames: usize,
    /// Frame-major: `data[frame * num_bins + bin]`
    data: Vec<Complex64>,
}

impl Spectrum {
    /// All-zero spectrum
    pub fn zeros(num_bins: usize, num_frames: usize) -> Self {
        Self {
            num_bins,
            num_frames,
            data: vec![Complex64::new(0.0, 0.0); num_bins * num_frames],
        }
    }

    fn from_frames(num_bins: usize, frames: Vec<Vec<Complex64>>) -> Self {
        let num_frames = frames.len();
        let mut data = Vec::with_capacity(num_bins * num_frames);
        for frame in frames {
            debug_assert_eq!(frame.len(), num_bins);
            data.extend(frame);
        }
        Self {
            num_bins,
            num_frames,
            data,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    #[inline]
    pub fn get(&self, bin: usize, frame: usize) -> Complex64 {
        self.data[frame * self.num_bins + bin]
    }

    #[inline]
    pub fn set(&mut self, bin: usize, frame: usize, value: Complex64) {
        self.data[frame * self.num_bins + bin] = value;
    }

    /// All bins of one frame
    pub fn frame(&self, frame: usize) -> &[Complex64] {
        &self.data[frame * self.num_bins..(frame + 1) * self.num_bins]
    }

    pub fn frame_mut(&mut self, frame: usize) -> &mut [Complex64] {
        &mut self.data[frame * self.num_bins..(frame + 1) * self.num_bins]
    }

    /// Real inner product, treating each bin as a (re, im) pair
    pub fn dot(&self, other: &Spectrum) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a.re * b.re + a.im * b.im)
            .sum()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════════

/// Analysis/synthesis transform pair.
///
/// Parallelism is fixed at construction: with one thread every frame is
/// transformed on the calling thread; with more, frames are spread over a
/// private rayon pool. Overlap-add always runs sequentially, so results are
/// bit-identical regardless of the thread count.
pub struct SpectralTransform {
    fft_size: usize,
    hop_size: usize,
    window: Vec<f64>,
    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl SpectralTransform {
    /// Single-threaded transform
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f64>::new();

        // Periodic Hamming window
        let window: Vec<f64> = (0..FFT_SIZE)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / FFT_SIZE as f64).cos())
            .collect();

        Self {
            fft_size: FFT_SIZE,
            hop_size: HOP_SIZE,
            window,
            r2c: planner.plan_fft_forward(FFT_SIZE),
            c2r: planner.plan_fft_inverse(FFT_SIZE),
            pool: None,
        }
    }

    /// Transform that spreads frames over `threads` workers
    pub fn with_threads(threads: usize) -> Result<Self> {
        let mut transform = Self::new();
        if threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("dt-stft-{}", i))
                .build()
                .map_err(|e| DompteurError::Config(format!("transform thread pool: {}", e)))?;
            transform.pool = Some(Arc::new(pool));
        }
        Ok(transform)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Threads used per call
    pub fn threads(&self) -> usize {
        self.pool.as_ref().map(|p| p.current_num_threads()).unwrap_or(1)
    }

    /// Frames produced by `forward` for a signal of `len` samples
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_size
    }

    fn pad(&self) -> usize {
        self.fft_size / 2
    }

    /// Length of the padded overlap-add buffer covered by `num_frames`
    fn padded_len(&self, num_frames: usize) -> usize {
        self.fft_size + self.hop_size * num_frames.saturating_sub(1)
    }

    /// Sum of squared windows over the padded buffer
    fn envelope(&self, num_frames: usize) -> Vec<f64> {
        let mut envelope = vec![0.0; self.padded_len(num_frames)];
        for frame in 0..num_frames {
            let start = frame * self.hop_size;
            for (i, &w) in self.window.iter().enumerate() {
                envelope[start + i] += w * w;
            }
        }
        envelope
    }

    fn run_frames<T, F>(&self, count: usize, op: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| (0..count).into_par_iter().map(|t| op(t)).collect()),
            None => (0..count).map(op).collect(),
        }
    }

    fn check_bins(&self, spectrum: &Spectrum) -> Result<()> {
        if spectrum.num_bins() != self.num_bins() {
            return Err(DompteurError::shape(format!(
                "spectrum has {} bins, transform expects {}",
                spectrum.num_bins(),
                self.num_bins()
            )));
        }
        if spectrum.num_frames() == 0 {
            return Err(DompteurError::shape("spectrum has no frames"));
        }
        Ok(())
    }

    fn overlap_add(&self, segments: &[Vec<f64>]) -> Vec<f64> {
        let mut buffer = vec![0.0; self.padded_len(segments.len())];
        for (frame, segment) in segments.iter().enumerate() {
            let start = frame * self.hop_size;
            for (i, &v) in segment.iter().enumerate() {
                buffer[start + i] += v;
            }
        }
        buffer
    }

    /// Time → time-frequency
    pub fn forward(&self, signal: &[f64]) -> Result<Spectrum> {
        if signal.is_empty() {
            return Err(DompteurError::shape("cannot transform an empty signal"));
        }

        let num_frames = self.num_frames(signal.len());
        let pad = self.pad();
        let num_bins = self.num_bins();

        let frames = self.run_frames(num_frames, |frame| -> Result<Vec<Complex64>> {
            let start = frame * self.hop_size;
            let mut input = vec![0.0; self.fft_size];
            for (i, slot) in input.iter_mut().enumerate() {
                if let Some(idx) = (start + i).checked_sub(pad) {
                    if idx < signal.len() {
                        *slot = signal[idx] * self.window[i];
                    }
                }
            }

            let mut output = vec![Complex64::new(0.0, 0.0); num_bins];
            self.r2c
                .process(&mut input, &mut output)
                .map_err(|e| DompteurError::Transform(e.to_string()))?;
            Ok(output)
        });

        let frames = frames.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(Spectrum::from_frames(num_bins, frames))
    }

    /// Time-frequency → time, returning exactly `length` samples.
    ///
    /// The imaginary parts of the DC and Nyquist bins are ignored.
    pub fn inverse(&self, spectrum: &Spectrum, length: usize) -> Result<Vec<f64>> {
        self.check_bins(spectrum)?;

        let norm = 1.0 / self.fft_size as f64;
        let last = self.num_bins() - 1;

        let segments = self.run_frames(spectrum.num_frames(), |frame| -> Result<Vec<f64>> {
            let mut input = spectrum.frame(frame).to_vec();
            input[0].im = 0.0;
            input[last].im = 0.0;

            let mut output = vec![0.0; self.fft_size];
            self.c2r
                .process(&mut input, &mut output)
                .map_err(|e| DompteurError::Transform(e.to_string()))?;

            for (sample, &w) in output.iter_mut().zip(&self.window) {
                *sample *= norm * w;
            }
            Ok(output)
        });
        let segments = segments.into_iter().collect::<Result<Vec<_>>>()?;

        let buffer = self.overlap_add(&segments);
        let envelope = self.envelope(spectrum.num_frames());
        let pad = self.pad();

        Ok((0..length)
            .map(|j| {
                let m = j + pad;
                if m < buffer.len() && envelope[m] > ENVELOPE_FLOOR {
                    buffer[m] / envelope[m]
                } else {
                    0.0
                }
            })
            .collect())
    }

    /// Transpose of `inverse`: maps a gradient on the output signal to a
    /// gradient on the (re, im) pairs of a spectrum with `num_frames` frames.
    pub fn inverse_adjoint(&self, grad: &[f64], num_frames: usize) -> Result<Spectrum> {
        if num_frames == 0 {
            return Err(DompteurError::shape("spectrum has no frames"));
        }

        let envelope = self.envelope(num_frames);
        let pad = self.pad();
        let num_bins = self.num_bins();
        let last = num_bins - 1;
        let norm = 1.0 / self.fft_size as f64;

        let frames = self.run_frames(num_frames, |frame| -> Result<Vec<Complex64>> {
            let start = frame * self.hop_size;
            let mut input = vec![0.0; self.fft_size];
            for (i, slot) in input.iter_mut().enumerate() {
                let m = start + i;
                if let Some(idx) = m.checked_sub(pad) {
                    if idx < grad.len() && envelope[m] > ENVELOPE_FLOOR {
                        *slot = grad[idx] * self.window[i] / envelope[m];
                    }
                }
            }

            let mut output = vec![Complex64::new(0.0, 0.0); num_bins];
            self.r2c
                .process(&mut input, &mut output)
                .map_err(|e| DompteurError::Transform(e.to_string()))?;

            // The one-sided inverse counts interior bins twice
            for (bin, value) in output.iter_mut().enumerate() {
                let weight = if bin == 0 || bin == last { norm } else { 2.0 * norm };
                *value *= weight;
            }
            output[0].im = 0.0;
            output[last].im = 0.0;
            Ok(output)
        });

        let frames = frames.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(Spectrum::from_frames(num_bins, frames))
    }

    /// Transpose of `forward`: maps a gradient on the (re, im) pairs of a
    /// spectrum to a gradient on an input signal of `length` samples.
    pub fn forward_adjoint(&self, grad: &Spectrum, length: usize) -> Result<Vec<f64>> {
        self.check_bins(grad)?;

        let last = self.num_bins() - 1;

        let segments = self.run_frames(grad.num_frames(), |frame| -> Result<Vec<f64>> {
            let mut input = grad.frame(frame).to_vec();
            // DC and Nyquist appear once in the full spectrum, the one-sided
            // inverse below halves everything else
            input[0] = Complex64::new(2.0 * input[0].re, 0.0);
            input[last] = Complex64::new(2.0 * input[last].re, 0.0);

            let mut output = vec![0.0; self.fft_size];
            self.c2r
                .process(&mut input, &mut output)
                .map_err(|e| DompteurError::Transform(e.to_string()))?;

            for (sample, &w) in output.iter_mut().zip(&self.window) {
                *sample *= 0.5 * w;
            }
            Ok(output)
        });
        let segments = segments.into_iter().collect::<Result<Vec<_>>>()?;

        let buffer = self.overlap_add(&segments);
        let pad = self.pad();

        Ok((0..length)
            .map(|j| buffer.get(j + pad).copied().unwrap_or(0.0))
            .collect())
    }
}

impl Default for SpectralTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("fft_size", &self.fft_size)
            .field("hop_size", &self.hop_size)
            .field("threads", &self.threads())
            .finish()
    }
}
