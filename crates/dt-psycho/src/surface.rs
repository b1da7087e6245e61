//! Hearing-threshold surfaces

use std::path::Path;

use dt_core::table::Table;
use dt_core::{DompteurError, Result};

/// Bands the masking decision uses (extra estimator columns are ignored)
pub const NUM_BANDS: usize = 256;

/// Alignment frames the estimator adds at each time edge
pub const PAD_FRAMES: usize = 4;

/// Per-frame, per-band hearing thresholds in dB SPL.
///
/// Stored as the estimator writes it: one row per analysis frame (including
/// the padding frames), one column per band. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSurface {
    table: Table,
}

impl ThresholdSurface {
    /// Wrap a parsed table, rejecting surfaces the mask cannot use
    pub fn from_table(table: Table) -> Result<Self> {
        if table.is_empty() {
            return Err(DompteurError::threshold("threshold surface is empty"));
        }
        if table.cols() < NUM_BANDS {
            return Err(DompteurError::threshold(format!(
                "threshold surface has {} bands, need at least {}",
                table.cols(),
                NUM_BANDS
            )));
        }
        if table.rows() <= 2 * PAD_FRAMES {
            return Err(DompteurError::threshold(format!(
                "threshold surface has {} frames, need more than {} padding frames",
                table.rows(),
                2 * PAD_FRAMES
            )));
        }
        Ok(Self { table })
    }

    /// Build a surface from a function of (frame, band), mainly for synthetic
    /// surfaces. `num_frames` includes the padding frames.
    pub fn from_fn<F>(num_frames: usize, num_bands: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut values = Vec::with_capacity(num_frames * num_bands);
        for frame in 0..num_frames {
            for band in 0..num_bands {
                values.push(f(frame, band));
            }
        }
        Self::from_table(Table::new(num_frames, num_bands, values)?)
    }

    /// Parse estimator CSV text
    pub fn parse(text: &str) -> Result<Self> {
        let table = Table::parse(text).map_err(|e| DompteurError::threshold(e.to_string()))?;
        Self::from_table(table)
    }

    /// Read an estimator CSV file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let table = Table::read(path)
            .map_err(|e| DompteurError::threshold(format!("{}: {}", path.display(), e)))?;
        Self::from_table(table)
    }

    /// Atomically write in the estimator's CSV layout
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.table.write(path)
    }

    pub fn to_csv(&self) -> String {
        self.table.to_csv()
    }

    /// Frames including padding
    pub fn num_frames(&self) -> usize {
        self.table.rows()
    }

    pub fn num_bands(&self) -> usize {
        self.table.cols()
    }

    #[inline]
    pub fn get(&self, frame: usize, band: usize) -> f64 {
        self.table.get(frame, band)
    }

    /// View with the padding trimmed and the first `NUM_BANDS` bands kept,
    /// addressed by (band, frame). Fails unless the trimmed frame count is
    /// `expected_frames`.
    pub fn aligned(&self, expected_frames: usize) -> Result<AlignedSurface<'_>> {
        let usable = self.num_frames() - 2 * PAD_FRAMES;
        if usable != expected_frames {
            return Err(DompteurError::shape(format!(
                "threshold surface covers {} frames after trimming {} padding frames per edge, spectrum has {}",
                usable, PAD_FRAMES, expected_frames
            )));
        }
        Ok(AlignedSurface {
            surface: self,
            num_frames: usable,
        })
    }
}

/// Trimmed, transposed view of a `ThresholdSurface`
#[derive(Debug, Clone, Copy)]
pub struct AlignedSurface<'a> {
    surface: &'a ThresholdSurface,
    num_frames: usize,
}

impl AlignedSurface<'_> {
    pub fn num_bands(&self) -> usize {
        NUM_BANDS
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    #[inline]
    pub fn get(&self, band: usize, frame: usize) -> f64 {
        self.surface.get(frame + PAD_FRAMES, band)
    }
}
