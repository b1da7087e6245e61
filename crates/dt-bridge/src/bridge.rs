//! Cross-process gradient protocol
//!
//! The optimizer calls `propagate` on the forward pass and `backprop` on the
//! backward pass, each time with files it owns and the utterance identifier
//! that ties the two calls (and the cached thresholds) together. Results are
//! written back over the input files, reshaped to the shape they arrived in.

use std::path::Path;

use dt_core::{DompteurConfig, DompteurError, FilterMode, Result, wav};
use dt_psycho::MaskedFilter;

use crate::exchange::{ArrayData, read_array, write_array};
use crate::stats::log_signal;

#[derive(Debug)]
pub struct GradientBridge {
    filter: MaskedFilter,
}

impl GradientBridge {
    pub fn new(filter: MaskedFilter) -> Self {
        Self { filter }
    }

    pub fn from_config(config: &DompteurConfig) -> Result<Self> {
        Ok(Self::new(MaskedFilter::from_config(config)?))
    }

    pub fn filter(&self) -> &MaskedFilter {
        &self.filter
    }

    /// Filter the array in `data_file` and overwrite it with the result.
    ///
    /// With φ present, the first call for `id` computes its thresholds from
    /// the data rounded to 16-bit PCM.
    pub fn propagate(&self, data_file: &Path, id: &str, mode: FilterMode) -> Result<ArrayData> {
        log::info!("propagate {} (id {}, φ {})", data_file.display(), id, mode);

        let data = read_array(data_file)?;
        log_signal("data in", data.data());

        if !mode.is_identity() && data.is_empty() {
            return Err(DompteurError::shape(format!(
                "{} holds no samples to filter",
                data_file.display()
            )));
        }
        if !mode.is_identity() && !self.filter.cache().contains(id) {
            let waveform = wav::quantize(data.data());
            self.filter.cache().get_or_compute(id, &waveform)?;
        }

        let output = self.filter.forward(data.data(), id, mode)?;
        log_signal("data out", &output);

        let output = data.with_data(output)?;
        write_array(data_file, &output)?;
        Ok(output)
    }

    /// Map the gradient in `grad_file` through the filter at the point stored
    /// in `data_in_file` and overwrite `grad_file` with the result.
    ///
    /// `data_out_file` only feeds the diagnostics. With φ present the
    /// thresholds for `id` must already be cached by a previous `propagate`.
    pub fn backprop(
        &self,
        data_in_file: &Path,
        data_out_file: &Path,
        grad_file: &Path,
        id: &str,
        mode: FilterMode,
    ) -> Result<ArrayData> {
        log::info!("backprop {} (id {}, φ {})", grad_file.display(), id, mode);

        let data_in = read_array(data_in_file)?;
        let grad = read_array(grad_file)?;
        log_signal("gradient in", grad.data());

        match read_array(data_out_file) {
            Ok(data_out) => log_signal("data out", data_out.data()),
            Err(e) => log::warn!("ignoring unreadable {}: {}", data_out_file.display(), e),
        }

        if data_in.len() != grad.len() {
            return Err(DompteurError::shape(format!(
                "data {:?} has {} values, gradient {:?} has {}",
                data_in.shape(),
                data_in.len(),
                grad.shape(),
                grad.len()
            )));
        }

        if !mode.is_identity() && !self.filter.cache().contains(id) {
            return Err(DompteurError::threshold(format!(
                "missing entry for id {}: propagate must run before backprop",
                id
            )));
        }

        let grad_in = self.filter.backward(grad.data(), data_in.data(), id, mode)?;
        log_signal("gradient out", &grad_in);

        let grad_in = grad.with_data(grad_in)?;
        write_array(grad_file, &grad_in)?;
        Ok(grad_in)
    }
}
