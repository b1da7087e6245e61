//! 16 kHz mono 16-bit PCM I/O
//!
//! Samples are carried as `f64` values in the integer range of `i16`, the
//! scale the masking filter and the threshold estimator both operate in.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::{DompteurError, Result, SAMPLE_RATE, persist};

/// Integer full scale used when converting normalized samples
const FULL_SCALE: f64 = 32767.0;

/// Quantize one sample to 16-bit PCM (round half to even, saturating)
#[inline]
pub fn to_pcm16(sample: f64) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    sample
        .round_ties_even()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Quantize a buffer, keeping the `f64` representation
pub fn quantize(samples: &[f64]) -> Vec<f64> {
    samples.iter().map(|&s| to_pcm16(s) as f64).collect()
}

fn pcm16_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Read a 16 kHz mono 16-bit file.
///
/// Samples are first normalized by 2^15 and then rescaled to the integer
/// range by 32767 with rounding, which is how waveforms entered the filter
/// when the threshold surfaces were originally produced.
pub fn read_pcm16<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(DompteurError::Format(format!(
            "{}: expected mono, got {} channels",
            path.display(),
            spec.channels
        )));
    }
    if spec.sample_rate != SAMPLE_RATE {
        return Err(DompteurError::Format(format!(
            "{}: expected {} Hz, got {} Hz",
            path.display(),
            SAMPLE_RATE,
            spec.sample_rate
        )));
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(DompteurError::Format(format!(
            "{}: expected 16-bit integer PCM, got {} bit {:?}",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .map(|s| s.map(|v| (v as f64 / 32768.0 * FULL_SCALE).round_ties_even()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    log::debug!("read {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Atomically write samples as a 16 kHz mono 16-bit file
pub fn write_pcm16<P: AsRef<Path>>(path: P, samples: &[f64]) -> Result<()> {
    let path = path.as_ref();
    let mut tmp = persist::sibling_temp(path)?;
    {
        let mut writer = hound::WavWriter::new(BufWriter::new(tmp.as_file_mut()), pcm16_spec())?;
        for &sample in samples {
            writer.write_sample(to_pcm16(sample))?;
        }
        writer.finalize()?;
    }
    tmp.flush()?;
    persist::commit(tmp, path)
}
