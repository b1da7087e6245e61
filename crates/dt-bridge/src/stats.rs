//! Signal summaries for the protocol logs

use std::fmt;

/// Sample positions reported when the signal is long enough
pub const PROBE_INDICES: [usize; 3] = [1000, 10000, 20000];

#[derive(Debug, Clone, PartialEq)]
pub struct SignalStats {
    pub len: usize,
    pub min: f64,
    pub max: f64,
    pub mean_abs: f64,
    /// `(index, value)` for every probe index inside the signal
    pub probes: Vec<(usize, f64)>,
}

impl SignalStats {
    pub fn from_slice(signal: &[f64]) -> Self {
        let (min, max) = signal
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let mean_abs = if signal.is_empty() {
            0.0
        } else {
            signal.iter().map(|x| x.abs()).sum::<f64>() / signal.len() as f64
        };
        let probes = PROBE_INDICES
            .iter()
            .filter_map(|&i| signal.get(i).map(|&v| (i, v)))
            .collect();

        Self {
            len: signal.len(),
            min,
            max,
            mean_abs,
            probes,
        }
    }
}

impl fmt::Display for SignalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len == 0 {
            return write!(f, "empty");
        }
        write!(
            f,
            "n={} min={} max={} mean|x|={}",
            self.len, self.min, self.max, self.mean_abs
        )?;
        for (i, v) in &self.probes {
            write!(f, " [{}]={}", i, v)?;
        }
        Ok(())
    }
}

/// Log a summary of `signal` under `label` at debug level
pub fn log_signal(label: &str, signal: &[f64]) {
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("{}: {}", label, SignalStats::from_slice(signal));
    }
}
