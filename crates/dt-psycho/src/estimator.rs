//! Hearing-threshold estimators
//!
//! Thresholds are never computed in-process. An estimator receives a 16-bit
//! PCM file inside a scratch directory it may freely write to and returns the
//! parsed surface.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use dt_core::{DompteurError, EstimatorConfig, Result};

use crate::surface::ThresholdSurface;

/// Output file the external estimator writes into its work directory
pub const ESTIMATOR_OUTPUT: &str = "data_dB.csv";

/// Produces a threshold surface for one waveform file
pub trait ThresholdEstimator: Send + Sync {
    /// `wav` lives inside `work_dir`; both are removed after the call
    fn estimate(&self, wav: &Path, work_dir: &Path) -> Result<ThresholdSurface>;
}

impl<F> ThresholdEstimator for F
where
    F: Fn(&Path, &Path) -> Result<ThresholdSurface> + Send + Sync,
{
    fn estimate(&self, wav: &Path, work_dir: &Path) -> Result<ThresholdSurface> {
        self(wav, work_dir)
    }
}

/// Runs the external estimator launcher:
///
/// ```text
/// <program> <runtime_dir> <work_dir>/wav.scp <window> <hop> <work_dir>/
/// ```
///
/// where `wav.scp` lists the single utterance as `data <wav>`. The surface is
/// read from `<work_dir>/data_dB.csv`.
#[derive(Debug, Clone)]
pub struct ExternalEstimator {
    config: EstimatorConfig,
}

impl ExternalEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Check whether the launcher exists
    pub fn is_available(&self) -> bool {
        self.config.program.is_file()
    }
}

impl Default for ExternalEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

impl ThresholdEstimator for ExternalEstimator {
    fn estimate(&self, wav: &Path, work_dir: &Path) -> Result<ThresholdSurface> {
        let scp = work_dir.join("wav.scp");
        fs::write(&scp, format!("data {}\n", wav.display()))?;

        // The launcher concatenates the output directory with file names
        let mut out_dir = work_dir.as_os_str().to_owned();
        out_dir.push("/");

        log::debug!(
            "running {} on {}",
            self.config.program.display(),
            wav.display()
        );

        let output = Command::new(&self.config.program)
            .arg(&self.config.runtime_dir)
            .arg(&scp)
            .arg(self.config.window.to_string())
            .arg(self.config.hop.to_string())
            .arg(&out_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                DompteurError::threshold(format!(
                    "cannot run {}: {}",
                    self.config.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DompteurError::threshold(format!(
                "{} exited with {}: {}",
                self.config.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let result = work_dir.join(ESTIMATOR_OUTPUT);
        if !result.is_file() {
            return Err(DompteurError::threshold(format!(
                "{} produced no {}",
                self.config.program.display(),
                ESTIMATOR_OUTPUT
            )));
        }

        ThresholdSurface::read(&result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write an executable shell script standing in for the launcher
    fn fake_launcher(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("run_calc_threshold.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn estimator(program: PathBuf) -> ExternalEstimator {
        ExternalEstimator::new(EstimatorConfig {
            program,
            runtime_dir: PathBuf::from("/opt/runtime"),
            ..EstimatorConfig::default()
        })
    }

    #[test]
    fn test_runs_launcher_with_protocol_arguments() {
        let bin = tempfile::tempdir().unwrap();
        // 10 frames of 256 bands, plus an argument log
        let launcher = fake_launcher(
            bin.path(),
            r#"echo "$1 $3 $4" > "$5args.txt"
head -n 1 "$2" > "$5scp_copy.txt"
i=0
while [ $i -lt 10 ]; do
  seq -s, 1 256 >> "$5data_dB.csv"
  i=$((i+1))
done"#,
        );

        let work = tempfile::tempdir().unwrap();
        let wav = work.path().join("utt.wav");
        fs::write(&wav, b"").unwrap();

        let surface = estimator(launcher).estimate(&wav, work.path()).unwrap();
        assert_eq!(surface.num_frames(), 10);
        assert_eq!(surface.num_bands(), 256);
        assert_eq!(surface.get(3, 255), 256.0);

        let args = fs::read_to_string(work.path().join("args.txt")).unwrap();
        assert_eq!(args.trim(), "/opt/runtime 512 256");
        let scp = fs::read_to_string(work.path().join("scp_copy.txt")).unwrap();
        assert_eq!(scp.trim(), format!("data {}", wav.display()));
    }

    #[test]
    fn test_nonzero_exit_is_an_error() {
        let bin = tempfile::tempdir().unwrap();
        let launcher = fake_launcher(bin.path(), "echo broken >&2\nexit 3");
        let work = tempfile::tempdir().unwrap();

        let err = estimator(launcher)
            .estimate(&work.path().join("x.wav"), work.path())
            .unwrap_err();
        match err {
            DompteurError::ThresholdComputation(msg) => assert!(msg.contains("broken")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_output_is_an_error() {
        let bin = tempfile::tempdir().unwrap();
        let launcher = fake_launcher(bin.path(), "exit 0");
        let work = tempfile::tempdir().unwrap();

        let err = estimator(launcher)
            .estimate(&work.path().join("x.wav"), work.path())
            .unwrap_err();
        assert!(matches!(err, DompteurError::ThresholdComputation(_)));
    }

    #[test]
    fn test_missing_program() {
        let est = estimator(PathBuf::from("/nonexistent/launcher.sh"));
        assert!(!est.is_available());
        let work = tempfile::tempdir().unwrap();
        assert!(est.estimate(&work.path().join("x.wav"), work.path()).is_err());
    }

    #[test]
    fn test_closure_estimator() {
        let est = |_: &Path, _: &Path| ThresholdSurface::from_fn(9, 256, |_, _| 0.0);
        let work = tempfile::tempdir().unwrap();
        let surface = est.estimate(&work.path().join("x.wav"), work.path()).unwrap();
        assert_eq!(surface.num_frames(), 9);
    }
}
