//! Dompteur command line
//!
//! Usage:
//!   dompteur propagate  --data-file F --threshs-file-id ID
//!   dompteur backprop   --data-in-file F --data-out-file F --grad-file F --threshs-file-id ID
//!   dompteur preprocess --encoding-dir DIR
//!   dompteur thresholds --wav F [--out F]
//!
//! φ comes from `--phi` or the `PHI` environment variable (`None` disables
//! filtering), the preprocessing job count from `--numjobs` or `NUMJOBS`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use dt_bridge::{BatchPreprocessor, GradientBridge};
use dt_core::{DompteurConfig, FilterMode};
use dt_psycho::ThresholdCache;

#[derive(Parser)]
#[command(name = "dompteur", version, about = "Psychoacoustic masking filter with a file-based gradient protocol")]
struct Cli {
    /// JSON configuration file; flags and environment override its values
    #[arg(long, global = true, env = "DOMPTEUR_CONFIG")]
    config: Option<PathBuf>,

    /// Filter strength in dB, or `None` for the identity
    #[arg(long, global = true, env = "PHI", allow_negative_numbers = true)]
    phi: Option<FilterMode>,

    /// Directory of cached threshold surfaces
    #[arg(long, global = true, env = "DOMPTEUR_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Threshold estimator launcher
    #[arg(long, global = true, env = "DOMPTEUR_ESTIMATOR")]
    estimator: Option<PathBuf>,

    /// Runtime directory handed to the estimator
    #[arg(long, global = true, env = "DOMPTEUR_RUNTIME")]
    runtime: Option<PathBuf>,

    /// Threads per transform call
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter an exchange file in place
    Propagate {
        #[arg(long)]
        data_file: PathBuf,
        /// Identifier shared with the matching backprop call
        #[arg(long)]
        threshs_file_id: String,
    },
    /// Map a gradient file through the filter in place
    Backprop {
        #[arg(long)]
        data_in_file: PathBuf,
        /// Forward output, only used for diagnostics
        #[arg(long)]
        data_out_file: PathBuf,
        #[arg(long)]
        grad_file: PathBuf,
        #[arg(long)]
        threshs_file_id: String,
    },
    /// Replace every waveform in a directory with its filtered version
    Preprocess {
        #[arg(long)]
        encoding_dir: PathBuf,
        /// Total job count; a third of it runs as workers
        #[arg(long, env = "NUMJOBS")]
        numjobs: Option<usize>,
        /// Write the batch report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Compute the threshold surface of one waveform
    Thresholds {
        #[arg(long)]
        wav: PathBuf,
        /// Output CSV (default: next to the waveform)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Propagate {
            data_file,
            threshs_file_id,
        } => {
            let bridge = GradientBridge::from_config(&config)?;
            bridge
                .propagate(&data_file, &threshs_file_id, config.phi)
                .with_context(|| format!("propagate failed for {}", data_file.display()))?;
        }
        Commands::Backprop {
            data_in_file,
            data_out_file,
            grad_file,
            threshs_file_id,
        } => {
            let bridge = GradientBridge::from_config(&config)?;
            bridge
                .backprop(
                    &data_in_file,
                    &data_out_file,
                    &grad_file,
                    &threshs_file_id,
                    config.phi,
                )
                .with_context(|| format!("backprop failed for {}", grad_file.display()))?;
        }
        Commands::Preprocess {
            encoding_dir,
            numjobs,
            report,
        } => {
            if let Some(numjobs) = numjobs {
                config.jobs = (numjobs / 3).max(1);
            }
            preprocess(&config, &encoding_dir, report.as_deref())?;
        }
        Commands::Thresholds { wav, out } => {
            let out = out.unwrap_or_else(|| wav.with_extension("csv"));
            let cache = ThresholdCache::from_config(&config)?;
            let surface = cache
                .compute_for_file(&wav, &out)
                .with_context(|| format!("threshold estimation failed for {}", wav.display()))?;
            log::info!(
                "wrote {} frames x {} bands to {}",
                surface.num_frames(),
                surface.num_bands(),
                out.display()
            );
        }
    }

    Ok(())
}

/// Configuration file (or defaults) with flag and environment overrides
fn load_config(cli: &Cli) -> Result<DompteurConfig> {
    let mut config = match &cli.config {
        Some(path) => DompteurConfig::load(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => DompteurConfig::default(),
    };

    if let Some(phi) = cli.phi {
        config = config.with_phi(phi);
    }
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    if let Some(program) = &cli.estimator {
        config = config.with_estimator_program(program);
    }
    if let Some(runtime) = &cli.runtime {
        config = config.with_estimator_runtime(runtime);
    }
    if let Some(threads) = cli.threads {
        config = config.with_numeric_threads(threads);
    }

    config.validate()?;
    log::debug!("configuration: {:?}", config);
    Ok(config)
}

fn preprocess(config: &DompteurConfig, dir: &Path, report_path: Option<&Path>) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let batch = BatchPreprocessor::from_config(config)?;
    let report = batch.batch_preprocess(dir)?;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("cannot write report {}", path.display()))?;
    }

    for failure in report.failures() {
        log::error!(
            "{}: {}",
            failure.path.display(),
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    if !report.is_success() {
        bail!("{} of {} files failed", report.failed, report.total());
    }
    Ok(())
}
