//! Repeated runs with result-file concatenation.

use super::invoke;
use crate::engine::EngineLauncher;
use crate::error::BenchError;
use crate::generator::declared_result_path;
use crate::model::{AggregateConfig, Phase, PipelineEvent};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Separator appended after every collected result block.
const BLOCK_SEPARATOR: &str = "\n\n";

/// What happened to one target configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TargetOutcome {
    pub config: PathBuf,
    /// `None` when the target was skipped before or while writing.
    pub combined: Option<PathBuf>,
    pub succeeded: usize,
    pub failed: usize,
    pub missing: usize,
}

#[derive(Debug, Default)]
pub(crate) struct AggregateReport {
    pub warmup_failures: usize,
    pub targets: Vec<TargetOutcome>,
}

/// `stats_X.txt` -> `stats_X<suffix>.txt`; without an extension the suffix is appended.
pub(crate) fn combined_path(result: &Path, suffix: &str) -> PathBuf {
    let stem = result
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match result.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    result.with_file_name(name)
}

/// Read `config` and resolve its declared result file against the
/// configuration's own directory, as the engine does.
pub(crate) async fn resolve_result_path(config: &Path) -> Result<PathBuf, BenchError> {
    let bytes = tokio::fs::read(config).await.map_err(|source| BenchError::Io {
        path: config.to_path_buf(),
        source,
    })?;
    let doc: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|source| BenchError::Document {
            path: config.to_path_buf(),
            source,
        })?;
    let declared = declared_result_path(&doc).ok_or_else(|| BenchError::NoResultPath {
        config: config.to_path_buf(),
    })?;
    let base = config.parent().unwrap_or_else(|| Path::new(""));
    Ok(base.join(declared))
}

/// Warm up, then repeat every target and write one combined file per target.
///
/// Per-target problems are reported and the next target proceeds; a spawn
/// failure anywhere aborts the stage.
pub(crate) async fn aggregate<L: EngineLauncher>(
    cfg: &AggregateConfig,
    launcher: &L,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<AggregateReport> {
    let mut report = AggregateReport {
        warmup_failures: warmup(cfg, launcher, event_tx).await?,
        ..Default::default()
    };

    for target in &cfg.targets {
        let config = cfg.config_dir.join(target);
        match replicate(cfg, launcher, &config, event_tx).await {
            Ok(outcome) => report.targets.push(outcome),
            Err(TargetError { error, .. }) if error.is_fatal() => return Err(error.into()),
            Err(TargetError { outcome, error }) => {
                warn!(config = %config.display(), %error, "target skipped");
                let _ = event_tx.send(PipelineEvent::TargetFailed {
                    config: config.clone(),
                    reason: error.to_string(),
                });
                report.targets.push(outcome);
            }
        }
    }

    info!(targets = report.targets.len(), "aggregation finished");
    Ok(report)
}

/// Discarded runs against the warmup configuration. Returns how many failed.
async fn warmup<L: EngineLauncher>(
    cfg: &AggregateConfig,
    launcher: &L,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<usize, BenchError> {
    let config = cfg.config_dir.join(&cfg.warmup_file);
    let mut failures = 0;
    for i in 0..cfg.warmup_runs {
        let phase = Phase::Warmup {
            iteration: i + 1,
            total: cfg.warmup_runs,
        };
        if !invoke(launcher, &config, phase, event_tx).await?.success {
            failures += 1;
        }
    }
    Ok(failures)
}

/// Why a target ended early, with what it had collected so far.
struct TargetError {
    outcome: TargetOutcome,
    error: BenchError,
}

async fn replicate<L: EngineLauncher>(
    cfg: &AggregateConfig,
    launcher: &L,
    config: &Path,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<TargetOutcome, TargetError> {
    let mut outcome = TargetOutcome {
        config: config.to_path_buf(),
        ..Default::default()
    };

    let result = match resolve_result_path(config).await {
        Ok(p) => p,
        Err(error) => return Err(TargetError { outcome, error }),
    };
    debug!(config = %config.display(), result = %result.display(), "resolved result file");
    let _ = event_tx.send(PipelineEvent::Info(format!(
        "Measuring {} ({} repeats) -> {}",
        config.display(),
        cfg.repeats,
        result.display()
    )));

    let mut combined = String::new();
    for i in 0..cfg.repeats {
        let phase = Phase::Repeat {
            iteration: i + 1,
            total: cfg.repeats,
        };
        // A zero exit only counts if this run wrote the file.
        if let Err(source) = tokio::fs::remove_file(&result).await {
            if source.kind() != std::io::ErrorKind::NotFound {
                let error = BenchError::Io {
                    path: result.clone(),
                    source,
                };
                return Err(TargetError { outcome, error });
            }
        }
        let status = match invoke(launcher, config, phase, event_tx).await {
            Ok(status) => status,
            Err(error) => return Err(TargetError { outcome, error }),
        };
        if !status.success {
            outcome.failed += 1;
            continue;
        }
        match tokio::fs::read_to_string(&result).await {
            Ok(contents) => {
                combined.push_str(&contents);
                combined.push_str(BLOCK_SEPARATOR);
                outcome.succeeded += 1;
            }
            Err(source) => {
                let e = BenchError::ResultMissing {
                    path: result.clone(),
                    source,
                };
                warn!(config = %config.display(), error = %e, "result file missing after success");
                let _ = event_tx.send(PipelineEvent::ResultMissing {
                    config: config.to_path_buf(),
                    result: result.clone(),
                    reason: e.to_string(),
                });
                outcome.missing += 1;
            }
        }
    }

    let path = combined_path(&result, &cfg.combined_suffix);
    if let Err(source) = tokio::fs::write(&path, combined).await {
        let error = BenchError::Io { path, source };
        return Err(TargetError { outcome, error });
    }
    let _ = event_tx.send(PipelineEvent::CombinedWritten {
        path: path.clone(),
        blocks: outcome.succeeded,
    });
    outcome.combined = Some(path);
    Ok(outcome)
}
