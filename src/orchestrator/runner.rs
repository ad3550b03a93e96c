//! Plain runner: one engine invocation per configuration file.

use super::invoke;
use crate::engine::EngineLauncher;
use crate::model::{Phase, PipelineEvent, RunTargets};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Per-file outcome of a plain run.
#[derive(Debug, Default)]
pub(crate) struct RunReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Resolve the configuration files to run.
///
/// A directory yields its regular files sorted by file name, so reports do
/// not depend on the platform's listing order.
pub(crate) async fn discover_targets(targets: &RunTargets) -> Result<Vec<PathBuf>> {
    match targets {
        RunTargets::List { dir, files } => Ok(files.iter().map(|f| dir.join(f)).collect()),
        RunTargets::Directory(dir) => {
            let mut entries = tokio::fs::read_dir(dir)
                .await
                .with_context(|| format!("read directory {}", dir.display()))?;
            let mut files = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("read directory {}", dir.display()))?
            {
                let path = entry.path();
                let meta = tokio::fs::metadata(&path)
                    .await
                    .with_context(|| format!("stat {}", path.display()))?;
                if meta.is_file() {
                    files.push(path);
                }
            }
            files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            Ok(files)
        }
    }
}

/// Invoke the engine once per file, in order.
///
/// A non-zero exit is recorded and the loop moves on; only a spawn failure
/// stops the run.
pub(crate) async fn run_all<L: EngineLauncher>(
    launcher: &L,
    files: &[PathBuf],
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    for file in files {
        let outcome = invoke(launcher, file, Phase::Run, event_tx).await?;
        if outcome.success {
            report.succeeded.push(file.clone());
        } else {
            warn!(config = %file.display(), code = ?outcome.code, "engine run failed");
            report.failed.push(file.clone());
        }
    }
    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "run finished"
    );
    Ok(report)
}
