//! The external engine executable, seen as a single capability: run it against
//! one configuration file and report how it exited.

use crate::error::BenchError;
use crate::model::ExitOutcome;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

pub(crate) trait EngineLauncher {
    /// Run the engine with `config` as its sole argument and wait for it to exit.
    ///
    /// `Err` means the process could not be started; a non-zero exit is an `Ok`
    /// outcome with `success == false`.
    fn launch(&self, config: &Path) -> impl Future<Output = Result<ExitOutcome, BenchError>> + Send;
}

/// Launches the engine as a child process with inherited stdio and no timeout.
#[derive(Debug, Clone)]
pub(crate) struct ProcessLauncher {
    executable: PathBuf,
}

impl ProcessLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl EngineLauncher for ProcessLauncher {
    async fn launch(&self, config: &Path) -> Result<ExitOutcome, BenchError> {
        debug!(executable = %self.executable.display(), config = %config.display(), "spawning engine");
        let status = Command::new(&self.executable)
            .arg(config)
            .status()
            .await
            .map_err(|source| BenchError::Spawn {
                executable: self.executable.clone(),
                source,
            })?;
        debug!(?status, "engine exited");
        Ok(ExitOutcome::from(status))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_exit_status() {
        let ok = ProcessLauncher::new("true");
        let outcome = ok.launch(Path::new("ignored.json")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.code, Some(0));

        let failing = ProcessLauncher::new("false");
        let outcome = failing.launch(Path::new("ignored.json")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.code, Some(1));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let launcher = ProcessLauncher::new("/nonexistent/engine-binary");
        let err = launcher.launch(Path::new("a.json")).await.unwrap_err();
        assert!(matches!(err, BenchError::Spawn { .. }));
        assert!(err.is_fatal());
    }
}
