//! Stage orchestration on top of the engine capability.
//!
//! The runner invokes the engine once per configuration; the aggregator warms
//! it up, repeats each target and concatenates the result files. Both are
//! strictly sequential: a result file is only read after the invocation that
//! wrote it has exited.

mod aggregator;
mod runner;

pub(crate) use aggregator::{aggregate, AggregateReport, TargetOutcome};
pub(crate) use runner::{discover_targets, run_all, RunReport};

use crate::engine::EngineLauncher;
use crate::error::BenchError;
use crate::model::{ExitOutcome, Phase, PipelineEvent};
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Run the engine once, bracketing the call with start/finish events.
async fn invoke<L: EngineLauncher>(
    launcher: &L,
    config: &Path,
    phase: Phase,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<ExitOutcome, BenchError> {
    let _ = event_tx.send(PipelineEvent::InvocationStarted {
        config: config.to_path_buf(),
        phase,
    });
    let started = Instant::now();
    let outcome = launcher.launch(config).await?;
    let _ = event_tx.send(PipelineEvent::InvocationFinished {
        config: config.to_path_buf(),
        phase,
        outcome,
        elapsed: started.elapsed(),
    });
    Ok(outcome)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stand-in for the engine executable.

    use super::*;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// What one scripted invocation does before exiting.
    #[derive(Debug, Clone)]
    pub(crate) enum Step {
        /// Write `contents` to `path` (if given), then exit with `code`.
        Exit {
            code: i32,
            write: Option<(PathBuf, String)>,
        },
        /// Fail to start, as a missing executable would.
        SpawnError,
    }

    impl Step {
        pub fn ok() -> Self {
            Step::Exit {
                code: 0,
                write: None,
            }
        }

        pub fn ok_writing(path: &Path, contents: &str) -> Self {
            Step::Exit {
                code: 0,
                write: Some((path.to_path_buf(), contents.to_string())),
            }
        }

        pub fn fail(code: i32) -> Self {
            Step::Exit { code, write: None }
        }
    }

    /// Plays back steps in order; once the script runs out every call succeeds.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedLauncher {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl ScriptedLauncher {
        pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into_iter().collect()),
                calls: Mutex::default(),
            }
        }

        pub fn calls(&self) -> Vec<PathBuf> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl EngineLauncher for ScriptedLauncher {
        async fn launch(&self, config: &Path) -> Result<ExitOutcome, BenchError> {
            self.calls.lock().unwrap().push(config.to_path_buf());
            let step = self.steps.lock().unwrap().pop_front().unwrap_or_else(Step::ok);
            match step {
                Step::Exit { code, write } => {
                    if let Some((path, contents)) = write {
                        std::fs::write(path, contents).unwrap();
                    }
                    Ok(ExitOutcome::from_code(code))
                }
                Step::SpawnError => Err(BenchError::Spawn {
                    executable: PathBuf::from("engine"),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
            }
        }
    }
}
