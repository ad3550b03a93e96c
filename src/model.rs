use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::str::FromStr;
use std::time::Duration;

/// Rendering backend selected by the engine's rendering system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Renderer {
    #[value(name = "DirectX")]
    DirectX,
    #[value(name = "OpenGL")]
    OpenGL,
    #[value(name = "Vulkan")]
    Vulkan,
}

impl Renderer {
    pub fn as_str(self) -> &'static str {
        match self {
            Renderer::DirectX => "DirectX",
            Renderer::OpenGL => "OpenGL",
            Renderer::Vulkan => "Vulkan",
        }
    }
}

impl fmt::Display for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named model template. `model` is written into documents verbatim and is
/// resolved by the engine relative to the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefab {
    pub name: String,
    pub model: String,
}

impl FromStr for Prefab {
    type Err = String;

    /// Parse `NAME=MODEL_PATH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, model) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=MODEL_PATH, got `{s}`"))?;
        let name = name.trim();
        let model = model.trim();
        if name.is_empty() || model.is_empty() {
            return Err(format!("expected NAME=MODEL_PATH, got `{s}`"));
        }
        Ok(Prefab {
            name: name.to_string(),
            model: model.to_string(),
        })
    }
}

/// Behaviour applied by the engine's experiment system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExperimentKind {
    /// Objects placed on concentric rings, alternating rings orbit in opposite directions.
    DynamicOrbit {
        rotation_speed: f32,
        radiuses: Vec<f32>,
    },
    /// Objects laid out on a static grid, filling rows then layers.
    StaticGrid {
        distance_delta: f32,
        elements_per_row: usize,
    },
}

impl ExperimentKind {
    /// 1-based index, matching the engine's `Experiment<N>System` numbering.
    pub fn index(&self) -> u8 {
        match self {
            ExperimentKind::DynamicOrbit { .. } => 1,
            ExperimentKind::StaticGrid { .. } => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExperimentKind::DynamicOrbit { .. } => "dynamic orbit",
            ExperimentKind::StaticGrid { .. } => "static grid",
        }
    }
}

/// One experiment kind together with the instance counts swept for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub kind: ExperimentKind,
    pub counts: Vec<usize>,
}

/// Shape of the generated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// Flat entity list: models, camera, render-method tag and stats entity.
    Entities,
    /// Prefabs, camera entity and experiment/stats/rendering systems.
    Config,
}

impl OutputShape {
    pub fn file_prefix(self) -> &'static str {
        match self {
            OutputShape::Entities => "entities",
            OutputShape::Config => "config",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub shape: OutputShape,
    pub output_dir: PathBuf,
    /// Directory of the engine's result files, relative to `output_dir`.
    pub stats_dir: String,
    pub renderers: Vec<Renderer>,
    pub prefabs: Vec<Prefab>,
    /// Instance counts for the entities shape.
    #[serde(default)]
    pub counts: Vec<usize>,
    /// Experiment kinds for the config shape, each with its own counts.
    #[serde(default)]
    pub experiments: Vec<ExperimentPlan>,
    #[serde(with = "humantime_serde")]
    pub experiment_time: Duration,
    /// Bare system typenames placed in every config-shape template.
    #[serde(default)]
    pub default_systems: Vec<String>,
}

/// One tuple of the cartesian product.
#[derive(Debug, Clone, Copy)]
pub struct SweepPoint<'a> {
    pub renderer: Renderer,
    pub prefab: &'a Prefab,
    pub count: usize,
    /// Absent for the entities shape.
    pub experiment: Option<&'a ExperimentPlan>,
}

impl SweepPoint<'_> {
    /// Name fragment shared by the configuration file and its result file.
    pub fn key(&self) -> String {
        let mut key = format!("{}_{}_{}", self.renderer, self.prefab.name, self.count);
        if let Some(plan) = self.experiment {
            key.push('_');
            key.push_str(&plan.kind.index().to_string());
        }
        key
    }
}

impl SweepConfig {
    /// Reject axes that would make two tuples share a file name.
    pub fn validate(&self) -> Result<(), BenchError> {
        let invalid = |msg: String| Err(BenchError::InvalidSweep(msg));

        if self.renderers.is_empty() {
            return invalid("no renderers configured".into());
        }
        if self.prefabs.is_empty() {
            return invalid("no prefabs configured".into());
        }
        if !all_distinct(self.renderers.iter()) {
            return invalid("duplicate renderer".into());
        }
        for prefab in &self.prefabs {
            if prefab.name.is_empty()
                || prefab
                    .name
                    .chars()
                    .any(|c| matches!(c, '_' | '/' | '\\' | '.'))
            {
                return invalid(format!(
                    "prefab name `{}` must be non-empty and free of `_`, `/`, `\\` and `.`",
                    prefab.name
                ));
            }
        }
        if !all_distinct(self.prefabs.iter().map(|p| &p.name)) {
            return invalid("duplicate prefab name".into());
        }

        match self.shape {
            OutputShape::Entities => {
                if self.counts.is_empty() {
                    return invalid("no instance counts configured".into());
                }
                if !all_distinct(self.counts.iter()) {
                    return invalid("duplicate instance count".into());
                }
            }
            OutputShape::Config => {
                if self.experiments.is_empty() {
                    return invalid("no experiments configured".into());
                }
                if !all_distinct(self.experiments.iter().map(|e| e.kind.index())) {
                    return invalid("duplicate experiment kind".into());
                }
                for plan in &self.experiments {
                    if plan.counts.is_empty() {
                        return invalid(format!("no instance counts for {}", plan.kind.label()));
                    }
                    if !all_distinct(plan.counts.iter()) {
                        return invalid(format!(
                            "duplicate instance count for {}",
                            plan.kind.label()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Enumerate every tuple in a fixed order: prefab, renderer, experiment, count.
    pub fn points(&self) -> Vec<SweepPoint<'_>> {
        let mut points = Vec::new();
        for prefab in &self.prefabs {
            for &renderer in &self.renderers {
                match self.shape {
                    OutputShape::Entities => {
                        for &count in &self.counts {
                            points.push(SweepPoint {
                                renderer,
                                prefab,
                                count,
                                experiment: None,
                            });
                        }
                    }
                    OutputShape::Config => {
                        for plan in &self.experiments {
                            for &count in &plan.counts {
                                points.push(SweepPoint {
                                    renderer,
                                    prefab,
                                    count,
                                    experiment: Some(plan),
                                });
                            }
                        }
                    }
                }
            }
        }
        points
    }
}

fn all_distinct<T: std::hash::Hash + Eq>(items: impl Iterator<Item = T>) -> bool {
    let mut seen = HashSet::new();
    items.into_iter().all(|item| seen.insert(item))
}

/// Which configuration files the plain runner invokes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTargets {
    /// Every regular file in the directory, sorted by file name.
    Directory(PathBuf),
    /// The listed files inside `dir`, in the given order.
    List { dir: PathBuf, files: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub executable: PathBuf,
    pub targets: RunTargets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub executable: PathBuf,
    pub config_dir: PathBuf,
    pub targets: Vec<String>,
    pub repeats: usize,
    pub warmup_runs: usize,
    pub warmup_file: String,
    #[serde(default = "default_combined_suffix")]
    pub combined_suffix: String,
}

pub fn default_combined_suffix() -> String {
    "_all".to_string()
}

/// Contents of a `--plan` file. Each stage reads its own section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sweep: Option<SweepConfig>,
    #[serde(default)]
    pub run: Option<RunnerConfig>,
    #[serde(default)]
    pub aggregate: Option<AggregateConfig>,
}

/// How an engine invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    #[cfg(test)]
    pub fn from_code(code: i32) -> Self {
        Self {
            success: code == 0,
            code: Some(code),
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Position of an invocation within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Run,
    Warmup { iteration: usize, total: usize },
    Repeat { iteration: usize, total: usize },
}

impl Phase {
    fn suffix(self) -> String {
        match self {
            Phase::Run => String::new(),
            Phase::Warmup { iteration, total } => format!(" [warmup {iteration}/{total}]"),
            Phase::Repeat { iteration, total } => format!(" [repeat {iteration}/{total}]"),
        }
    }
}

/// Progress events emitted by the stages and rendered by the CLI.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ConfigWritten {
        path: PathBuf,
    },
    InvocationStarted {
        config: PathBuf,
        phase: Phase,
    },
    InvocationFinished {
        config: PathBuf,
        phase: Phase,
        outcome: ExitOutcome,
        elapsed: Duration,
    },
    ResultMissing {
        config: PathBuf,
        result: PathBuf,
        reason: String,
    },
    TargetFailed {
        config: PathBuf,
        reason: String,
    },
    CombinedWritten {
        path: PathBuf,
        blocks: usize,
    },
    Info(String),
}

impl PipelineEvent {
    /// Render a human-readable status line.
    pub fn to_message(&self) -> String {
        match self {
            PipelineEvent::ConfigWritten { path } => {
                format!("Generated config file: {}", path.display())
            }
            PipelineEvent::InvocationStarted { config, phase } => {
                format!("Running {}{}", config.display(), phase.suffix())
            }
            PipelineEvent::InvocationFinished {
                config,
                phase,
                outcome,
                elapsed,
            } => {
                let phase = phase.suffix();
                let elapsed = humantime::format_duration(round_millis(*elapsed));
                if outcome.success {
                    format!("Finished running {}{phase} ({elapsed})", config.display())
                } else {
                    let code = outcome
                        .code
                        .map(|c| format!("exit code {c}"))
                        .unwrap_or_else(|| "terminated by signal".into());
                    format!(
                        "Error running {}{phase} ({code}, {elapsed})",
                        config.display()
                    )
                }
            }
            PipelineEvent::ResultMissing {
                config,
                result,
                reason,
            } => format!(
                "Result file {} missing after running {}: {reason}",
                result.display(),
                config.display()
            ),
            PipelineEvent::TargetFailed { config, reason } => {
                format!("Skipping {}: {reason}", config.display())
            }
            PipelineEvent::CombinedWritten { path, blocks } => {
                format!("Wrote {} ({blocks} runs)", path.display())
            }
            PipelineEvent::Info(msg) => msg.clone(),
        }
    }
}

fn round_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(shape: OutputShape) -> SweepConfig {
        SweepConfig {
            shape,
            output_dir: PathBuf::from("out"),
            stats_dir: "../Stats".into(),
            renderers: vec![Renderer::OpenGL],
            prefabs: vec!["Cube=cube.obj".parse().unwrap()],
            counts: vec![0, 5],
            experiments: vec![ExperimentPlan {
                kind: ExperimentKind::StaticGrid {
                    distance_delta: 3.0,
                    elements_per_row: 20,
                },
                counts: vec![100],
            }],
            experiment_time: Duration::from_secs(30),
            default_systems: Vec::new(),
        }
    }

    #[test]
    fn prefab_parses_name_and_model() {
        let prefab: Prefab = "Bunny=../Resources/bunny/bunny.obj".parse().unwrap();
        assert_eq!(prefab.name, "Bunny");
        assert_eq!(prefab.model, "../Resources/bunny/bunny.obj");
        assert!("Bunny".parse::<Prefab>().is_err());
        assert!("=model.obj".parse::<Prefab>().is_err());
    }

    #[test]
    fn points_follow_shape() {
        let entities = sweep(OutputShape::Entities);
        let keys: Vec<String> = entities.points().iter().map(|p| p.key()).collect();
        assert_eq!(keys, vec!["OpenGL_Cube_0", "OpenGL_Cube_5"]);

        let config = sweep(OutputShape::Config);
        let keys: Vec<String> = config.points().iter().map(|p| p.key()).collect();
        assert_eq!(keys, vec!["OpenGL_Cube_100_2"]);
    }

    #[test]
    fn validate_rejects_ambiguous_names() {
        let mut cfg = sweep(OutputShape::Entities);
        assert!(cfg.validate().is_ok());

        cfg.prefabs.push("Cube=other.obj".parse().unwrap());
        assert!(matches!(cfg.validate(), Err(BenchError::InvalidSweep(_))));

        let mut cfg = sweep(OutputShape::Entities);
        cfg.prefabs = vec!["Big_Cube=cube.obj".parse().unwrap()];
        assert!(cfg.validate().is_err());

        let mut cfg = sweep(OutputShape::Entities);
        cfg.counts = vec![5, 5];
        assert!(cfg.validate().is_err());

        let mut cfg = sweep(OutputShape::Config);
        cfg.experiments.push(cfg.experiments[0].clone());
        assert!(cfg.validate().is_err());

        let mut cfg = sweep(OutputShape::Config);
        cfg.renderers.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_axes() {
        let mut cfg = sweep(OutputShape::Entities);
        cfg.counts.clear();
        assert!(matches!(cfg.validate(), Err(BenchError::InvalidSweep(_))));
        // Experiments only matter for the config shape.
        cfg.counts = vec![0];
        cfg.experiments.clear();
        assert!(cfg.validate().is_ok());

        let mut cfg = sweep(OutputShape::Config);
        cfg.experiments.clear();
        assert!(matches!(cfg.validate(), Err(BenchError::InvalidSweep(_))));

        let mut cfg = sweep(OutputShape::Config);
        cfg.experiments[0].counts.clear();
        assert!(matches!(cfg.validate(), Err(BenchError::InvalidSweep(_))));

        let mut cfg = sweep(OutputShape::Config);
        cfg.counts.clear();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn plan_file_round_trips_durations() {
        let plan = PipelineConfig {
            sweep: Some(sweep(OutputShape::Config)),
            ..Default::default()
        };
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"experiment_time\":\"30s\""));
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        let back = back.sweep.unwrap();
        assert_eq!(back.experiment_time, Duration::from_secs(30));
        assert_eq!(back.experiments, plan.sweep.unwrap().experiments);
    }

    #[test]
    fn started_message_names_phase() {
        let ev = PipelineEvent::InvocationStarted {
            config: PathBuf::from("a.json"),
            phase: Phase::Warmup {
                iteration: 2,
                total: 5,
            },
        };
        assert_eq!(ev.to_message(), "Running a.json [warmup 2/5]");
    }

    #[test]
    fn finished_message_reports_exit_code() {
        let ev = PipelineEvent::InvocationFinished {
            config: PathBuf::from("a.json"),
            phase: Phase::Run,
            outcome: ExitOutcome::from_code(3),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(ev.to_message(), "Error running a.json (exit code 3, 1s 500ms)");
    }
}
