use crate::engine::ProcessLauncher;
use crate::model::{
    AggregateConfig, ExperimentKind, ExperimentPlan, OutputShape, PipelineConfig, PipelineEvent,
    Prefab, Renderer, RunTargets, RunnerConfig, SweepConfig,
};
use crate::text_summary::TextSummary;
use crate::{generator, orchestrator, text_summary};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (mpsc::UnboundedSender<OutputLine>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "engine-bench",
    version,
    about = "Generate, run and aggregate rendering-engine benchmark experiments"
)]
pub struct Cli {
    /// Read stage settings from a JSON plan file instead of the stage flags
    #[arg(long, global = true)]
    pub plan: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Write one configuration document per parameter tuple
    Generate(GenerateArgs),
    /// Run the engine once per configuration file
    Run(RunArgs),
    /// Warm up, repeat each target configuration and concatenate its results
    Aggregate(AggregateArgs),
}

/// Experiment kinds selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Dynamic,
    Static,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    /// Document shape to generate
    #[arg(long, value_enum, default_value = "config")]
    pub shape: OutputShape,

    /// Directory the configuration files are written to (must exist)
    #[arg(long, default_value = "Configs")]
    pub output_dir: PathBuf,

    /// Result-file directory, relative to the configuration directory
    #[arg(long, default_value = "../Stats")]
    pub stats_dir: String,

    /// Renderers to sweep
    #[arg(
        long = "renderer",
        value_enum,
        value_delimiter = ',',
        default_values = ["DirectX", "OpenGL", "Vulkan"]
    )]
    pub renderers: Vec<Renderer>,

    /// Prefabs to sweep, as NAME=MODEL_PATH
    #[arg(
        long = "prefab",
        value_delimiter = ',',
        default_values = [
            "Bunny=../Resources/bunny/bunny.obj",
            "Cube=../Resources/cube/cube.obj",
            "Teapot=../Resources/teapot/teapot.obj",
        ]
    )]
    pub prefabs: Vec<Prefab>,

    /// Instance counts (entities shape)
    #[arg(long, value_delimiter = ',', default_values_t = [0usize, 5, 10, 15, 20, 25])]
    pub counts: Vec<usize>,

    /// Experiment kinds (config shape)
    #[arg(
        long = "kind",
        value_enum,
        value_delimiter = ',',
        default_values = ["dynamic", "static"]
    )]
    pub kinds: Vec<KindArg>,

    /// Instance counts for the dynamic orbit experiment
    #[arg(long, value_delimiter = ',', default_values_t = [500usize, 1000, 1500, 2000])]
    pub dynamic_counts: Vec<usize>,

    /// Instance counts for the static grid experiment
    #[arg(long, value_delimiter = ',', default_values_t = [500usize, 1000, 1500, 2000])]
    pub static_counts: Vec<usize>,

    /// Orbit speed of the dynamic experiment (radians per second)
    #[arg(long, default_value_t = 0.5)]
    pub rotation_speed: f32,

    /// Ring radiuses of the dynamic experiment
    #[arg(long, value_delimiter = ',', default_values_t = [10.0f32, 20.0, 30.0])]
    pub radiuses: Vec<f32>,

    /// Grid spacing of the static experiment
    #[arg(long, default_value_t = 3.0)]
    pub distance_delta: f32,

    /// Grid row width of the static experiment
    #[arg(long, default_value_t = 20)]
    pub elements_per_row: usize,

    /// How long the engine runs each experiment
    #[arg(long, default_value = "30s")]
    pub experiment_time: humantime::Duration,

    /// Parameterless systems placed in every config-shape document
    #[arg(long = "default-system", value_delimiter = ',')]
    pub default_systems: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Engine executable
    #[arg(long, default_value = "GameEngine.exe")]
    pub executable: PathBuf,

    /// Directory whose regular files are run, in file-name order
    #[arg(long, default_value = "Resources/inputs")]
    pub dir: PathBuf,

    /// Run only these files from --dir, in the given order
    #[arg(long = "file", value_delimiter = ',')]
    pub files: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct AggregateArgs {
    /// Engine executable
    #[arg(long, default_value = "GameEngine.exe")]
    pub executable: PathBuf,

    /// Directory holding the target and warmup configurations
    #[arg(long, default_value = "Configs")]
    pub config_dir: PathBuf,

    /// Target configuration files, in processing order
    #[arg(
        long = "target",
        value_delimiter = ',',
        default_values = [
            "config_DirectX_Bunny_2000_2.json",
            "config_OpenGL_Bunny_2000_2.json",
            "config_Vulkan_Bunny_2000_2.json",
            "config_DirectX_Cube_2000_2.json",
            "config_OpenGL_Cube_2000_2.json",
            "config_Vulkan_Cube_2000_2.json",
            "config_DirectX_Teapot_2000_2.json",
            "config_OpenGL_Teapot_2000_2.json",
            "config_Vulkan_Teapot_2000_2.json",
        ]
    )]
    pub targets: Vec<String>,

    /// Measured runs per target
    #[arg(long, default_value_t = 20)]
    pub repeats: usize,

    /// Discarded runs before the measured phase
    #[arg(long, default_value_t = 5)]
    pub warmup_runs: usize,

    /// Configuration used for the warmup runs
    #[arg(long, default_value = "config_DirectX_Teapot_2000_2.json")]
    pub warmup_file: String,

    /// Suffix inserted before the result file's extension for the combined file
    #[arg(long, default_value = "_all")]
    pub suffix: String,
}

pub async fn run(args: Cli) -> Result<()> {
    let plan = match args.plan.as_deref() {
        Some(path) => Some(load_plan(path)?),
        None => None,
    };

    match &args.command {
        Command::Generate(a) => {
            let cfg = match plan {
                Some(p) => p.sweep.context("plan has no `sweep` section")?,
                None => build_sweep_config(a),
            };
            run_generate(cfg).await
        }
        Command::Run(a) => {
            let cfg = match plan {
                Some(p) => p.run.context("plan has no `run` section")?,
                None => build_runner_config(a),
            };
            run_runner(cfg).await
        }
        Command::Aggregate(a) => {
            let cfg = match plan {
                Some(p) => p.aggregate.context("plan has no `aggregate` section")?,
                None => build_aggregate_config(a),
            };
            run_aggregate(cfg).await
        }
    }
}

fn load_plan(path: &Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read plan {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse plan {}", path.display()))
}

/// Build a `SweepConfig` from CLI arguments.
pub fn build_sweep_config(args: &GenerateArgs) -> SweepConfig {
    let experiments = args
        .kinds
        .iter()
        .map(|kind| match kind {
            KindArg::Dynamic => ExperimentPlan {
                kind: ExperimentKind::DynamicOrbit {
                    rotation_speed: args.rotation_speed,
                    radiuses: args.radiuses.clone(),
                },
                counts: args.dynamic_counts.clone(),
            },
            KindArg::Static => ExperimentPlan {
                kind: ExperimentKind::StaticGrid {
                    distance_delta: args.distance_delta,
                    elements_per_row: args.elements_per_row,
                },
                counts: args.static_counts.clone(),
            },
        })
        .collect();

    SweepConfig {
        shape: args.shape,
        output_dir: args.output_dir.clone(),
        stats_dir: args.stats_dir.clone(),
        renderers: args.renderers.clone(),
        prefabs: args.prefabs.clone(),
        counts: args.counts.clone(),
        experiments,
        experiment_time: Duration::from(args.experiment_time),
        default_systems: args.default_systems.clone(),
    }
}

/// Build a `RunnerConfig` from CLI arguments.
pub fn build_runner_config(args: &RunArgs) -> RunnerConfig {
    let targets = if args.files.is_empty() {
        RunTargets::Directory(args.dir.clone())
    } else {
        RunTargets::List {
            dir: args.dir.clone(),
            files: args.files.clone(),
        }
    };
    RunnerConfig {
        executable: args.executable.clone(),
        targets,
    }
}

/// Build an `AggregateConfig` from CLI arguments.
pub fn build_aggregate_config(args: &AggregateArgs) -> AggregateConfig {
    AggregateConfig {
        executable: args.executable.clone(),
        config_dir: args.config_dir.clone(),
        targets: args.targets.clone(),
        repeats: args.repeats,
        warmup_runs: args.warmup_runs,
        warmup_file: args.warmup_file.clone(),
        combined_suffix: args.suffix.clone(),
    }
}

async fn run_generate(cfg: SweepConfig) -> Result<()> {
    info!(shape = ?cfg.shape, output_dir = %cfg.output_dir.display(), "generating configurations");
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let handle = tokio::task::spawn_blocking(move || {
        generator::generate(&cfg, &evt_tx)
    });
    drive_stage(handle, evt_rx, text_summary::build_generation_summary).await
}

async fn run_runner(cfg: RunnerConfig) -> Result<()> {
    let files = orchestrator::discover_targets(&cfg.targets).await?;
    info!(executable = %cfg.executable.display(), files = files.len(), "running configurations");
    let launcher = ProcessLauncher::new(cfg.executable);
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let handle =
        tokio::spawn(async move { orchestrator::run_all(&launcher, &files, &evt_tx).await });
    drive_stage(handle, evt_rx, text_summary::build_run_summary).await
}

async fn run_aggregate(cfg: AggregateConfig) -> Result<()> {
    info!(
        executable = %cfg.executable.display(),
        targets = cfg.targets.len(),
        repeats = cfg.repeats,
        warmup_runs = cfg.warmup_runs,
        "aggregating configurations"
    );
    let launcher = ProcessLauncher::new(cfg.executable.clone());
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let handle =
        tokio::spawn(async move { orchestrator::aggregate(&cfg, &launcher, &evt_tx).await });
    drive_stage(handle, evt_rx, text_summary::build_aggregate_summary).await
}

/// Print stage events as they arrive, then the stage's summary.
///
/// The stage task owns the event sender, so the event loop ends when the
/// stage does.
async fn drive_stage<T>(
    handle: JoinHandle<Result<T>>,
    mut evt_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    summarize: fn(&T) -> TextSummary,
) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();

    while let Some(ev) = evt_rx.recv().await {
        let line = match ev {
            PipelineEvent::ResultMissing { .. } | PipelineEvent::TargetFailed { .. } => {
                OutputLine::Stderr(ev.to_message())
            }
            _ => OutputLine::Stdout(ev.to_message()),
        };
        let _ = out_tx.send(line);
    }

    let result = handle.await.context("stage task failed").and_then(|r| r);
    if let Ok(report) = &result {
        for line in summarize(report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_need_no_arguments() {
        let cli = Cli::try_parse_from(["engine-bench", "generate"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let cfg = build_sweep_config(&args);
        assert_eq!(cfg.shape, OutputShape::Config);
        assert_eq!(
            cfg.renderers,
            vec![Renderer::DirectX, Renderer::OpenGL, Renderer::Vulkan]
        );
        assert_eq!(cfg.prefabs.len(), 3);
        assert_eq!(cfg.experiments.len(), 2);
        assert_eq!(cfg.experiments[1].kind.index(), 2);
        assert_eq!(cfg.experiment_time, Duration::from_secs(30));
        assert!(cfg.validate().is_ok());

        let cli = Cli::try_parse_from(["engine-bench", "aggregate"]).unwrap();
        let Command::Aggregate(args) = cli.command else {
            panic!("expected aggregate");
        };
        let cfg = build_aggregate_config(&args);
        assert_eq!(cfg.repeats, 20);
        assert_eq!(cfg.warmup_runs, 5);
        assert_eq!(cfg.targets.len(), 9);
    }

    #[test]
    fn explicit_sweep_flags() {
        let cli = Cli::try_parse_from([
            "engine-bench",
            "generate",
            "--shape",
            "entities",
            "--renderer",
            "OpenGL",
            "--prefab",
            "Cube=cube.obj",
            "--counts",
            "0,5",
        ])
        .unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let cfg = build_sweep_config(&args);
        let keys: Vec<String> = cfg.points().iter().map(|p| p.key()).collect();
        assert_eq!(keys, vec!["OpenGL_Cube_0", "OpenGL_Cube_5"]);
    }

    #[test]
    fn run_files_switch_to_list_mode() {
        let cli =
            Cli::try_parse_from(["engine-bench", "run", "--file", "b.json,a.json"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        match build_runner_config(&args).targets {
            RunTargets::List { files, .. } => assert_eq!(files, vec!["b.json", "a.json"]),
            other => panic!("unexpected targets {other:?}"),
        }
    }

    #[test]
    fn plan_sections_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"{
                "aggregate": {
                    "executable": "engine",
                    "config_dir": "Configs",
                    "targets": ["config_OpenGL_Cube_5_1.json"],
                    "repeats": 3,
                    "warmup_runs": 1,
                    "warmup_file": "config_OpenGL_Cube_5_1.json"
                }
            }"#,
        )
        .unwrap();
        let plan = load_plan(&path).unwrap();
        let aggregate = plan.aggregate.unwrap();
        assert_eq!(aggregate.repeats, 3);
        assert_eq!(aggregate.combined_suffix, "_all");
        assert!(plan.sweep.is_none());
    }
}
