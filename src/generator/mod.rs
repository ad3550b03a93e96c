//! Configuration sweep generator.
//!
//! One generator covers both document shapes: a shape-specific template is
//! built once, then every tuple of the sweep clones it and appends its own
//! entities or systems. File names are a pure function of the tuple.

mod document;

pub(crate) use document::declared_result_path;
use document::{
    Component, Document, Entity, PrefabTemplate, SystemDescriptor, SystemEntry, Vec3, CAMERA_TAG,
    STATS_TAG,
};

use crate::model::{ExperimentKind, OutputShape, PipelineEvent, SweepConfig, SweepPoint};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Files written by one generation run, in sweep order.
#[derive(Debug, Default)]
pub(crate) struct GenerationReport {
    pub written: Vec<PathBuf>,
}

/// Build the part of every document that does not depend on the tuple.
pub(crate) fn base_template(cfg: &SweepConfig) -> Document {
    let camera = Entity {
        components: vec![
            Component::Transform {
                position: Vec3::new(0.0, 0.0, -5.0),
                scale: None,
            },
            Component::tag(CAMERA_TAG),
        ],
    };

    match cfg.shape {
        OutputShape::Entities => Document {
            prefabs: None,
            entities: vec![camera],
            systems: None,
        },
        OutputShape::Config => Document {
            prefabs: Some(
                cfg.prefabs
                    .iter()
                    .map(|p| PrefabTemplate {
                        name: p.name.clone(),
                        components: vec![
                            Component::Transform {
                                position: Vec3::new(0.0, 0.0, 0.0),
                                scale: Some(Vec3::ONE),
                            },
                            Component::Model {
                                path: p.model.clone(),
                            },
                        ],
                    })
                    .collect(),
            ),
            entities: vec![camera],
            systems: Some(
                cfg.default_systems
                    .iter()
                    .map(|typename| SystemEntry::Bare {
                        typename: typename.clone(),
                    })
                    .collect(),
            ),
        },
    }
}

/// File name of the configuration document for `point`.
pub(crate) fn config_file_name(shape: OutputShape, point: &SweepPoint<'_>) -> String {
    format!("{}_{}.json", shape.file_prefix(), point.key())
}

/// Result-file path declared inside the document for `point`, relative to the
/// configuration directory.
pub(crate) fn result_path(cfg: &SweepConfig, point: &SweepPoint<'_>) -> String {
    let dir = cfg.stats_dir.trim_end_matches('/');
    let file = format!("stats_{}.txt", point.key());
    if dir.is_empty() {
        file
    } else {
        format!("{dir}/{file}")
    }
}

/// Clone the template and append everything `point` contributes.
pub(crate) fn build_document(
    cfg: &SweepConfig,
    template: &Document,
    point: &SweepPoint<'_>,
) -> Document {
    let mut doc = template.clone();
    let output_file = result_path(cfg, point);

    match point.experiment {
        None => {
            for i in 0..point.count {
                doc.entities.push(Entity {
                    components: vec![
                        Component::Transform {
                            position: Vec3::new(i as f32 * 2.0, 0.0, 0.0),
                            scale: Some(Vec3::ONE),
                        },
                        Component::Model {
                            path: point.prefab.model.clone(),
                        },
                    ],
                });
            }
            doc.entities.push(Entity {
                components: vec![Component::tag(point.renderer.as_str())],
            });
            doc.entities.push(Entity {
                components: vec![
                    Component::FileLocation { path: output_file },
                    Component::tag(STATS_TAG),
                ],
            });
        }
        Some(plan) => {
            let prefab = point.prefab.name.clone();
            let prefab_count = point.count;
            let experiment_time = cfg.experiment_time.as_secs_f32();
            let experiment = match &plan.kind {
                ExperimentKind::DynamicOrbit {
                    rotation_speed,
                    radiuses,
                } => SystemDescriptor::DynamicOrbit {
                    prefab,
                    prefab_count,
                    experiment_time,
                    rotation_speed: *rotation_speed,
                    radiuses: radiuses.clone(),
                },
                ExperimentKind::StaticGrid {
                    distance_delta,
                    elements_per_row,
                } => SystemDescriptor::StaticGrid {
                    prefab,
                    prefab_count,
                    experiment_time,
                    distance_delta: *distance_delta,
                    elements_per_row: *elements_per_row,
                },
            };
            doc.push_system(experiment);
            doc.push_system(SystemDescriptor::Stats { output_file });
            doc.push_system(SystemDescriptor::Rendering {
                renderer: point.renderer,
            });
        }
    }
    doc
}

/// Write one document per sweep tuple into `cfg.output_dir`.
///
/// The output directory must exist. The first write error aborts the run;
/// files written before it stay on disk.
pub(crate) fn generate(
    cfg: &SweepConfig,
    event_tx: &UnboundedSender<PipelineEvent>,
) -> Result<GenerationReport> {
    cfg.validate()?;
    let template = base_template(cfg);
    let mut report = GenerationReport::default();

    for point in cfg.points() {
        let doc = build_document(cfg, &template, &point);
        let path = cfg.output_dir.join(config_file_name(cfg.shape, &point));
        let bytes = doc
            .to_pretty_json()
            .with_context(|| format!("serialize {}", path.display()))?;
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), count = point.count, "wrote configuration");

        let _ = event_tx.send(PipelineEvent::ConfigWritten { path: path.clone() });
        report.written.push(path);
    }

    Ok(report)
}
