//! Configuration documents consumed by the engine.
//!
//! The generator builds these as typed values and writes them once. Reading
//! goes through an untyped `serde_json::Value` because the engine owns the
//! schema; only the declared result path is ever extracted.

use crate::model::Renderer;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

pub(crate) const STATS_SYSTEM: &str = "Engine::Systems::StatsSystem";
pub(crate) const TAG_COMPONENT: &str = "Engine::Components::Tag";
pub(crate) const FILE_LOCATION_COMPONENT: &str = "Engine::Components::FileLocation";
pub(crate) const CAMERA_TAG: &str = "MainCamera";
pub(crate) const STATS_TAG: &str = "StatsConfiguration";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ONE: Vec3 = Vec3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "typename")]
pub(crate) enum Component {
    #[serde(rename = "Engine::Components::Transform")]
    Transform {
        position: Vec3,
        #[serde(skip_serializing_if = "Option::is_none")]
        scale: Option<Vec3>,
    },
    #[serde(rename = "Engine::Components::Model")]
    Model { path: String },
    #[serde(rename = "Engine::Components::Tag")]
    Tag { tag: String },
    #[serde(rename = "Engine::Components::FileLocation")]
    FileLocation { path: String },
}

impl Component {
    pub fn tag(tag: impl Into<String>) -> Self {
        Component::Tag { tag: tag.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "typename")]
pub(crate) enum SystemDescriptor {
    #[serde(rename = "Engine::Systems::Experiment1System", rename_all = "camelCase")]
    DynamicOrbit {
        prefab: String,
        prefab_count: usize,
        experiment_time: f32,
        rotation_speed: f32,
        radiuses: Vec<f32>,
    },
    #[serde(rename = "Engine::Systems::Experiment2System", rename_all = "camelCase")]
    StaticGrid {
        prefab: String,
        prefab_count: usize,
        experiment_time: f32,
        distance_delta: f32,
        elements_per_row: usize,
    },
    #[serde(rename = "Engine::Systems::StatsSystem", rename_all = "camelCase")]
    Stats { output_file: String },
    #[serde(rename = "Engine::Systems::RenderingSystem")]
    Rendering { renderer: Renderer },
}

/// Entry of the `Systems` list: a parameterized descriptor, or a bare
/// typename for template systems that take no configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum SystemEntry {
    Known(SystemDescriptor),
    Bare { typename: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PrefabTemplate {
    pub name: String,
    #[serde(rename = "Components")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Entity {
    #[serde(rename = "Components")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct Document {
    #[serde(rename = "Prefabs", skip_serializing_if = "Option::is_none")]
    pub prefabs: Option<Vec<PrefabTemplate>>,
    #[serde(rename = "Entities")]
    pub entities: Vec<Entity>,
    #[serde(rename = "Systems", skip_serializing_if = "Option::is_none")]
    pub systems: Option<Vec<SystemEntry>>,
}

impl Document {
    /// Serialize with 4-space indentation, the layout the engine's sample configs use.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(buf)
    }

    pub fn push_system(&mut self, system: SystemDescriptor) {
        self.systems
            .get_or_insert_with(Vec::new)
            .push(SystemEntry::Known(system));
    }
}

/// Extract the result-file path a document declares.
///
/// Looks for the `StatsSystem` descriptor's `outputFile` first, then for a
/// `FileLocation` on the entity tagged `StatsConfiguration`.
pub(crate) fn declared_result_path(doc: &Value) -> Option<&str> {
    let from_systems = doc
        .get("Systems")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|s| typename(s) == Some(STATS_SYSTEM))
        .find_map(|s| s.get("outputFile").and_then(Value::as_str));
    if from_systems.is_some() {
        return from_systems;
    }

    doc.get("Entities")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(components)
        .filter(|comps| {
            comps.iter().any(|c| {
                typename(c) == Some(TAG_COMPONENT)
                    && c.get("tag").and_then(Value::as_str) == Some(STATS_TAG)
            })
        })
        .find_map(|comps| {
            comps
                .iter()
                .filter(|c| typename(c) == Some(FILE_LOCATION_COMPONENT))
                .find_map(|c| c.get("path").and_then(Value::as_str))
        })
}

fn typename(v: &Value) -> Option<&str> {
    v.get("typename").and_then(Value::as_str)
}

fn components(entity: &Value) -> Option<&Vec<Value>> {
    entity.get("Components").and_then(Value::as_array)
}

/// Number of entities carrying a `Model` component.
#[cfg(test)]
pub(crate) fn model_entity_count(doc: &Value) -> usize {
    doc.get("Entities")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(components)
        .filter(|comps| {
            comps
                .iter()
                .any(|c| typename(c) == Some("Engine::Components::Model"))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn components_carry_typename_discriminator() {
        let v = serde_json::to_value(Component::Transform {
            position: Vec3::new(0.0, 0.0, -5.0),
            scale: None,
        })
        .unwrap();
        assert_eq!(
            v,
            json!({
                "typename": "Engine::Components::Transform",
                "position": { "x": 0.0, "y": 0.0, "z": -5.0 }
            })
        );
    }

    #[test]
    fn systems_use_engine_field_names() {
        let v = serde_json::to_value(SystemDescriptor::StaticGrid {
            prefab: "Cube".into(),
            prefab_count: 10,
            experiment_time: 30.0,
            distance_delta: 3.0,
            elements_per_row: 20,
        })
        .unwrap();
        assert_eq!(v["typename"], "Engine::Systems::Experiment2System");
        assert_eq!(v["prefabCount"], 10);
        assert_eq!(v["elementsPerRow"], 20);

        let bare = serde_json::to_value(SystemEntry::Bare {
            typename: "Engine::Systems::InputSystem".into(),
        })
        .unwrap();
        assert_eq!(bare, json!({ "typename": "Engine::Systems::InputSystem" }));
    }

    #[test]
    fn pretty_json_uses_four_spaces() {
        let doc = Document::default();
        let text = String::from_utf8(doc.to_pretty_json().unwrap()).unwrap();
        assert_eq!(text, "{\n    \"Entities\": []\n}");
    }

    #[test]
    fn result_path_from_stats_system() {
        let doc = json!({
            "Entities": [],
            "Systems": [
                { "typename": "Engine::Systems::RenderingSystem", "renderer": "Vulkan" },
                { "typename": "Engine::Systems::StatsSystem", "outputFile": "../Stats/a.txt" }
            ]
        });
        assert_eq!(declared_result_path(&doc), Some("../Stats/a.txt"));
    }

    #[test]
    fn result_path_from_stats_entity() {
        let doc = json!({
            "Entities": [
                { "Components": [
                    { "typename": "Engine::Components::FileLocation", "path": "wrong.txt" }
                ] },
                { "Components": [
                    { "typename": "Engine::Components::FileLocation", "path": "stats.txt" },
                    { "typename": "Engine::Components::Tag", "tag": "StatsConfiguration" }
                ] }
            ]
        });
        assert_eq!(declared_result_path(&doc), Some("stats.txt"));
        assert_eq!(declared_result_path(&json!({ "Entities": [] })), None);
    }
}
