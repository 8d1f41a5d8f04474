use std::collections::HashSet;

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{DOCUMENT_VERSION, Decoration, DiagramData, Edge, Person, ViewportState};

/// Wire shape of a stored document before validation. Every collection is
/// optional so older or hand-edited documents still load.
#[derive(Debug, Default, Deserialize)]
struct RawDiagramData {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    nodes: Option<Vec<Value>>,
    #[serde(default)]
    edges: Option<Vec<Value>>,
    #[serde(default)]
    decorations: Option<Vec<Value>>,
    #[serde(default)]
    viewport: Option<Value>,
}

impl<'de> Deserialize<'de> for DiagramData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<RawDiagramData>::deserialize(deserializer)?.unwrap_or_default();
        Ok(DiagramData::from_raw(raw))
    }
}

impl DiagramData {
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn from_raw(raw: RawDiagramData) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let mut data = DiagramData {
            version: raw.version.unwrap_or_else(|| DOCUMENT_VERSION.to_string()),
            ..Default::default()
        };

        for person in parse_entries::<Person>(raw.nodes, "node") {
            if !seen.insert(person.id.clone()) {
                warn!("event=load module=model status=dropped kind=node reason=duplicate_id id={}", person.id);
                continue;
            }
            data.nodes.push(person);
        }

        for mut decoration in parse_entries::<Decoration>(raw.decorations, "decoration") {
            if !seen.insert(decoration.id().to_string()) {
                warn!(
                    "event=load module=model status=dropped kind=decoration reason=duplicate_id id={}",
                    decoration.id()
                );
                continue;
            }
            if let Decoration::Note(note) = &mut decoration {
                note.normalize();
            }
            data.decorations.push(decoration);
        }

        for edge in parse_entries::<Edge>(raw.edges, "edge") {
            if !seen.insert(edge.id.clone()) {
                warn!("event=load module=model status=dropped kind=edge reason=duplicate_id id={}", edge.id);
                continue;
            }
            if data.person(&edge.from).is_none() || data.person(&edge.to).is_none() {
                warn!(
                    "event=load module=model status=dropped kind=edge reason=dangling id={} from={} to={}",
                    edge.id, edge.from, edge.to
                );
                continue;
            }
            data.edges.push(edge);
        }

        data.viewport = raw
            .viewport
            .and_then(|value| serde_json::from_value::<ViewportState>(value).ok())
            .unwrap_or_default();
        data
    }
}

fn parse_entries<T: DeserializeOwned>(entries: Option<Vec<Value>>, kind: &str) -> Vec<T> {
    entries
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<T>(value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("event=load module=model status=dropped kind={kind} index={index} error={err}");
                None
            }
        })
        .collect()
}
