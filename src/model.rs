mod load;
pub(crate) mod types;
pub use types::*;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

pub const DOCUMENT_VERSION: &str = "1.0";
pub const DEFAULT_TREE_NAME: &str = "Untitled Tree";

/// A stored family tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data: DiagramData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Tree {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data: DiagramData::default(),
            updated_at: None,
        }
    }
}

/// Listing entry returned by the persistence gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub id: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// The mutable document of a tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramData {
    pub version: String,
    pub nodes: Vec<Person>,
    pub edges: Vec<Edge>,
    pub decorations: Vec<Decoration>,
    pub viewport: ViewportState,
}

impl Default for DiagramData {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            decorations: Vec::new(),
            viewport: ViewportState::default(),
        }
    }
}

impl DiagramData {
    pub fn person(&self, id: &str) -> Option<&Person> {
        self.nodes.iter().find(|person| person.id == id)
    }

    pub fn person_mut(&mut self, id: &str) -> Option<&mut Person> {
        self.nodes.iter_mut().find(|person| person.id == id)
    }

    pub fn decoration(&self, id: &str) -> Option<&Decoration> {
        self.decorations.iter().find(|decoration| decoration.id() == id)
    }

    pub fn decoration_mut(&mut self, id: &str) -> Option<&mut Decoration> {
        self.decorations
            .iter_mut()
            .find(|decoration| decoration.id() == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn edges_touching<'a>(&'a self, person_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.touches(person_id))
    }

    /// True when any entity (person, decoration or edge) already uses `id`.
    pub fn contains_id(&self, id: &str) -> bool {
        self.person(id).is_some() || self.decoration(id).is_some() || self.edge(id).is_some()
    }

    pub fn add_person(&mut self, person: Person) -> bool {
        if self.contains_id(&person.id) {
            warn!("event=add_person module=model status=skipped reason=duplicate_id id={}", person.id);
            return false;
        }
        self.nodes.push(person);
        true
    }

    pub fn add_decoration(&mut self, mut decoration: Decoration) -> bool {
        if self.contains_id(decoration.id()) {
            warn!(
                "event=add_decoration module=model status=skipped reason=duplicate_id id={}",
                decoration.id()
            );
            return false;
        }
        if let Decoration::Note(note) = &mut decoration {
            note.normalize();
        }
        self.decorations.push(decoration);
        true
    }

    /// Appends an edge. Both endpoints must be existing, distinct persons.
    /// Edges with the same (from, to) pair are allowed.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if self.contains_id(&edge.id) {
            warn!("event=add_edge module=model status=skipped reason=duplicate_id id={}", edge.id);
            return false;
        }
        if edge.from == edge.to {
            warn!("event=add_edge module=model status=skipped reason=self_edge id={}", edge.id);
            return false;
        }
        for endpoint in [&edge.from, &edge.to] {
            if self.person(endpoint).is_none() {
                warn!(
                    "event=add_edge module=model status=skipped reason=missing_person id={} person={}",
                    edge.id, endpoint
                );
                return false;
            }
        }
        self.edges.push(edge);
        true
    }

    pub fn update_person(&mut self, id: &str, patch: PersonPatch) -> bool {
        let Some(person) = self.person_mut(id) else {
            warn!("event=update_person module=model status=skipped reason=missing_id id={id}");
            return false;
        };
        patch.apply(person);
        true
    }

    pub fn update_decoration(&mut self, id: &str, patch: DecorationPatch) -> bool {
        let Some(decoration) = self.decoration_mut(id) else {
            warn!("event=update_decoration module=model status=skipped reason=missing_id id={id}");
            return false;
        };
        patch.apply(decoration);
        true
    }

    pub fn update_edge_style(&mut self, id: &str, style: LineStyle) -> bool {
        let Some(edge) = self.edges.iter_mut().find(|edge| edge.id == id) else {
            warn!("event=update_edge_style module=model status=skipped reason=missing_id id={id}");
            return false;
        };
        edge.line_style = style;
        true
    }

    pub fn move_person(&mut self, id: &str, x: f32, y: f32) -> bool {
        self.update_person(
            id,
            PersonPatch {
                x: Some(x),
                y: Some(y),
                ..Default::default()
            },
        )
    }

    pub fn move_decoration(&mut self, id: &str, x: f32, y: f32) -> bool {
        self.update_decoration(
            id,
            DecorationPatch {
                x: Some(x),
                y: Some(y),
                ..Default::default()
            },
        )
    }

    /// Resizes a note, clamped to the note minimums. Emojis are not resizable.
    pub fn resize_note(&mut self, id: &str, width: f32, height: f32) -> bool {
        match self.decoration_mut(id) {
            Some(Decoration::Note(note)) => {
                note.set_size(width, height);
                true
            }
            Some(Decoration::Emoji(_)) => {
                warn!("event=resize_note module=model status=skipped reason=not_a_note id={id}");
                false
            }
            None => {
                warn!("event=resize_note module=model status=skipped reason=missing_id id={id}");
                false
            }
        }
    }

    pub fn set_note_text(&mut self, id: &str, text: impl Into<String>) -> bool {
        self.update_decoration(
            id,
            DecorationPatch {
                text: Some(text.into()),
                ..Default::default()
            },
        )
    }

    pub fn set_photo(&mut self, id: &str, url: impl Into<String>) -> bool {
        self.update_person(
            id,
            PersonPatch {
                photo_ref: Some(url.into()),
                ..Default::default()
            },
        )
    }

    /// Removes a person and every edge touching it. Returns the removed edge ids,
    /// or `None` when the person does not exist.
    pub fn delete_person(&mut self, id: &str) -> Option<Vec<String>> {
        let before = self.nodes.len();
        self.nodes.retain(|person| person.id != id);
        if self.nodes.len() == before {
            warn!("event=delete_person module=model status=skipped reason=missing_id id={id}");
            return None;
        }
        let mut removed = Vec::new();
        self.edges.retain(|edge| {
            if edge.touches(id) {
                removed.push(edge.id.clone());
                false
            } else {
                true
            }
        });
        Some(removed)
    }

    pub fn delete_decoration(&mut self, id: &str) -> bool {
        let before = self.decorations.len();
        self.decorations.retain(|decoration| decoration.id() != id);
        if self.decorations.len() == before {
            warn!("event=delete_decoration module=model status=skipped reason=missing_id id={id}");
            return false;
        }
        true
    }

    pub fn delete_edge(&mut self, id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|edge| edge.id != id);
        if self.edges.len() == before {
            warn!("event=delete_edge module=model status=skipped reason=missing_id id={id}");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> DiagramData {
        let mut data = DiagramData::default();
        assert!(data.add_person(Person::new("mum", 0.0, 0.0, "Mum")));
        assert!(data.add_person(Person::new("dad", 300.0, 0.0, "Dad")));
        assert!(data.add_person(Person::new("kid", 150.0, 400.0, "Kid")));
        assert!(data.add_person(Person::new("aunt", 600.0, 0.0, "Aunt")));
        assert!(data.add_edge(Edge::new("e1", "mum", "kid", LineStyle::Solid)));
        assert!(data.add_edge(Edge::new("e2", "dad", "kid", LineStyle::Dashed)));
        assert!(data.add_edge(Edge::new("e3", "mum", "aunt", LineStyle::Solid)));
        data
    }

    #[test]
    fn delete_person_cascades_only_touching_edges() {
        let mut data = family();
        let removed = data.delete_person("mum").unwrap();
        assert_eq!(removed, vec!["e1".to_string(), "e3".to_string()]);
        let remaining: Vec<_> = data.edges.iter().map(|edge| edge.id.as_str()).collect();
        assert_eq!(remaining, vec!["e2"]);
        assert!(data.person("mum").is_none());
        assert_eq!(data.nodes.len(), 3);
    }

    #[test]
    fn missing_ids_are_no_ops() {
        let mut data = family();
        let snapshot = data.clone();
        assert!(data.delete_person("ghost").is_none());
        assert!(!data.delete_edge("ghost"));
        assert!(!data.delete_decoration("ghost"));
        assert!(!data.update_edge_style("ghost", LineStyle::Dashed));
        assert!(!data.update_person("ghost", PersonPatch::default()));
        assert!(!data.resize_note("ghost", 10.0, 10.0));
        assert_eq!(data, snapshot);
    }

    #[test]
    fn add_edge_requires_existing_distinct_endpoints() {
        let mut data = family();
        assert!(!data.add_edge(Edge::new("e9", "mum", "ghost", LineStyle::Solid)));
        assert!(!data.add_edge(Edge::new("e9", "kid", "kid", LineStyle::Solid)));
        assert!(!data.add_edge(Edge::new("e1", "dad", "aunt", LineStyle::Solid)));
        // Duplicate (from, to) pairs are fine.
        assert!(data.add_edge(Edge::new("e4", "mum", "kid", LineStyle::Dashed)));
        assert_eq!(data.edges.len(), 4);
    }

    #[test]
    fn deleting_decoration_or_edge_leaves_others() {
        let mut data = family();
        data.add_decoration(Decoration::Note(Note::new("note_1", 0.0, 0.0)));
        data.add_decoration(Decoration::Emoji(Emoji {
            id: "emoji_1".to_string(),
            x: 5.0,
            y: 5.0,
            symbol: "🌳".to_string(),
        }));
        assert!(data.delete_decoration("note_1"));
        assert!(data.delete_edge("e2"));
        assert_eq!(data.decorations.len(), 1);
        assert_eq!(data.nodes.len(), 4);
        assert_eq!(data.edges.len(), 2);
    }

    #[test]
    fn resize_note_clamps_and_keeps_position() {
        let mut data = DiagramData::default();
        data.add_decoration(Decoration::Note(Note::new("note_1", 40.0, 50.0)));
        assert!(data.resize_note("note_1", 20.0, 500.0));
        match data.decoration("note_1") {
            Some(Decoration::Note(note)) => {
                assert_eq!((note.width, note.height), (NOTE_MIN_WIDTH, 500.0));
                assert_eq!((note.x, note.y), (40.0, 50.0));
            }
            other => panic!("unexpected decoration {other:?}"),
        }
    }

    #[test]
    fn update_edge_style_changes_only_target() {
        let mut data = family();
        assert!(data.update_edge_style("e1", LineStyle::Dashed));
        assert_eq!(data.edge("e1").unwrap().line_style, LineStyle::Dashed);
        assert_eq!(data.edge("e3").unwrap().line_style, LineStyle::Solid);
    }
}
