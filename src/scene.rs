mod card;
pub(crate) mod types;
pub use card::{EMOJI_SIZE, RESIZE_HANDLE_SIZE};
pub use types::*;

use std::collections::HashMap;

use serde::Serialize;

use crate::interaction::Selection;
use crate::model::{Decoration, DiagramData, LineStyle, Person};
use crate::routing::{Routes, Segment, distance_to_line};
use crate::theme::Theme;

/// Maximum distance (document units) at which a click still hits a connector.
pub const LINE_HIT_TOLERANCE: f32 = 5.0;

/// Inputs the renderer reads besides the entity itself.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub selection: &'a Selection,
    /// Intrinsic photo sizes reported by the host, keyed by url.
    pub image_sizes: &'a HashMap<String, (f32, f32)>,
    pub theme: &'a Theme,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scene {
    /// Connectors, always drawn beneath the entity groups.
    pub connectors: Vec<Connector>,
    /// Entity groups in z-order, last on top.
    pub groups: Vec<DrawGroup>,
}

impl Scene {
    /// Full render: persons first, then decorations, then connectors.
    pub fn build(data: &DiagramData, routes: &Routes, ctx: RenderContext<'_>) -> Self {
        let mut scene = Scene::default();
        for person in &data.nodes {
            scene.render_person(person, ctx);
        }
        for decoration in &data.decorations {
            scene.render_decoration(decoration, ctx);
        }
        scene.set_connectors(routes, ctx);
        scene
    }

    /// Destroys and recreates the group of `person`, keeping its z position.
    pub fn render_person(&mut self, person: &Person, ctx: RenderContext<'_>) {
        let selected = matches!(ctx.selection, Selection::Person(id) if *id == person.id);
        let photo_size = person
            .photo_ref
            .as_ref()
            .and_then(|url| ctx.image_sizes.get(url).copied());
        let group = card::person_group(person, selected, photo_size, ctx.theme);
        self.replace_group(group);
    }

    pub fn render_decoration(&mut self, decoration: &Decoration, ctx: RenderContext<'_>) {
        let selected = matches!(ctx.selection, Selection::Decoration(id) if id == decoration.id());
        let group = match decoration {
            Decoration::Emoji(emoji) => card::emoji_group(emoji, selected, ctx.theme),
            Decoration::Note(note) => card::note_group(note, selected, ctx.theme),
        };
        self.replace_group(group);
    }

    /// Re-renders every entity whose highlight no longer matches the selection,
    /// and restyles the connectors.
    pub fn apply_selection(&mut self, data: &DiagramData, routes: &Routes, ctx: RenderContext<'_>) {
        let stale: Vec<String> = self
            .groups
            .iter()
            .filter(|group| group.selected != selection_targets(ctx.selection, &group.id))
            .map(|group| group.id.clone())
            .collect();
        for id in stale {
            if let Some(person) = data.person(&id) {
                self.render_person(person, ctx);
            } else if let Some(decoration) = data.decoration(&id) {
                self.render_decoration(decoration, ctx);
            }
        }
        self.set_connectors(routes, ctx);
    }

    fn replace_group(&mut self, group: DrawGroup) {
        match self.groups.iter().position(|existing| existing.id == group.id) {
            Some(index) => self.groups[index] = group,
            None => self.groups.push(group),
        }
    }

    pub fn remove_group(&mut self, id: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|group| group.id != id);
        self.groups.len() != before
    }

    pub fn group(&self, id: &str) -> Option<&DrawGroup> {
        self.groups.iter().find(|group| group.id == id)
    }

    fn group_mut(&mut self, id: &str) -> Option<&mut DrawGroup> {
        self.groups.iter_mut().find(|group| group.id == id)
    }

    /// Moves a group's mirror without touching the document (live drag).
    pub fn move_group(&mut self, id: &str, x: f32, y: f32) -> bool {
        match self.group_mut(id) {
            Some(group) => {
                group.x = x;
                group.y = y;
                true
            }
            None => false,
        }
    }

    pub fn set_draggable(&mut self, id: &str, draggable: bool) -> bool {
        match self.group_mut(id) {
            Some(group) => {
                group.draggable = draggable;
                true
            }
            None => false,
        }
    }

    /// Moves a group to the top of the z-order.
    pub fn raise(&mut self, id: &str) -> bool {
        match self.groups.iter().position(|group| group.id == id) {
            Some(index) => {
                let group = self.groups.remove(index);
                self.groups.push(group);
                true
            }
            None => false,
        }
    }

    /// Moves a group to the bottom of the entity z-order (still above connectors).
    pub fn lower(&mut self, id: &str) -> bool {
        match self.groups.iter().position(|group| group.id == id) {
            Some(index) => {
                let group = self.groups.remove(index);
                self.groups.insert(0, group);
                true
            }
            None => false,
        }
    }

    /// Replaces all connectors with freshly routed geometry.
    pub fn set_connectors(&mut self, routes: &Routes, ctx: RenderContext<'_>) {
        let selected_edge = match ctx.selection {
            Selection::Edge(id) => Some(id.as_str()),
            _ => None,
        };
        self.connectors = routes
            .segments
            .iter()
            .map(|segment| connector(segment, selected_edge, ctx.theme))
            .collect();
    }

    /// Restyles only the connectors drawn for `edge_id`. Returns how many changed.
    pub fn restyle_edge(&mut self, edge_id: &str, style: LineStyle) -> usize {
        let mut changed = 0;
        for connector in &mut self.connectors {
            if connector.selectable_edge.as_deref() == Some(edge_id) {
                connector.line.dash = style.dash();
                changed += 1;
            }
        }
        changed
    }

    pub fn connectors_for_edge<'a>(&'a self, edge_id: &'a str) -> impl Iterator<Item = &'a Connector> + 'a {
        self.connectors
            .iter()
            .filter(move |connector| connector.edges.iter().any(|id| id == edge_id))
    }

    /// Document-space bounding box of all content as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let corners = self
            .groups
            .iter()
            .flat_map(|group| [(group.x, group.y), (group.x + group.width, group.y + group.height)])
            .chain(
                self.connectors
                    .iter()
                    .flat_map(|connector| connector.line.points.iter().copied()),
            );
        corners.fold(None, |acc, (x, y)| match acc {
            None => Some((x, y, x, y)),
            Some((min_x, min_y, max_x, max_y)) => {
                Some((min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y)))
            }
        })
    }

    /// Finds what lies under a document-space point: entity groups from the top
    /// down (a note's resize handle before its body), then connectors.
    pub fn hit_test(&self, point: (f32, f32), line_tolerance: f32) -> Hit {
        for group in self.groups.iter().rev() {
            if group.kind == GroupKind::Note && group.on_resize_handle(point) {
                return Hit::ResizeHandle(group.id.clone());
            }
            if group.contains(point) {
                return match group.kind {
                    GroupKind::Person => Hit::Person(group.id.clone()),
                    GroupKind::Emoji | GroupKind::Note => Hit::Decoration(group.id.clone()),
                };
            }
        }

        let nearest = self
            .connectors
            .iter()
            .filter_map(|connector| {
                let distance = polyline_distance(&connector.line.points, point);
                (distance <= line_tolerance).then_some((distance, connector))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            Some((_, connector)) => match &connector.selectable_edge {
                Some(edge) => Hit::Edge(edge.clone()),
                None => Hit::Junction(connector.child.clone()),
            },
            None => Hit::Canvas,
        }
    }
}

fn selection_targets(selection: &Selection, id: &str) -> bool {
    match selection {
        Selection::Person(selected) | Selection::Decoration(selected) => selected == id,
        Selection::Edge(_) | Selection::None => false,
    }
}

fn connector(segment: &Segment, selected_edge: Option<&str>, theme: &Theme) -> Connector {
    let selectable_edge = segment.selectable_edge().map(str::to_string);
    let selected = selected_edge.is_some() && selectable_edge.as_deref() == selected_edge;
    let (stroke, stroke_width) = if selected {
        (theme.selection_color.clone(), theme.selected_line_width())
    } else {
        (theme.line_color.clone(), theme.line_width)
    };
    Connector {
        id: segment.id.clone(),
        kind: segment.kind,
        edges: segment.edges.clone(),
        child: segment.child.clone(),
        selectable_edge,
        selected,
        line: LineShape {
            points: segment.points().to_vec(),
            stroke,
            stroke_width,
            dash: segment.style.dash(),
            round_cap: true,
        },
    }
}

fn polyline_distance(points: &[(f32, f32)], point: (f32, f32)) -> f32 {
    points
        .windows(2)
        .map(|pair| distance_to_line(pair[0], pair[1], point))
        .fold(f32::INFINITY, f32::min)
}
