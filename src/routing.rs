use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::model::{DiagramData, Edge, LineStyle};

/// Fraction of the vertical distance from the parents' mean height to the child
/// at which the junction bus is placed.
const JUNCTION_DROP_RATIO: f32 = 0.5;

/// Connector endpoint of a person card in document space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
    /// Current card height; anchors move when conditional fields change it.
    pub height: f32,
}

impl Anchor {
    pub fn point(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Single-parent edge drawn parent anchor to child anchor.
    Straight,
    /// Vertical drop from one parent anchor to the junction bus.
    ParentLeg,
    /// Horizontal bus joining the parent legs.
    Bus,
    /// Vertical leg from the bus midpoint to the child anchor.
    ChildLeg,
}

impl SegmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentKind::Straight => "straight",
            SegmentKind::ParentLeg => "parent_leg",
            SegmentKind::Bus => "bus",
            SegmentKind::ChildLeg => "child_leg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Drawable id: the edge id for straight segments and parent legs,
    /// `junction_h_<child>` / `junction_v_<child>` for the shared infrastructure.
    pub id: String,
    pub kind: SegmentKind,
    pub from: (f32, f32),
    pub to: (f32, f32),
    pub style: LineStyle,
    /// Originating edge ids.
    pub edges: Vec<String>,
    pub child: String,
}

impl Segment {
    /// The edge this segment selects when clicked. Junction infrastructure
    /// (bus and child leg) belongs to the child, not to any single edge.
    pub fn selectable_edge(&self) -> Option<&str> {
        match self.kind {
            SegmentKind::Straight | SegmentKind::ParentLeg => self.edges.first().map(String::as_str),
            SegmentKind::Bus | SegmentKind::ChildLeg => None,
        }
    }

    pub fn is_junction(&self) -> bool {
        !matches!(self.kind, SegmentKind::Straight)
    }

    pub fn points(&self) -> [(f32, f32); 2] {
        [self.from, self.to]
    }

    pub fn length(&self) -> f32 {
        let dx = self.to.0 - self.from.0;
        let dy = self.to.1 - self.from.1;
        (dx * dx + dy * dy).sqrt()
    }

    /// Shortest distance from `point` to this segment.
    pub fn distance_to(&self, point: (f32, f32)) -> f32 {
        distance_to_line(self.from, self.to, point)
    }
}

/// Shortest distance from `point` to the line segment `from`..`to`.
pub fn distance_to_line(from: (f32, f32), to: (f32, f32), point: (f32, f32)) -> f32 {
    let (ax, ay) = from;
    let (bx, by) = to;
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((point.0 - ax) * dx + (point.1 - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let px = ax + t * dx - point.0;
    let py = ay + t * dy - point.1;
    (px * px + py * py).sqrt()
}

/// Routed geometry for a whole edge set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Routes {
    pub segments: Vec<Segment>,
}

impl Routes {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn for_edge<'a>(&'a self, edge_id: &'a str) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments
            .iter()
            .filter(move |segment| segment.edges.iter().any(|id| id == edge_id))
    }

    pub fn for_child<'a>(&'a self, child_id: &'a str) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments
            .iter()
            .filter(move |segment| segment.child == child_id)
    }

    /// True when the edge was drawn as a leg of a T-junction.
    pub fn in_junction(&self, edge_id: &str) -> bool {
        self.for_edge(edge_id)
            .any(|segment| segment.kind == SegmentKind::ParentLeg)
    }

    pub fn by_kind(&self, kind: SegmentKind) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |segment| segment.kind == kind)
    }
}

/// Anchors of every person in the document, keyed by person id.
pub fn node_anchors(data: &DiagramData) -> HashMap<String, Anchor> {
    data.nodes
        .iter()
        .map(|person| {
            let (x, y) = person.anchor();
            (
                person.id.clone(),
                Anchor {
                    x,
                    y,
                    height: person.derived_height(),
                },
            )
        })
        .collect()
}

/// Routes every edge of the document from its current anchors.
///
/// A child with one incoming edge gets a straight segment. Two or more
/// resolvable parents share a T-junction: a leg per parent down to a bus and
/// one leg from the bus midpoint to the child.
pub fn route_document(data: &DiagramData) -> Routes {
    route_edges(&data.edges, &node_anchors(data))
}

pub fn route_edges(edges: &[Edge], anchors: &HashMap<String, Anchor>) -> Routes {
    let mut routes = Routes::default();
    for (child, incoming) in group_by_child(edges) {
        if incoming.len() >= 2 {
            route_junction(child, &incoming, anchors, &mut routes);
        } else {
            for edge in incoming {
                route_straight(edge, anchors, &mut routes);
            }
        }
    }
    routes
}

/// Groups edges by child id, keeping first-appearance order of children and
/// edge order within each child.
fn group_by_child(edges: &[Edge]) -> Vec<(&str, Vec<&Edge>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&Edge>)> = Vec::new();
    for edge in edges {
        let slot = *index.entry(edge.to.as_str()).or_insert_with(|| {
            groups.push((edge.to.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(edge);
    }
    groups
}

fn route_straight(edge: &Edge, anchors: &HashMap<String, Anchor>, routes: &mut Routes) {
    let (Some(parent), Some(child)) = (anchors.get(&edge.from), anchors.get(&edge.to)) else {
        debug!(
            "event=route module=routing status=skipped reason=unresolved_endpoint edge={}",
            edge.id
        );
        return;
    };
    routes.segments.push(Segment {
        id: edge.id.clone(),
        kind: SegmentKind::Straight,
        from: parent.point(),
        to: child.point(),
        style: edge.line_style,
        edges: vec![edge.id.clone()],
        child: edge.to.clone(),
    });
}

fn route_junction(
    child_id: &str,
    incoming: &[&Edge],
    anchors: &HashMap<String, Anchor>,
    routes: &mut Routes,
) {
    let Some(child) = anchors.get(child_id) else {
        debug!("event=route module=routing status=skipped reason=unresolved_child child={child_id}");
        return;
    };

    let parents: Vec<(&Edge, Anchor)> = incoming
        .iter()
        .filter_map(|edge| anchors.get(&edge.from).map(|anchor| (*edge, *anchor)))
        .collect();
    if parents.len() < 2 {
        debug!(
            "event=route module=routing status=fallback reason=junction_underflow child={child_id} parents={}",
            parents.len()
        );
        for (edge, _) in parents {
            route_straight(edge, anchors, routes);
        }
        return;
    }

    let avg_parent_y = parents.iter().map(|(_, anchor)| anchor.y).sum::<f32>() / parents.len() as f32;
    let min_parent_x = parents
        .iter()
        .map(|(_, anchor)| anchor.x)
        .fold(f32::INFINITY, f32::min);
    let max_parent_x = parents
        .iter()
        .map(|(_, anchor)| anchor.x)
        .fold(f32::NEG_INFINITY, f32::max);
    let junction_x = (min_parent_x + max_parent_x) / 2.0;
    let junction_y = avg_parent_y + JUNCTION_DROP_RATIO * (child.y - avg_parent_y);

    let member_ids: Vec<String> = parents.iter().map(|(edge, _)| edge.id.clone()).collect();

    routes.segments.push(Segment {
        id: format!("junction_h_{child_id}"),
        kind: SegmentKind::Bus,
        from: (min_parent_x, junction_y),
        to: (max_parent_x, junction_y),
        style: LineStyle::Solid,
        edges: member_ids.clone(),
        child: child_id.to_string(),
    });
    routes.segments.push(Segment {
        id: format!("junction_v_{child_id}"),
        kind: SegmentKind::ChildLeg,
        from: (junction_x, junction_y),
        to: child.point(),
        style: LineStyle::Solid,
        edges: member_ids,
        child: child_id.to_string(),
    });
    for (edge, anchor) in parents {
        routes.segments.push(Segment {
            id: edge.id.clone(),
            kind: SegmentKind::ParentLeg,
            from: anchor.point(),
            to: (anchor.x, junction_y),
            style: edge.line_style,
            edges: vec![edge.id.clone()],
            child: child_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(x: f32, y: f32) -> Anchor {
        Anchor { x, y, height: 220.0 }
    }

    fn anchors(entries: &[(&str, f32, f32)]) -> HashMap<String, Anchor> {
        entries
            .iter()
            .map(|(id, x, y)| (id.to_string(), anchor(*x, *y)))
            .collect()
    }

    #[test]
    fn single_parent_is_one_straight_segment() {
        let anchors = anchors(&[("p", 10.0, 20.0), ("c", 30.0, 200.0)]);
        let edges = vec![Edge::new("e1", "p", "c", LineStyle::Dashed)];
        let routes = route_edges(&edges, &anchors);
        assert_eq!(routes.len(), 1);
        let segment = &routes.segments[0];
        assert_eq!(segment.kind, SegmentKind::Straight);
        assert_eq!(segment.points(), [(10.0, 20.0), (30.0, 200.0)]);
        assert_eq!(segment.style.dash(), Some([10.0, 5.0]));
        assert_eq!(segment.selectable_edge(), Some("e1"));
    }

    #[test]
    fn two_parents_form_t_junction() {
        let anchors = anchors(&[("mum", 100.0, 50.0), ("dad", 300.0, 50.0), ("kid", 200.0, 150.0)]);
        let edges = vec![
            Edge::new("e1", "mum", "kid", LineStyle::Solid),
            Edge::new("e2", "dad", "kid", LineStyle::Dashed),
        ];
        let routes = route_edges(&edges, &anchors);
        assert_eq!(routes.len(), 4);

        let bus: Vec<_> = routes.by_kind(SegmentKind::Bus).collect();
        assert_eq!(bus.len(), 1);
        assert_eq!(bus[0].points(), [(100.0, 100.0), (300.0, 100.0)]);
        assert_eq!(bus[0].id, "junction_h_kid");
        assert_eq!(bus[0].selectable_edge(), None);

        let child_leg: Vec<_> = routes.by_kind(SegmentKind::ChildLeg).collect();
        assert_eq!(child_leg.len(), 1);
        assert_eq!(child_leg[0].points(), [(200.0, 100.0), (200.0, 150.0)]);

        let legs: Vec<_> = routes.by_kind(SegmentKind::ParentLeg).collect();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].points(), [(100.0, 50.0), (100.0, 100.0)]);
        assert_eq!(legs[0].style, LineStyle::Solid);
        assert_eq!(legs[1].points(), [(300.0, 50.0), (300.0, 100.0)]);
        assert_eq!(legs[1].style, LineStyle::Dashed);
        assert!(routes.in_junction("e2"));
    }

    #[test]
    fn junction_uses_mean_height_and_extreme_x() {
        let anchors = anchors(&[
            ("a", 0.0, 0.0),
            ("b", 500.0, 60.0),
            ("c", 200.0, 30.0),
            ("kid", 100.0, 230.0),
        ]);
        let edges = vec![
            Edge::new("e1", "a", "kid", LineStyle::Solid),
            Edge::new("e2", "b", "kid", LineStyle::Solid),
            Edge::new("e3", "c", "kid", LineStyle::Solid),
        ];
        let routes = route_edges(&edges, &anchors);
        // avg y = 30, junction y = 30 + 0.5 * (230 - 30) = 130
        let bus = routes.by_kind(SegmentKind::Bus).next().unwrap();
        assert_eq!(bus.points(), [(0.0, 130.0), (500.0, 130.0)]);
        let child_leg = routes.by_kind(SegmentKind::ChildLeg).next().unwrap();
        assert_eq!(child_leg.from, (250.0, 130.0));
        assert_eq!(routes.by_kind(SegmentKind::ParentLeg).count(), 3);
        assert_eq!(bus.edges, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn junction_underflow_falls_back_to_straight() {
        let anchors = anchors(&[("mum", 100.0, 50.0), ("kid", 200.0, 150.0)]);
        let edges = vec![
            Edge::new("e1", "mum", "kid", LineStyle::Solid),
            Edge::new("e2", "gone", "kid", LineStyle::Dashed),
        ];
        let routes = route_edges(&edges, &anchors);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes.segments[0].kind, SegmentKind::Straight);
        assert_eq!(routes.segments[0].id, "e1");
    }

    #[test]
    fn unresolved_child_draws_nothing() {
        let anchors = anchors(&[("mum", 100.0, 50.0), ("dad", 300.0, 50.0)]);
        let edges = vec![
            Edge::new("e1", "mum", "kid", LineStyle::Solid),
            Edge::new("e2", "dad", "kid", LineStyle::Solid),
            Edge::new("e3", "mum", "dad", LineStyle::Solid),
        ];
        let routes = route_edges(&edges, &anchors);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes.segments[0].id, "e3");
    }

    #[test]
    fn duplicate_pairs_route_independently() {
        let anchors = anchors(&[("mum", 100.0, 50.0), ("kid", 200.0, 150.0)]);
        let edges = vec![
            Edge::new("e1", "mum", "kid", LineStyle::Solid),
            Edge::new("e2", "mum", "kid", LineStyle::Dashed),
        ];
        // Both edges resolve the same parent, which still counts as two legs.
        let routes = route_edges(&edges, &anchors);
        assert_eq!(routes.by_kind(SegmentKind::ParentLeg).count(), 2);
        assert_eq!(routes.by_kind(SegmentKind::Bus).count(), 1);
    }

    #[test]
    fn anchors_follow_derived_height() {
        let mut data = DiagramData::default();
        let mut parent = crate::model::Person::new("p", 0.0, 0.0, "P");
        parent.death_date = Some("1900".to_string());
        data.add_person(parent);
        data.add_person(crate::model::Person::new("c", 0.0, 400.0, "C"));
        data.add_edge(Edge::new("e", "p", "c", LineStyle::Solid));
        let routes = route_document(&data);
        assert_eq!(routes.segments[0].from, (90.0, 117.5));
        assert_eq!(routes.segments[0].to, (90.0, 510.0));
    }

    #[test]
    fn distance_to_segment() {
        let segment = Segment {
            id: "e".to_string(),
            kind: SegmentKind::Straight,
            from: (0.0, 0.0),
            to: (10.0, 0.0),
            style: LineStyle::Solid,
            edges: vec!["e".to_string()],
            child: "c".to_string(),
        };
        assert_eq!(segment.distance_to((5.0, 3.0)), 3.0);
        assert_eq!(segment.distance_to((-4.0, 3.0)), 5.0);
        assert_eq!(segment.length(), 10.0);
    }
}
