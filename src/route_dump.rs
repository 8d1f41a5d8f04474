use crate::model::DiagramData;
use crate::routing::{Routes, node_anchors};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct RouteDump {
    pub persons: Vec<PersonDump>,
    pub segments: Vec<SegmentDump>,
    pub junctions: Vec<JunctionDump>,
}

#[derive(Debug, Serialize)]
pub struct PersonDump {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct SegmentDump {
    pub id: String,
    pub kind: String,
    pub child: String,
    pub edges: Vec<String>,
    pub style: String,
    pub points: Vec<[f32; 2]>,
}

/// One T-junction: the parents sharing a child and the bus between them.
#[derive(Debug, Serialize)]
pub struct JunctionDump {
    pub child: String,
    pub parents: Vec<String>,
    pub bus_y: f32,
}

impl RouteDump {
    pub fn from_routes(routes: &Routes, data: &DiagramData) -> Self {
        let anchors = node_anchors(data);
        let mut persons: Vec<PersonDump> = anchors
            .iter()
            .map(|(id, anchor)| PersonDump {
                id: id.clone(),
                x: anchor.x,
                y: anchor.y,
                height: anchor.height,
            })
            .collect();
        persons.sort_by(|a, b| a.id.cmp(&b.id));

        let segments = routes
            .segments
            .iter()
            .map(|segment| SegmentDump {
                id: segment.id.clone(),
                kind: segment.kind.as_str().to_string(),
                child: segment.child.clone(),
                edges: segment.edges.clone(),
                style: segment.style.as_str().to_string(),
                points: segment.points().iter().map(|(x, y)| [*x, *y]).collect(),
            })
            .collect();

        let junctions = routes
            .by_kind(crate::routing::SegmentKind::Bus)
            .map(|bus| {
                let mut parents: Vec<String> = routes
                    .for_child(&bus.child)
                    .filter(|segment| segment.kind == crate::routing::SegmentKind::ParentLeg)
                    .filter_map(|segment| data.edge(&segment.id).map(|edge| edge.from.clone()))
                    .collect();
                parents.sort();
                JunctionDump {
                    child: bus.child.clone(),
                    parents,
                    bus_y: bus.from.1,
                }
            })
            .collect();

        RouteDump {
            persons,
            segments,
            junctions,
        }
    }
}

pub fn write_route_dump(path: &Path, routes: &Routes, data: &DiagramData) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = RouteDump::from_routes(routes, data);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
