use serde::Serialize;

use crate::routing::SegmentKind;

/// Named position inside an entity group. Lets hosts and tests find a
/// specific sub-element without relying on child order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Card,
    Photo,
    PhotoPlaceholder,
    PhotoIcon,
    Name,
    BirthDate,
    BirthLocation,
    DeathDate,
    BurialLocation,
    Glyph,
    NoteBackground,
    NoteText,
    ResizeHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RectShape {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fill: String,
    pub stroke: Option<String>,
    pub stroke_width: f32,
    pub corner_radius: f32,
    pub shadow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextShape {
    pub x: f32,
    pub y: f32,
    /// Wrapping/alignment box width; `None` for unbounded text.
    pub width: Option<f32>,
    /// Clip height; text beyond it is not drawn.
    pub height: Option<f32>,
    pub text: String,
    pub font_size: f32,
    pub bold: bool,
    pub fill: String,
    pub align: TextAlign,
    pub wrap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageShape {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub href: String,
    pub corner_radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineShape {
    pub points: Vec<(f32, f32)>,
    pub stroke: String,
    pub stroke_width: f32,
    pub dash: Option<[f32; 2]>,
    pub round_cap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    Rect(RectShape),
    Text(TextShape),
    Image(ImageShape),
    Line(LineShape),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Primitive {
    pub slot: Slot,
    #[serde(flatten)]
    pub shape: Shape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Person,
    Emoji,
    Note,
}

/// Drawable mirror of one document entity. Children are positioned relative
/// to the group origin `(x, y)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawGroup {
    pub id: String,
    pub kind: GroupKind,
    pub x: f32,
    pub y: f32,
    /// Hit box size.
    pub width: f32,
    pub height: f32,
    pub draggable: bool,
    pub selected: bool,
    pub children: Vec<Primitive>,
}

impl DrawGroup {
    pub fn child(&self, slot: Slot) -> Option<&Primitive> {
        self.children.iter().find(|child| child.slot == slot)
    }

    pub fn text(&self, slot: Slot) -> Option<&str> {
        match self.child(slot).map(|child| &child.shape) {
            Some(Shape::Text(text)) => Some(text.text.as_str()),
            _ => None,
        }
    }

    pub fn contains(&self, point: (f32, f32)) -> bool {
        point.0 >= self.x
            && point.0 <= self.x + self.width
            && point.1 >= self.y
            && point.1 <= self.y + self.height
    }

    /// True when `point` (document space) lies on this group's resize handle.
    pub fn on_resize_handle(&self, point: (f32, f32)) -> bool {
        let Some(Primitive {
            shape: Shape::Rect(handle),
            ..
        }) = self.child(Slot::ResizeHandle)
        else {
            return false;
        };
        let local = (point.0 - self.x, point.1 - self.y);
        local.0 >= handle.x
            && local.0 <= handle.x + handle.width
            && local.1 >= handle.y
            && local.1 <= handle.y + handle.height
    }
}

/// Drawable mirror of one routed connector segment, in document space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connector {
    pub id: String,
    pub kind: SegmentKind,
    pub edges: Vec<String>,
    pub child: String,
    /// Edge selected by clicking this connector, if any.
    pub selectable_edge: Option<String>,
    pub selected: bool,
    pub line: LineShape,
}

/// Result of hit-testing a document-space point, topmost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", content = "id", rename_all = "snake_case")]
pub enum Hit {
    Canvas,
    Person(String),
    Decoration(String),
    ResizeHandle(String),
    Edge(String),
    /// Junction infrastructure of the given child; not an edge.
    Junction(String),
}
