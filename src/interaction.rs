use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::model::{
    CARD_WIDTH, Decoration, DiagramData, Edge, Emoji, LineStyle, Note, Person, PersonPatch, Tree,
    DEFAULT_PERSON_NAME, NOTE_DEFAULT_HEIGHT, NOTE_DEFAULT_WIDTH, CARD_BASE_HEIGHT, clamp_note_size,
    new_entity_id,
};
use crate::routing::{Routes, node_anchors, route_edges};
use crate::scene::{EMOJI_SIZE, Hit, LINE_HIT_TOLERANCE, RenderContext, Scene};
use crate::theme::Theme;
use crate::viewport::Viewport;

// ── Status messages ─────────────────────────────────────────────────
pub const STATUS_NO_TREE: &str = "Please select or create a tree first";
pub const STATUS_CONNECT_START: &str = "Click two people to connect";
pub const STATUS_CONNECT_SECOND: &str = "Click second person to complete connection";
pub const STATUS_CONNECTED: &str = "Connection created";
pub const STATUS_UNSAVED: &str = "Unsaved changes";
pub const STATUS_PHOTO_UPLOADED: &str = "Photo uploaded";

/// Offset between consecutive additions so new entities do not stack exactly.
const PLACEMENT_STAGGER: f32 = 30.0;
const PLACEMENT_CYCLE: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    Select,
    /// Two-click edge handshake; `from` is the parent picked by the first click.
    Connect { from: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    None,
    Person(String),
    Decoration(String),
    Edge(String),
}

impl Selection {
    pub fn id(&self) -> Option<&str> {
        match self {
            Selection::None => None,
            Selection::Person(id) | Selection::Decoration(id) | Selection::Edge(id) => Some(id),
        }
    }
}

/// Pointer gesture in progress between press and release.
#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Idle,
    DraggingPerson {
        id: String,
        /// Pointer minus entity origin, in document units.
        grab: (f32, f32),
        position: (f32, f32),
        moved: bool,
    },
    DraggingDecoration {
        id: String,
        grab: (f32, f32),
        position: (f32, f32),
        moved: bool,
    },
    Panning {
        last: (f32, f32),
    },
    Resizing {
        id: String,
        start_pointer: (f32, f32),
        start_size: (f32, f32),
        size: (f32, f32),
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Delete,
    Escape,
}

/// Typed events emitted by the host surface. Pointer positions are in screen
/// pixels relative to the drawing surface.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp { x: f32, y: f32 },
    Wheel { x: f32, y: f32, delta_y: f32 },
    ZoomIn,
    ZoomOut,
    ResetZoom,
    Pan { dx: f32, dy: f32 },
    ResizeViewport { width: f32, height: f32 },
    ToggleConnectMode,
    SetLineStyleSetting { style: LineStyle },
    AddPerson,
    AddNote,
    AddEmoji { symbol: String },
    EditPerson { id: String, patch: PersonPatch },
    EditNoteText { id: String, text: String },
    SetEdgeStyle { id: String, style: LineStyle },
    DeleteSelection,
    Key { key: Key },
    PhotoUploaded { person: String, url: String },
    /// Intrinsic size of a loaded photo, used to letter-box it on cards.
    ImageLoaded { url: String, width: f32, height: f32 },
}

/// Property panel the host should show for the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "panel", rename_all = "snake_case")]
pub enum Panel {
    Person { person: Person },
    Note { id: String, text: String },
    Emoji { id: String, symbol: String },
    LineStyle { edge: String, style: LineStyle },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    Redraw,
    OpenPanel(Panel),
    ClosePanel,
    /// Replace the status line; an empty message clears it.
    Status { message: String },
}

/// Collects effects, keeping at most one `Redraw`.
#[derive(Debug, Default)]
struct Effects(Vec<Effect>);

impl Effects {
    fn redraw(&mut self) {
        if !self.0.contains(&Effect::Redraw) {
            self.0.push(Effect::Redraw);
        }
    }

    fn push(&mut self, effect: Effect) {
        self.0.push(effect);
    }
}

/// The whole editor state: the open tree plus everything the UI derives from it.
#[derive(Debug, Clone)]
pub struct AppState {
    tree: Option<Tree>,
    viewport: Viewport,
    mode: Mode,
    gesture: Gesture,
    selection: Selection,
    line_style_setting: LineStyle,
    dirty: bool,
    revision: u64,
    status: String,
    theme: Theme,
    routes: Routes,
    scene: Scene,
    image_sizes: HashMap<String, (f32, f32)>,
    placements: u32,
}

impl AppState {
    pub fn new(theme: Theme, viewport: Viewport) -> Self {
        Self {
            tree: None,
            viewport,
            mode: Mode::Select,
            gesture: Gesture::Idle,
            selection: Selection::None,
            line_style_setting: LineStyle::Solid,
            dirty: false,
            revision: 0,
            status: String::new(),
            theme,
            routes: Routes::default(),
            scene: Scene::default(),
            image_sizes: HashMap::new(),
            placements: 0,
        }
    }

    /// Replaces the open tree, restoring its saved viewport and rebuilding the scene.
    pub fn open(&mut self, tree: Tree) {
        info!(
            "event=open_tree module=interaction status=ok id={} nodes={} edges={} decorations={}",
            tree.id,
            tree.data.nodes.len(),
            tree.data.edges.len(),
            tree.data.decorations.len()
        );
        self.viewport.restore(&tree.data.viewport);
        self.tree = Some(tree);
        self.reset_interaction();
        self.dirty = false;
        self.rebuild();
    }

    /// Closes the open tree and returns it.
    pub fn close(&mut self) -> Option<Tree> {
        let tree = self.tree.take();
        self.reset_interaction();
        self.dirty = false;
        self.rebuild();
        tree
    }

    fn reset_interaction(&mut self) {
        self.mode = Mode::Select;
        self.gesture = Gesture::Idle;
        self.selection = Selection::None;
        self.placements = 0;
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    pub fn data(&self) -> Option<&DiagramData> {
        self.tree.as_ref().map(|tree| &tree.data)
    }

    /// Copy of the open tree with the current viewport stored into its data,
    /// ready to hand to the persistence gateway.
    pub fn snapshot(&mut self) -> Option<Tree> {
        let state = self.viewport.state();
        let tree = self.tree.as_mut()?;
        tree.data.viewport = state;
        Some(tree.clone())
    }

    pub fn rename(&mut self, name: impl Into<String>) -> bool {
        match self.tree.as_mut() {
            Some(tree) => {
                tree.name = name.into();
                self.mark_dirty_quietly();
                true
            }
            None => false,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn line_style_setting(&self) -> LineStyle {
        self.line_style_setting
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Increases on every structural mutation; lets a scheduler detect new edits.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Clears the dirty flag after a successful save.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Sets the status line and returns the matching effect.
    pub fn set_status(&mut self, message: impl Into<String>) -> Effect {
        self.status = message.into();
        Effect::Status {
            message: self.status.clone(),
        }
    }

    pub fn dispatch(&mut self, event: UiEvent) -> Vec<Effect> {
        let mut effects = Effects::default();
        match event {
            UiEvent::PointerDown { x, y } => self.pointer_down((x, y), &mut effects),
            UiEvent::PointerMove { x, y } => self.pointer_move((x, y), &mut effects),
            UiEvent::PointerUp { x, y } => self.pointer_up((x, y), &mut effects),
            UiEvent::Wheel { x, y, delta_y } => {
                self.viewport.wheel(delta_y, (x, y));
                effects.redraw();
            }
            UiEvent::ZoomIn => {
                self.viewport.zoom_in();
                effects.redraw();
            }
            UiEvent::ZoomOut => {
                self.viewport.zoom_out();
                effects.redraw();
            }
            UiEvent::ResetZoom => {
                self.viewport.reset();
                effects.redraw();
            }
            UiEvent::Pan { dx, dy } => {
                self.viewport.pan((dx, dy));
                effects.redraw();
            }
            UiEvent::ResizeViewport { width, height } => {
                self.viewport.resize(width, height);
                effects.redraw();
            }
            UiEvent::ToggleConnectMode => self.toggle_connect_mode(&mut effects),
            UiEvent::SetLineStyleSetting { style } => self.line_style_setting = style,
            UiEvent::AddPerson => self.add_person(&mut effects),
            UiEvent::AddNote => self.add_note(&mut effects),
            UiEvent::AddEmoji { symbol } => self.add_emoji(symbol, &mut effects),
            UiEvent::EditPerson { id, patch } => self.edit_person(&id, patch, &mut effects),
            UiEvent::EditNoteText { id, text } => self.edit_note_text(&id, text, &mut effects),
            UiEvent::SetEdgeStyle { id, style } => self.set_edge_style(&id, style, &mut effects),
            UiEvent::DeleteSelection | UiEvent::Key { key: Key::Delete } => {
                self.delete_selection(&mut effects)
            }
            UiEvent::Key { key: Key::Escape } => {
                if matches!(self.mode, Mode::Connect { .. }) {
                    self.exit_connect_mode(&mut effects);
                    effects.push(self.set_status(""));
                } else {
                    self.select(Selection::None, &mut effects);
                }
            }
            UiEvent::PhotoUploaded { person, url } => self.photo_uploaded(&person, url, &mut effects),
            UiEvent::ImageLoaded { url, width, height } => {
                self.image_sizes.insert(url.clone(), (width, height));
                let ids: Vec<String> = self
                    .data()
                    .map(|data| {
                        data.nodes
                            .iter()
                            .filter(|person| person.photo_ref.as_deref() == Some(url.as_str()))
                            .map(|person| person.id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for id in &ids {
                    self.refresh_person(id);
                }
                if !ids.is_empty() {
                    effects.redraw();
                }
            }
        }
        effects.0
    }

    // ── Pointer handling ────────────────────────────────────────────

    fn pointer_down(&mut self, screen: (f32, f32), effects: &mut Effects) {
        let point = self.viewport.to_document(screen);
        let hit = self
            .scene
            .hit_test(point, LINE_HIT_TOLERANCE / self.viewport.scale);

        if let Mode::Connect { from } = &self.mode {
            match hit {
                Hit::Person(id) => match from {
                    None => {
                        self.mode = Mode::Connect { from: Some(id) };
                        effects.push(self.set_status(STATUS_CONNECT_SECOND));
                    }
                    Some(from) if *from == id => {}
                    Some(from) => {
                        let from = from.clone();
                        self.connect(from, id, effects);
                    }
                },
                Hit::Canvas => self.gesture = Gesture::Panning { last: screen },
                _ => {}
            }
            return;
        }

        match hit {
            Hit::Person(id) => {
                let Some(person) = self.data().and_then(|data| data.person(&id)) else {
                    return;
                };
                let origin = (person.x, person.y);
                self.select(Selection::Person(id.clone()), effects);
                if self.is_draggable(&id) {
                    self.gesture = Gesture::DraggingPerson {
                        id,
                        grab: (point.0 - origin.0, point.1 - origin.1),
                        position: origin,
                        moved: false,
                    };
                }
            }
            Hit::Decoration(id) => {
                let Some(origin) = self
                    .data()
                    .and_then(|data| data.decoration(&id))
                    .map(Decoration::position)
                else {
                    return;
                };
                self.select(Selection::Decoration(id.clone()), effects);
                // Decorations overlap freely; the grabbed one comes to the front.
                self.scene.raise(&id);
                if self.is_draggable(&id) {
                    self.gesture = Gesture::DraggingDecoration {
                        id,
                        grab: (point.0 - origin.0, point.1 - origin.1),
                        position: origin,
                        moved: false,
                    };
                }
            }
            Hit::ResizeHandle(id) => {
                let Some(Decoration::Note(note)) = self.data().and_then(|data| data.decoration(&id)) else {
                    return;
                };
                let size = (note.width, note.height);
                self.select(Selection::Decoration(id.clone()), effects);
                self.scene.set_draggable(&id, false);
                self.gesture = Gesture::Resizing {
                    id,
                    start_pointer: screen,
                    start_size: size,
                    size,
                };
            }
            Hit::Edge(id) => self.select(Selection::Edge(id), effects),
            // Junction infrastructure belongs to no single edge.
            Hit::Junction(_) => self.select(Selection::None, effects),
            Hit::Canvas => {
                self.select(Selection::None, effects);
                self.gesture = Gesture::Panning { last: screen };
            }
        }
    }

    fn pointer_move(&mut self, screen: (f32, f32), effects: &mut Effects) {
        let point = self.viewport.to_document(screen);
        match &mut self.gesture {
            Gesture::Idle => {}
            Gesture::DraggingPerson {
                id,
                grab,
                position,
                moved,
            } => {
                let next = (point.0 - grab.0, point.1 - grab.1);
                if next == *position {
                    return;
                }
                *position = next;
                *moved = true;
                let (id, position) = (id.clone(), *position);
                self.scene.move_group(&id, position.0, position.1);
                self.reroute(Some((&id, position)));
                effects.redraw();
            }
            Gesture::DraggingDecoration {
                id,
                grab,
                position,
                moved,
            } => {
                let next = (point.0 - grab.0, point.1 - grab.1);
                if next == *position {
                    return;
                }
                *position = next;
                *moved = true;
                let (id, position) = (id.clone(), *position);
                self.scene.move_group(&id, position.0, position.1);
                effects.redraw();
            }
            Gesture::Panning { last } => {
                let delta = (screen.0 - last.0, screen.1 - last.1);
                *last = screen;
                self.viewport.pan(delta);
                effects.redraw();
            }
            Gesture::Resizing {
                id,
                start_pointer,
                start_size,
                size,
            } => {
                let delta = self
                    .viewport
                    .to_document_delta((screen.0 - start_pointer.0, screen.1 - start_pointer.1));
                *size = clamp_note_size(start_size.0 + delta.0, start_size.1 + delta.1);
                let (id, size) = (id.clone(), *size);
                self.preview_note_size(&id, size);
                effects.redraw();
            }
        }
    }

    fn pointer_up(&mut self, screen: (f32, f32), effects: &mut Effects) {
        // A release without an intervening move still carries the final position.
        if !matches!(self.gesture, Gesture::Idle | Gesture::Panning { .. }) {
            self.pointer_move(screen, effects);
        }
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::DraggingPerson {
                id,
                position,
                moved: true,
                ..
            } => {
                if let Some(tree) = self.tree.as_mut() {
                    tree.data.move_person(&id, position.0, position.1);
                }
                self.reroute(None);
                self.mark_dirty(effects);
                effects.redraw();
            }
            Gesture::DraggingDecoration {
                id,
                position,
                moved: true,
                ..
            } => {
                if let Some(tree) = self.tree.as_mut() {
                    tree.data.move_decoration(&id, position.0, position.1);
                }
                self.mark_dirty(effects);
                effects.redraw();
            }
            Gesture::Resizing {
                id,
                start_size,
                size,
                ..
            } => {
                if size != start_size
                    && let Some(tree) = self.tree.as_mut()
                {
                    tree.data.resize_note(&id, size.0, size.1);
                    self.mark_dirty(effects);
                }
                self.refresh_decoration(&id);
                effects.redraw();
            }
            _ => {}
        }
    }

    fn preview_note_size(&mut self, id: &str, size: (f32, f32)) {
        let Some(Decoration::Note(note)) = self.tree.as_ref().and_then(|tree| tree.data.decoration(id)) else {
            return;
        };
        let mut preview = note.clone();
        preview.set_size(size.0, size.1);
        let ctx = RenderContext {
            selection: &self.selection,
            image_sizes: &self.image_sizes,
            theme: &self.theme,
        };
        self.scene.render_decoration(&Decoration::Note(preview), ctx);
        self.scene.set_draggable(id, false);
    }

    // ── Connect mode ────────────────────────────────────────────────

    fn toggle_connect_mode(&mut self, effects: &mut Effects) {
        match self.mode {
            Mode::Select => {
                self.mode = Mode::Connect { from: None };
                self.gesture = Gesture::Idle;
                self.sync_person_draggable();
                debug!("event=connect_mode module=interaction status=armed");
                effects.push(self.set_status(STATUS_CONNECT_START));
                effects.redraw();
            }
            Mode::Connect { .. } => {
                self.exit_connect_mode(effects);
                effects.push(self.set_status(""));
            }
        }
    }

    fn exit_connect_mode(&mut self, effects: &mut Effects) {
        if let Mode::Connect { from } = &self.mode {
            debug!(
                "event=connect_mode module=interaction status=cancelled pending={}",
                from.as_deref().unwrap_or("-")
            );
        }
        self.mode = Mode::Select;
        self.sync_person_draggable();
        effects.redraw();
    }

    fn connect(&mut self, from: String, to: String, effects: &mut Effects) {
        let edge = Edge::new(new_entity_id("edge"), from, to, self.line_style_setting);
        let edge_id = edge.id.clone();
        let added = self
            .tree
            .as_mut()
            .is_some_and(|tree| tree.data.add_edge(edge));
        self.mode = Mode::Select;
        self.sync_person_draggable();
        if added {
            info!("event=add_edge module=interaction status=ok id={edge_id}");
            self.reroute(None);
            self.mark_dirty(effects);
            effects.push(self.set_status(STATUS_CONNECTED));
        } else {
            effects.push(self.set_status(""));
        }
        effects.redraw();
    }

    fn sync_person_draggable(&mut self) {
        let draggable = self.mode == Mode::Select;
        let ids: Vec<String> = self
            .data()
            .map(|data| data.nodes.iter().map(|person| person.id.clone()).collect())
            .unwrap_or_default();
        for id in ids {
            self.scene.set_draggable(&id, draggable);
        }
    }

    fn is_draggable(&self, id: &str) -> bool {
        self.scene.group(id).is_some_and(|group| group.draggable)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Document-space origin for a new entity of the given size: centered in
    /// the visible area, staggered by the number of recent additions.
    fn next_placement(&mut self, size: (f32, f32)) -> (f32, f32) {
        let center = self.viewport.to_document(self.viewport.center());
        let step = (self.placements % PLACEMENT_CYCLE) as f32 * PLACEMENT_STAGGER;
        self.placements += 1;
        (center.0 - size.0 / 2.0 + step, center.1 - size.1 / 2.0 + step)
    }

    fn add_person(&mut self, effects: &mut Effects) {
        if self.tree.is_none() {
            effects.push(self.set_status(STATUS_NO_TREE));
            return;
        }
        let (x, y) = self.next_placement((CARD_WIDTH, CARD_BASE_HEIGHT));
        let person = Person::new(new_entity_id("person"), x, y, DEFAULT_PERSON_NAME);
        let id = person.id.clone();
        if let Some(tree) = self.tree.as_mut()
            && tree.data.add_person(person)
        {
            self.selection = Selection::Person(id.clone());
            self.rebuild();
            self.mark_dirty(effects);
            self.open_panel_for_selection(effects);
            effects.redraw();
        }
    }

    fn add_note(&mut self, effects: &mut Effects) {
        if self.tree.is_none() {
            effects.push(self.set_status(STATUS_NO_TREE));
            return;
        }
        let (x, y) = self.next_placement((NOTE_DEFAULT_WIDTH, NOTE_DEFAULT_HEIGHT));
        self.insert_decoration(Decoration::Note(Note::new(new_entity_id("note"), x, y)), effects);
    }

    fn add_emoji(&mut self, symbol: String, effects: &mut Effects) {
        if self.tree.is_none() {
            effects.push(self.set_status(STATUS_NO_TREE));
            return;
        }
        if symbol.is_empty() {
            warn!("event=add_emoji module=interaction status=skipped reason=empty_symbol");
            return;
        }
        let (x, y) = self.next_placement((EMOJI_SIZE, EMOJI_SIZE));
        let emoji = Emoji {
            id: new_entity_id("emoji"),
            x,
            y,
            symbol,
        };
        self.insert_decoration(Decoration::Emoji(emoji), effects);
    }

    fn insert_decoration(&mut self, decoration: Decoration, effects: &mut Effects) {
        let id = decoration.id().to_string();
        if let Some(tree) = self.tree.as_mut()
            && tree.data.add_decoration(decoration)
        {
            self.selection = Selection::Decoration(id);
            self.rebuild();
            self.mark_dirty(effects);
            self.open_panel_for_selection(effects);
            effects.redraw();
        }
    }

    fn edit_person(&mut self, id: &str, patch: PersonPatch, effects: &mut Effects) {
        if patch.is_empty() {
            return;
        }
        let updated = self
            .tree
            .as_mut()
            .is_some_and(|tree| tree.data.update_person(id, patch));
        if updated {
            // Height may have changed, which moves this card's anchor.
            self.refresh_person(id);
            self.reroute(None);
            self.mark_dirty(effects);
            effects.redraw();
        }
    }

    fn edit_note_text(&mut self, id: &str, text: String, effects: &mut Effects) {
        let updated = self
            .tree
            .as_mut()
            .is_some_and(|tree| tree.data.set_note_text(id, text));
        if updated {
            self.refresh_decoration(id);
            self.mark_dirty(effects);
            effects.redraw();
        }
    }

    fn set_edge_style(&mut self, id: &str, style: LineStyle, effects: &mut Effects) {
        let updated = self
            .tree
            .as_mut()
            .is_some_and(|tree| tree.data.update_edge_style(id, style));
        if !updated {
            return;
        }
        if self.routes.in_junction(id) {
            self.reroute(None);
        } else {
            for segment in self.routes.segments.iter_mut() {
                if segment.selectable_edge() == Some(id) {
                    segment.style = style;
                }
            }
            self.scene.restyle_edge(id, style);
        }
        self.mark_dirty(effects);
        if self.selection == Selection::Edge(id.to_string()) {
            self.open_panel_for_selection(effects);
        }
        effects.redraw();
    }

    fn delete_selection(&mut self, effects: &mut Effects) {
        let selection = std::mem::take(&mut self.selection);
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let deleted = match &selection {
            Selection::None => return,
            Selection::Person(id) => match tree.data.delete_person(id) {
                Some(removed) => {
                    info!(
                        "event=delete_person module=interaction status=ok id={id} cascaded_edges={}",
                        removed.len()
                    );
                    if let Mode::Connect { from } = &mut self.mode
                        && from.as_deref() == Some(id.as_str())
                    {
                        *from = None;
                    }
                    true
                }
                None => false,
            },
            Selection::Decoration(id) => tree.data.delete_decoration(id),
            Selection::Edge(id) => tree.data.delete_edge(id),
        };
        if let Some(id) = selection.id() {
            self.scene.remove_group(id);
        }
        self.gesture = Gesture::Idle;
        self.reroute(None);
        if deleted {
            self.mark_dirty(effects);
        }
        effects.push(Effect::ClosePanel);
        effects.redraw();
    }

    fn photo_uploaded(&mut self, person: &str, url: String, effects: &mut Effects) {
        let updated = self
            .tree
            .as_mut()
            .is_some_and(|tree| tree.data.set_photo(person, url));
        if updated {
            self.refresh_person(person);
            self.mark_dirty(effects);
            effects.push(self.set_status(STATUS_PHOTO_UPLOADED));
            effects.redraw();
        }
    }

    // ── Selection ───────────────────────────────────────────────────

    fn select(&mut self, selection: Selection, effects: &mut Effects) {
        let changed = self.selection != selection;
        self.selection = selection;
        if changed {
            self.apply_selection();
            effects.redraw();
        }
        match self.selection {
            Selection::None if changed => effects.push(Effect::ClosePanel),
            Selection::None => {}
            _ => self.open_panel_for_selection(effects),
        }
    }

    fn apply_selection(&mut self) {
        let Some(tree) = self.tree.as_ref() else {
            return;
        };
        let ctx = RenderContext {
            selection: &self.selection,
            image_sizes: &self.image_sizes,
            theme: &self.theme,
        };
        self.scene.apply_selection(&tree.data, &self.routes, ctx);
        self.sync_person_draggable();
    }

    fn open_panel_for_selection(&self, effects: &mut Effects) {
        let Some(data) = self.data() else {
            return;
        };
        let panel = match &self.selection {
            Selection::None => None,
            Selection::Person(id) => data.person(id).map(|person| Panel::Person {
                person: person.clone(),
            }),
            Selection::Decoration(id) => data.decoration(id).map(|decoration| match decoration {
                Decoration::Note(note) => Panel::Note {
                    id: note.id.clone(),
                    text: note.text.clone(),
                },
                Decoration::Emoji(emoji) => Panel::Emoji {
                    id: emoji.id.clone(),
                    symbol: emoji.symbol.clone(),
                },
            }),
            Selection::Edge(id) => data.edge(id).map(|edge| Panel::LineStyle {
                edge: edge.id.clone(),
                style: edge.line_style,
            }),
        };
        if let Some(panel) = panel {
            effects.push(Effect::OpenPanel(panel));
        }
    }

    // ── Dirty tracking ──────────────────────────────────────────────

    fn mark_dirty(&mut self, effects: &mut Effects) {
        self.mark_dirty_quietly();
        effects.push(self.set_status(STATUS_UNSAVED));
    }

    fn mark_dirty_quietly(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    // ── Scene maintenance ───────────────────────────────────────────

    /// Full re-route and re-render of the open tree.
    fn rebuild(&mut self) {
        match self.tree.as_ref() {
            Some(tree) => {
                self.routes = crate::routing::route_document(&tree.data);
                let ctx = RenderContext {
                    selection: &self.selection,
                    image_sizes: &self.image_sizes,
                    theme: &self.theme,
                };
                self.scene = Scene::build(&tree.data, &self.routes, ctx);
            }
            None => {
                self.routes = Routes::default();
                self.scene = Scene::default();
            }
        }
        self.sync_person_draggable();
    }

    /// Recomputes all connectors. `live` overrides one person's origin while it
    /// is being dragged and not yet committed to the document.
    fn reroute(&mut self, live: Option<(&str, (f32, f32))>) {
        let Some(tree) = self.tree.as_ref() else {
            return;
        };
        let mut anchors = node_anchors(&tree.data);
        if let Some((id, (x, y))) = live
            && let Some(anchor) = anchors.get_mut(id)
        {
            anchor.x = x + CARD_WIDTH / 2.0;
            anchor.y = y + anchor.height / 2.0;
        }
        self.routes = route_edges(&tree.data.edges, &anchors);
        let ctx = RenderContext {
            selection: &self.selection,
            image_sizes: &self.image_sizes,
            theme: &self.theme,
        };
        self.scene.set_connectors(&self.routes, ctx);
    }

    fn refresh_person(&mut self, id: &str) {
        let Some(person) = self.tree.as_ref().and_then(|tree| tree.data.person(id)) else {
            return;
        };
        let ctx = RenderContext {
            selection: &self.selection,
            image_sizes: &self.image_sizes,
            theme: &self.theme,
        };
        self.scene.render_person(person, ctx);
        self.scene.set_draggable(id, self.mode == Mode::Select);
    }

    fn refresh_decoration(&mut self, id: &str) {
        let Some(decoration) = self.tree.as_ref().and_then(|tree| tree.data.decoration(id)) else {
            return;
        };
        let ctx = RenderContext {
            selection: &self.selection,
            image_sizes: &self.image_sizes,
            theme: &self.theme,
        };
        self.scene.render_decoration(decoration, ctx);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Theme::classic(), Viewport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::SegmentKind;
    use crate::scene::Slot;

    fn family() -> Tree {
        let mut tree = Tree::new("t1", "Family");
        let data = &mut tree.data;
        data.add_person(Person::new("mum", 0.0, 0.0, "Mum"));
        data.add_person(Person::new("dad", 400.0, 0.0, "Dad"));
        data.add_person(Person::new("kid", 200.0, 400.0, "Kid"));
        data.add_edge(Edge::new("e1", "mum", "kid", LineStyle::Solid));
        data.add_decoration(Decoration::Note(Note::new("note", 800.0, 0.0)));
        data.add_decoration(Decoration::Emoji(Emoji {
            id: "star".to_string(),
            x: 800.0,
            y: 300.0,
            symbol: "\u{2B50}".to_string(),
        }));
        tree
    }

    fn state() -> AppState {
        let mut state = AppState::new(Theme::classic(), Viewport::new(1000.0, 800.0));
        state.open(family());
        state
    }

    fn click(state: &mut AppState, x: f32, y: f32) -> Vec<Effect> {
        let mut effects = state.dispatch(UiEvent::PointerDown { x, y });
        effects.extend(state.dispatch(UiEvent::PointerUp { x, y }));
        effects
    }

    fn edge_ids(state: &AppState) -> Vec<String> {
        state
            .data()
            .unwrap()
            .edges
            .iter()
            .map(|edge| edge.id.clone())
            .collect()
    }

    #[test]
    fn connect_mode_cancelled_leaves_edges() {
        let mut state = state();
        state.dispatch(UiEvent::ToggleConnectMode);
        click(&mut state, 50.0, 50.0);
        assert_eq!(
            state.mode(),
            &Mode::Connect {
                from: Some("mum".to_string())
            }
        );
        state.dispatch(UiEvent::ToggleConnectMode);
        assert_eq!(state.mode(), &Mode::Select);
        assert_eq!(edge_ids(&state), vec!["e1"]);
        assert!(!state.is_dirty());
    }

    #[test]
    fn connect_handshake_creates_edge() {
        let mut state = state();
        state.dispatch(UiEvent::SetLineStyleSetting {
            style: LineStyle::Dashed,
        });
        state.dispatch(UiEvent::ToggleConnectMode);
        assert_eq!(state.status(), STATUS_CONNECT_START);
        assert!(!state.scene().group("mum").unwrap().draggable);

        click(&mut state, 450.0, 50.0);
        // Same node again is a no-op.
        click(&mut state, 460.0, 60.0);
        assert_eq!(
            state.mode(),
            &Mode::Connect {
                from: Some("dad".to_string())
            }
        );

        let effects = click(&mut state, 250.0, 450.0);
        assert_eq!(state.mode(), &Mode::Select);
        assert!(state.is_dirty());
        assert!(effects.contains(&Effect::Status {
            message: STATUS_CONNECTED.to_string()
        }));
        let data = state.data().unwrap();
        let edge = data.edges.last().unwrap();
        assert_eq!((edge.from.as_str(), edge.to.as_str()), ("dad", "kid"));
        assert_eq!(edge.line_style, LineStyle::Dashed);
        // Kid now has two parents.
        assert_eq!(state.routes().by_kind(SegmentKind::Bus).count(), 1);
        assert!(state.scene().group("mum").unwrap().draggable);
    }

    #[test]
    fn grabbed_decoration_comes_to_front() {
        let mut state = state();
        assert_eq!(state.scene().groups.last().unwrap().id, "star");
        click(&mut state, 810.0, 10.0);
        assert_eq!(state.selection(), &Selection::Decoration("note".to_string()));
        assert_eq!(state.scene().groups.last().unwrap().id, "note");
    }

    #[test]
    fn clicking_person_selects_and_opens_editor() {
        let mut state = state();
        let effects = click(&mut state, 10.0, 10.0);
        assert_eq!(state.selection(), &Selection::Person("mum".to_string()));
        assert!(effects.iter().any(|effect| matches!(
            effect,
            Effect::OpenPanel(Panel::Person { person }) if person.id == "mum"
        )));
        assert!(state.scene().group("mum").unwrap().selected);

        let effects = click(&mut state, 700.0, 700.0);
        assert_eq!(state.selection(), &Selection::None);
        assert!(effects.contains(&Effect::ClosePanel));
        assert!(!state.scene().group("mum").unwrap().selected);
        // A click is not a move.
        assert!(!state.is_dirty());
    }

    #[test]
    fn dragging_person_reroutes_live_and_commits_on_release() {
        let mut state = state();
        state.dispatch(UiEvent::PointerDown { x: 10.0, y: 10.0 });
        state.dispatch(UiEvent::PointerMove { x: 60.0, y: 30.0 });
        assert_eq!(state.data().unwrap().person("mum").unwrap().x, 0.0);
        let straight = &state.routes().segments[0];
        assert_eq!(straight.from, (140.0, 130.0));

        state.dispatch(UiEvent::PointerUp { x: 110.0, y: 10.0 });
        let mum = state.data().unwrap().person("mum").unwrap();
        assert_eq!((mum.x, mum.y), (100.0, 0.0));
        assert_eq!(state.routes().segments[0].from, (190.0, 110.0));
        assert!(state.is_dirty());
        assert_eq!(state.status(), STATUS_UNSAVED);
    }

    #[test]
    fn note_resize_clamps_and_keeps_origin() {
        let mut state = state();
        state.dispatch(UiEvent::ZoomIn);
        let handle = state.viewport().to_screen((800.0 + 175.0, 95.0));
        state.dispatch(UiEvent::PointerDown {
            x: handle.0,
            y: handle.1,
        });
        assert!(!state.scene().group("note").unwrap().draggable);
        state.dispatch(UiEvent::PointerMove {
            x: handle.0 - 5000.0,
            y: handle.1 - 5000.0,
        });
        assert_eq!(state.scene().group("note").unwrap().width, 100.0);
        state.dispatch(UiEvent::PointerUp {
            x: handle.0 - 5000.0,
            y: handle.1 - 5000.0,
        });
        match state.data().unwrap().decoration("note").unwrap() {
            Decoration::Note(note) => {
                assert_eq!((note.width, note.height), (100.0, 60.0));
                assert_eq!((note.x, note.y), (800.0, 0.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(state.scene().group("note").unwrap().draggable);
        assert!(state.is_dirty());
    }

    #[test]
    fn resize_delta_scales_with_zoom() {
        let mut state = state();
        state.dispatch(UiEvent::ResetZoom);
        state.dispatch(UiEvent::Wheel {
            x: 0.0,
            y: 0.0,
            delta_y: -1.0,
        });
        let scale = state.viewport().scale;
        let handle = state.viewport().to_screen((975.0, 95.0));
        state.dispatch(UiEvent::PointerDown {
            x: handle.0,
            y: handle.1,
        });
        state.dispatch(UiEvent::PointerUp {
            x: handle.0 + 21.0 * scale,
            y: handle.1 + 42.0 * scale,
        });
        match state.data().unwrap().decoration("note").unwrap() {
            Decoration::Note(note) => {
                assert!((note.width - 201.0).abs() < 1e-3);
                assert!((note.height - 142.0).abs() < 1e-3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn delete_person_cascades() {
        let mut state = state();
        click(&mut state, 250.0, 450.0);
        let effects = state.dispatch(UiEvent::Key { key: Key::Delete });
        assert!(effects.contains(&Effect::ClosePanel));
        assert!(edge_ids(&state).is_empty());
        assert!(state.scene().group("kid").is_none());
        assert!(state.scene().connectors.is_empty());
        assert_eq!(state.selection(), &Selection::None);
        assert!(state.is_dirty());
    }

    #[test]
    fn edge_style_change_restyles_line() {
        let mut state = state();
        // Straight segment from (90, 110) to (290, 510).
        click(&mut state, 190.0, 310.0);
        assert_eq!(state.selection(), &Selection::Edge("e1".to_string()));
        state.dispatch(UiEvent::SetEdgeStyle {
            id: "e1".to_string(),
            style: LineStyle::Dashed,
        });
        assert_eq!(state.data().unwrap().edge("e1").unwrap().line_style, LineStyle::Dashed);
        assert_eq!(state.scene().connectors[0].line.dash, Some([10.0, 5.0]));
        assert_eq!(state.routes().segments[0].style, LineStyle::Dashed);
    }

    #[test]
    fn person_edit_rerenders_card() {
        let mut state = state();
        state.dispatch(UiEvent::EditPerson {
            id: "mum".to_string(),
            patch: PersonPatch {
                death_date: Some("1990".to_string()),
                ..Default::default()
            },
        });
        let group = state.scene().group("mum").unwrap();
        assert_eq!(group.height, 235.0);
        assert_eq!(group.text(Slot::DeathDate), Some("Death: 1990"));
        assert_eq!(state.routes().segments[0].from, (90.0, 117.5));
    }

    #[test]
    fn add_commands_need_a_tree() {
        let mut state = AppState::default();
        let effects = state.dispatch(UiEvent::AddPerson);
        assert_eq!(
            effects,
            vec![Effect::Status {
                message: STATUS_NO_TREE.to_string()
            }]
        );
        assert!(state.data().is_none());
    }

    #[test]
    fn additions_are_staggered_and_selected() {
        let mut state = state();
        state.dispatch(UiEvent::AddNote);
        state.dispatch(UiEvent::AddNote);
        let data = state.data().unwrap();
        let notes: Vec<_> = data.decorations.iter().skip(2).map(Decoration::position).collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0], (410.0, 350.0));
        assert_eq!(notes[1], (440.0, 380.0));
        assert!(matches!(state.selection(), Selection::Decoration(id) if id.starts_with("note_")));
    }

    #[test]
    fn escape_cancels_then_deselects() {
        let mut state = state();
        click(&mut state, 820.0, 320.0);
        assert_eq!(state.selection(), &Selection::Decoration("star".to_string()));
        state.dispatch(UiEvent::ToggleConnectMode);
        state.dispatch(UiEvent::Key { key: Key::Escape });
        assert_eq!(state.mode(), &Mode::Select);
        assert_eq!(state.selection(), &Selection::Decoration("star".to_string()));
        state.dispatch(UiEvent::Key { key: Key::Escape });
        assert_eq!(state.selection(), &Selection::None);
    }

    #[test]
    fn canvas_drag_pans() {
        let mut state = state();
        state.dispatch(UiEvent::PointerDown { x: 700.0, y: 700.0 });
        state.dispatch(UiEvent::PointerMove { x: 720.0, y: 690.0 });
        state.dispatch(UiEvent::PointerUp { x: 720.0, y: 690.0 });
        assert_eq!(state.viewport().offset, (20.0, -10.0));
        assert!(!state.is_dirty());
    }

    #[test]
    fn junction_click_clears_selection_without_panning() {
        let mut tree = family();
        tree.data.add_edge(Edge::new("e2", "dad", "kid", LineStyle::Solid));
        let mut state = AppState::new(Theme::classic(), Viewport::new(1000.0, 800.0));
        state.open(tree);
        click(&mut state, 50.0, 50.0);
        assert_eq!(state.selection(), &Selection::Person("mum".to_string()));

        let bus = state.routes().by_kind(SegmentKind::Bus).next().unwrap().clone();
        let (x, y) = state
            .viewport()
            .to_screen(((bus.from.0 + bus.to.0) / 2.0 + 40.0, bus.from.1));
        let effects = state.dispatch(UiEvent::PointerDown { x, y });
        assert_eq!(state.selection(), &Selection::None);
        assert!(effects.contains(&Effect::ClosePanel));

        let before = *state.viewport();
        state.dispatch(UiEvent::PointerMove { x: x + 30.0, y: y + 30.0 });
        state.dispatch(UiEvent::PointerUp { x: x + 30.0, y: y + 30.0 });
        assert_eq!(*state.viewport(), before);
    }

    #[test]
    fn events_deserialize_from_json() {
        let event: UiEvent =
            serde_json::from_str(r#"{"type":"set_edge_style","id":"e1","style":"dashed"}"#).unwrap();
        assert_eq!(
            event,
            UiEvent::SetEdgeStyle {
                id: "e1".to_string(),
                style: LineStyle::Dashed
            }
        );
        let event: UiEvent = serde_json::from_str(r#"{"type":"key","key":"escape"}"#).unwrap();
        assert_eq!(event, UiEvent::Key { key: Key::Escape });
    }
}
