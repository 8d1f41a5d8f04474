use family_tree_canvas::autosave::{FlushOutcome, flush_if_dirty};
use family_tree_canvas::config::{Config, parse_config};
use family_tree_canvas::model::Tree;
use family_tree_canvas::render::{fit_viewport, render_svg};
use family_tree_canvas::{AppState, Effect, MemoryGateway, TreeGateway, UiEvent, Viewport};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditorOptions {
    /// JSON/JSON5 config text, same shape as the CLI config file.
    config: Option<String>,
    width: Option<f32>,
    height: Option<f32>,
}

fn build_config(options: &EditorOptions) -> Result<Config, String> {
    let mut config = match options.config.as_deref() {
        Some(raw) => parse_config(raw).map_err(|error| error.to_string())?,
        None => Config::default(),
    };
    if let Some(width) = options.width {
        config.canvas.width = width.max(1.0);
    }
    if let Some(height) = options.height {
        config.canvas.height = height.max(1.0);
    }
    Ok(config)
}

fn js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// Browser-side editor. The host forwards pointer/keyboard input as JSON
/// events and applies the returned effects; saving is driven by the host's
/// timers through [`Editor::save`].
#[wasm_bindgen]
pub struct Editor {
    state: AppState,
    gateway: MemoryGateway,
    config: Config,
}

impl Editor {
    fn from_options(options: EditorOptions) -> Result<Self, String> {
        let config = build_config(&options)?;
        let viewport = Viewport::new(config.canvas.width, config.canvas.height);
        Ok(Self {
            state: AppState::new(config.theme.clone(), viewport),
            gateway: MemoryGateway::new(),
            config,
        })
    }

    fn dispatch_event(&mut self, event: UiEvent) -> Vec<Effect> {
        self.state.dispatch(event)
    }
}

#[wasm_bindgen]
impl Editor {
    #[wasm_bindgen(constructor)]
    pub fn new(options_json: Option<String>) -> Result<Editor, JsValue> {
        let options = match options_json {
            Some(raw) => serde_json::from_str::<EditorOptions>(&raw).map_err(js_error)?,
            None => EditorOptions::default(),
        };
        Editor::from_options(options).map_err(js_error)
    }

    /// Opens a stored tree record (`{id, name, data}`) and returns its id.
    #[wasm_bindgen(js_name = loadTree)]
    pub fn load_tree(&mut self, tree_json: &str) -> Result<String, JsValue> {
        let tree: Tree = serde_json::from_str(tree_json).map_err(js_error)?;
        self.gateway.insert_tree(tree.clone());
        let id = tree.id.clone();
        self.state.open(tree);
        Ok(id)
    }

    /// Creates an empty tree and opens it.
    #[wasm_bindgen(js_name = createTree)]
    pub fn create_tree(&mut self, name: Option<String>) -> Result<String, JsValue> {
        let tree = self.gateway.create_tree(name.as_deref()).map_err(js_error)?;
        let id = tree.id.clone();
        self.state.open(tree);
        Ok(id)
    }

    /// Applies one `UiEvent` (JSON, `{"type": "pointer_down", ...}`) and returns
    /// the resulting effects as a JSON array.
    pub fn dispatch(&mut self, event_json: &str) -> Result<String, JsValue> {
        let event: UiEvent = serde_json::from_str(event_json).map_err(js_error)?;
        let effects = self.dispatch_event(event);
        serde_json::to_string(&effects).map_err(js_error)
    }

    /// Saves the open tree when dirty; returns the effects (status line).
    pub fn save(&mut self) -> Result<String, JsValue> {
        let mut effects = Vec::new();
        if let FlushOutcome::Failed(error) = flush_if_dirty(&mut self.state, &mut self.gateway, &mut effects) {
            return Err(js_error(error));
        }
        serde_json::to_string(&effects).map_err(js_error)
    }

    #[wasm_bindgen(js_name = isDirty)]
    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    /// Drawable primitives of the current scene as JSON.
    #[wasm_bindgen(js_name = sceneJson)]
    pub fn scene_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.state.scene()).map_err(js_error)
    }

    /// SVG of the current view, or of the whole tree when `fit` is set.
    pub fn svg(&self, fit: bool) -> String {
        let scene = self.state.scene();
        let viewport = if fit {
            fit_viewport(scene, &self.config.render, *self.state.viewport())
        } else {
            *self.state.viewport()
        };
        render_svg(scene, &viewport, self.state.theme(), &self.config.render)
    }

    /// The open tree with the current viewport stored, as JSON.
    #[wasm_bindgen(js_name = treeJson)]
    pub fn tree_json(&mut self) -> Result<String, JsValue> {
        match self.state.snapshot() {
            Some(tree) => serde_json::to_string(&tree).map_err(js_error),
            None => Err(JsValue::from_str("no tree is open")),
        }
    }

    pub fn status(&self) -> String {
        self.state.status().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> Editor {
        Editor::from_options(EditorOptions {
            config: Some("{ theme: 'dark', render: { shadows: false } }".to_string()),
            width: Some(800.0),
            height: None,
        })
        .unwrap()
    }

    #[test]
    fn events_round_trip_through_json() {
        let mut editor = editor();
        let tree = r#"{"id":"t1","name":"Family","data":{"nodes":[{"id":"a","x":0,"y":0,"name":"Ada"}]}}"#;
        editor.state.open(serde_json::from_str(tree).unwrap());
        let effects = editor.dispatch_event(serde_json::from_str(r#"{"type":"pointer_down","x":10,"y":10}"#).unwrap());
        let json = serde_json::to_string(&effects).unwrap();
        assert!(json.contains("\"effect\":\"open_panel\""));
        assert!(editor.state.scene().group("a").unwrap().selected);
    }

    #[test]
    fn loaded_tree_opens_and_saves() {
        let mut editor = editor();
        let tree = r#"{"id":"t1","name":"Family","data":{"nodes":[{"id":"a","x":0,"y":0,"name":"Ada"}]}}"#;
        assert_eq!(editor.load_tree(tree).unwrap(), "t1");
        assert!(editor.state.scene().group("a").is_some());
        assert!(!editor.is_dirty());

        editor.dispatch_event(UiEvent::AddNote);
        assert!(editor.is_dirty());
        let effects = editor.save().unwrap();
        assert!(effects.contains("Saved"));
        assert!(!editor.is_dirty());
        let stored = editor.gateway.fetch_tree("t1").unwrap();
        assert_eq!(stored.name, "Family");
        assert_eq!(stored.data.nodes.len(), 1);
        assert_eq!(stored.data.decorations.len(), 1);
    }

    #[test]
    fn svg_uses_configured_theme_and_size() {
        let mut editor = editor();
        let tree = editor.gateway.create_tree(Some("T")).unwrap();
        editor.state.open(tree);
        editor.dispatch_event(UiEvent::AddPerson);
        let svg = editor.svg(false);
        assert!(svg.contains("width=\"800\""));
        assert!(svg.contains("#1A1A1A"));
        assert!(!svg.contains("feDropShadow"));
    }

    #[test]
    fn save_flushes_into_memory_store() {
        let mut editor = editor();
        let tree = editor.gateway.create_tree(None).unwrap();
        let id = tree.id.clone();
        editor.state.open(tree);
        editor.dispatch_event(UiEvent::AddNote);
        assert!(editor.is_dirty());
        let mut effects = Vec::new();
        assert!(matches!(
            flush_if_dirty(&mut editor.state, &mut editor.gateway, &mut effects),
            FlushOutcome::Saved
        ));
        assert_eq!(editor.gateway.fetch_tree(&id).unwrap().data.decorations.len(), 1);
    }
}
