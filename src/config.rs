use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: json5::Error,
    },

    #[error("unknown theme: {0} (expected 'classic' or 'dark')")]
    UnknownTheme(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
    pub periodic_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            periodic_ms: 15_000,
        }
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn periodic(&self) -> Duration {
        Duration::from_millis(self.periodic_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Export the bounding box of the content instead of the saved viewport.
    pub fit_content: bool,
    /// Margin around the content when fitting.
    pub padding: f32,
    pub draw_background: bool,
    pub shadows: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fit_content: true,
            padding: 40.0,
            draw_background: true,
            shadows: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub theme: Theme,
    pub canvas: CanvasConfig,
    pub autosave: AutosaveConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    background: Option<String>,
    card_fill: Option<String>,
    card_border: Option<String>,
    card_border_width: Option<f32>,
    card_corner_radius: Option<f32>,
    selection_color: Option<String>,
    name_color: Option<String>,
    date_color: Option<String>,
    location_color: Option<String>,
    photo_placeholder: Option<String>,
    line_color: Option<String>,
    line_width: Option<f32>,
    note_fill: Option<String>,
    note_border: Option<String>,
    note_text_color: Option<String>,
    resize_handle_fill: Option<String>,
    resize_handle_border: Option<String>,
    shadow_color: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CanvasConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AutosaveConfigFile {
    debounce_ms: Option<u64>,
    periodic_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    fit_content: Option<bool>,
    padding: Option<f32>,
    draw_background: Option<bool>,
    shadows: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    canvas: Option<CanvasConfigFile>,
    autosave: Option<AutosaveConfigFile>,
    render: Option<RenderConfigFile>,
}

/// Loads a JSON/JSON5 file of partial overrides on top of [`Config::default`].
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: ConfigFile = json5::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    apply_config_file(parsed)
}

/// Parses overrides from a string; used by hosts that keep config in memory.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let parsed: ConfigFile = json5::from_str(contents).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    apply_config_file(parsed)
}

fn apply_config_file(parsed: ConfigFile) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(name) = parsed.theme.as_deref() {
        config.theme = Theme::by_name(name).ok_or_else(|| ConfigError::UnknownTheme(name.to_string()))?;
    }

    if let Some(vars) = parsed.theme_variables {
        let theme = &mut config.theme;
        if let Some(v) = vars.font_family {
            theme.font_family = v;
        }
        if let Some(v) = vars.background {
            theme.background = v;
        }
        if let Some(v) = vars.card_fill {
            theme.card_fill = v;
        }
        if let Some(v) = vars.card_border {
            theme.card_border = v;
        }
        if let Some(v) = vars.card_border_width {
            theme.card_border_width = v;
        }
        if let Some(v) = vars.card_corner_radius {
            theme.card_corner_radius = v;
        }
        if let Some(v) = vars.selection_color {
            theme.selection_color = v;
        }
        if let Some(v) = vars.name_color {
            theme.name_color = v;
        }
        if let Some(v) = vars.date_color {
            theme.date_color = v;
        }
        if let Some(v) = vars.location_color {
            theme.location_color = v;
        }
        if let Some(v) = vars.photo_placeholder {
            theme.photo_placeholder = v;
        }
        if let Some(v) = vars.line_color {
            theme.line_color = v;
        }
        if let Some(v) = vars.line_width {
            theme.line_width = v;
        }
        if let Some(v) = vars.note_fill {
            theme.note_fill = v;
        }
        if let Some(v) = vars.note_border {
            theme.note_border = v;
        }
        if let Some(v) = vars.note_text_color {
            theme.note_text_color = v;
        }
        if let Some(v) = vars.resize_handle_fill {
            theme.resize_handle_fill = v;
        }
        if let Some(v) = vars.resize_handle_border {
            theme.resize_handle_border = v;
        }
        if let Some(v) = vars.shadow_color {
            theme.shadow_color = v;
        }
    }

    if let Some(canvas) = parsed.canvas {
        if let Some(v) = canvas.width {
            config.canvas.width = v.max(1.0);
        }
        if let Some(v) = canvas.height {
            config.canvas.height = v.max(1.0);
        }
    }

    if let Some(autosave) = parsed.autosave {
        if let Some(v) = autosave.debounce_ms {
            config.autosave.debounce_ms = v;
        }
        if let Some(v) = autosave.periodic_ms {
            config.autosave.periodic_ms = v;
        }
    }

    if let Some(render) = parsed.render {
        if let Some(v) = render.fit_content {
            config.render.fit_content = v;
        }
        if let Some(v) = render.padding {
            config.render.padding = v.max(0.0);
        }
        if let Some(v) = render.draw_background {
            config.render.draw_background = v;
        }
        if let Some(v) = render.shadows {
            config.render.shadows = v;
        }
    }

    Ok(config)
}
