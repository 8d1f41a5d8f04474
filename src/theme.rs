use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub background: String,
    pub card_fill: String,
    pub card_border: String,
    pub card_border_width: f32,
    pub card_corner_radius: f32,
    pub selection_color: String,
    pub name_color: String,
    pub date_color: String,
    pub location_color: String,
    pub photo_placeholder: String,
    pub line_color: String,
    pub line_width: f32,
    pub note_fill: String,
    pub note_border: String,
    pub note_text_color: String,
    pub resize_handle_fill: String,
    pub resize_handle_border: String,
    pub shadow_color: String,
}

impl Theme {
    pub fn classic() -> Self {
        Self {
            font_family: "Arial, Helvetica, sans-serif".to_string(),
            background: "#FAFAFA".to_string(),
            card_fill: "#FFFFFF".to_string(),
            card_border: "#4A90E2".to_string(),
            card_border_width: 2.0,
            card_corner_radius: 8.0,
            selection_color: "#FF6B6B".to_string(),
            name_color: "#333333".to_string(),
            date_color: "#555555".to_string(),
            location_color: "#777777".to_string(),
            photo_placeholder: "#E0E0E0".to_string(),
            line_color: "#666666".to_string(),
            line_width: 3.0,
            note_fill: "#FFFACD".to_string(),
            note_border: "#F0E68C".to_string(),
            note_text_color: "#333333".to_string(),
            resize_handle_fill: "#F0E68C".to_string(),
            resize_handle_border: "#D4C470".to_string(),
            shadow_color: "rgba(0,0,0,0.2)".to_string(),
        }
    }

    /// Classic palette on a dark canvas.
    pub fn dark() -> Self {
        Self {
            background: "#1A1A1A".to_string(),
            ..Self::classic()
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "classic" | "light" | "default" => Some(Self::classic()),
            "dark" => Some(Self::dark()),
            _ => None,
        }
    }

    /// Stroke width of a highlighted connector.
    pub fn selected_line_width(&self) -> f32 {
        self.line_width + 1.0
    }

    /// Stroke width of a highlighted card border.
    pub fn selected_card_border_width(&self) -> f32 {
        self.card_border_width + 1.0
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::classic()
    }
}
