use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ── Person card geometry ────────────────────────────────────────────
pub const CARD_WIDTH: f32 = 180.0;
pub const CARD_BASE_HEIGHT: f32 = 220.0;
/// Extra height for each populated conditional field (death date, burial location).
pub const CARD_HEIGHT_STEP: f32 = 15.0;

// ── Sticky notes ────────────────────────────────────────────────────
pub const NOTE_MIN_WIDTH: f32 = 100.0;
pub const NOTE_MIN_HEIGHT: f32 = 60.0;
pub const NOTE_DEFAULT_WIDTH: f32 = 180.0;
pub const NOTE_DEFAULT_HEIGHT: f32 = 100.0;
pub const NOTE_DEFAULT_TEXT: &str = "Note text here";

pub const DEFAULT_PERSON_NAME: &str = "New Person";

/// Stroke pattern of a parent/child connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
}

impl LineStyle {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "solid" => Some(Self::Solid),
            "dashed" => Some(Self::Dashed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Dashed => "dashed",
        }
    }

    /// Dash pattern `[dash, gap]`, `None` for a continuous stroke.
    pub fn dash(self) -> Option<[f32; 2]> {
        match self {
            Self::Solid => None,
            Self::Dashed => Some([10.0, 5.0]),
        }
    }
}

// Anything other than "dashed" (including null) draws solid.
impl<'de> Deserialize<'de> for LineStyle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = Option::<String>::deserialize(deserializer)?;
        Ok(token
            .as_deref()
            .and_then(LineStyle::from_token)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub name: String,
    #[serde(
        rename = "photo",
        alias = "photoRef",
        default,
        deserialize_with = "blank_as_none"
    )]
    pub photo_ref: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none", serialize_with = "none_as_blank")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none", serialize_with = "none_as_blank")]
    pub birth_location: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none", serialize_with = "none_as_blank")]
    pub death_date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none", serialize_with = "none_as_blank")]
    pub burial_location: Option<String>,
}

impl Person {
    pub fn new(id: impl Into<String>, x: f32, y: f32, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            name: name.into(),
            photo_ref: None,
            birth_date: None,
            birth_location: None,
            death_date: None,
            burial_location: None,
        }
    }

    /// Card height; never stored, always derived from the populated fields.
    pub fn derived_height(&self) -> f32 {
        let mut height = CARD_BASE_HEIGHT;
        if self.death_date.is_some() {
            height += CARD_HEIGHT_STEP;
        }
        if self.burial_location.is_some() {
            height += CARD_HEIGHT_STEP;
        }
        height
    }

    /// Connector endpoint: horizontal center, vertical middle of the card.
    pub fn anchor(&self) -> (f32, f32) {
        (
            self.x + CARD_WIDTH / 2.0,
            self.y + self.derived_height() / 2.0,
        )
    }

    pub fn contains(&self, point: (f32, f32)) -> bool {
        point.0 >= self.x
            && point.0 <= self.x + CARD_WIDTH
            && point.1 >= self.y
            && point.1 <= self.y + self.derived_height()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "emoji", alias = "symbol")]
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default = "default_note_text")]
    pub text: String,
}

impl Note {
    pub fn new(id: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width: NOTE_DEFAULT_WIDTH,
            height: NOTE_DEFAULT_HEIGHT,
            text: NOTE_DEFAULT_TEXT.to_string(),
        }
    }

    /// Applies a size, clamped to the note minimums.
    pub fn set_size(&mut self, width: f32, height: f32) {
        let (width, height) = clamp_note_size(width, height);
        self.width = width;
        self.height = height;
    }

    /// Fills sizes missing from older documents and enforces the minimums.
    pub(crate) fn normalize(&mut self) {
        if self.width.is_nan() || self.width <= 0.0 {
            self.width = NOTE_DEFAULT_WIDTH;
        }
        if self.height.is_nan() || self.height <= 0.0 {
            self.height = NOTE_DEFAULT_HEIGHT;
        }
        self.set_size(self.width, self.height);
    }
}

pub fn clamp_note_size(width: f32, height: f32) -> (f32, f32) {
    // NaN falls through `max` to the minimum.
    (width.max(NOTE_MIN_WIDTH), height.max(NOTE_MIN_HEIGHT))
}

fn default_note_text() -> String {
    NOTE_DEFAULT_TEXT.to_string()
}

/// Free-form canvas decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Decoration {
    Emoji(Emoji),
    Note(Note),
}

impl Decoration {
    pub fn id(&self) -> &str {
        match self {
            Self::Emoji(emoji) => &emoji.id,
            Self::Note(note) => &note.id,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        match self {
            Self::Emoji(emoji) => (emoji.x, emoji.y),
            Self::Note(note) => (note.x, note.y),
        }
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        match self {
            Self::Emoji(emoji) => {
                emoji.x = x;
                emoji.y = y;
            }
            Self::Note(note) => {
                note.x = x;
                note.y = y;
            }
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Emoji(_) => "emoji",
            Self::Note(_) => "note",
        }
    }
}

/// Parent (`from`) to child (`to`) relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub line_style: LineStyle,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        line_style: LineStyle,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            line_style,
        }
    }

    pub fn touches(&self, person_id: &str) -> bool {
        self.from == person_id || self.to == person_id
    }
}

/// Last viewport of a document, persisted alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportState {
    #[serde(default = "default_zoom")]
    pub zoom: f32,
    #[serde(default)]
    pub pan_x: f32,
    #[serde(default)]
    pub pan_y: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

fn default_zoom() -> f32 {
    1.0
}

/// Partial update of a person. `Some("")` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub name: Option<String>,
    pub photo_ref: Option<String>,
    pub birth_date: Option<String>,
    pub birth_location: Option<String>,
    pub death_date: Option<String>,
    pub burial_location: Option<String>,
}

impl PersonPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply(self, person: &mut Person) {
        if let Some(x) = self.x {
            person.x = x;
        }
        if let Some(y) = self.y {
            person.y = y;
        }
        if let Some(name) = self.name {
            person.name = name;
        }
        set_optional(&mut person.photo_ref, self.photo_ref);
        set_optional(&mut person.birth_date, self.birth_date);
        set_optional(&mut person.birth_location, self.birth_location);
        set_optional(&mut person.death_date, self.death_date);
        set_optional(&mut person.burial_location, self.burial_location);
    }
}

/// Partial update of a decoration. Fields that do not apply to the
/// decoration's kind are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub text: Option<String>,
    pub symbol: Option<String>,
}

impl DecorationPatch {
    pub(crate) fn apply(self, decoration: &mut Decoration) {
        let (x, y) = decoration.position();
        decoration.set_position(self.x.unwrap_or(x), self.y.unwrap_or(y));
        match decoration {
            Decoration::Emoji(emoji) => {
                if let Some(symbol) = self.symbol {
                    emoji.symbol = symbol;
                }
            }
            Decoration::Note(note) => {
                if self.width.is_some() || self.height.is_some() {
                    note.set_size(
                        self.width.unwrap_or(note.width),
                        self.height.unwrap_or(note.height),
                    );
                }
                if let Some(text) = self.text {
                    note.text = text;
                }
            }
        }
    }
}

fn set_optional(field: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *field = if value.is_empty() { None } else { Some(value) };
    }
}

/// Generates `<prefix>_<uuid>` entity ids.
pub fn new_entity_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.is_empty()))
}

fn none_as_blank<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_height_counts_conditional_fields() {
        let mut person = Person::new("p", 0.0, 0.0, "Ada");
        assert_eq!(person.derived_height(), 220.0);
        person.death_date = Some("1852".to_string());
        assert_eq!(person.derived_height(), 235.0);
        person.burial_location = Some("Hucknall".to_string());
        assert_eq!(person.derived_height(), 250.0);
        assert_eq!(person.anchor(), (90.0, 125.0));
    }

    #[test]
    fn person_loads_legacy_fields() {
        let json = r#"{"id":"person_1","type":"person","x":10,"y":20,"name":"Ada",
            "photo":null,"birthDate":"1815","birthLocation":"","deathDate":"",
            "burialLocation":""}"#;
        let person: Person = serde_json::from_str(json).unwrap();
        assert_eq!(person.birth_date.as_deref(), Some("1815"));
        assert_eq!(person.birth_location, None);
        assert_eq!(person.death_date, None);
        assert_eq!(person.derived_height(), CARD_BASE_HEIGHT);

        let aliased: Person =
            serde_json::from_str(r#"{"id":"p","x":0,"y":0,"photoRef":"/uploads/t/a.png"}"#).unwrap();
        assert_eq!(aliased.photo_ref.as_deref(), Some("/uploads/t/a.png"));
        assert_eq!(aliased.name, "");
    }

    #[test]
    fn line_style_tolerates_unknown_tokens() {
        let edge: Edge = serde_json::from_str(r#"{"id":"e","from":"a","to":"b"}"#).unwrap();
        assert_eq!(edge.line_style, LineStyle::Solid);
        let edge: Edge =
            serde_json::from_str(r#"{"id":"e","from":"a","to":"b","lineStyle":"dashed"}"#).unwrap();
        assert_eq!(edge.line_style, LineStyle::Dashed);
        let edge: Edge =
            serde_json::from_str(r#"{"id":"e","from":"a","to":"b","lineStyle":"wavy"}"#).unwrap();
        assert_eq!(edge.line_style, LineStyle::Solid);
        assert_eq!(LineStyle::Dashed.dash(), Some([10.0, 5.0]));
    }

    #[test]
    fn decoration_tagged_by_type() {
        let emoji: Decoration =
            serde_json::from_str(r#"{"type":"emoji","id":"emoji_1","x":1,"y":2,"emoji":"🌳"}"#)
                .unwrap();
        assert!(matches!(&emoji, Decoration::Emoji(e) if e.symbol == "🌳"));

        let mut note: Decoration =
            serde_json::from_str(r#"{"type":"note","id":"note_1","x":1,"y":2}"#).unwrap();
        if let Decoration::Note(note) = &mut note {
            assert_eq!(note.text, NOTE_DEFAULT_TEXT);
            note.normalize();
            assert_eq!((note.width, note.height), (180.0, 100.0));
        } else {
            panic!("expected note");
        }
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["type"], "note");
    }

    #[test]
    fn note_size_never_below_minimum() {
        let mut note = Note::new("n", 0.0, 0.0);
        note.set_size(-500.0, 10.0);
        assert_eq!((note.width, note.height), (NOTE_MIN_WIDTH, NOTE_MIN_HEIGHT));
        note.set_size(f32::NAN, 240.0);
        assert_eq!((note.width, note.height), (NOTE_MIN_WIDTH, 240.0));
    }

    #[test]
    fn patch_blank_clears_optional_field() {
        let mut person = Person::new("p", 0.0, 0.0, "Ada");
        person.death_date = Some("1852".to_string());
        PersonPatch {
            death_date: Some(String::new()),
            name: Some("Ada Lovelace".to_string()),
            ..Default::default()
        }
        .apply(&mut person);
        assert_eq!(person.death_date, None);
        assert_eq!(person.name, "Ada Lovelace");
    }

    #[test]
    fn entity_ids_are_prefixed_and_distinct() {
        let a = new_entity_id("person");
        let b = new_entity_id("person");
        assert!(a.starts_with("person_"));
        assert_ne!(a, b);
    }
}
