use crate::model::{CARD_WIDTH, Emoji, Note, Person};
use crate::theme::Theme;

use super::{DrawGroup, GroupKind, ImageShape, Primitive, RectShape, Shape, Slot, TextAlign, TextShape};

// ── Photo frame ─────────────────────────────────────────────────────
const PHOTO_X: f32 = 15.0;
const PHOTO_Y: f32 = 10.0;
const PHOTO_WIDTH: f32 = 150.0;
const PHOTO_HEIGHT: f32 = 100.0;
const PHOTO_CORNER_RADIUS: f32 = 4.0;
const PHOTO_ICON: &str = "\u{1F464}";
const PHOTO_ICON_Y: f32 = 40.0;
const PHOTO_ICON_SIZE: f32 = 50.0;

// ── Text slots ──────────────────────────────────────────────────────
const TEXT_X: f32 = 10.0;
const TEXT_WIDTH: f32 = 160.0;
const NAME_Y: f32 = 115.0;
const NAME_SIZE: f32 = 16.0;
const FIRST_DETAIL_Y: f32 = 140.0;
const DETAIL_STEP: f32 = 15.0;
/// Extra space above the death block.
const DEATH_GAP: f32 = 5.0;
const DATE_SIZE: f32 = 11.0;
const LOCATION_SIZE: f32 = 10.0;

// ── Decorations ─────────────────────────────────────────────────────
pub const EMOJI_SIZE: f32 = 40.0;
const NOTE_INSET: f32 = 10.0;
const NOTE_TEXT_SIZE: f32 = 14.0;
const NOTE_CORNER_RADIUS: f32 = 4.0;
pub const RESIZE_HANDLE_SIZE: f32 = 12.0;

pub(super) fn person_group(
    person: &Person,
    selected: bool,
    photo_size: Option<(f32, f32)>,
    theme: &Theme,
) -> DrawGroup {
    let height = person.derived_height();
    let mut children = Vec::with_capacity(8);

    let (stroke, stroke_width) = if selected {
        (theme.selection_color.clone(), theme.selected_card_border_width())
    } else {
        (theme.card_border.clone(), theme.card_border_width)
    };
    children.push(Primitive {
        slot: Slot::Card,
        shape: Shape::Rect(RectShape {
            x: 0.0,
            y: 0.0,
            width: CARD_WIDTH,
            height,
            fill: theme.card_fill.clone(),
            stroke: Some(stroke),
            stroke_width,
            corner_radius: theme.card_corner_radius,
            shadow: true,
        }),
    });

    match person.photo_ref.as_deref() {
        Some(href) => children.push(photo(href, photo_size)),
        None => {
            children.push(Primitive {
                slot: Slot::PhotoPlaceholder,
                shape: Shape::Rect(RectShape {
                    x: PHOTO_X,
                    y: PHOTO_Y,
                    width: PHOTO_WIDTH,
                    height: PHOTO_HEIGHT,
                    fill: theme.photo_placeholder.clone(),
                    stroke: None,
                    stroke_width: 0.0,
                    corner_radius: PHOTO_CORNER_RADIUS,
                    shadow: false,
                }),
            });
            children.push(text(
                Slot::PhotoIcon,
                PHOTO_X,
                PHOTO_ICON_Y,
                PHOTO_WIDTH,
                PHOTO_ICON,
                PHOTO_ICON_SIZE,
                &theme.name_color,
            ));
        }
    }

    let mut name = text(
        Slot::Name,
        TEXT_X,
        NAME_Y,
        TEXT_WIDTH,
        &person.name,
        NAME_SIZE,
        &theme.name_color,
    );
    if let Shape::Text(shape) = &mut name.shape {
        shape.bold = true;
        shape.align = TextAlign::Center;
        shape.wrap = true;
    }
    children.push(name);

    let mut y = FIRST_DETAIL_Y;
    children.push(text(
        Slot::BirthDate,
        TEXT_X,
        y,
        TEXT_WIDTH,
        &format!("Birth: {}", person.birth_date.as_deref().unwrap_or("N/A")),
        DATE_SIZE,
        &theme.date_color,
    ));
    y += DETAIL_STEP;
    children.push(wrapped(text(
        Slot::BirthLocation,
        TEXT_X,
        y,
        TEXT_WIDTH,
        person.birth_location.as_deref().unwrap_or(""),
        LOCATION_SIZE,
        &theme.location_color,
    )));
    y += DETAIL_STEP;

    // Burial is part of the death block; without a death date it is not shown
    // even though it still adds to the card height.
    if let Some(death_date) = person.death_date.as_deref() {
        y += DEATH_GAP;
        children.push(text(
            Slot::DeathDate,
            TEXT_X,
            y,
            TEXT_WIDTH,
            &format!("Death: {death_date}"),
            DATE_SIZE,
            &theme.date_color,
        ));
        y += DETAIL_STEP;
        children.push(wrapped(text(
            Slot::BurialLocation,
            TEXT_X,
            y,
            TEXT_WIDTH,
            &format!("Burial: {}", person.burial_location.as_deref().unwrap_or("")),
            LOCATION_SIZE,
            &theme.location_color,
        )));
    }

    DrawGroup {
        id: person.id.clone(),
        kind: GroupKind::Person,
        x: person.x,
        y: person.y,
        width: CARD_WIDTH,
        height,
        draggable: true,
        selected,
        children,
    }
}

/// Letter-boxes the photo into the frame when its intrinsic size is known.
fn photo(href: &str, intrinsic: Option<(f32, f32)>) -> Primitive {
    let (x, y, width, height) = match intrinsic {
        Some((w, h)) if w > 0.0 && h > 0.0 => {
            let ratio = (PHOTO_WIDTH / w).min(PHOTO_HEIGHT / h);
            let (w, h) = (w * ratio, h * ratio);
            (
                PHOTO_X + (PHOTO_WIDTH - w) / 2.0,
                PHOTO_Y + (PHOTO_HEIGHT - h) / 2.0,
                w,
                h,
            )
        }
        _ => (PHOTO_X, PHOTO_Y, PHOTO_WIDTH, PHOTO_HEIGHT),
    };
    Primitive {
        slot: Slot::Photo,
        shape: Shape::Image(ImageShape {
            x,
            y,
            width,
            height,
            href: href.to_string(),
            corner_radius: PHOTO_CORNER_RADIUS,
        }),
    }
}

pub(super) fn emoji_group(emoji: &Emoji, selected: bool, theme: &Theme) -> DrawGroup {
    DrawGroup {
        id: emoji.id.clone(),
        kind: GroupKind::Emoji,
        x: emoji.x,
        y: emoji.y,
        width: EMOJI_SIZE,
        height: EMOJI_SIZE,
        draggable: true,
        selected,
        children: vec![Primitive {
            slot: Slot::Glyph,
            shape: Shape::Text(TextShape {
                x: 0.0,
                y: 0.0,
                width: None,
                height: None,
                text: emoji.symbol.clone(),
                font_size: EMOJI_SIZE,
                bold: false,
                fill: theme.name_color.clone(),
                align: TextAlign::Left,
                wrap: false,
            }),
        }],
    }
}

pub(super) fn note_group(note: &Note, selected: bool, theme: &Theme) -> DrawGroup {
    let stroke = if selected {
        theme.selection_color.clone()
    } else {
        theme.note_border.clone()
    };
    let background = Primitive {
        slot: Slot::NoteBackground,
        shape: Shape::Rect(RectShape {
            x: 0.0,
            y: 0.0,
            width: note.width,
            height: note.height,
            fill: theme.note_fill.clone(),
            stroke: Some(stroke),
            stroke_width: 1.0,
            corner_radius: NOTE_CORNER_RADIUS,
            shadow: true,
        }),
    };
    let body = Primitive {
        slot: Slot::NoteText,
        shape: Shape::Text(TextShape {
            x: NOTE_INSET,
            y: NOTE_INSET,
            width: Some(note.width - 2.0 * NOTE_INSET),
            height: Some(note.height - 2.0 * NOTE_INSET),
            text: note.text.clone(),
            font_size: NOTE_TEXT_SIZE,
            bold: false,
            fill: theme.note_text_color.clone(),
            align: TextAlign::Left,
            wrap: true,
        }),
    };
    let handle = Primitive {
        slot: Slot::ResizeHandle,
        shape: Shape::Rect(RectShape {
            x: note.width - RESIZE_HANDLE_SIZE,
            y: note.height - RESIZE_HANDLE_SIZE,
            width: RESIZE_HANDLE_SIZE,
            height: RESIZE_HANDLE_SIZE,
            fill: theme.resize_handle_fill.clone(),
            stroke: Some(theme.resize_handle_border.clone()),
            stroke_width: 1.0,
            corner_radius: 2.0,
            shadow: false,
        }),
    };
    DrawGroup {
        id: note.id.clone(),
        kind: GroupKind::Note,
        x: note.x,
        y: note.y,
        width: note.width,
        height: note.height,
        draggable: true,
        selected,
        children: vec![background, body, handle],
    }
}

fn text(slot: Slot, x: f32, y: f32, width: f32, value: &str, font_size: f32, fill: &str) -> Primitive {
    Primitive {
        slot,
        shape: Shape::Text(TextShape {
            x,
            y,
            width: Some(width),
            height: None,
            text: value.to_string(),
            font_size,
            bold: false,
            fill: fill.to_string(),
            align: TextAlign::Left,
            wrap: false,
        }),
    }
}

fn wrapped(mut primitive: Primitive) -> Primitive {
    if let Shape::Text(shape) = &mut primitive.shape {
        shape.wrap = true;
    }
    primitive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn living_person_card_layout() {
        let mut person = Person::new("p", 20.0, 30.0, "Grace Hopper");
        person.birth_date = Some("1906".to_string());
        let group = person_group(&person, false, None, &Theme::classic());
        assert_eq!((group.x, group.y, group.width, group.height), (20.0, 30.0, 180.0, 220.0));
        assert_eq!(group.text(Slot::Name), Some("Grace Hopper"));
        assert_eq!(group.text(Slot::BirthDate), Some("Birth: 1906"));
        assert_eq!(group.text(Slot::BirthLocation), Some(""));
        assert!(group.child(Slot::DeathDate).is_none());
        assert!(group.child(Slot::PhotoPlaceholder).is_some());
    }

    #[test]
    fn death_block_adds_slots() {
        let mut person = Person::new("p", 0.0, 0.0, "Ada");
        person.death_date = Some("1852".to_string());
        let group = person_group(&person, false, None, &Theme::classic());
        assert_eq!(group.height, 235.0);
        assert_eq!(group.text(Slot::BirthDate), Some("Birth: N/A"));
        assert_eq!(group.text(Slot::DeathDate), Some("Death: 1852"));
        assert_eq!(group.text(Slot::BurialLocation), Some("Burial: "));
        match &group.child(Slot::DeathDate).unwrap().shape {
            Shape::Text(text) => assert_eq!(text.y, 175.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn photo_is_letterboxed() {
        let mut person = Person::new("p", 0.0, 0.0, "Ada");
        person.photo_ref = Some("/uploads/t/a.png".to_string());
        let group = person_group(&person, false, Some((300.0, 100.0)), &Theme::classic());
        match &group.child(Slot::Photo).unwrap().shape {
            Shape::Image(image) => {
                assert_eq!((image.width, image.height), (150.0, 50.0));
                assert_eq!((image.x, image.y), (15.0, 35.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(group.child(Slot::PhotoPlaceholder).is_none());
    }

    #[test]
    fn note_handle_sits_in_corner() {
        let note = Note::new("n", 100.0, 100.0);
        let group = note_group(&note, false, &Theme::classic());
        assert!(group.on_resize_handle((100.0 + 175.0, 100.0 + 95.0)));
        assert!(!group.on_resize_handle((110.0, 110.0)));
        assert_eq!(group.text(Slot::NoteText), Some("Note text here"));
    }
}
