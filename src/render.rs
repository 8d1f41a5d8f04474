use crate::config::RenderConfig;
use crate::scene::{Connector, DrawGroup, ImageShape, LineShape, Primitive, RectShape, Scene, Shape, TextAlign, TextShape};
use crate::text_metrics::wrap_text;
use crate::theme::Theme;
use crate::viewport::Viewport;
use anyhow::Result;
use std::path::Path;

const LINE_HEIGHT: f32 = 1.2;
/// Distance from the top of a text line to its baseline, in em.
const BASELINE_EM: f32 = 0.8;
const SHADOW_FILTER_ID: &str = "card-shadow";

/// Serializes `scene` as seen through `viewport`.
pub fn render_svg(scene: &Scene, viewport: &Viewport, theme: &Theme, config: &RenderConfig) -> String {
    let mut svg = String::new();
    let (width, height) = viewport.size;

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));

    if config.shadows {
        svg.push_str("<defs>");
        svg.push_str(&format!(
            "<filter id=\"{SHADOW_FILTER_ID}\" x=\"-20%\" y=\"-20%\" width=\"140%\" height=\"140%\"><feDropShadow dx=\"2\" dy=\"2\" stdDeviation=\"5\" flood-color=\"{}\"/></filter>",
            escape_xml(&theme.shadow_color)
        ));
        svg.push_str("</defs>");
    }

    if config.draw_background {
        svg.push_str(&format!(
            "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
            escape_xml(&theme.background)
        ));
    }

    svg.push_str(&format!(
        "<g transform=\"translate({:.2} {:.2}) scale({:.4})\">",
        viewport.offset.0, viewport.offset.1, viewport.scale
    ));

    for connector in &scene.connectors {
        svg.push_str(&connector_svg(connector));
    }

    for (index, group) in scene.groups.iter().enumerate() {
        svg.push_str(&group_svg(group, index, theme, config));
    }

    svg.push_str("</g></svg>");
    svg
}

/// Document-space bounds of the scene as `(min_x, min_y, max_x, max_y)`.
pub fn scene_bounds(scene: &Scene) -> Option<(f32, f32, f32, f32)> {
    scene.bounds()
}

/// Viewport framing the whole scene with `config.padding` around it. Scale is
/// 1:1 so exports keep document units; an empty scene yields `fallback`.
pub fn fit_viewport(scene: &Scene, config: &RenderConfig, fallback: Viewport) -> Viewport {
    let Some((min_x, min_y, max_x, max_y)) = scene_bounds(scene) else {
        return fallback;
    };
    let padding = config.padding;
    Viewport {
        scale: 1.0,
        offset: (padding - min_x, padding - min_y),
        size: (
            (max_x - min_x + 2.0 * padding).max(1.0),
            (max_y - min_y + 2.0 * padding).max(1.0),
        ),
    }
}

fn connector_svg(connector: &Connector) -> String {
    format!(
        "<polyline data-id=\"{}\" data-kind=\"{}\" {}/>",
        escape_xml(&connector.id),
        connector.kind.as_str(),
        line_attrs(&connector.line)
    )
}

fn line_attrs(line: &LineShape) -> String {
    let points = line
        .points
        .iter()
        .map(|(x, y)| format!("{x:.2},{y:.2}"))
        .collect::<Vec<_>>()
        .join(" ");
    let mut attrs = format!(
        "points=\"{points}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\"",
        escape_xml(&line.stroke),
        line.stroke_width
    );
    if line.round_cap {
        attrs.push_str(" stroke-linecap=\"round\" stroke-linejoin=\"round\"");
    }
    if let Some([on, off]) = line.dash {
        attrs.push_str(&format!(" stroke-dasharray=\"{on} {off}\""));
    }
    attrs
}

fn group_svg(group: &DrawGroup, index: usize, theme: &Theme, config: &RenderConfig) -> String {
    let mut out = format!(
        "<g data-id=\"{}\" data-kind=\"{}\" transform=\"translate({:.2} {:.2})\">",
        escape_xml(&group.id),
        group_kind_name(group),
        group.x,
        group.y
    );
    for (child_index, child) in group.children.iter().enumerate() {
        out.push_str(&primitive_svg(child, (index, child_index), theme, config));
    }
    out.push_str("</g>");
    out
}

fn group_kind_name(group: &DrawGroup) -> &'static str {
    match group.kind {
        crate::scene::GroupKind::Person => "person",
        crate::scene::GroupKind::Emoji => "emoji",
        crate::scene::GroupKind::Note => "note",
    }
}

fn primitive_svg(primitive: &Primitive, key: (usize, usize), theme: &Theme, config: &RenderConfig) -> String {
    match &primitive.shape {
        Shape::Rect(rect) => rect_svg(rect, config),
        Shape::Text(text) => text_svg(text, key, &theme.font_family),
        Shape::Image(image) => image_svg(image, key),
        Shape::Line(line) => format!("<polyline {}/>", line_attrs(line)),
    }
}

fn rect_svg(rect: &RectShape, config: &RenderConfig) -> String {
    let stroke = match &rect.stroke {
        Some(color) => format!(
            " stroke=\"{}\" stroke-width=\"{}\"",
            escape_xml(color),
            rect.stroke_width
        ),
        None => String::new(),
    };
    let filter = if rect.shadow && config.shadows {
        format!(" filter=\"url(#{SHADOW_FILTER_ID})\"")
    } else {
        String::new()
    };
    format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{r}\" ry=\"{r}\" fill=\"{}\"{stroke}{filter}/>",
        rect.x,
        rect.y,
        rect.width,
        rect.height,
        escape_xml(&rect.fill),
        r = rect.corner_radius
    )
}

fn text_svg(text: &TextShape, key: (usize, usize), font_family: &str) -> String {
    let lines: Vec<String> = match (text.wrap, text.width) {
        (true, Some(width)) => wrap_text(&text.text, width, text.font_size, font_family),
        _ => text.text.split('\n').map(str::to_string).collect(),
    };
    let line_height = text.font_size * LINE_HEIGHT;
    let visible = match text.height {
        Some(height) => ((height / line_height).floor().max(0.0) as usize).min(lines.len()),
        None => lines.len(),
    };
    if visible == 0 {
        return String::new();
    }

    let (x, anchor) = match (text.align, text.width) {
        (TextAlign::Center, Some(width)) => (text.x + width / 2.0, "middle"),
        (TextAlign::Center, None) => (text.x, "middle"),
        (TextAlign::Left, _) => (text.x, "start"),
    };
    let weight = if text.bold { " font-weight=\"bold\"" } else { "" };

    let mut out = String::new();
    let clip = match (text.width, text.height) {
        (Some(width), Some(height)) => {
            let id = format!("clip-{}-{}", key.0, key.1);
            out.push_str(&format!(
                "<clipPath id=\"{id}\"><rect x=\"{:.2}\" y=\"{:.2}\" width=\"{width:.2}\" height=\"{height:.2}\"/></clipPath>",
                text.x, text.y
            ));
            format!(" clip-path=\"url(#{id})\"")
        }
        _ => String::new(),
    };

    out.push_str(&format!(
        "<text font-family=\"{}\" font-size=\"{}\" fill=\"{}\" text-anchor=\"{anchor}\"{weight}{clip}>",
        escape_xml(font_family),
        text.font_size,
        escape_xml(&text.fill)
    ));
    for (i, line) in lines.iter().take(visible).enumerate() {
        let y = text.y + text.font_size * BASELINE_EM + i as f32 * line_height;
        out.push_str(&format!(
            "<tspan x=\"{x:.2}\" y=\"{y:.2}\">{}</tspan>",
            escape_xml(line)
        ));
    }
    out.push_str("</text>");
    out
}

fn image_svg(image: &ImageShape, key: (usize, usize)) -> String {
    let id = format!("photo-{}-{}", key.0, key.1);
    format!(
        "<clipPath id=\"{id}\"><rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"{r}\" ry=\"{r}\"/></clipPath><image x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" href=\"{href}\" xlink:href=\"{href}\" preserveAspectRatio=\"none\" clip-path=\"url(#{id})\"/>",
        x = image.x,
        y = image.y,
        w = image.width,
        h = image.height,
        r = image.corner_radius,
        href = escape_xml(&image.href)
    )
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

/// Rasterizes `svg`. Photo hrefs are resolved against `resources_dir`.
#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, resources_dir: Option<&Path>) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = "Arial".to_string();
    opt.resources_dir = resources_dir.map(Path::to_path_buf);
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::Selection;
    use crate::model::{Decoration, DiagramData, Edge, LineStyle, Note, Person};
    use crate::routing::route_document;
    use crate::scene::RenderContext;
    use std::collections::HashMap;

    fn scene_for(data: &DiagramData) -> Scene {
        let theme = Theme::classic();
        let sizes = HashMap::new();
        let ctx = RenderContext {
            selection: &Selection::None,
            image_sizes: &sizes,
            theme: &theme,
        };
        Scene::build(data, &route_document(data), ctx)
    }

    fn family() -> DiagramData {
        let mut data = DiagramData::default();
        data.add_person(Person::new("mum", 0.0, 0.0, "Ada <Lovelace>"));
        data.add_person(Person::new("kid", 0.0, 400.0, "Kid"));
        data.add_edge(Edge::new("e1", "mum", "kid", LineStyle::Dashed));
        data
    }

    #[test]
    fn render_svg_basic() {
        let data = family();
        let scene = scene_for(&data);
        let svg = render_svg(&scene, &Viewport::default(), &Theme::classic(), &RenderConfig::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("Ada &lt;Lovelace&gt;"));
        assert!(svg.contains("data-id=\"mum\""));
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("feDropShadow"));
        assert!(svg.contains("fill=\"#FAFAFA\""));
    }

    #[test]
    fn background_and_shadow_are_optional() {
        let scene = scene_for(&family());
        let config = RenderConfig {
            draw_background: false,
            shadows: false,
            ..RenderConfig::default()
        };
        let svg = render_svg(&scene, &Viewport::default(), &Theme::dark(), &config);
        assert!(!svg.contains("#1A1A1A"));
        assert!(!svg.contains("filter"));
    }

    #[test]
    fn viewport_transform_wraps_content() {
        let scene = scene_for(&family());
        let mut viewport = Viewport::new(300.0, 200.0);
        viewport.scale = 2.0;
        viewport.offset = (10.0, -5.0);
        let svg = render_svg(&scene, &viewport, &Theme::classic(), &RenderConfig::default());
        assert!(svg.contains("width=\"300\" height=\"200\""));
        assert!(svg.contains("translate(10.00 -5.00) scale(2.0000)"));
    }

    #[test]
    fn note_text_is_clipped_to_its_box() {
        let mut data = DiagramData::default();
        let mut note = Note::new("n", 0.0, 0.0);
        note.text = (1..=20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        data.add_decoration(Decoration::Note(note));
        let svg = render_svg(&scene_for(&data), &Viewport::default(), &Theme::classic(), &RenderConfig::default());
        assert!(svg.contains("line1<"));
        assert!(!svg.contains("line20"));
        assert!(svg.contains("clipPath"));
    }

    #[test]
    fn fit_viewport_frames_content() {
        let scene = scene_for(&family());
        let config = RenderConfig::default();
        let viewport = fit_viewport(&scene, &config, Viewport::default());
        assert_eq!(viewport.offset, (40.0, 40.0));
        assert_eq!(viewport.size, (260.0, 700.0));

        let empty = fit_viewport(&Scene::default(), &config, Viewport::new(10.0, 10.0));
        assert_eq!(empty.size, (10.0, 10.0));
    }

    #[test]
    fn escape_xml_covers_quotes() {
        assert_eq!(escape_xml("a&\"'"), "a&amp;&quot;&apos;");
    }
}
