//! Natural-language descriptions of layouts for the rendering collaborator.

use crate::collaborators::RenderStyle;
use crate::model::{DepthLayer, Layout, RoomObject};

/// Moves smaller than this share of the room span are not worth describing.
const MOVE_THRESHOLD_PERCENT: f64 = 2.0;

fn style_details(style: &str) -> &'static str {
    match style.to_lowercase().as_str() {
        "minimalist" => "- White and light grey palette\n- Essential furniture only\n- Hidden storage, clean surfaces",
        "cozy" => "- Warm earth tones, soft textures\n- Plush bedding and throw pillows\n- Warm lighting, plants",
        "scandinavian" => "- Light wood tones, white walls\n- Simple functional furniture\n- Natural materials",
        "industrial" => "- Exposed brick or concrete accents\n- Metal and wood combinations\n- Raw materials, filament bulbs",
        _ => "- Clean lines, neutral colors with bold accents\n- Minimal clutter, sleek furniture\n- Matte black hardware",
    }
}

/// Center of the object as percentages of the room span.
fn center_percent(object: &RoomObject, layout: &Layout) -> (f64, f64) {
    let e = object.extent();
    (
        (e.x + e.width / 2.0) / layout.span_x() * 100.0,
        (e.y + e.height / 2.0) / layout.span_y() * 100.0,
    )
}

fn area_phrase(x: f64, y: f64) -> String {
    let column = if x < 33.0 {
        "left"
    } else if x < 66.0 {
        "center"
    } else {
        "right"
    };
    let row = if y < 33.0 {
        "front"
    } else if y < 66.0 {
        "middle"
    } else {
        "back"
    };
    format!("{row}-{column}")
}

fn orientation_phrase(degrees: u16) -> Option<&'static str> {
    match degrees {
        0 => Some("facing the back of the room"),
        90 => Some("facing left"),
        180 => Some("facing the viewer"),
        270 => Some("facing right"),
        _ => None,
    }
}

fn describe_object(object: &RoomObject, layout: &Layout) -> String {
    let (x, y) = center_percent(object, layout);
    let mut line = format!("- {}", object.label);
    if let Some(material) = &object.material_hint {
        line.push_str(&format!(" made of {material}"));
    }
    line.push_str(&format!(" in the {} area of the room", area_phrase(x, y)));
    if object.is_movable() {
        if let Some(facing) = orientation_phrase(object.orientation) {
            line.push_str(&format!(", {facing}"));
        }
    }
    line
}

fn section(lines: &[String], fallback: &str) -> String {
    if lines.is_empty() {
        fallback.to_string()
    } else {
        lines.join("\n")
    }
}

/// Scene description grouped into structure, floor items and furniture.
pub fn scene_description(layout: &Layout, style: &RenderStyle) -> String {
    let mut structural = Vec::new();
    let mut floor = Vec::new();
    let mut furniture = Vec::new();
    for object in layout.objects() {
        let line = describe_object(object, layout);
        if object.is_structural() {
            structural.push(line);
        } else if object.layer == DepthLayer::Floor {
            floor.push(line);
        } else {
            furniture.push(line);
        }
    }

    let dims = layout.dimensions();
    format!(
        "Room size: approximately {} x {} feet\n\n\
         STRUCTURAL ELEMENTS:\n{}\n\n\
         FLOOR ELEMENTS:\n{}\n\n\
         FURNITURE ARRANGEMENT:\n{}\n\n\
         STYLE DETAILS ({}, {} view, {}):\n{}",
        dims.width,
        dims.height,
        section(&structural, "- Standard walls with one entrance"),
        section(&floor, "- Plain flooring"),
        section(&furniture, "- Empty room"),
        style.style,
        style.view_angle,
        style.lighting,
        style_details(&style.style),
    )
}

/// Instructions describing how movable objects moved from `baseline` to
/// `layout`, skipping shifts under 2% of the room span.
pub fn movement_instructions(baseline: &Layout, layout: &Layout) -> Vec<String> {
    layout
        .movable()
        .filter_map(|object| {
            let before = baseline.get(&object.id)?;
            let (x0, y0) = center_percent(before, baseline);
            let (x1, y1) = center_percent(object, layout);
            let (dx, dy) = (x1 - x0, y1 - y0);

            let mut directions = Vec::new();
            if dx.abs() > MOVE_THRESHOLD_PERCENT {
                directions.push(if dx > 0.0 { "right" } else { "left" });
            }
            if dy.abs() > MOVE_THRESHOLD_PERCENT {
                directions.push(if dy > 0.0 { "down" } else { "up" });
            }
            let turned = before.orientation != object.orientation;
            if directions.is_empty() && !turned {
                return None;
            }

            let mut instruction = format!("Move the {}", object.label);
            if !directions.is_empty() {
                instruction.push(' ');
                instruction.push_str(&directions.join(" and "));
            }
            if turned {
                instruction.push_str(&format!(" and turn it to {} degrees", object.orientation));
            }
            Some(instruction)
        })
        .collect()
}
