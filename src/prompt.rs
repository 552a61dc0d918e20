//! Prompt builders for proposal and repair rounds.
//!
//! Proposal prompts carry the whole room. Repair prompts carry only the
//! violation list and the current candidate's movable objects.

use serde_json::{json, Value};

use crate::constraints::Violation;
use crate::geometry::GeometryRules;
use crate::model::{Layout, LayoutUnit, RoomObject};
use crate::reasoning::{PromptContext, PromptPurpose};

/// At most this many violations are spelled out in a repair prompt.
const MAX_LISTED_VIOLATIONS: usize = 8;

const SYSTEM_PROMPT: &str = r#"You are a master interior architect producing furniture layouts for a top-down floor plan.

You never move, resize or invent objects that are not listed as movable.
You respond with a single JSON document and nothing else."#;

/// Short design brief for the known themes; unknown themes pass through by name.
pub fn theme_guidance(theme: &str) -> &'static str {
    match theme {
        "Work Focused" => "Prioritize productivity. Put the desk near natural light and carve out a dedicated workspace zone.",
        "Cozy" => "Prioritize comfort. Create intimate seating areas and a warm arrangement, such as the bed tucked into a corner.",
        "Creative/Aesthetic" => "An artistic, unconventional arrangement with asymmetrical balance.",
        _ => "Follow the theme's name as the design brief.",
    }
}

fn unit_phrase(layout: &Layout) -> String {
    let dims = layout.dimensions();
    match layout.unit() {
        LayoutUnit::Percent => format!(
            "{} x {} feet, coordinates are percentages (0-100) of the room on each axis",
            dims.width, dims.height
        ),
        LayoutUnit::Feet => format!(
            "{} x {} feet, coordinates are in feet from the top-left corner",
            dims.width, dims.height
        ),
    }
}

fn object_json(object: &RoomObject) -> Value {
    let mut value = json!({
        "id": object.id,
        "label": object.label,
        "bbox": object.bbox,
        "orientation": object.orientation,
        "layer": object.layer,
    });
    if let Some(hint) = &object.material_hint {
        value["material_hint"] = json!(hint);
    }
    value
}

fn rules_text(layout: &Layout, rules: &GeometryRules) -> String {
    let clearance = rules.clearance_for(layout);
    format!(
        "1. Never move structural or locked objects.\n\
         2. No overlaps: objects may not intersect by more than {:.2} x {:.2} units.\n\
         3. Keep {} ft of free space in front of every door.\n\
         4. Keep every object inside the room (0-{} on x, 0-{} on y).",
        clearance.x,
        clearance.y,
        rules.door_clearance_ft,
        layout.span_x(),
        layout.span_y(),
    )
}

/// Prompt asking for `desired_count` named variations of `layout`.
///
/// Locked objects are listed with the fixed elements.
pub fn proposal_prompt(
    layout: &Layout,
    desired_count: usize,
    theme: Option<&str>,
    rules: &GeometryRules,
) -> PromptContext {
    let (fixed, movable): (Vec<&RoomObject>, Vec<&RoomObject>) = layout
        .objects()
        .partition(|o| o.is_structural() || o.locked);
    let fixed: Vec<Value> = fixed.into_iter().map(object_json).collect();
    let movable: Vec<Value> = movable.into_iter().map(object_json).collect();

    let brief = match theme {
        Some(theme) => format!(
            "Generate EXACTLY {desired_count} layout variation(s) in the \"{theme}\" theme.\n{}",
            theme_guidance(theme)
        ),
        None => format!("Generate EXACTLY {desired_count} distinct layout variation(s)."),
    };

    let user = format!(
        r#"ROOM: {room}

FIXED ELEMENTS (never move):
{fixed:#}

MOVABLE FURNITURE:
{movable:#}

TASK:
{brief}

Keep nightstands beside the head of the bed, group chairs with tables or desks, and keep fixtures of one zone (kitchen, bathroom) together.

HARD RULES:
{rules}

OUTPUT JSON:
{{
  "variations": [
    {{"name": "...", "description": "...", "objects": [{{"id": "...", "bbox": [x, y, w, h], "orientation": 0}}]}}
  ]
}}
Only list movable objects in "objects". Use the ids exactly as given."#,
        room = unit_phrase(layout),
        fixed = Value::Array(fixed),
        movable = Value::Array(movable),
        brief = brief,
        rules = rules_text(layout, rules),
    );

    PromptContext::new(PromptPurpose::Proposal, SYSTEM_PROMPT, user)
}

/// Prompt asking to fix `violations` on `candidate`, touching only the
/// offending movable objects.
pub fn repair_prompt(
    candidate: &Layout,
    violations: &[Violation],
    repairable: &[String],
    rules: &GeometryRules,
) -> PromptContext {
    let listed: Vec<String> = violations
        .iter()
        .take(MAX_LISTED_VIOLATIONS)
        .map(|v| format!("- {}: {}", v.kind, v.description))
        .collect();
    let omitted = violations.len().saturating_sub(MAX_LISTED_VIOLATIONS);

    let movable: Vec<Value> = candidate.movable().map(object_json).collect();
    let fixed: Vec<Value> = candidate.structural().map(object_json).collect();

    let mut user = format!(
        "The layout has these CONSTRAINT VIOLATIONS:\n{}\n",
        listed.join("\n")
    );
    if omitted > 0 {
        user.push_str(&format!("(and {omitted} more)\n"));
    }
    user.push_str(&format!(
        r#"
ROOM: {room}

FIXED ELEMENTS:
{fixed:#}

CURRENT MOVABLE OBJECTS:
{movable:#}

RULES:
{rules}

Return ONLY a JSON array of corrected objects, limited to these ids: {ids}
[{{"id": "object_id", "bbox": [x, y, w, h], "orientation": 0}}]"#,
        room = unit_phrase(candidate),
        fixed = Value::Array(fixed),
        movable = Value::Array(movable),
        rules = rules_text(candidate, rules),
        ids = repairable.join(", "),
    ));

    PromptContext::new(PromptPurpose::Repair, SYSTEM_PROMPT, user)
}
