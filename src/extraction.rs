//! Vision payload parsing
//!
//! Turns the JSON document a vision service returns for a floor-plan photo
//! into a percent-unit baseline layout. Boxes arrive as
//! `[ymin, xmin, ymax, xmax]` normalized to 0-1000.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::model::{
    round_orientation, BoundingBox, DepthLayer, Layout, LayoutUnit, ObjectCategory, RoomDimensions,
    RoomObject,
};
use crate::schema::strip_code_fences;

const NORMALIZED_SPAN: f64 = 1000.0;

#[derive(Debug, Deserialize)]
struct VisionPayload {
    room_dimensions: VisionDimensions,
    #[serde(default)]
    objects: Vec<VisionObject>,
}

#[derive(Debug, Deserialize)]
struct VisionDimensions {
    #[serde(alias = "width")]
    width_estimate: f64,
    #[serde(alias = "height")]
    height_estimate: f64,
}

#[derive(Debug, Deserialize)]
struct VisionObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: Option<String>,
    box_2d: [f64; 4],
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    orientation: Option<f64>,
    #[serde(default, alias = "z_index")]
    layer: Option<u8>,
    #[serde(default)]
    material_hint: Option<String>,
}

fn extraction_failed(message: impl Into<String>) -> PipelineError {
    PipelineError::ExtractionFailed(message.into())
}

/// `[ymin, xmin, ymax, xmax]` in 0-1000 to a percent `[x, y, w, h]` box.
fn to_percent_box([ymin, xmin, ymax, xmax]: [f64; 4]) -> BoundingBox {
    let clamp = |v: f64| v.clamp(0.0, NORMALIZED_SPAN);
    let (x0, x1) = (clamp(xmin.min(xmax)), clamp(xmin.max(xmax)));
    let (y0, y1) = (clamp(ymin.min(ymax)), clamp(ymin.max(ymax)));
    let per_percent = NORMALIZED_SPAN / 100.0;
    BoundingBox::new(
        x0 / per_percent,
        y0 / per_percent,
        (x1 - x0) / per_percent,
        (y1 - y0) / per_percent,
    )
}

/// Parse a vision-service response into a baseline layout.
///
/// Objects without an id get `obj_<n>`; repeated ids get a numeric suffix.
/// Objects whose box collapses to nothing are dropped with a warning.
pub fn parse_vision_payload(raw: &str) -> Result<Layout, PipelineError> {
    let payload: VisionPayload = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| extraction_failed(format!("invalid vision payload: {e}")))?;

    let dims = RoomDimensions::new(
        payload.room_dimensions.width_estimate,
        payload.room_dimensions.height_estimate,
    )
    .map_err(|e| extraction_failed(e.to_string()))?;

    let mut seen = BTreeSet::new();
    let mut objects = Vec::with_capacity(payload.objects.len());
    for (index, raw_object) in payload.objects.into_iter().enumerate() {
        let bbox = to_percent_box(raw_object.box_2d);
        let base_id = raw_object
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("obj_{index}"));
        if !bbox.is_well_formed() {
            tracing::warn!(object_id = %base_id, "Dropping object with empty box");
            continue;
        }

        let mut id = base_id.clone();
        let mut suffix = 2;
        while seen.contains(&id) {
            id = format!("{base_id}_{suffix}");
            suffix += 1;
        }
        if id != base_id {
            tracing::warn!(object_id = %base_id, renamed = %id, "Renamed duplicate object id");
        }
        seen.insert(id.clone());

        let category = match raw_object.kind.as_deref() {
            Some("structural") => ObjectCategory::Structural,
            _ => ObjectCategory::Movable,
        };
        let label = raw_object.label.unwrap_or_else(|| "unknown".to_string());
        let mut object = RoomObject::new(id, label, bbox, category)
            .with_orientation(raw_object.orientation.and_then(round_orientation).unwrap_or(0));
        if let Some(layer) = raw_object.layer.and_then(|l| DepthLayer::try_from(l).ok()) {
            object = object.with_layer(layer);
        }
        if let Some(hint) = raw_object.material_hint {
            object = object.with_material(hint);
        }
        objects.push(object);
    }

    tracing::info!(objects = objects.len(), "Parsed vision payload");
    Layout::new(dims, LayoutUnit::Percent, objects).map_err(|e| extraction_failed(e.to_string()))
}
