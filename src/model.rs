//! Room data model
//!
//! Objects, layouts, proposed updates and the variations surfaced to callers.
//! A `Layout` is a value: every pipeline stage owns its own snapshot and new
//! layouts are only ever produced by copying (see `merge`).

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::constraints::Violation;
use crate::error::LayoutError;

// ---------------------------------------------------------------------------
// Geometry primitives
// ---------------------------------------------------------------------------

/// A 2D point in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned box: origin (top-left) plus size, serialized as `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Corners in clockwise order starting at the origin.
    pub fn corners(&self) -> Vec<Point> {
        vec![
            Point::new(self.min_x(), self.min_y()),
            Point::new(self.max_x(), self.min_y()),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.min_x(), self.max_y()),
        ]
    }

    /// Smallest box enclosing all points. `None` for an empty slice.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut lo_x, mut lo_y, mut hi_x, mut hi_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            lo_x = lo_x.min(p.x);
            lo_y = lo_y.min(p.y);
            hi_x = hi_x.max(p.x);
            hi_y = hi_y.max(p.y);
        }
        Some(Self::new(lo_x, lo_y, hi_x - lo_x, hi_y - lo_y))
    }

    /// Finite origin and strictly positive finite size.
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

// ---------------------------------------------------------------------------
// RoomObject
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCategory {
    /// Furniture eligible for repositioning.
    Movable,
    /// Doors, windows, walls. Never moved by the pipeline.
    Structural,
}

/// Vertical layer: 0 floor-level, 1 furniture-level, 2 ceiling-level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DepthLayer {
    Floor,
    #[default]
    Furniture,
    Ceiling,
}

impl TryFrom<u8> for DepthLayer {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DepthLayer::Floor),
            1 => Ok(DepthLayer::Furniture),
            2 => Ok(DepthLayer::Ceiling),
            other => Err(format!("depth layer must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<DepthLayer> for u8 {
    fn from(layer: DepthLayer) -> Self {
        match layer {
            DepthLayer::Floor => 0,
            DepthLayer::Furniture => 1,
            DepthLayer::Ceiling => 2,
        }
    }
}

/// Wrap any integer angle into `0..360`.
pub fn normalize_orientation(degrees: i64) -> u16 {
    degrees.rem_euclid(360) as u16
}

/// Angle as sent over the wire, which may be fractional, rounded to whole
/// degrees. `None` when it is not finite.
pub fn round_orientation(degrees: f64) -> Option<i64> {
    degrees.is_finite().then(|| degrees.round() as i64)
}

fn deserialize_orientation<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    round_orientation(raw)
        .map(normalize_orientation)
        .ok_or_else(|| serde::de::Error::custom("orientation must be a finite angle"))
}

/// One furniture or structural element of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomObject {
    pub id: String,
    pub label: String,
    pub bbox: BoundingBox,
    pub category: ObjectCategory,
    /// Degrees in `0..360`; 0 is the reference direction.
    #[serde(default, deserialize_with = "deserialize_orientation")]
    pub orientation: u16,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub layer: DepthLayer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_hint: Option<String>,
    /// Precise outline; used instead of `bbox` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<Vec<Point>>,
}

impl RoomObject {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        bbox: BoundingBox,
        category: ObjectCategory,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            bbox,
            category,
            orientation: 0,
            locked: false,
            layer: DepthLayer::default(),
            material_hint: None,
            footprint: None,
        }
    }

    pub fn movable(id: impl Into<String>, label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self::new(id, label, bbox, ObjectCategory::Movable)
    }

    pub fn structural(id: impl Into<String>, label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self::new(id, label, bbox, ObjectCategory::Structural)
    }

    pub fn with_orientation(mut self, degrees: i64) -> Self {
        self.orientation = normalize_orientation(degrees);
        self
    }

    pub fn with_layer(mut self, layer: DepthLayer) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_material(mut self, hint: impl Into<String>) -> Self {
        self.material_hint = Some(hint.into());
        self
    }

    pub fn with_footprint(mut self, points: Vec<Point>) -> Self {
        self.footprint = Some(points);
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn is_structural(&self) -> bool {
        self.category == ObjectCategory::Structural
    }

    pub fn is_movable(&self) -> bool {
        self.category == ObjectCategory::Movable
    }

    /// Structural elements whose label names a door.
    pub fn is_door(&self) -> bool {
        self.is_structural() && self.label.to_lowercase().contains("door")
    }

    /// Outline used for geometry: the footprint when present, else the box corners.
    pub fn outline(&self) -> Vec<Point> {
        match &self.footprint {
            Some(points) if points.len() >= 3 => points.clone(),
            _ => self.bbox.corners(),
        }
    }

    /// Axis-aligned extent of the outline.
    pub fn extent(&self) -> BoundingBox {
        match &self.footprint {
            Some(points) if points.len() >= 3 => {
                BoundingBox::enclosing(points).unwrap_or(self.bbox)
            }
            _ => self.bbox,
        }
    }

    fn check(&self) -> Result<(), LayoutError> {
        if self.id.trim().is_empty() {
            return Err(LayoutError::EmptyId);
        }
        if !(self.bbox.x.is_finite() && self.bbox.y.is_finite()) {
            return Err(LayoutError::InvalidPosition(self.id.clone()));
        }
        if !self.bbox.is_well_formed() {
            return Err(LayoutError::InvalidSize {
                id: self.id.clone(),
                width: self.bbox.width,
                height: self.bbox.height,
            });
        }
        if let Some(points) = &self.footprint {
            if points.len() < 3 {
                return Err(LayoutError::DegenerateFootprint {
                    id: self.id.clone(),
                    points: points.len(),
                });
            }
            if points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
                return Err(LayoutError::InvalidPosition(self.id.clone()));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RoomDimensions / LayoutUnit
// ---------------------------------------------------------------------------

/// Real-world room size estimate in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomDimensions {
    pub width: f64,
    pub height: f64,
}

impl RoomDimensions {
    pub fn new(width: f64, height: f64) -> Result<Self, LayoutError> {
        let dims = Self { width, height };
        dims.check()?;
        Ok(dims)
    }

    fn check(&self) -> Result<(), LayoutError> {
        if self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
        {
            Ok(())
        } else {
            Err(LayoutError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// Coordinate unit shared by every object of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutUnit {
    /// 0..100 across each room axis.
    #[default]
    Percent,
    Feet,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct LayoutRepr {
    dimensions: RoomDimensions,
    #[serde(default)]
    unit: LayoutUnit,
    objects: Vec<RoomObject>,
}

/// The complete set of positioned objects for one room, unique by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LayoutRepr", into = "LayoutRepr")]
pub struct Layout {
    dimensions: RoomDimensions,
    unit: LayoutUnit,
    objects: BTreeMap<String, RoomObject>,
}

impl Layout {
    pub fn new(
        dimensions: RoomDimensions,
        unit: LayoutUnit,
        objects: impl IntoIterator<Item = RoomObject>,
    ) -> Result<Self, LayoutError> {
        dimensions.check()?;
        let mut map = BTreeMap::new();
        for mut object in objects {
            object.check()?;
            object.orientation %= 360;
            if map.contains_key(&object.id) {
                return Err(LayoutError::DuplicateId(object.id));
            }
            map.insert(object.id.clone(), object);
        }
        Ok(Self {
            dimensions,
            unit,
            objects: map,
        })
    }

    /// Rebuild around an object map whose members already passed validation.
    pub(crate) fn with_objects(&self, objects: BTreeMap<String, RoomObject>) -> Self {
        Self {
            dimensions: self.dimensions,
            unit: self.unit,
            objects,
        }
    }

    pub fn dimensions(&self) -> RoomDimensions {
        self.dimensions
    }

    pub fn unit(&self) -> LayoutUnit {
        self.unit
    }

    pub fn get(&self, id: &str) -> Option<&RoomObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Objects in identifier order.
    pub fn objects(&self) -> impl Iterator<Item = &RoomObject> {
        self.objects.values()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn movable(&self) -> impl Iterator<Item = &RoomObject> {
        self.objects().filter(|o| o.is_movable())
    }

    pub fn structural(&self) -> impl Iterator<Item = &RoomObject> {
        self.objects().filter(|o| o.is_structural())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn object_map(&self) -> &BTreeMap<String, RoomObject> {
        &self.objects
    }

    /// Room extent along x in layout units.
    pub fn span_x(&self) -> f64 {
        match self.unit {
            LayoutUnit::Percent => 100.0,
            LayoutUnit::Feet => self.dimensions.width,
        }
    }

    /// Room extent along y in layout units.
    pub fn span_y(&self) -> f64 {
        match self.unit {
            LayoutUnit::Percent => 100.0,
            LayoutUnit::Feet => self.dimensions.height,
        }
    }

    /// Convert a horizontal distance in feet into layout units.
    pub fn feet_to_units_x(&self, feet: f64) -> f64 {
        feet * self.span_x() / self.dimensions.width
    }

    /// Convert a vertical distance in feet into layout units.
    pub fn feet_to_units_y(&self, feet: f64) -> f64 {
        feet * self.span_y() / self.dimensions.height
    }

    /// Copy with the given ids flagged as locked. Returns ids not present.
    pub fn with_locked(&self, locked_ids: &[String]) -> (Layout, Vec<String>) {
        let mut objects = self.objects.clone();
        let mut unknown = Vec::new();
        for id in locked_ids {
            match objects.get_mut(id) {
                Some(object) => object.locked = true,
                None => unknown.push(id.clone()),
            }
        }
        (self.with_objects(objects), unknown)
    }
}

impl TryFrom<LayoutRepr> for Layout {
    type Error = LayoutError;

    fn try_from(repr: LayoutRepr) -> Result<Self, Self::Error> {
        Layout::new(repr.dimensions, repr.unit, repr.objects)
    }
}

impl From<Layout> for LayoutRepr {
    fn from(layout: Layout) -> Self {
        LayoutRepr {
            dimensions: layout.dimensions,
            unit: layout.unit,
            objects: layout.objects.into_values().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Proposed updates
// ---------------------------------------------------------------------------

/// Partial update for one object: position/size and/or orientation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<i64>,
}

impl ObjectUpdate {
    pub fn bbox(bbox: BoundingBox) -> Self {
        Self {
            bbox: Some(bbox),
            orientation: None,
        }
    }

    pub fn orientation(degrees: i64) -> Self {
        Self {
            bbox: None,
            orientation: Some(degrees),
        }
    }

    pub fn with_orientation(mut self, degrees: i64) -> Self {
        self.orientation = Some(degrees);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bbox.is_none() && self.orientation.is_none()
    }
}

/// Proposed updates keyed by object id.
pub type UpdateSet = BTreeMap<String, ObjectUpdate>;

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

mod base64_bytes {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// An uploaded photo or a rendered image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomImage {
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl RoomImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Decode plain base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        let (mime_type, payload) = match encoded.split_once(',') {
            Some((header, payload)) if header.starts_with("data:") => {
                let mime = header
                    .trim_start_matches("data:")
                    .split(';')
                    .next()
                    .filter(|m| !m.is_empty())
                    .unwrap_or("image/png");
                (mime.to_string(), payload)
            }
            _ => ("image/png".to_string(), encoded),
        };
        let data = STANDARD.decode(payload.trim().as_bytes())?;
        Ok(Self { mime_type, data })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

// ---------------------------------------------------------------------------
// LayoutVariation
// ---------------------------------------------------------------------------

/// Final verdict of the repair loop for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    AcceptedWithWarnings,
    Rejected,
}

/// A named candidate layout with its validation verdict. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutVariation {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub layout: Layout,
    pub verdict: Verdict,
    /// Violations left after the repair budget ran out.
    #[serde(default)]
    pub residual_violations: Vec<Violation>,
    pub repair_rounds: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<RoomImage>,
    pub created_at: DateTime<Utc>,
}

impl LayoutVariation {
    pub fn is_surviving(&self) -> bool {
        self.verdict != Verdict::Rejected
    }
}
