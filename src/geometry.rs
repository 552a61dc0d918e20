//! Geometry Engine
//!
//! Pure, total functions over object outlines: overlap, door clearance and
//! room containment. Outlines are treated as convex polygons and tested with
//! the separating axis theorem, so axis-aligned boxes and precise footprints
//! share one code path.
//!
//! All distances returned here are in the layout's own unit. Rules expressed
//! in feet are converted through the layout's room dimensions.

use serde::{Deserialize, Serialize};

use crate::model::{Layout, Point, RoomObject};

const EPSILON: f64 = 1e-9;

/// Hard-constraint thresholds, in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryRules {
    /// Overlap shallower than this is tolerated (default 6 inches).
    pub min_clearance_ft: f64,
    /// Free space required in front of every door (default 3 ft).
    pub door_clearance_ft: f64,
}

impl Default for GeometryRules {
    fn default() -> Self {
        Self {
            min_clearance_ft: 0.5,
            door_clearance_ft: 3.0,
        }
    }
}

impl GeometryRules {
    /// Overlap tolerance converted to the layout's unit.
    pub fn clearance_for(&self, layout: &Layout) -> Clearance {
        Clearance {
            x: layout.feet_to_units_x(self.min_clearance_ft),
            y: layout.feet_to_units_y(self.min_clearance_ft),
        }
    }
}

/// Per-axis tolerance in layout units. Percent layouts of non-square rooms
/// have different scales along x and y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clearance {
    pub x: f64,
    pub y: f64,
}

impl Clearance {
    pub fn uniform(value: f64) -> Self {
        Self { x: value, y: value }
    }

    fn along(&self, axis: Point) -> f64 {
        (self.x * axis.x).hypot(self.y * axis.y)
    }
}

fn project(points: &[Point], axis: Point) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for p in points {
        let dot = p.x * axis.x + p.y * axis.y;
        lo = lo.min(dot);
        hi = hi.max(dot);
    }
    (lo, hi)
}

/// Smallest displacement (beyond the tolerance) that would separate the two
/// outlines, or `None` when they are already separated on some axis.
fn penetration(a: &[Point], b: &[Point], clearance: Clearance) -> Option<f64> {
    let mut excess = f64::INFINITY;
    for outline in [a, b] {
        let n = outline.len();
        for i in 0..n {
            let p = outline[i];
            let q = outline[(i + 1) % n];
            let (ex, ey) = (q.x - p.x, q.y - p.y);
            let len = ex.hypot(ey);
            if len < EPSILON {
                continue;
            }
            let axis = Point::new(-ey / len, ex / len);
            let (min_a, max_a) = project(a, axis);
            let (min_b, max_b) = project(b, axis);
            let overlap = max_a.min(max_b) - min_a.max(min_b);
            let tolerance = clearance.along(axis);
            if overlap <= tolerance + EPSILON {
                return None;
            }
            excess = excess.min(overlap - tolerance);
        }
    }
    excess.is_finite().then_some(excess)
}

/// Overlap depth beyond the tolerance. Structural-vs-structural pairs are
/// exempt and always yield `None`.
pub fn overlap_depth(a: &RoomObject, b: &RoomObject, clearance: Clearance) -> Option<f64> {
    if a.is_structural() && b.is_structural() {
        return None;
    }
    penetration(&a.outline(), &b.outline(), clearance)
}

/// True if the outlines intersect by more than the clearance tolerance.
pub fn overlaps(a: &RoomObject, b: &RoomObject, clearance: Clearance) -> bool {
    overlap_depth(a, b, clearance).is_some()
}

// ---------------------------------------------------------------------------
// Doors
// ---------------------------------------------------------------------------

/// Side a door opens toward, in plan coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningSide {
    Down,
    Left,
    Up,
    Right,
}

impl OpeningSide {
    /// Orientation snapped to the nearest quarter turn: 0 → down, 90 → left,
    /// 180 → up, 270 → right.
    pub fn from_orientation(degrees: u16) -> Self {
        match ((u32::from(degrees) + 45) % 360) / 90 {
            0 => OpeningSide::Down,
            1 => OpeningSide::Left,
            2 => OpeningSide::Up,
            _ => OpeningSide::Right,
        }
    }

    fn is_vertical(self) -> bool {
        matches!(self, OpeningSide::Down | OpeningSide::Up)
    }
}

fn spans_overlap(a_lo: f64, a_hi: f64, b_lo: f64, b_hi: f64) -> bool {
    a_hi.min(b_hi) - a_lo.max(b_lo) > EPSILON
}

fn required_door_clearance(side: OpeningSide, layout: &Layout, rules: &GeometryRules) -> f64 {
    if side.is_vertical() {
        layout.feet_to_units_y(rules.door_clearance_ft)
    } else {
        layout.feet_to_units_x(rules.door_clearance_ft)
    }
}

/// Movable objects in the door's swing path, with their distance from the
/// door's leading edge.
fn door_gaps<'a>(door: &RoomObject, layout: &'a Layout) -> Vec<(&'a RoomObject, f64)> {
    let side = OpeningSide::from_orientation(door.orientation);
    let d = door.extent();
    layout
        .movable()
        .filter(|obstacle| obstacle.id != door.id)
        .filter_map(|obstacle| {
            let e = obstacle.extent();
            let gap = match side {
                OpeningSide::Down => (spans_overlap(d.min_x(), d.max_x(), e.min_x(), e.max_x())
                    && e.max_y() > d.max_y() + EPSILON)
                    .then(|| (e.min_y() - d.max_y()).max(0.0)),
                OpeningSide::Up => (spans_overlap(d.min_x(), d.max_x(), e.min_x(), e.max_x())
                    && e.min_y() < d.min_y() - EPSILON)
                    .then(|| (d.min_y() - e.max_y()).max(0.0)),
                OpeningSide::Left => (spans_overlap(d.min_y(), d.max_y(), e.min_y(), e.max_y())
                    && e.min_x() < d.min_x() - EPSILON)
                    .then(|| (d.min_x() - e.max_x()).max(0.0)),
                OpeningSide::Right => (spans_overlap(d.min_y(), d.max_y(), e.min_y(), e.max_y())
                    && e.max_x() > d.max_x() + EPSILON)
                    .then(|| (e.min_x() - d.max_x()).max(0.0)),
            };
            gap.map(|gap| (obstacle, gap))
        })
        .collect()
}

/// Shortfall of free space in front of `door` in layout units, zero when the
/// clearance is met.
///
/// The clearance zone spans the door's width on the opening side, up to the
/// required depth. Only movable objects obstruct it.
pub fn clearance_in_front_of_door(door: &RoomObject, layout: &Layout, rules: &GeometryRules) -> f64 {
    let side = OpeningSide::from_orientation(door.orientation);
    let required = required_door_clearance(side, layout, rules);
    let free = door_gaps(door, layout)
        .into_iter()
        .map(|(_, gap)| gap)
        .fold(required, f64::min);
    (required - free).max(0.0)
}

/// Ids of the movable objects inside the door's clearance zone.
pub fn door_obstructions(door: &RoomObject, layout: &Layout, rules: &GeometryRules) -> Vec<String> {
    let side = OpeningSide::from_orientation(door.orientation);
    let required = required_door_clearance(side, layout, rules);
    door_gaps(door, layout)
        .into_iter()
        .filter(|(_, gap)| *gap < required - EPSILON)
        .map(|(obstacle, _)| obstacle.id.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Room bounds
// ---------------------------------------------------------------------------

/// How far the outline pokes outside the room, zero when fully inside.
pub fn bounds_overflow(object: &RoomObject, layout: &Layout) -> f64 {
    let (span_x, span_y) = (layout.span_x(), layout.span_y());
    object
        .outline()
        .iter()
        .map(|p| {
            (-p.x)
                .max(p.x - span_x)
                .max(-p.y)
                .max(p.y - span_y)
                .max(0.0)
        })
        .fold(0.0, f64::max)
}

pub fn within_room_bounds(object: &RoomObject, layout: &Layout) -> bool {
    bounds_overflow(object, layout) <= EPSILON
}
