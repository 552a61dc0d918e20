//! Layout Merge
//!
//! Applies a partial update set to a baseline and returns a new layout. The
//! member set never changes: unknown ids are dropped, structural and locked
//! objects are carried through untouched, and every skipped update is
//! reported as a warning.

use serde::{Deserialize, Serialize};

use crate::model::{normalize_orientation, BoundingBox, Layout, ObjectUpdate, Point, RoomObject, UpdateSet};

/// An update that was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", content = "object_id", rename_all = "snake_case")]
pub enum MergeWarning {
    /// Id not present in the baseline.
    UnknownObject(String),
    /// Structural objects never move.
    StructuralTarget(String),
    /// Locked by the user.
    LockedTarget(String),
    /// Non-finite or non-positive box.
    InvalidBox(String),
}

impl MergeWarning {
    pub fn object_id(&self) -> &str {
        match self {
            MergeWarning::UnknownObject(id)
            | MergeWarning::StructuralTarget(id)
            | MergeWarning::LockedTarget(id)
            | MergeWarning::InvalidBox(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub layout: Layout,
    pub warnings: Vec<MergeWarning>,
}

/// Merge `updates` into a copy of `baseline`.
pub fn merge(baseline: &Layout, updates: &UpdateSet) -> MergeOutcome {
    let mut objects = baseline.object_map().clone();
    let mut warnings = Vec::new();

    for (id, update) in updates {
        let Some(object) = objects.get_mut(id) else {
            tracing::debug!(object_id = %id, "Ignoring update for unknown object");
            warnings.push(MergeWarning::UnknownObject(id.clone()));
            continue;
        };
        if update.is_empty() {
            continue;
        }
        if object.is_structural() {
            warnings.push(MergeWarning::StructuralTarget(id.clone()));
            continue;
        }
        if object.locked {
            warnings.push(MergeWarning::LockedTarget(id.clone()));
            continue;
        }
        if let Some(bbox) = update.bbox {
            if !bbox.is_well_formed() {
                warnings.push(MergeWarning::InvalidBox(id.clone()));
                continue;
            }
        }
        apply(object, update);
    }

    if !warnings.is_empty() {
        tracing::debug!(warnings = warnings.len(), "Merge skipped updates");
    }

    MergeOutcome {
        layout: baseline.with_objects(objects),
        warnings,
    }
}

fn apply(object: &mut RoomObject, update: &ObjectUpdate) {
    if let Some(bbox) = update.bbox {
        if let Some(points) = object.footprint.as_mut() {
            remap_footprint(points, object.bbox, bbox);
        }
        object.bbox = bbox;
    }
    if let Some(degrees) = update.orientation {
        object.orientation = normalize_orientation(degrees);
    }
}

/// Carry a footprint along with its box: translate and scale per axis.
fn remap_footprint(points: &mut [Point], from: BoundingBox, to: BoundingBox) {
    let sx = to.width / from.width;
    let sy = to.height / from.height;
    for p in points.iter_mut() {
        p.x = to.x + (p.x - from.x) * sx;
        p.y = to.y + (p.y - from.y) * sy;
    }
}
