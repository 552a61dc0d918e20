//! Constraint Engine
//!
//! Evaluates a layout against the fixed hard-constraint set and returns typed
//! violations. An empty list means the layout is fully valid.
//!
//! Output order is deterministic: by rule kind, then by offending ids.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{self, GeometryRules};
use crate::model::Layout;

const EPSILON: f64 = 1e-9;

/// Rule kinds, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    Overlap,
    DoorClearance,
    OutOfBounds,
    StructuralImmutable,
}

impl ViolationKind {
    /// Fatal kinds reject a candidate even after the repair budget is spent.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ViolationKind::OutOfBounds | ViolationKind::StructuralImmutable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::Overlap => "OVERLAP",
            ViolationKind::DoorClearance => "DOOR_CLEARANCE",
            ViolationKind::OutOfBounds => "OUT_OF_BOUNDS",
            ViolationKind::StructuralImmutable => "STRUCTURAL_IMMUTABLE",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One breach of a hard constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Offending object ids, sorted.
    pub object_ids: Vec<String>,
    pub description: String,
    /// Minimum corrective displacement in layout units, where one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<f64>,
}

impl Violation {
    fn new(kind: ViolationKind, mut object_ids: Vec<String>, description: String) -> Self {
        object_ids.sort();
        object_ids.dedup();
        Self {
            kind,
            object_ids,
            description,
            correction: None,
        }
    }

    fn with_correction(mut self, amount: f64) -> Self {
        self.correction = Some(amount);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    pub fn involves(&self, id: &str) -> bool {
        self.object_ids.iter().any(|o| o == id)
    }
}

/// Validates candidates against the rule set and a retained baseline.
///
/// The baseline is the extraction output; it is only read, so one engine can
/// be shared across concurrent repair loops.
#[derive(Debug, Clone)]
pub struct ConstraintEngine {
    rules: GeometryRules,
    baseline: Arc<Layout>,
}

impl ConstraintEngine {
    pub fn new(rules: GeometryRules, baseline: Arc<Layout>) -> Self {
        Self { rules, baseline }
    }

    pub fn rules(&self) -> &GeometryRules {
        &self.rules
    }

    pub fn baseline(&self) -> &Layout {
        &self.baseline
    }

    /// Run every rule against `layout`.
    pub fn validate(&self, layout: &Layout) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.check_overlaps(layout, &mut violations);
        self.check_doors(layout, &mut violations);
        self.check_bounds(layout, &mut violations);
        self.check_structural(layout, &mut violations);

        violations.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.object_ids.cmp(&b.object_ids))
        });
        violations
    }

    pub fn is_valid(&self, layout: &Layout) -> bool {
        self.validate(layout).is_empty()
    }

    fn check_overlaps(&self, layout: &Layout, out: &mut Vec<Violation>) {
        let clearance = self.rules.clearance_for(layout);
        let objects: Vec<_> = layout.objects().collect();
        for (i, a) in objects.iter().enumerate() {
            for b in &objects[i + 1..] {
                if let Some(depth) = geometry::overlap_depth(a, b, clearance) {
                    out.push(
                        Violation::new(
                            ViolationKind::Overlap,
                            vec![a.id.clone(), b.id.clone()],
                            format!(
                                "{} '{}' overlaps {} '{}'",
                                a.label, a.id, b.label, b.id
                            ),
                        )
                        .with_correction(depth),
                    );
                }
            }
        }
    }

    fn check_doors(&self, layout: &Layout, out: &mut Vec<Violation>) {
        for door in layout.structural().filter(|o| o.is_door()) {
            let shortfall = geometry::clearance_in_front_of_door(door, layout, &self.rules);
            if shortfall <= EPSILON {
                continue;
            }
            let mut ids = vec![door.id.clone()];
            ids.extend(geometry::door_obstructions(door, layout, &self.rules));
            out.push(
                Violation::new(
                    ViolationKind::DoorClearance,
                    ids,
                    format!(
                        "door '{}' needs {} ft of clear space in front of it",
                        door.id, self.rules.door_clearance_ft
                    ),
                )
                .with_correction(shortfall),
            );
        }
    }

    fn check_bounds(&self, layout: &Layout, out: &mut Vec<Violation>) {
        for object in layout.objects() {
            let overflow = geometry::bounds_overflow(object, layout);
            if overflow > EPSILON {
                out.push(
                    Violation::new(
                        ViolationKind::OutOfBounds,
                        vec![object.id.clone()],
                        format!("{} '{}' extends outside the room", object.label, object.id),
                    )
                    .with_correction(overflow),
                );
            }
        }
    }

    fn check_structural(&self, layout: &Layout, out: &mut Vec<Violation>) {
        for original in self.baseline.structural() {
            match layout.get(&original.id) {
                None => out.push(Violation::new(
                    ViolationKind::StructuralImmutable,
                    vec![original.id.clone()],
                    format!("structural {} '{}' was removed", original.label, original.id),
                )),
                Some(current) if current.is_movable() => out.push(Violation::new(
                    ViolationKind::StructuralImmutable,
                    vec![original.id.clone()],
                    format!(
                        "structural {} '{}' was recategorized as movable",
                        original.label, original.id
                    ),
                )),
                Some(current) if current.bbox != original.bbox => {
                    let (a, b) = (original.bbox, current.bbox);
                    let drift = (a.x - b.x)
                        .abs()
                        .max((a.y - b.y).abs())
                        .max((a.width - b.width).abs())
                        .max((a.height - b.height).abs());
                    out.push(
                        Violation::new(
                            ViolationKind::StructuralImmutable,
                            vec![original.id.clone()],
                            format!("structural {} '{}' was moved", original.label, original.id),
                        )
                        .with_correction(drift),
                    );
                }
                Some(_) => {}
            }
        }

        for added in layout
            .structural()
            .filter(|o| self.baseline.get(&o.id).map_or(true, |b| b.is_movable()))
        {
            out.push(Violation::new(
                ViolationKind::StructuralImmutable,
                vec![added.id.clone()],
                format!("structural {} '{}' is not in the original room", added.label, added.id),
            ));
        }
    }
}
