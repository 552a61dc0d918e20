//! End-to-end rule and generation scenarios.
//!
//! Each test drives the real constraint engine, generator and repair loop
//! with fakes standing in for the reasoning service.

mod helpers;

use std::sync::Arc;

use helpers::*;
use layout_pipeline::{
    merge, BoundingBox, CandidateState, ConstraintEngine, GenerationError, GeometryRules,
    ObjectUpdate, RepairLoop, RoomObject, SchemaViolation, TransientFailure, UpdateSet, Verdict,
    VariationGenerator, ViolationKind,
};

fn engine_for(baseline: &layout_pipeline::Layout) -> ConstraintEngine {
    ConstraintEngine::new(GeometryRules::default(), Arc::new(baseline.clone()))
}

// =============================================================================
// Geometry rules
// =============================================================================

#[test]
fn overlapping_pair_yields_one_overlap() {
    let layout = feet_layout(vec![
        RoomObject::movable("chair_1", "chair", BoundingBox::new(0.0, 0.0, 4.0, 4.0)),
        RoomObject::movable("table_1", "table", BoundingBox::new(2.0, 2.0, 4.0, 4.0)),
    ]);

    let violations = engine_for(&layout).validate(&layout);

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::Overlap);
    assert_eq!(violations[0].object_ids, vec!["chair_1", "table_1"]);
}

#[test]
fn door_clearance_only_fires_when_blocked() {
    let open = feet_layout(vec![door()]);
    let violations = engine_for(&open).validate(&open);
    assert!(violations
        .iter()
        .all(|v| v.kind != ViolationKind::DoorClearance));

    let blocked = feet_layout(vec![
        door(),
        RoomObject::movable("box_1", "box", BoundingBox::new(10.0, 0.5, 2.0, 2.0)),
    ]);
    let door_violations: Vec<_> = engine_for(&open)
        .validate(&blocked)
        .into_iter()
        .filter(|v| v.kind == ViolationKind::DoorClearance)
        .collect();
    assert_eq!(door_violations.len(), 1);
    assert!(door_violations[0].involves("door_1"));
    assert!(door_violations[0].involves("box_1"));
}

#[test]
fn moving_structure_is_always_reported() {
    let baseline = bedroom();
    let shifted = moved(&baseline, "door_1", BoundingBox::new(12.0, 0.0, 3.0, 1.0));

    let violations = engine_for(&baseline).validate(&shifted);

    let structural: Vec<_> = violations
        .iter()
        .filter(|v| v.kind == ViolationKind::StructuralImmutable)
        .collect();
    assert_eq!(structural.len(), 1);
    assert_eq!(structural[0].object_ids, vec!["door_1"]);
    assert!(structural[0].is_fatal());
}

#[test]
fn merge_never_moves_structure() {
    let baseline = bedroom();
    let mut updates = UpdateSet::new();
    updates.insert(
        "door_1".into(),
        ObjectUpdate::bbox(BoundingBox::new(0.0, 0.0, 3.0, 1.0)),
    );

    let outcome = merge(&baseline, &updates);

    assert_eq!(outcome.layout, baseline);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(engine_for(&baseline).validate(&outcome.layout).is_empty());
}

#[test]
fn validation_is_deterministic_and_idempotent() {
    let layout = feet_layout(vec![
        door(),
        RoomObject::movable("a", "chair", BoundingBox::new(0.0, 0.0, 4.0, 4.0)),
        RoomObject::movable("b", "desk", BoundingBox::new(2.0, 2.0, 4.0, 4.0)),
        RoomObject::movable("c", "lamp", BoundingBox::new(10.5, 1.0, 1.0, 1.0)),
        RoomObject::movable("d", "shelf", BoundingBox::new(18.0, 14.0, 4.0, 4.0)),
    ]);
    let engine = engine_for(&layout);

    let first = engine.validate(&layout);
    let second = engine.validate(&layout);
    assert_eq!(first, second);
    assert!(first.len() >= 3);
    let kinds: Vec<_> = first.iter().map(|v| v.kind).collect();
    let mut sorted = kinds.clone();
    sorted.sort();
    assert_eq!(kinds, sorted);

    let clean = bedroom();
    let engine = engine_for(&clean);
    assert!(engine.validate(&clean).is_empty());
    assert!(engine.validate(&clean).is_empty());
}

// =============================================================================
// Variation generator
// =============================================================================

#[tokio::test]
async fn generator_recovers_after_two_failures() {
    let good = proposal("Open Plan", r#"[{"id": "desk_1", "bbox": [14, 10, 4, 2]}]"#);
    let client = ScriptedClient::new(vec![None, Some("```json\n{\"variations\": 7}\n```"), Some(good.as_str())]);
    let generator = VariationGenerator::new(client.clone(), fast_policy(), GeometryRules::default());

    let generated = generator.propose(&bedroom(), &[], 1, None).await.unwrap();

    assert_eq!(generated.attempts, 3);
    assert_eq!(client.calls(), 3);
    assert_eq!(generated.value.len(), 1);
    assert_eq!(generated.value[0].name, "Open Plan");
    assert_eq!(
        generated.value[0].updates["desk_1"].bbox,
        Some(BoundingBox::new(14.0, 10.0, 4.0, 2.0))
    );
}

#[tokio::test]
async fn generator_exhausts_on_unknown_ids() {
    let ghost = proposal("Haunted", r#"[{"id": "ghost_1", "bbox": [1, 1, 2, 2]}]"#);
    let client = ScriptedClient::always(&ghost);
    let generator = VariationGenerator::new(client.clone(), fast_policy(), GeometryRules::default());

    let err = generator.propose(&bedroom(), &[], 1, None).await.unwrap_err();

    assert_eq!(
        err,
        GenerationError::GenerationExhausted {
            attempts: 3,
            last_failure: TransientFailure::Schema(SchemaViolation::UnknownObject("ghost_1".into())),
        }
    );
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn locked_objects_are_presented_as_fixed() {
    let good = proposal("Desk Swap", r#"[{"id": "desk_1", "bbox": [14, 10, 4, 2]}]"#);
    let client = ScriptedClient::always(&good);
    let generator = VariationGenerator::new(client, fast_policy(), GeometryRules::default());

    let generated = generator
        .propose(&bedroom(), &["bed_1".to_string(), "sofa_9".to_string()], 1, Some("Cozy"))
        .await
        .unwrap();
    assert_eq!(generated.attempts, 1);

    let (locked, unknown) = bedroom().with_locked(&["bed_1".to_string()]);
    assert!(unknown.is_empty());
    let mut updates = UpdateSet::new();
    updates.insert("bed_1".into(), ObjectUpdate::bbox(BoundingBox::new(0.0, 0.0, 5.0, 6.0)));
    assert_eq!(merge(&locked, &updates).layout, locked);
}

// =============================================================================
// Repair loop
// =============================================================================

#[tokio::test]
async fn one_repair_round_fixes_overlap() {
    let baseline = Arc::new(bedroom());
    let client = ScriptedClient::always(REPAIR_DESK);
    let generator = VariationGenerator::new(client.clone(), fast_policy(), GeometryRules::default());
    let engine = ConstraintEngine::new(GeometryRules::default(), baseline.clone());
    let repair = RepairLoop::new(generator, engine, 2);

    let mut updates = UpdateSet::new();
    updates.insert("desk_1".into(), ObjectUpdate::bbox(BoundingBox::new(3.0, 7.0, 4.0, 2.0)));
    let outcome = repair.run(baseline.clone(), &updates).await;

    assert_eq!(outcome.verdict, Verdict::Accepted);
    assert_eq!(outcome.rounds, 1);
    assert!(outcome.residual_violations.is_empty());
    assert_eq!(client.calls(), 1);
    assert_eq!(
        outcome
            .trace
            .iter()
            .filter(|s| **s == CandidateState::Repairing)
            .count(),
        1
    );
    assert_eq!(outcome.trace.last(), Some(&CandidateState::Accepted));
    assert_eq!(
        outcome.layout.get("desk_1").map(|o| o.bbox),
        Some(BoundingBox::new(14.0, 8.0, 4.0, 2.0))
    );
}

#[tokio::test]
async fn repair_rounds_stay_within_budget() {
    let baseline = Arc::new(bedroom());
    // keeps proposing the same overlap
    let client = ScriptedClient::always(r#"{"objects": [{"id": "desk_1", "bbox": [3, 7, 4, 2]}]}"#);
    let generator = VariationGenerator::new(client.clone(), fast_policy(), GeometryRules::default());
    let engine = ConstraintEngine::new(GeometryRules::default(), baseline.clone());

    for budget in 0..4 {
        let repair = RepairLoop::new(generator.clone(), engine.clone(), budget);
        let mut updates = UpdateSet::new();
        updates.insert("desk_1".into(), ObjectUpdate::bbox(BoundingBox::new(3.0, 7.0, 4.0, 2.0)));

        let outcome = repair.run(baseline.clone(), &updates).await;

        assert_eq!(outcome.rounds, budget);
        assert_eq!(outcome.verdict, Verdict::AcceptedWithWarnings);
        assert!(outcome.trace.last().is_some_and(|s| s.is_terminal()));
    }
}
