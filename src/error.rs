//! Typed error model for the layout pipeline.
//!
//! Failures fall into three tiers:
//!
//! ```text
//! TransientFailure   → retried inside the VariationGenerator budget
//! GenerationError    → budget spent, surfaced to the orchestrator
//! PipelineError      → surfaced to the caller of the orchestrator
//! ```
//!
//! Constraint violations are not errors. They drive the repair loop and only
//! become a `PipelineError` when a chat edit would introduce them.

use serde::{Deserialize, Serialize};

use crate::constraints::Violation;
use crate::pipeline::{PipelineEvent, PipelineStage};

// ---------------------------------------------------------------------------
// LayoutError: malformed input rejected before geometry runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("Duplicate object id '{0}'")]
    DuplicateId(String),

    #[error("Object '{id}' has a non-positive or non-finite size ({width} x {height})")]
    InvalidSize { id: String, width: f64, height: f64 },

    #[error("Object '{0}' has a non-finite position")]
    InvalidPosition(String),

    #[error("Object '{id}' footprint needs at least 3 points, got {points}")]
    DegenerateFootprint { id: String, points: usize },

    #[error("Room dimensions must be positive, got {width} x {height}")]
    InvalidDimensions { width: f64, height: f64 },

    #[error("Object id must not be empty")]
    EmptyId,
}

// ---------------------------------------------------------------------------
// SchemaViolation / TransientFailure: retried under one budget
// ---------------------------------------------------------------------------

/// Generator output that parsed as JSON but breaks the response contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "violation", content = "object_id", rename_all = "snake_case")]
pub enum SchemaViolation {
    #[error("response contained no variations")]
    EmptyVariations,

    #[error("variation is missing a name")]
    MissingName,

    #[error("variation is missing a description")]
    MissingDescription,

    #[error("update references unknown object '{0}'")]
    UnknownObject(String),

    #[error("update targets object '{0}' outside the repair scope")]
    OutOfScopeObject(String),

    #[error("update for '{0}' carries an invalid bounding box")]
    InvalidBox(String),
}

/// One failed attempt against the reasoning service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransientFailure {
    #[error("reasoning call timed out after {0} ms")]
    Timeout(u64),

    #[error("reasoning service failed: {0}")]
    Transport(String),

    #[error("response was not valid JSON: {0}")]
    MalformedJson(String),

    #[error("schema violation: {0}")]
    Schema(#[from] SchemaViolation),
}

// ---------------------------------------------------------------------------
// GenerationError: retry budget spent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation exhausted after {attempts} attempts (last failure: {last_failure})")]
    GenerationExhausted {
        attempts: u32,
        last_failure: TransientFailure,
    },
}

impl GenerationError {
    pub fn attempts(&self) -> u32 {
        match self {
            GenerationError::GenerationExhausted { attempts, .. } => *attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineError: surfaced to the orchestrator's caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Only {survived} valid variations survived, {required} required")]
    InsufficientValidVariations { survived: usize, required: usize },

    #[error("Event {event:?} is not valid in stage {stage:?}")]
    OutOfOrderTransition {
        stage: PipelineStage,
        event: PipelineEvent,
    },

    #[error("Variation {0} not found")]
    UnknownVariation(uuid::Uuid),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Edit failed: {0}")]
    EditFailed(String),

    #[error("Edit rejected with {} violation(s)", violations.len())]
    EditRejected { violations: Vec<Violation> },

    #[error("Invalid layout: {0}")]
    InvalidLayout(#[from] LayoutError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_violation_is_transient() {
        let failure: TransientFailure = SchemaViolation::UnknownObject("ghost".into()).into();
        assert!(matches!(
            failure,
            TransientFailure::Schema(SchemaViolation::UnknownObject(ref id)) if id == "ghost"
        ));
        assert_eq!(
            failure.to_string(),
            "schema violation: update references unknown object 'ghost'"
        );
    }

    #[test]
    fn test_exhausted_reports_attempts() {
        let err = GenerationError::GenerationExhausted {
            attempts: 3,
            last_failure: TransientFailure::Timeout(30_000),
        };
        assert_eq!(err.attempts(), 3);
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn test_out_of_order_message() {
        let err = PipelineError::OutOfOrderTransition {
            stage: PipelineStage::AwaitingSelection,
            event: PipelineEvent::Render,
        };
        assert_eq!(
            err.to_string(),
            "Event Render is not valid in stage AwaitingSelection"
        );
    }
}
