//! Repair Loop
//!
//! Per-candidate state machine:
//!
//! ```text
//! PROPOSED → VALIDATING ─┬─ no violations ──────────────→ VALID → ACCEPTED
//!                        ├─ violations, budget left ────→ REPAIRING → VALIDATING
//!                        └─ violations, budget spent ───→ ACCEPTED_WITH_WARNINGS
//!                                                         | REJECTED (fatal kinds)
//! ```
//!
//! Repair updates are merged into the current candidate, never the baseline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constraints::{ConstraintEngine, Violation};
use crate::generator::{repair_scope, VariationGenerator};
use crate::merge::{merge, MergeWarning};
use crate::model::{Layout, UpdateSet, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateState {
    Proposed,
    Validating,
    Valid,
    Repairing,
    Accepted,
    AcceptedWithWarnings,
    Rejected,
}

impl CandidateState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CandidateState::Accepted | CandidateState::AcceptedWithWarnings | CandidateState::Rejected
        )
    }

    /// Terminal state for a candidate whose repair budget is spent.
    fn settle(violations: &[Violation]) -> Self {
        if violations.iter().any(Violation::is_fatal) {
            CandidateState::Rejected
        } else {
            CandidateState::AcceptedWithWarnings
        }
    }

    fn verdict(self) -> Option<Verdict> {
        match self {
            CandidateState::Accepted => Some(Verdict::Accepted),
            CandidateState::AcceptedWithWarnings => Some(Verdict::AcceptedWithWarnings),
            CandidateState::Rejected => Some(Verdict::Rejected),
            _ => None,
        }
    }
}

/// Terminal result for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub layout: Layout,
    pub verdict: Verdict,
    /// Empty unless the budget ran out.
    pub residual_violations: Vec<Violation>,
    pub rounds: usize,
    /// Every state visited, in order.
    pub trace: Vec<CandidateState>,
    pub merge_warnings: Vec<MergeWarning>,
}

#[derive(Clone)]
pub struct RepairLoop {
    generator: VariationGenerator,
    engine: ConstraintEngine,
    max_rounds: usize,
}

impl RepairLoop {
    pub fn new(generator: VariationGenerator, engine: ConstraintEngine, max_rounds: usize) -> Self {
        Self {
            generator,
            engine,
            max_rounds,
        }
    }

    pub fn engine(&self) -> &ConstraintEngine {
        &self.engine
    }

    /// Drive one proposal to a terminal state. `baseline` is the layout the
    /// proposal's updates were generated against.
    pub async fn run(&self, baseline: Arc<Layout>, updates: &UpdateSet) -> RepairOutcome {
        let mut trace = vec![CandidateState::Proposed];
        let merged = merge(&baseline, updates);
        let mut candidate = merged.layout;
        let mut merge_warnings = merged.warnings;
        let mut violations = Vec::new();
        let mut rounds = 0;

        let mut state = CandidateState::Validating;
        trace.push(state);
        while !state.is_terminal() {
            state = match state {
                CandidateState::Proposed | CandidateState::Validating => {
                    violations = self.engine.validate(&candidate);
                    if violations.is_empty() {
                        CandidateState::Valid
                    } else if rounds < self.max_rounds {
                        CandidateState::Repairing
                    } else {
                        CandidateState::settle(&violations)
                    }
                }
                CandidateState::Valid => CandidateState::Accepted,
                CandidateState::Repairing => {
                    let scope = repair_scope(&candidate, &violations);
                    if scope.is_empty() {
                        tracing::debug!(
                            violations = violations.len(),
                            "No repairable objects in violation set"
                        );
                        CandidateState::settle(&violations)
                    } else {
                        rounds += 1;
                        match self.generator.repair(&candidate, &violations, &scope).await {
                            Ok(generated) => {
                                let repaired = merge(&candidate, &generated.value);
                                candidate = repaired.layout;
                                merge_warnings.extend(repaired.warnings);
                                tracing::debug!(
                                    round = rounds,
                                    updates = generated.value.len(),
                                    "Applied repair round"
                                );
                                CandidateState::Validating
                            }
                            Err(e) => {
                                tracing::warn!(round = rounds, error = %e, "Repair round failed");
                                CandidateState::settle(&violations)
                            }
                        }
                    }
                }
                terminal => terminal,
            };
            trace.push(state);
        }

        let verdict = state.verdict().unwrap_or(Verdict::Rejected);
        if verdict == Verdict::Accepted {
            violations.clear();
        }
        tracing::info!(
            verdict = ?verdict,
            rounds,
            violations = violations.len(),
            "Candidate settled"
        );

        RepairOutcome {
            layout: candidate,
            verdict,
            residual_violations: violations,
            rounds,
            trace,
            merge_warnings,
        }
    }
}
