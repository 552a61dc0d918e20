//! Pipeline Orchestrator
//!
//! Sequencing state machine for one room session:
//!
//! ```text
//! EXTRACTING ──extract──▶ GENERATING ──generate──▶ AWAITING_SELECTION
//!      ──select──▶ RENDERING ──render──▶ EDITING ⟲ edit ──finish──▶ DONE
//! ```
//!
//! Every operation checks its event against the transition table before
//! doing any work, so an out-of-order call fails without side effects. A
//! stage only advances once its work has succeeded.
//!
//! All state is owned by the `Pipeline` value. Nothing is shared between
//! sessions.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::collaborators::{ChatEditor, Extractor, PreviewRequest, RenderRequest, RenderStyle, Renderer};
use crate::config::PipelineConfig;
use crate::constraints::{ConstraintEngine, Violation};
use crate::describe;
use crate::error::{GenerationError, PipelineError, SchemaViolation, TransientFailure};
use crate::generator::VariationGenerator;
use crate::merge::merge;
use crate::model::{Layout, LayoutVariation, RoomImage};
use crate::reasoning::ReasoningClient;
use crate::repair::{RepairLoop, RepairOutcome};

// ---------------------------------------------------------------------------
// Stages and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Extracting,
    Generating,
    AwaitingSelection,
    Rendering,
    Editing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEvent {
    Extract,
    Generate,
    Select,
    Render,
    Edit,
    Finish,
}

impl PipelineStage {
    /// Transition table. `None` means the event is out of order.
    pub fn next(self, event: PipelineEvent) -> Option<PipelineStage> {
        use PipelineEvent::*;
        use PipelineStage::*;

        match (self, event) {
            (Extracting, Extract) => Some(Generating),
            (Generating, Generate) => Some(AwaitingSelection),
            (AwaitingSelection, Select) => Some(Rendering),
            (Rendering, Render) => Some(Editing),
            (Editing, Edit) => Some(Editing),
            (Editing, Finish) => Some(Done),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators and results
// ---------------------------------------------------------------------------

/// External services the orchestrator delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub reasoning: Arc<dyn ReasoningClient>,
    pub renderer: Arc<dyn Renderer>,
    pub editor: Arc<dyn ChatEditor>,
}

/// Result of an accepted chat edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub layout: Layout,
    pub image: Option<RoomImage>,
    pub layout_changed: bool,
    pub explanation: String,
}

// ---------------------------------------------------------------------------
// GENERATING
// ---------------------------------------------------------------------------

/// Run the GENERATING stage: one proposal plus repair loop per candidate,
/// concurrently, then filter and truncate.
///
/// Dropping the returned future aborts every in-flight candidate.
pub async fn generate_variations(
    config: &PipelineConfig,
    client: Arc<dyn ReasoningClient>,
    baseline: Arc<Layout>,
    locked_ids: &[String],
) -> Result<Vec<LayoutVariation>, PipelineError> {
    let generator = VariationGenerator::new(client, config.retry, config.rules)
        .with_max_concurrency(config.max_concurrency);
    let engine = ConstraintEngine::new(config.rules, baseline.clone());
    let repair = RepairLoop::new(generator.clone(), engine, config.max_repair_rounds);

    let (locked_layout, _) = baseline.with_locked(locked_ids);
    let proposal_base = Arc::new(locked_layout);
    let locked_ids: Arc<Vec<String>> = Arc::new(locked_ids.to_vec());

    tracing::info!(
        candidates = config.desired_candidates,
        max_concurrency = config.max_concurrency,
        "Generating layout variations"
    );

    let mut tasks = JoinSet::new();
    for index in 0..config.desired_candidates {
        let theme = config.theme_for(index).map(str::to_string);
        let generator = generator.clone();
        let repair = repair.clone();
        let base = proposal_base.clone();
        let locked_ids = locked_ids.clone();
        tasks.spawn(async move {
            let generated = generator
                .propose(&base, &locked_ids, 1, theme.as_deref())
                .await?;
            let attempts = generated.attempts;
            let Some(proposal) = generated.value.into_iter().next() else {
                return Err(GenerationError::GenerationExhausted {
                    attempts,
                    last_failure: TransientFailure::Schema(SchemaViolation::EmptyVariations),
                });
            };
            let outcome = repair.run(base, &proposal.updates).await;
            Ok::<_, GenerationError>(Candidate {
                index,
                theme,
                name: proposal.name,
                description: proposal.description,
                outcome,
            })
        });
    }

    let mut candidates = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(candidate)) => candidates.push(candidate),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Candidate generation failed");
                failures.push(e);
            }
            Err(e) => tracing::error!(error = %e, "Candidate task did not complete"),
        }
    }
    candidates.sort_by_key(|c| c.index);

    let mut survivors: Vec<LayoutVariation> = candidates
        .into_iter()
        .filter_map(Candidate::into_variation)
        .collect();
    survivors.truncate(config.max_variations);

    if survivors.len() < config.min_variations {
        if let Some(failure) = failures.into_iter().next() {
            return Err(PipelineError::Generation(failure));
        }
        return Err(PipelineError::InsufficientValidVariations {
            survived: survivors.len(),
            required: config.min_variations,
        });
    }

    tracing::info!(
        survived = survivors.len(),
        failed = failures.len(),
        "Layout variations ready"
    );
    Ok(survivors)
}

struct Candidate {
    index: usize,
    theme: Option<String>,
    name: String,
    description: String,
    outcome: RepairOutcome,
}

impl Candidate {
    /// `None` for rejected candidates.
    fn into_variation(self) -> Option<LayoutVariation> {
        let variation = LayoutVariation {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            theme: self.theme,
            layout: self.outcome.layout,
            verdict: self.outcome.verdict,
            residual_violations: self.outcome.residual_violations,
            repair_rounds: self.outcome.rounds,
            preview: None,
            created_at: Utc::now(),
        };
        if variation.is_surviving() {
            Some(variation)
        } else {
            tracing::info!(variation = %variation.name, "Dropping rejected candidate");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Orchestrator for one room session.
pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    stage: PipelineStage,
    source_image: Option<RoomImage>,
    baseline: Option<Arc<Layout>>,
    variations: Vec<LayoutVariation>,
    selected: Option<Uuid>,
    current_layout: Option<Layout>,
    current_image: Option<RoomImage>,
}

impl Pipeline {
    /// Start a session at EXTRACTING.
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            stage: PipelineStage::Extracting,
            source_image: None,
            baseline: None,
            variations: Vec::new(),
            selected: None,
            current_layout: None,
            current_image: None,
        }
    }

    /// Start a session at GENERATING from an already extracted layout.
    pub fn with_layout(config: PipelineConfig, collaborators: Collaborators, baseline: Layout) -> Self {
        let mut pipeline = Self::new(config, collaborators);
        pipeline.baseline = Some(Arc::new(baseline));
        pipeline.stage = PipelineStage::Generating;
        pipeline
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn baseline(&self) -> Option<&Layout> {
        self.baseline.as_deref()
    }

    pub fn variations(&self) -> &[LayoutVariation] {
        &self.variations
    }

    pub fn selected(&self) -> Option<&LayoutVariation> {
        let id = self.selected?;
        self.variations.iter().find(|v| v.id == id)
    }

    pub fn current_layout(&self) -> Option<&Layout> {
        self.current_layout.as_ref()
    }

    pub fn current_image(&self) -> Option<&RoomImage> {
        self.current_image.as_ref()
    }

    /// Target stage for `event`, or `OutOfOrderTransition`.
    fn expect(&self, event: PipelineEvent) -> Result<PipelineStage, PipelineError> {
        self.stage.next(event).ok_or_else(|| self.out_of_order(event))
    }

    fn advance(&mut self, next: PipelineStage) {
        tracing::debug!(from = ?self.stage, to = ?next, "Pipeline stage transition");
        self.stage = next;
    }

    fn out_of_order(&self, event: PipelineEvent) -> PipelineError {
        PipelineError::OutOfOrderTransition {
            stage: self.stage,
            event,
        }
    }

    /// EXTRACTING: hand the photo to the extraction collaborator.
    pub async fn extract(&mut self, image: RoomImage) -> Result<&Layout, PipelineError> {
        let next = self.expect(PipelineEvent::Extract)?;
        let layout = self
            .collaborators
            .extractor
            .extract(&image)
            .await
            .map_err(|e| PipelineError::ExtractionFailed(format!("{e:#}")))?;

        tracing::info!(objects = layout.len(), "Extracted room layout");
        self.source_image = Some(image);
        self.advance(next);
        let baseline: &Layout = self.baseline.insert(Arc::new(layout));
        Ok(baseline)
    }

    /// GENERATING: produce the surviving variations and wait for a selection.
    pub async fn generate(&mut self, locked_ids: &[String]) -> Result<&[LayoutVariation], PipelineError> {
        let next = self.expect(PipelineEvent::Generate)?;
        let baseline = self
            .baseline
            .clone()
            .ok_or_else(|| self.out_of_order(PipelineEvent::Generate))?;

        let mut variations = generate_variations(
            &self.config,
            self.collaborators.reasoning.clone(),
            baseline.clone(),
            locked_ids,
        )
        .await?;

        if self.config.render_previews {
            self.attach_previews(&baseline, &mut variations).await;
        }

        self.variations = variations;
        self.advance(next);
        Ok(&self.variations)
    }

    async fn attach_previews(&self, baseline: &Layout, variations: &mut [LayoutVariation]) {
        let renderer = &self.collaborators.renderer;
        let requests: Vec<PreviewRequest> = variations
            .iter()
            .map(|v| PreviewRequest {
                layout: v.layout.clone(),
                scene_description: describe::scene_description(&v.layout, &RenderStyle::sketch()),
                instructions: describe::movement_instructions(baseline, &v.layout),
                source_image: self.source_image.clone(),
            })
            .collect();

        let previews = join_all(requests.iter().map(|r| renderer.preview(r))).await;
        for (variation, preview) in variations.iter_mut().zip(previews) {
            match preview {
                Ok(image) => variation.preview = Some(image),
                Err(e) => {
                    tracing::warn!(variation = %variation.name, error = %e, "Preview render failed")
                }
            }
        }
    }

    /// AWAITING_SELECTION: pick a variation by id.
    pub fn select(&mut self, id: Uuid) -> Result<&LayoutVariation, PipelineError> {
        let next = self.expect(PipelineEvent::Select)?;
        let index = self
            .variations
            .iter()
            .position(|v| v.id == id)
            .ok_or(PipelineError::UnknownVariation(id))?;

        let variation = &self.variations[index];
        tracing::info!(variation = %variation.name, "Variation selected");
        self.current_layout = Some(variation.layout.clone());
        self.selected = Some(id);
        self.advance(next);
        Ok(&self.variations[index])
    }

    /// RENDERING: perspective render of the selected layout. Not retried.
    pub async fn render(&mut self, style: &RenderStyle) -> Result<&RoomImage, PipelineError> {
        let next = self.expect(PipelineEvent::Render)?;
        let layout = self
            .current_layout
            .clone()
            .ok_or_else(|| self.out_of_order(PipelineEvent::Render))?;

        let image = self.render_layout(layout, style).await?;
        self.advance(next);
        let image: &RoomImage = self.current_image.insert(image);
        Ok(image)
    }

    async fn render_layout(&self, layout: Layout, style: &RenderStyle) -> Result<RoomImage, PipelineError> {
        let request = RenderRequest {
            scene_description: describe::scene_description(&layout, style),
            layout,
            style: style.clone(),
            source_image: self.source_image.clone(),
        };
        self.collaborators
            .renderer
            .render(&request)
            .await
            .map_err(|e| PipelineError::RenderFailed(format!("{e:#}")))
    }

    /// EDITING: apply a chat edit. Layout changes are validated against the
    /// extraction baseline and rejected if they introduce violations; accepted
    /// layout changes are re-rendered before being committed.
    pub async fn edit(&mut self, command: &str, style: &RenderStyle) -> Result<EditOutcome, PipelineError> {
        let next = self.expect(PipelineEvent::Edit)?;
        let (current, baseline) = match (self.current_layout.clone(), self.baseline.clone()) {
            (Some(current), Some(baseline)) => (current, baseline),
            _ => return Err(self.out_of_order(PipelineEvent::Edit)),
        };

        let response = self
            .collaborators
            .editor
            .apply_edit(command, &current, self.current_image.as_ref())
            .await
            .map_err(|e| PipelineError::EditFailed(format!("{e:#}")))?;

        let mut explanation = response.explanation;
        let candidate = match (response.layout, response.command) {
            (Some(layout), _) => Some(layout),
            (None, Some(edit)) => {
                let (updates, summary) = edit.to_updates(&current)?;
                if explanation.is_empty() {
                    explanation = summary;
                }
                Some(merge(&current, &updates).layout)
            }
            (None, None) => None,
        };

        let outcome = match candidate {
            Some(layout) => {
                let engine = ConstraintEngine::new(self.config.rules, baseline);
                let introduced = introduced_violations(&engine, &current, &layout);
                if !introduced.is_empty() {
                    tracing::info!(violations = introduced.len(), "Rejected chat edit");
                    return Err(PipelineError::EditRejected {
                        violations: introduced,
                    });
                }
                let image = match response.image {
                    Some(image) => image,
                    None => self.render_layout(layout.clone(), style).await?,
                };
                self.current_layout = Some(layout.clone());
                self.current_image = Some(image.clone());
                EditOutcome {
                    layout,
                    image: Some(image),
                    layout_changed: true,
                    explanation,
                }
            }
            None => {
                if let Some(image) = response.image {
                    self.current_image = Some(image);
                }
                EditOutcome {
                    layout: current,
                    image: self.current_image.clone(),
                    layout_changed: false,
                    explanation,
                }
            }
        };

        self.advance(next);
        Ok(outcome)
    }

    /// EDITING → DONE.
    pub fn finish(&mut self) -> Result<(), PipelineError> {
        let next = self.expect(PipelineEvent::Finish)?;
        self.advance(next);
        Ok(())
    }
}

/// Violations of `edited` that `current` did not already have. Fatal kinds
/// always count.
fn introduced_violations(engine: &ConstraintEngine, current: &Layout, edited: &Layout) -> Vec<Violation> {
    let existing = engine.validate(current);
    engine
        .validate(edited)
        .into_iter()
        .filter(|v| {
            v.is_fatal()
                || !existing
                    .iter()
                    .any(|e| e.kind == v.kind && e.object_ids == v.object_ids)
        })
        .collect()
}
