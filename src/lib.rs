//! Layout Pipeline - generation and constraint validation for floor plans
//!
//! Takes a top-down room layout (extracted from a photo), asks a reasoning
//! service for alternative arrangements, and only lets arrangements through
//! that satisfy hard physical rules. Everything non-deterministic lives
//! behind traits; everything that decides validity is pure and local.
//!
//! ## Architecture
//!
//! ```text
//! RoomImage ──▶ Extractor ──▶ Layout (baseline)
//!                                │
//!              ┌─────────────────┴──────────────────┐
//!              ▼   N candidates, concurrently       │
//!      VariationGenerator ──▶ merge ──▶ ConstraintEngine
//!              ▲                              │
//!              └──── RepairLoop (bounded) ◀───┘
//!                                │
//!                   surviving LayoutVariations
//!                                │
//!         select ──▶ Renderer ──▶ ChatEditor ⟲ (re-validated)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use layout_pipeline::{
//!     client_factory::reasoning_client_from_env, generate_variations, Layout, PipelineConfig,
//! };
//!
//! # async fn run(baseline: Layout) -> anyhow::Result<()> {
//! let config = PipelineConfig::from_env();
//! let client = reasoning_client_from_env()?;
//! let variations = generate_variations(&config, client, Arc::new(baseline), &[]).await?;
//! for v in &variations {
//!     println!("{} ({:?})", v.name, v.verdict);
//! }
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Data model and pure rules
pub mod constraints;
pub mod geometry;
pub mod merge;
pub mod model;

// Reasoning service boundary
pub mod client_factory;
pub mod gemini_client;
pub mod reasoning;

// Generation and repair
pub mod generator;
pub mod prompt;
pub mod repair;
pub mod schema;

// Collaborators and orchestration
pub mod collaborators;
pub mod config;
pub mod describe;
pub mod edit;
pub mod extraction;
pub mod pipeline;

pub use collaborators::{ChatEditor, EditResponse, Extractor, RenderStyle, Renderer};
pub use config::{PipelineConfig, RetryPolicy};
pub use constraints::{ConstraintEngine, Violation, ViolationKind};
pub use error::{GenerationError, LayoutError, PipelineError, SchemaViolation, TransientFailure};
pub use generator::{Generated, VariationGenerator};
pub use geometry::GeometryRules;
pub use merge::{merge, MergeOutcome, MergeWarning};
pub use model::{
    BoundingBox, DepthLayer, Layout, LayoutUnit, LayoutVariation, ObjectCategory, ObjectUpdate,
    Point, RoomDimensions, RoomImage, RoomObject, UpdateSet, Verdict,
};
pub use pipeline::{generate_variations, Collaborators, EditOutcome, Pipeline, PipelineEvent, PipelineStage};
pub use reasoning::{PromptContext, PromptPurpose, ReasoningClient};
pub use repair::{CandidateState, RepairLoop, RepairOutcome};
