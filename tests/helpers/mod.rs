//! Shared fakes and fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use layout_pipeline::collaborators::{PreviewRequest, RenderRequest};
use layout_pipeline::{
    BoundingBox, ChatEditor, Collaborators, EditResponse, Extractor, Layout, LayoutUnit,
    PipelineConfig, PromptContext, PromptPurpose, ReasoningClient, RenderStyle, Renderer,
    RetryPolicy, RoomDimensions, RoomImage, RoomObject,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn feet_layout(objects: Vec<RoomObject>) -> Layout {
    Layout::new(
        RoomDimensions::new(20.0, 15.0).unwrap(),
        LayoutUnit::Feet,
        objects,
    )
    .unwrap()
}

pub fn door() -> RoomObject {
    RoomObject::structural("door_1", "door", BoundingBox::new(10.0, 0.0, 3.0, 1.0))
}

/// Door, bed and desk; valid as is.
pub fn bedroom() -> Layout {
    feet_layout(vec![
        door(),
        RoomObject::movable("bed_1", "bed", BoundingBox::new(1.0, 5.0, 5.0, 6.0)),
        RoomObject::movable("desk_1", "desk", BoundingBox::new(14.0, 8.0, 4.0, 2.0)),
    ])
}

/// Same layout with one object's box replaced.
pub fn moved(layout: &Layout, id: &str, bbox: BoundingBox) -> Layout {
    let objects = layout.objects().cloned().map(|mut o| {
        if o.id == id {
            o.bbox = bbox;
        }
        o
    });
    Layout::new(layout.dimensions(), layout.unit(), objects).unwrap()
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::ZERO,
        timeout: Duration::from_secs(5),
    }
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        retry: fast_policy(),
        ..PipelineConfig::default()
    }
}

pub fn proposal(name: &str, objects: &str) -> String {
    format!(
        r#"{{"variations": [{{"name": "{name}", "description": "{name} arrangement", "objects": {objects}}}]}}"#
    )
}

pub fn png() -> RoomImage {
    RoomImage::new("image/png", vec![0x89, 0x50, 0x4e, 0x47])
}

// ---------------------------------------------------------------------------
// Reasoning fakes
// ---------------------------------------------------------------------------

/// Replays responses in order; `None` is a transport failure. Once the
/// script runs out the last entry repeats.
pub struct ScriptedClient {
    script: Mutex<Vec<Option<String>>>,
    pub calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(script: Vec<Option<&str>>) -> Arc<Self> {
        let mut script: Vec<_> = script.into_iter().map(|s| s.map(String::from)).collect();
        script.reverse();
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(response: &str) -> Arc<Self> {
        Self::new(vec![Some(response)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    async fn reason(&self, _context: &PromptContext) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop()
        } else {
            script.last().cloned()
        };
        match next {
            Some(Some(raw)) => Ok(raw),
            _ => Err(anyhow!("connection reset")),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "test"
    }
}

/// Answers proposal prompts by theme and repair prompts with one fixed payload.
pub struct ThemedClient {
    proposals: HashMap<String, String>,
    repair: String,
    pub proposal_calls: AtomicUsize,
    pub repair_calls: AtomicUsize,
}

impl ThemedClient {
    pub fn new(proposals: &[(&str, String)], repair: &str) -> Arc<Self> {
        Arc::new(Self {
            proposals: proposals
                .iter()
                .map(|(theme, payload)| (theme.to_string(), payload.clone()))
                .collect(),
            repair: repair.to_string(),
            proposal_calls: AtomicUsize::new(0),
            repair_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ReasoningClient for ThemedClient {
    async fn reason(&self, context: &PromptContext) -> Result<String> {
        match context.purpose {
            PromptPurpose::Repair => {
                self.repair_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.repair.clone())
            }
            PromptPurpose::Proposal => {
                self.proposal_calls.fetch_add(1, Ordering::SeqCst);
                self.proposals
                    .iter()
                    .find(|(theme, _)| context.user.contains(&format!("\"{theme}\" theme")))
                    .map(|(_, payload)| payload.clone())
                    .ok_or_else(|| anyhow!("no scripted proposal for prompt"))
            }
        }
    }

    fn model_name(&self) -> &str {
        "themed"
    }

    fn provider_name(&self) -> &str {
        "test"
    }
}

/// Holds every call for `delay` before handing it to `inner`, recording the
/// call count and the highest overlap seen.
pub struct DelayedClient {
    inner: Arc<dyn ReasoningClient>,
    delay: Duration,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl DelayedClient {
    pub fn new(inner: Arc<dyn ReasoningClient>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningClient for DelayedClient {
    async fn reason(&self, context: &PromptContext) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.reason(context).await
    }

    fn model_name(&self) -> &str {
        "delayed"
    }

    fn provider_name(&self) -> &str {
        "test"
    }
}

/// Proposals for the three default themes against [`bedroom`]. The
/// creative one overlaps the bed and desk; `REPAIR_DESK` fixes it.
pub fn bedroom_proposals() -> Vec<(&'static str, String)> {
    vec![
        (
            "Work Focused",
            proposal("Focus Nook", r#"[{"id": "desk_1", "bbox": [14, 10, 4, 2]}]"#),
        ),
        (
            "Cozy",
            proposal("Snug Corner", r#"[{"id": "bed_1", "bbox": [0, 9, 5, 6]}]"#),
        ),
        (
            "Creative/Aesthetic",
            proposal("Gallery", r#"[{"id": "desk_1", "bbox": [3, 7, 4, 2], "orientation": 90}]"#),
        ),
    ]
}

pub const REPAIR_DESK: &str = r#"[{"id": "desk_1", "bbox": [14, 8, 4, 2]}]"#;

// ---------------------------------------------------------------------------
// Collaborator fakes
// ---------------------------------------------------------------------------

pub struct FakeExtractor {
    pub layout: Option<Layout>,
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, _image: &RoomImage) -> Result<Layout> {
        self.layout
            .clone()
            .ok_or_else(|| anyhow!("vision service unavailable"))
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub fail_previews: bool,
    pub renders: Mutex<Vec<RenderRequest>>,
    pub previews: AtomicUsize,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RoomImage> {
        let mut renders = self.renders.lock().unwrap();
        renders.push(request.clone());
        Ok(RoomImage::new("image/png", vec![renders.len() as u8]))
    }

    async fn preview(&self, _request: &PreviewRequest) -> Result<RoomImage> {
        self.previews.fetch_add(1, Ordering::SeqCst);
        if self.fail_previews {
            return Err(anyhow!("preview model overloaded"));
        }
        Ok(RoomImage::new("image/png", vec![0]))
    }
}

impl FakeRenderer {
    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }
}

/// Replays edit responses in order.
#[derive(Default)]
pub struct FakeEditor {
    responses: Mutex<Vec<EditResponse>>,
}

impl FakeEditor {
    pub fn new(mut responses: Vec<EditResponse>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl ChatEditor for FakeEditor {
    async fn apply_edit(
        &self,
        _command: &str,
        _layout: &Layout,
        _image: Option<&RoomImage>,
    ) -> Result<EditResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| anyhow!("editor has nothing left to say"))
    }
}

pub struct Fakes {
    pub reasoning: Arc<ThemedClient>,
    pub renderer: Arc<FakeRenderer>,
    pub collaborators: Collaborators,
}

pub fn fakes(extracted: Option<Layout>, renderer: FakeRenderer, editor: FakeEditor) -> Fakes {
    let reasoning = ThemedClient::new(&bedroom_proposals(), REPAIR_DESK);
    let renderer = Arc::new(renderer);
    let collaborators = Collaborators {
        extractor: Arc::new(FakeExtractor { layout: extracted }),
        reasoning: reasoning.clone(),
        renderer: renderer.clone(),
        editor: Arc::new(editor),
    };
    Fakes {
        reasoning,
        renderer,
        collaborators,
    }
}

pub fn default_style() -> RenderStyle {
    RenderStyle::default()
}
