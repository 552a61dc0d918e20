//! External collaborators
//!
//! Vision extraction, rendering and chat editing are opaque services. The
//! orchestrator only carries state through them; their failures come back as
//! `anyhow::Error` and are collapsed into `PipelineError` by the caller.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::edit::EditCommand;
use crate::model::{Layout, RoomImage};

/// Look of a perspective render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStyle {
    /// modern, minimalist, cozy, scandinavian, industrial
    pub style: String,
    /// corner, front wall, bed view, desk view
    pub view_angle: String,
    pub lighting: String,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            style: "modern".into(),
            view_angle: "corner".into(),
            lighting: "natural daylight".into(),
        }
    }
}

impl RenderStyle {
    /// Cheap overhead sketch used for previews.
    pub fn sketch() -> Self {
        Self {
            style: "sketch".into(),
            view_angle: "overhead".into(),
            lighting: "flat".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub layout: Layout,
    pub style: RenderStyle,
    /// Natural-language description built from the layout.
    pub scene_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<RoomImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub layout: Layout,
    pub scene_description: String,
    /// "Move the bed left" style edits relative to the source image.
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<RoomImage>,
}

/// What a chat edit produced. Any of the parts may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditResponse {
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default)]
    pub command: Option<EditCommand>,
    #[serde(default)]
    pub image: Option<RoomImage>,
    #[serde(default)]
    pub explanation: String,
}

/// Vision extraction: photo or scan in, baseline layout out.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, image: &RoomImage) -> Result<Layout>;
}

/// Perspective rendering.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RoomImage>;

    /// Low-cost preview of a variation. Defaults to a sketch-style render.
    async fn preview(&self, request: &PreviewRequest) -> Result<RoomImage> {
        let render = RenderRequest {
            layout: request.layout.clone(),
            style: RenderStyle::sketch(),
            scene_description: request.scene_description.clone(),
            source_image: request.source_image.clone(),
        };
        self.render(&render).await
    }
}

/// Chat-driven edits of the selected layout.
#[async_trait]
pub trait ChatEditor: Send + Sync {
    async fn apply_edit(
        &self,
        command: &str,
        layout: &Layout,
        image: Option<&RoomImage>,
    ) -> Result<EditResponse>;
}
