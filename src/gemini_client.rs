//! Google Gemini Client
//!
//! Reasoning client for the Gemini `generateContent` endpoint. The same
//! client doubles as the vision [`Extractor`]: a photo goes out as inline
//! data and the JSON answer is handed to [`parse_vision_payload`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::Extractor;
use crate::extraction::parse_vision_payload;
use crate::model::{Layout, RoomImage};
use crate::reasoning::{PromptContext, ReasoningClient};

/// Default Gemini model
const DEFAULT_MODEL: &str = "gemini-2.5-pro";

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const ROOM_ANALYSIS_PROMPT: &str = r#"Analyze this floor plan or room image from a top-down view and detect all furniture and structural elements.

For each object, provide:
1. A unique id (e.g., "bed_1", "desk_1", "door_1")
2. The object label (bed, desk, chair, sofa, door, window, wardrobe, nightstand, etc.)
3. The bounding box as box_2d: [ymin, xmin, ymax, xmax] normalized to 0-1000
4. The type: "movable" for furniture, "structural" for doors, windows and walls

Also estimate the room dimensions in feet based on typical furniture sizes.

Return ONLY valid JSON in this exact format:
{
    "room_dimensions": {"width_estimate": <number>, "height_estimate": <number>},
    "objects": [
        {"id": "<unique_id>", "label": "<object_type>", "box_2d": [ymin, xmin, ymax, xmax], "type": "movable" | "structural"}
    ]
}"#;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiPart {
    Text(String),
    InlineData(GeminiInlineData),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GeminiResponse {
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl GeminiClient {
    /// Create a new Gemini client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(api_key, &model)
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", BASE_URL, self.model)
    }

    async fn generate(&self, request: &GeminiRequest) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, body));
        }

        let api_response: GeminiResponse = response.json().await?;
        api_response
            .into_text()
            .ok_or_else(|| anyhow!("Empty response from Gemini"))
    }
}

fn json_config(temperature: f32) -> GeminiGenerationConfig {
    GeminiGenerationConfig {
        temperature,
        response_mime_type: "application/json",
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn reason(&self, context: &PromptContext) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart::Text(context.user.clone())],
            }],
            system_instruction: Some(GeminiContent {
                parts: vec![GeminiPart::Text(context.system.clone())],
            }),
            generation_config: json_config(0.7),
        };
        self.generate(&request).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Gemini"
    }
}

#[async_trait]
impl Extractor for GeminiClient {
    async fn extract(&self, image: &RoomImage) -> Result<Layout> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::InlineData(GeminiInlineData {
                        mime_type: image.mime_type.clone(),
                        data: image.to_base64(),
                    }),
                    GeminiPart::Text(ROOM_ANALYSIS_PROMPT.to_string()),
                ],
            }],
            system_instruction: None,
            generation_config: json_config(0.1),
        };
        let raw = self.generate(&request).await?;
        Ok(parse_vision_payload(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::InlineData(GeminiInlineData {
                        mime_type: "image/png".into(),
                        data: "AAAA".into(),
                    }),
                    GeminiPart::Text("hi".into()),
                ],
            }],
            system_instruction: None,
            generation_config: json_config(0.1),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(value["contents"][0]["parts"][1]["text"], "hi");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().as_deref(), Some("{\"a\":1}"));

        let empty: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(empty.into_text().is_none());
    }

    #[test]
    fn test_endpoint_uses_model() {
        let client = GeminiClient::with_model("k".into(), "gemini-2.5-flash");
        assert!(client.endpoint().ends_with("/gemini-2.5-flash:generateContent"));
        assert_eq!(client.provider_name(), "Gemini");
    }
}
