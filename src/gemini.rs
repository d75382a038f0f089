//! Google Gemini REST client: multimodal `generateContent` for the script and scene
//! stages, and long-running `predictLongRunning` operations for video.

use crate::error::{StudioError, StudioResult};
use crate::http::{network_error, read_asset, read_json};
use crate::media::MediaPayload;
use crate::stages::operation::{Operation, OperationClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const SERVICE: &str = "Gemini";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// A single user turn: one inline media part followed by one text part.
    pub fn media_and_text(media: &MediaPayload, text: impl Into<String>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part::inline(media), Part::text(text)],
            }],
            generation_config: None,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Inline media parts of the request, in order.
    pub fn inline_parts(&self) -> impl Iterator<Item = &InlineData> {
        self.contents
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.inline_data.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(media: &MediaPayload) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: media.content_type.clone(),
                data: media.data.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl From<InlineData> for MediaPayload {
    fn from(inline: InlineData) -> Self {
        MediaPayload {
            data: inline.data,
            content_type: inline.mime_type,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated text of all text parts, or `None` if there are none.
    pub fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn first_inline_image(&self) -> Option<&InlineData> {
        self.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| d.mime_type.starts_with("image/"))
    }

    /// Why the service produced nothing usable, when it says so.
    pub fn block_reason(&self) -> Option<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Some(reason);
        }
        self.candidates
            .iter()
            .filter_map(|c| c.finish_reason.as_deref())
            .find(|r| *r != "STOP")
            .map(str::to_string)
    }
}

/// A multimodal generation service. Both the script and the scene stages talk to
/// one of these; tests substitute scripted implementations.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> StudioResult<GenerateContentResponse>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct StartedOperation {
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> StudioResult<GenerateContentResponse> {
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        debug!(model, parts = request.contents.len(), "Gemini generateContent");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl OperationClient for GeminiClient {
    async fn start(&self, model: &str, body: &Value) -> StudioResult<String> {
        let url = format!("{}/models/{model}:predictLongRunning", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        let started: StartedOperation = read_json(SERVICE, response).await?;
        started.name.filter(|n| !n.is_empty()).ok_or_else(|| {
            StudioError::MissingPollTarget(format!("{model} returned no operation name"))
        })
    }

    async fn poll(&self, name: &str) -> StudioResult<Operation> {
        let url = format!("{}/{name}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        read_json(SERVICE, response).await
    }

    async fn fetch_asset(&self, uri: &str) -> StudioResult<Vec<u8>> {
        // Generated files are only downloadable with the API key attached.
        let response = self
            .http
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;
        read_asset(uri, response).await
    }
}
