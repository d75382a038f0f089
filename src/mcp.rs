use crate::error::StudioError;
use crate::media::{MediaHandle, MediaPayload};
use crate::progress::Progress;
use crate::session::{write_scene_images, RunSession, OUTPUT_DIR};
use crate::story::GeneratedScene;
use rmcp::handler::server::router::prompt::PromptRouter;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    Annotated, CallToolResult, Content, GetPromptRequestParams, GetPromptResult,
    ListPromptsResult, ListResourcesResult, Meta, PaginatedRequestParams, PromptMessage,
    PromptMessageRole, RawResource, ReadResourceRequestParams, ReadResourceResult,
    ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::Peer;
use rmcp::{
    prompt, prompt_handler, prompt_router, tool, tool_handler, tool_router, ErrorData as McpError,
    RoleServer, ServerHandler,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const SESSION_URI: &str = "doodlemagic://session";
const CONFIG_URI: &str = "doodlemagic://config";

/// Helper: convert display errors into MCP errors.
fn mc_err(e: impl std::fmt::Display) -> McpError {
    McpError::internal_error(e.to_string(), None)
}

/// Pipeline errors carry their hint so the agent can act on it.
fn studio_err(e: StudioError) -> McpError {
    match e.hint() {
        Some(hint) => McpError::internal_error(format!("{e} (hint: {hint})"), None),
        None => mc_err(e),
    }
}

fn progress_for(meta: &Meta, peer: Peer<RoleServer>) -> Progress {
    match meta.get_progress_token() {
        Some(token) => Progress::mcp(peer, token),
        None => Progress::noop(),
    }
}

fn json_result(value: &Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(mc_err)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn media_json(handle: &MediaHandle) -> Value {
    json!({
        "location": handle.describe(),
        "content_type": handle.content_type(),
    })
}

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SubmitDrawingParams {
    /// Drawing image
    #[schemars(
        description = "The child's drawing: a path to a png/jpg/webp/gif file, or a data:image/...;base64 URL"
    )]
    pub drawing: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SubmitPhotoParams {
    /// Photo of the main character
    #[schemars(
        description = "Photo of the person who becomes the story's hero: a file path or a data:image/...;base64 URL"
    )]
    pub photo: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SubmitVoiceSampleParams {
    /// Voice recording
    #[schemars(
        description = "Voice recording to clone for narration: a path to a webm/mp3/wav/ogg/m4a file, or a data:audio/...;base64 URL"
    )]
    pub voice_sample: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct NoParams {}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StoryFromDrawingParams {
    /// Path to the drawing
    #[schemars(description = "Path to the drawing image file")]
    pub drawing_path: String,
    /// Path to the hero photo
    #[schemars(description = "Path to the photo of the story's hero")]
    pub photo_path: String,
    /// Optional voice recording
    #[schemars(description = "Path to a voice recording for narration (optional)")]
    pub voice_path: Option<String>,
}

// ---------------------------------------------------------------------------
// StoryServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StoryServer {
    session: Arc<RunSession>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl StoryServer {
    pub fn new(session: RunSession) -> Self {
        Self {
            session: Arc::new(session),
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    /// Persist the run whatever the outcome, then surface the step result.
    fn settle<T>(&self, result: crate::error::StudioResult<T>) -> Result<T, McpError> {
        self.session.save().map_err(studio_err)?;
        result.map_err(studio_err)
    }

    fn step_json(&self) -> Value {
        json!(self.session.controller.snapshot().step.to_string())
    }

    fn scenes_json(&self, scenes: &[GeneratedScene]) -> Result<Value, McpError> {
        let out = self.session.dir.join(OUTPUT_DIR);
        std::fs::create_dir_all(&out).map_err(mc_err)?;
        let paths = write_scene_images(&out, scenes).map_err(studio_err)?;
        let list: Vec<Value> = scenes
            .iter()
            .zip(paths)
            .map(|(scene, path)| {
                json!({
                    "scene_number": scene.scene_number,
                    "description": scene.description,
                    "conversation": scene.conversation,
                    "rhyming_stanza": scene.rhyming_stanza,
                    "image_path": path.display().to_string(),
                })
            })
            .collect();
        Ok(json!(list))
    }

    async fn drawing(&self, input: &str, progress: &Progress) -> Result<Value, McpError> {
        let drawing = MediaPayload::from_input(input).map_err(studio_err)?;
        info!(bytes = drawing.approx_len(), "Drawing received");
        let result = self.session.controller.submit_drawing(drawing, progress).await;
        let draft = self.settle(result)?;
        Ok(json!({
            "title": draft.title,
            "video_prompt": draft.video_prompt,
            "scenes": draft.script.scenes(),
            "step": self.step_json(),
        }))
    }

    async fn photo(&self, input: &str, progress: &Progress) -> Result<Value, McpError> {
        let photo = MediaPayload::from_input(input).map_err(studio_err)?;
        let result = self.session.controller.submit_photo(photo, progress).await;
        let scenes = self.settle(result)?;
        Ok(json!({
            "scenes": self.scenes_json(&scenes)?,
            "step": self.step_json(),
        }))
    }

    async fn video(&self, progress: &Progress) -> Result<Value, McpError> {
        let result = self.session.controller.synthesize_video(progress).await;
        let video = self.settle(result)?;
        Ok(json!({
            "video": media_json(&video),
            "step": self.step_json(),
        }))
    }

    async fn voice(&self, input: &str, progress: &Progress) -> Result<Value, McpError> {
        let sample = MediaPayload::from_input(input).map_err(studio_err)?;
        let result = self
            .session
            .controller
            .submit_voice_sample(sample, progress)
            .await;
        let narration = self.settle(result)?;
        let state = self.session.controller.snapshot();
        Ok(json!({
            "narration": media_json(&narration),
            "video": state.final_video().map(media_json),
            "step": state.step.to_string(),
        }))
    }

    async fn merge(&self, progress: &Progress) -> Result<Value, McpError> {
        let result = self.session.controller.merge_narration(progress).await;
        let video = self.settle(result)?;
        Ok(json!({
            "video": media_json(&video),
            "step": self.step_json(),
        }))
    }

    fn restart(&self) -> Result<Value, McpError> {
        self.session.controller.restart();
        self.settle(Ok(()))?;
        Ok(json!({ "step": self.step_json() }))
    }
}

#[tool_router]
impl StoryServer {
    #[tool(
        description = "Start a story from a child's drawing. Returns the story title, the per-scene script, and the video prompt. Only valid at DRAWING_INPUT; moves the run to PHOTO_INPUT."
    )]
    async fn submit_drawing(
        &self,
        Parameters(params): Parameters<SubmitDrawingParams>,
        meta: Meta,
        peer: Peer<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = progress_for(&meta, peer);
        json_result(&self.drawing(&params.drawing, &progress).await?)
    }

    #[tool(
        description = "Cast a photographed person as the story's hero. Renders one image per scene, each using the previous scene as its reference, and writes them to the run's output directory. Only valid at PHOTO_INPUT."
    )]
    async fn submit_photo(
        &self,
        Parameters(params): Parameters<SubmitPhotoParams>,
        meta: Meta,
        peer: Peer<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = progress_for(&meta, peer);
        json_result(&self.photo(&params.photo, &progress).await?)
    }

    #[tool(
        description = "Animate the reviewed scenes into the story video. Long-running: sends progress notifications while the provider renders. Valid at SCENES_REVIEW (or VOICE_INPUT for narrated runs)."
    )]
    async fn synthesize_video(
        &self,
        #[allow(unused_variables)] Parameters(params): Parameters<NoParams>,
        meta: Meta,
        peer: Peer<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = progress_for(&meta, peer);
        json_result(&self.video(&progress).await?)
    }

    #[tool(
        description = "Narrated runs only: clone a voice from a recording, narrate the story in it, and lipsync the narration into the video. Valid at VOICE_INPUT; finishes the run."
    )]
    async fn submit_voice_sample(
        &self,
        Parameters(params): Parameters<SubmitVoiceSampleParams>,
        meta: Meta,
        peer: Peer<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = progress_for(&meta, peer);
        json_result(&self.voice(&params.voice_sample, &progress).await?)
    }

    #[tool(
        description = "Retry merging an existing narration track into an existing silent video, e.g. after the lipsync provider failed."
    )]
    async fn merge_narration(
        &self,
        #[allow(unused_variables)] Parameters(params): Parameters<NoParams>,
        meta: Meta,
        peer: Peer<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = progress_for(&meta, peer);
        json_result(&self.merge(&progress).await?)
    }

    #[tool(
        description = "Get the run's current step, story, scenes (without image data), produced media, busy flag, progress message, and last error."
    )]
    async fn get_pipeline_status(
        &self,
        #[allow(unused_variables)] Parameters(params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.session.controller.snapshot().summary())
    }

    #[tool(
        description = "Abandon the current run, cancelling any work in flight, and return to DRAWING_INPUT."
    )]
    async fn restart_pipeline(
        &self,
        #[allow(unused_variables)] Parameters(params): Parameters<NoParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.restart()?)
    }
}

#[prompt_router]
impl StoryServer {
    #[prompt(
        description = "Turn a drawing and a photo into an animated story. Returns step-by-step instructions for driving the pipeline tools."
    )]
    async fn story_from_drawing(
        &self,
        Parameters(params): Parameters<StoryFromDrawingParams>,
    ) -> Result<GetPromptResult, McpError> {
        let finish = match &params.voice_path {
            Some(voice) => format!(
                "4. If the run asks for a voice (step VOICE_INPUT), call `submit_voice_sample` with \
                 voice_sample=\"{voice}\". Otherwise call `synthesize_video`.\n"
            ),
            None => "4. Call `synthesize_video` and wait for the progress notifications to finish.\n"
                .to_string(),
        };
        let message = format!(
            "Make an animated story from the drawing at \"{drawing}\" starring the person in \"{photo}\".\n\n\
             1. Call `get_pipeline_status`. If the step is not DRAWING_INPUT, call `restart_pipeline`.\n\
             2. Call `submit_drawing` with drawing=\"{drawing}\" and read back the story title and scenes.\n\
             3. Call `submit_photo` with photo=\"{photo}\". Look at the scene images it wrote before continuing.\n\
             {finish}\
             5. Report the final video location from the last tool result.\n\n\
             If a step fails, `get_pipeline_status` shows the error. Scenes rendered before a failure are kept; \
             `restart_pipeline` starts over.",
            drawing = params.drawing_path,
            photo = params.photo_path,
        );

        Ok(GetPromptResult {
            description: Some(format!("Animated story from {}", params.drawing_path)),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, message)],
        })
    }
}

// ---------------------------------------------------------------------------
// ServerHandler: get_info, list_resources, read_resource
// ---------------------------------------------------------------------------

#[tool_handler]
#[prompt_handler]
impl ServerHandler for StoryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "doodlemagic turns a child's drawing into an animated story. 7 tools: \
                 submit_drawing (drawing -> story script), \
                 submit_photo (photo -> one image per scene), \
                 synthesize_video (scenes -> video), \
                 submit_voice_sample (narrated runs: voice -> narration lipsynced into the video), \
                 merge_narration (retry the lipsync), \
                 get_pipeline_status, restart_pipeline. \
                 Steps: DRAWING_INPUT -> PHOTO_INPUT -> (VOICE_INPUT) -> SCENES_REVIEW -> FINALE. \
                 Media inputs accept a file path or a base64 data URL."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: resource_list(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = &request.uri;
        let text = self.resource_text(uri)?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri.clone())],
        })
    }
}

fn resource_list() -> Vec<rmcp::model::Resource> {
    vec![
        Annotated::new(RawResource::new(SESSION_URI, "Pipeline session"), None),
        Annotated::new(RawResource::new(CONFIG_URI, "Run configuration"), None),
    ]
}

impl StoryServer {
    fn resource_text(&self, uri: &str) -> Result<String, McpError> {
        match uri {
            SESSION_URI => {
                serde_json::to_string_pretty(&self.session.controller.snapshot().summary())
                    .map_err(mc_err)
            }
            CONFIG_URI => toml::to_string_pretty(&self.session.config).map_err(mc_err),
            _ => Err(McpError::resource_not_found(
                format!("Unknown resource: {uri}"),
                None,
            )),
        }
    }
}
