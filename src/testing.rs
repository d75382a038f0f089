//! Deterministic service doubles shared by the stage and controller tests.

use crate::config::PollSettings;
use crate::controller::{PipelineController, PipelineState, PipelineVariant};
use crate::error::{StudioError, StudioResult};
use crate::gemini::{
    Candidate, Content, ContentGenerator, GenerateContentRequest, GenerateContentResponse,
    InlineData, Part,
};
use crate::media::{MediaHandle, MediaPayload};
use crate::progress::Progress;
use crate::services::Services;
use crate::stages::jobs::{JobClient, JobHandle, JobState, JobStatus};
use crate::stages::lipsync::PassthroughLipsync;
use crate::stages::narration::StubNarrator;
use crate::stages::operation::{Operation, OperationClient};
use crate::stages::scenes::SceneChainStage;
use crate::stages::script::ScriptStage;
use crate::stages::video::{StubVideoSynthesizer, VideoSynthesizer};
use crate::story::{GeneratedScene, StoryScene, StoryScript};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn fast_poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(1),
        transient_backoff: Duration::from_millis(1),
        max_wait: None,
    }
}

fn response(parts: Vec<Part>) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".into()),
                parts,
            }),
            finish_reason: Some("STOP".into()),
        }],
        prompt_feedback: None,
    }
}

pub fn text_response(text: &str) -> GenerateContentResponse {
    response(vec![Part::text(text)])
}

pub fn image_response(image: &MediaPayload) -> GenerateContentResponse {
    response(vec![Part::text("Here is your scene."), Part::inline(image)])
}

pub fn fixture_script(n: u32) -> StoryScript {
    let scenes = (1..=n)
        .map(|i| StoryScene {
            scene_number: i,
            description: format!("The hero explores place number {i}."),
            camera_shot: "Wide shot".into(),
            apparel_descriptor: "red raincoat and yellow boots".into(),
            conversation: format!("Line {i}."),
            rhyming_stanza: Some(format!("Rhyme {i}")),
        })
        .collect();
    StoryScript::new(scenes).unwrap()
}

pub fn fixture_scenes(n: u32) -> Vec<GeneratedScene> {
    fixture_script(n)
        .scenes()
        .iter()
        .map(|s| {
            let image = MediaPayload::from_bytes(format!("scene-{}", s.scene_number).as_bytes(), "image/png");
            GeneratedScene::new(s, image)
        })
        .collect()
}

/// A well-formed structured story reply with `n` scenes.
pub fn story_response(n: u32) -> GenerateContentResponse {
    let scenes: Vec<StoryScene> = fixture_script(n).into();
    let body = json!({
        "title": "The Puddle Explorer",
        "video_prompt": "An animated adventure of a hero in a red raincoat.",
        "scenes": scenes,
    });
    text_response(&body.to_string())
}

/// Replays queued responses in order and records every request.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<StudioResult<GenerateContentResponse>>>,
    requests: Mutex<Vec<(String, GenerateContentRequest)>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<StudioResult<GenerateContentResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, GenerateContentRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> StudioResult<GenerateContentResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StudioError::Other("no scripted response left".into())))
    }
}

/// Image generator that returns a distinct image per call (`image-<call>`), and a
/// text-only reply on call `fail_at`. Records the reference image of every call.
pub struct ChainImageGenerator {
    fail_at: Option<usize>,
    calls: AtomicUsize,
    references: Mutex<Vec<MediaPayload>>,
}

impl ChainImageGenerator {
    pub fn new(fail_at: Option<usize>) -> Self {
        Self {
            fail_at,
            calls: AtomicUsize::new(0),
            references: Mutex::new(Vec::new()),
        }
    }

    pub fn references(&self) -> Vec<MediaPayload> {
        self.references.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for ChainImageGenerator {
    async fn generate_content(
        &self,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> StudioResult<GenerateContentResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(reference) = request.inline_parts().next() {
            self.references
                .lock()
                .unwrap()
                .push(MediaPayload::from(InlineData::clone(reference)));
        }
        if self.fail_at == Some(call) {
            return Ok(text_response("I cannot draw that."));
        }
        let image = MediaPayload::from_bytes(format!("image-{call}").as_bytes(), "image/png");
        Ok(image_response(&image))
    }
}

/// Job client that replays status results and records submissions.
pub struct ScriptedJobClient {
    statuses: Mutex<VecDeque<StudioResult<JobStatus>>>,
    result: Value,
    submissions: Mutex<Vec<(String, Value)>>,
    status_calls: AtomicUsize,
    result_calls: AtomicUsize,
}

impl ScriptedJobClient {
    /// Once `statuses` runs out every check reports completion.
    pub fn new(statuses: Vec<StudioResult<JobStatus>>, result: Value) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            result,
            submissions: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
        }
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            job_id: "job-1".into(),
            status_url: "https://queue.example/requests/job-1/status".into(),
            response_url: Some("https://queue.example/requests/job-1".into()),
        }
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<(String, Value)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobClient for ScriptedJobClient {
    async fn submit(&self, model: &str, input: &Value) -> StudioResult<JobHandle> {
        self.submissions
            .lock()
            .unwrap()
            .push((model.to_string(), input.clone()));
        Ok(self.handle())
    }

    async fn status(&self, _handle: &JobHandle) -> StudioResult<JobStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses.lock().unwrap().pop_front().unwrap_or(Ok(JobStatus {
            state: JobState::Completed,
            reason: None,
            output: None,
        }))
    }

    async fn result(&self, _handle: &JobHandle) -> StudioResult<Value> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }

    async fn fetch_asset(&self, url: &str) -> StudioResult<Vec<u8>> {
        Ok(format!("asset:{url}").into_bytes())
    }
}

/// Operation client that replays poll results.
pub struct StubOperationClient {
    polls: Mutex<VecDeque<StudioResult<Operation>>>,
    poll_count: AtomicUsize,
}

impl StubOperationClient {
    pub fn new(polls: Vec<StudioResult<Operation>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            poll_count: AtomicUsize::new(0),
        }
    }

    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationClient for StubOperationClient {
    async fn start(&self, _model: &str, _body: &Value) -> StudioResult<String> {
        Ok("operations/test".into())
    }

    async fn poll(&self, name: &str) -> StudioResult<Operation> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StudioError::Other(format!("no scripted poll left for {name}"))))
    }

    async fn fetch_asset(&self, uri: &str) -> StudioResult<Vec<u8>> {
        Ok(format!("asset:{uri}").into_bytes())
    }
}

/// Video synthesizer that waits, then returns the placeholder. Lets tests hold a
/// run in the busy state.
struct SlowVideo(Duration);

#[async_trait]
impl VideoSynthesizer for SlowVideo {
    async fn synthesize(
        &self,
        _prompt: &str,
        _scenes: &[GeneratedScene],
        _output_dir: &Path,
        _progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        tokio::time::sleep(self.0).await;
        Ok(MediaHandle::Url {
            url: "https://cdn.example/slow.mp4".into(),
            content_type: "video/mp4".into(),
        })
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Builds `Services` from scripted script replies, the chain image generator, and
/// zero-delay placeholders for everything downstream.
pub struct TestServices {
    script_responses: Vec<StudioResult<GenerateContentResponse>>,
    fail_image_at: Option<usize>,
    video_delay: Option<Duration>,
}

impl TestServices {
    pub fn new(script_responses: Vec<StudioResult<GenerateContentResponse>>) -> Self {
        Self {
            script_responses,
            fail_image_at: None,
            video_delay: None,
        }
    }

    pub fn failing_image_at(mut self, call: usize) -> Self {
        self.fail_image_at = Some(call);
        self
    }

    pub fn slow_video(mut self, delay: Duration) -> Self {
        self.video_delay = Some(delay);
        self
    }

    pub fn services(self) -> Services {
        let scene_count = 3;
        let video: Box<dyn VideoSynthesizer> = match self.video_delay {
            Some(delay) => Box::new(SlowVideo(delay)),
            None => Box::new(StubVideoSynthesizer::new(Duration::ZERO)),
        };
        Services {
            script: ScriptStage::new(
                Arc::new(ScriptedGenerator::new(self.script_responses)),
                "script-model",
                scene_count,
            ),
            scenes: SceneChainStage::new(
                Arc::new(ChainImageGenerator::new(self.fail_image_at)),
                "image-model",
            ),
            video,
            narrator: Box::new(StubNarrator::new(Duration::ZERO)),
            lipsync: Box::new(PassthroughLipsync),
        }
    }

    pub fn controller(self, variant: PipelineVariant, output_dir: &Path) -> PipelineController {
        PipelineController::new(self.services(), variant, output_dir)
    }

    pub fn resume(
        self,
        variant: PipelineVariant,
        output_dir: &Path,
        state: PipelineState,
    ) -> PipelineController {
        PipelineController::resume(self.services(), variant, output_dir, state)
    }
}
