//! The pipeline state machine.
//!
//! A run moves forward through `DRAWING_INPUT -> PHOTO_INPUT -> (VOICE_INPUT) ->
//! SCENES_REVIEW -> FINALE`, one explicit call per transition. The controller owns the
//! run's `PipelineState`; stages only ever see their inputs. A busy flag rejects
//! overlapping calls, and `restart` abandons whatever is in flight.

use crate::error::{StudioError, StudioResult};
use crate::media::{MediaHandle, MediaPayload};
use crate::progress::Progress;
use crate::services::Services;
use crate::story::{GeneratedScene, StoryDraft, StoryScript};
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

const DRAWING_MESSAGE: &str = "Our storytellers are analyzing your drawing...";
const VOICE_MESSAGE: &str = "Cloning voice and adding narration...";
const MERGE_MESSAGE: &str = "Adding narration to your video...";
const VIDEO_MESSAGES: [&str; 3] = [
    "Stitching scenes together...",
    "Adding magical sparkle...",
    "Rendering your animation...",
];
const TICKER_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStep {
    #[default]
    DrawingInput,
    PhotoInput,
    VoiceInput,
    ScenesReview,
    Finale,
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStep::DrawingInput => "DRAWING_INPUT",
            PipelineStep::PhotoInput => "PHOTO_INPUT",
            PipelineStep::VoiceInput => "VOICE_INPUT",
            PipelineStep::ScenesReview => "SCENES_REVIEW",
            PipelineStep::Finale => "FINALE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVariant {
    /// Scenes are reviewed, then animated into a silent video.
    Silent,
    /// A voice sample is collected after the scenes; narration is lipsynced into the video.
    Narrated,
}

/// Everything a run has produced so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub step: PipelineStep,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub script: Option<StoryScript>,
    #[serde(default)]
    pub video_prompt: Option<String>,
    #[serde(default)]
    pub scenes: Vec<GeneratedScene>,
    #[serde(default)]
    pub silent_video: Option<MediaHandle>,
    #[serde(default)]
    pub narration: Option<MediaHandle>,
    #[serde(default)]
    pub narrated_video: Option<MediaHandle>,
    /// Inputs are single-use and never persisted.
    #[serde(skip)]
    pub drawing: Option<MediaPayload>,
    #[serde(skip)]
    pub photo: Option<MediaPayload>,
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PipelineState {
    /// The deliverable: the narrated video when one exists, otherwise the silent one.
    pub fn final_video(&self) -> Option<&MediaHandle> {
        self.narrated_video.as_ref().or(self.silent_video.as_ref())
    }

    /// Compact view for status output. Image payloads are left out.
    pub fn summary(&self) -> serde_json::Value {
        let scenes: Vec<_> = self
            .scenes
            .iter()
            .map(|s| {
                json!({
                    "scene_number": s.scene_number,
                    "description": s.description,
                    "conversation": s.conversation,
                    "rhyming_stanza": s.rhyming_stanza,
                    "image_type": s.image.content_type,
                })
            })
            .collect();
        json!({
            "step": self.step.to_string(),
            "title": self.title,
            "video_prompt": self.video_prompt,
            "script_scenes": self.script.as_ref().map(StoryScript::len),
            "scenes": scenes,
            "silent_video": self.silent_video.as_ref().map(MediaHandle::describe),
            "narration": self.narration.as_ref().map(MediaHandle::describe),
            "narrated_video": self.narrated_video.as_ref().map(MediaHandle::describe),
            "final_video": self.final_video().map(MediaHandle::describe),
            "busy": self.busy,
            "message": self.message,
            "error": self.error,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Script,
    Scenes,
    Video,
    Narration,
    Lipsync,
}

impl Stage {
    fn user_message(self, err: &StudioError, state: &PipelineState) -> String {
        match self {
            Stage::Script => "Could not generate story. Please try another drawing.".into(),
            Stage::Scenes => {
                let scene = match err {
                    StudioError::NoImageProduced { scene_number } => *scene_number as usize,
                    _ => state.scenes.len() + 1,
                };
                format!("Could not create scene {scene}. Please try another photo.")
            }
            Stage::Video => match err {
                StudioError::ContentBlocked(_) => {
                    "The video was blocked by the safety filter. Please try another drawing.".into()
                }
                _ => "Could not create the video. Please try again.".into(),
            },
            Stage::Narration => "Could not process your voice. Please try recording again.".into(),
            Stage::Lipsync => "Could not add narration to the video. Please try again.".into(),
        }
    }
}

type StageResult<T> = Result<T, (Stage, StudioError)>;

fn at(stage: Stage) -> impl FnOnce(StudioError) -> (Stage, StudioError) {
    move |e| (stage, e)
}

struct Shared {
    state: PipelineState,
    /// Bumped on restart. Work started under an older generation may not touch state.
    generation: u64,
    abort: Option<AbortHandle>,
}

struct Inner {
    services: Services,
    variant: PipelineVariant,
    output_dir: PathBuf,
    ticker_interval: Duration,
    shared: Mutex<Shared>,
}

struct Ticket {
    generation: u64,
    registration: AbortRegistration,
    release: Release,
}

/// Frees the busy flag if the action's future is dropped before it settles, e.g.
/// when the caller gives up on the request. `run` disarms it once it settles.
struct Release {
    inner: Arc<Inner>,
    generation: u64,
    armed: bool,
}

impl Drop for Release {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut shared = self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if shared.generation == self.generation && shared.state.busy {
            shared.abort = None;
            shared.state.busy = false;
            shared.state.message = None;
            warn!(step = %shared.state.step, "Pipeline step dropped by its caller");
        }
    }
}

/// Rotates status messages while a long job runs. Dropping it stops the task.
struct Ticker(tokio::task::JoinHandle<()>);

impl Ticker {
    fn spawn(progress: Progress, every: Duration) -> Self {
        Ticker(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately.
            interval.tick().await;
            let total = VIDEO_MESSAGES.len() as f64;
            for (i, message) in VIDEO_MESSAGES.iter().cycle().enumerate() {
                interval.tick().await;
                progress
                    .report((i % VIDEO_MESSAGES.len()) as f64, total, message)
                    .await;
            }
        }))
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct PipelineController {
    inner: Arc<Inner>,
}

impl PipelineController {
    pub fn new(services: Services, variant: PipelineVariant, output_dir: impl Into<PathBuf>) -> Self {
        Self::resume(services, variant, output_dir, PipelineState::default())
    }

    /// Continue a persisted run. A saved busy flag is stale by definition and is cleared.
    pub fn resume(
        services: Services,
        variant: PipelineVariant,
        output_dir: impl Into<PathBuf>,
        mut state: PipelineState,
    ) -> Self {
        state.busy = false;
        state.message = None;
        Self {
            inner: Arc::new(Inner {
                services,
                variant,
                output_dir: output_dir.into(),
                ticker_interval: TICKER_INTERVAL,
                shared: Mutex::new(Shared {
                    state,
                    generation: 0,
                    abort: None,
                }),
            }),
        }
    }

    pub fn variant(&self) -> PipelineVariant {
        self.inner.variant
    }

    pub fn snapshot(&self) -> PipelineState {
        self.lock().state.clone()
    }

    /// DRAWING_INPUT -> PHOTO_INPUT.
    pub async fn submit_drawing(
        &self,
        drawing: MediaPayload,
        progress: &Progress,
    ) -> StudioResult<StoryDraft> {
        let (ticket, ()) = self.begin(
            "submit a drawing",
            &[PipelineStep::DrawingInput],
            DRAWING_MESSAGE,
            |state| {
                state.drawing = Some(drawing.clone());
                Ok(())
            },
        )?;
        let progress = self.tracked(ticket.generation, progress);
        let work = async {
            progress.report(0.0, 1.0, DRAWING_MESSAGE).await;
            self.inner
                .services
                .script
                .generate(&drawing)
                .await
                .map_err(at(Stage::Script))
        };
        self.run(ticket, work, |state, draft| {
            state.title = Some(draft.title.clone());
            state.script = Some(draft.script.clone());
            state.video_prompt = Some(draft.video_prompt.clone());
            state.drawing = None;
            state.step = PipelineStep::PhotoInput;
        })
        .await
    }

    /// PHOTO_INPUT -> SCENES_REVIEW (or VOICE_INPUT for the narrated variant).
    ///
    /// Scenes appear in the state as they are rendered; a failure keeps the ones
    /// that finished.
    pub async fn submit_photo(
        &self,
        photo: MediaPayload,
        progress: &Progress,
    ) -> StudioResult<Vec<GeneratedScene>> {
        let (ticket, script) = self.begin(
            "submit a photo",
            &[PipelineStep::PhotoInput],
            "Creating your character...",
            |state| {
                let script = state
                    .script
                    .clone()
                    .ok_or_else(|| StudioError::Other("No story script yet. Submit a drawing first.".into()))?;
                state.photo = Some(photo.clone());
                state.scenes.clear();
                Ok(script)
            },
        )?;
        let generation = ticket.generation;
        let progress = self.tracked(generation, progress);
        let work = async {
            self.inner
                .services
                .scenes
                .render_chain(&script, &photo, &progress, |scene| {
                    self.update(generation, |state| state.scenes.push(scene));
                })
                .await
                .map_err(at(Stage::Scenes))
        };
        let next = match self.inner.variant {
            PipelineVariant::Silent => PipelineStep::ScenesReview,
            PipelineVariant::Narrated => PipelineStep::VoiceInput,
        };
        self.run(ticket, work, |state, scenes| {
            state.scenes = scenes.clone();
            state.photo = None;
            state.step = next;
        })
        .await
    }

    /// Animate the story. From SCENES_REVIEW this finishes the silent variant. In the
    /// narrated variant it renders the silent video from VOICE_INPUT and, if narration
    /// already exists, merges it.
    pub async fn synthesize_video(&self, progress: &Progress) -> StudioResult<MediaHandle> {
        let allowed = match self.inner.variant {
            PipelineVariant::Silent => [PipelineStep::ScenesReview],
            PipelineVariant::Narrated => [PipelineStep::VoiceInput],
        };
        let (ticket, (prompt, scenes, narration)) =
            self.begin("synthesize the video", &allowed, VIDEO_MESSAGES[0], |state| {
                if state.scenes.is_empty() {
                    return Err(StudioError::Other("There are no scenes to animate.".into()));
                }
                Ok((
                    state.video_prompt.clone().unwrap_or_default(),
                    state.scenes.clone(),
                    state.narration.clone(),
                ))
            })?;
        let generation = ticket.generation;
        let progress = self.tracked(generation, progress);
        let work = async {
            let video = self
                .render_video(&prompt, &scenes, &progress)
                .await
                .map_err(at(Stage::Video))?;
            let Some(narration) = narration else {
                return Ok((video, None));
            };
            self.update(generation, |state| state.silent_video = Some(video.clone()));
            progress.report(0.0, 1.0, MERGE_MESSAGE).await;
            let merged = self
                .inner
                .services
                .lipsync
                .merge(&video, &narration, &self.inner.output_dir, &progress)
                .await
                .map_err(at(Stage::Lipsync))?;
            StageResult::Ok((video, Some(merged)))
        };
        let variant = self.inner.variant;
        let (video, merged) = self
            .run(ticket, work, |state, (video, merged)| {
                state.silent_video = Some(video.clone());
                if let Some(merged) = merged {
                    state.narrated_video = Some(merged.clone());
                    state.step = PipelineStep::Finale;
                } else if variant == PipelineVariant::Silent {
                    state.step = PipelineStep::Finale;
                }
            })
            .await?;
        Ok(merged.unwrap_or(video))
    }

    /// VOICE_INPUT -> FINALE: clone the voice, narrate the story, render the video
    /// if it does not exist yet, and lipsync the two. Returns the narration track.
    pub async fn submit_voice_sample(
        &self,
        sample: MediaPayload,
        progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        let (ticket, (text, prompt, scenes, existing_video)) = self.begin(
            "submit a voice sample",
            &[PipelineStep::VoiceInput],
            VOICE_MESSAGE,
            |state| {
                let script = state
                    .script
                    .as_ref()
                    .ok_or_else(|| StudioError::Other("No story script yet. Submit a drawing first.".into()))?;
                Ok((
                    script.narration_text(),
                    state.video_prompt.clone().unwrap_or_default(),
                    state.scenes.clone(),
                    state.silent_video.clone(),
                ))
            },
        )?;
        let generation = ticket.generation;
        let progress = self.tracked(generation, progress);
        let work = async {
            progress.report(0.0, 1.0, VOICE_MESSAGE).await;
            let narration = self
                .inner
                .services
                .narrator
                .narrate(&sample, &text, &self.inner.output_dir)
                .await
                .map_err(at(Stage::Narration))?;
            self.update(generation, |state| state.narration = Some(narration.clone()));

            let video = match existing_video {
                Some(video) => video,
                None => {
                    let video = self
                        .render_video(&prompt, &scenes, &progress)
                        .await
                        .map_err(at(Stage::Video))?;
                    self.update(generation, |state| state.silent_video = Some(video.clone()));
                    video
                }
            };

            progress.report(0.0, 1.0, MERGE_MESSAGE).await;
            let merged = self
                .inner
                .services
                .lipsync
                .merge(&video, &narration, &self.inner.output_dir, &progress)
                .await
                .map_err(at(Stage::Lipsync))?;
            StageResult::Ok((narration, merged))
        };
        let (narration, _) = self
            .run(ticket, work, |state, (narration, merged)| {
                state.narration = Some(narration.clone());
                state.narrated_video = Some(merged.clone());
                state.step = PipelineStep::Finale;
            })
            .await?;
        Ok(narration)
    }

    /// Merge an existing narration into an existing silent video.
    pub async fn merge_narration(&self, progress: &Progress) -> StudioResult<MediaHandle> {
        let (ticket, (video, narration)) = self.begin(
            "merge narration",
            &[PipelineStep::VoiceInput, PipelineStep::Finale],
            MERGE_MESSAGE,
            |state| match (&state.silent_video, &state.narration, &state.narrated_video) {
                (Some(video), Some(narration), None) => Ok((video.clone(), narration.clone())),
                (_, _, Some(_)) => Err(StudioError::Other("The narration is already merged.".into())),
                _ => Err(StudioError::Other(
                    "Both a silent video and a narration track are needed to merge.".into(),
                )),
            },
        )?;
        let progress = self.tracked(ticket.generation, progress);
        let work = async {
            progress.report(0.0, 1.0, MERGE_MESSAGE).await;
            self.inner
                .services
                .lipsync
                .merge(&video, &narration, &self.inner.output_dir, &progress)
                .await
                .map_err(at(Stage::Lipsync))
        };
        self.run(ticket, work, |state, merged| {
            state.narrated_video = Some(merged.clone());
            state.step = PipelineStep::Finale;
        })
        .await
    }

    /// Abandon the current run and start a fresh one. In-flight work is aborted and
    /// anything it reports afterwards is discarded.
    pub fn restart(&self) {
        let mut shared = self.lock();
        if let Some(handle) = shared.abort.take() {
            handle.abort();
        }
        shared.generation += 1;
        shared.state = PipelineState::default();
        info!(generation = shared.generation, "Pipeline restarted");
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the run for one action. `prepare` sees the state after the busy and step
    /// checks and may reject the action; nothing is marked busy unless it succeeds.
    fn begin<X>(
        &self,
        action: &'static str,
        allowed: &[PipelineStep],
        message: &str,
        prepare: impl FnOnce(&mut PipelineState) -> StudioResult<X>,
    ) -> StudioResult<(Ticket, X)> {
        let mut shared = self.lock();
        if shared.state.busy {
            let current = shared
                .state
                .message
                .clone()
                .unwrap_or_else(|| "another step is running".into());
            return Err(StudioError::Busy(current));
        }
        if !allowed.contains(&shared.state.step) {
            return Err(StudioError::InvalidStep {
                action,
                step: shared.state.step.to_string(),
            });
        }
        let prepared = prepare(&mut shared.state)?;

        let (handle, registration) = AbortHandle::new_pair();
        shared.abort = Some(handle);
        shared.state.busy = true;
        shared.state.error = None;
        shared.state.message = Some(message.to_string());
        info!(action, step = %shared.state.step, "Pipeline step started");
        Ok((
            Ticket {
                generation: shared.generation,
                registration,
                release: Release {
                    inner: self.inner.clone(),
                    generation: shared.generation,
                    armed: true,
                },
            },
            prepared,
        ))
    }

    /// Drive one action to completion and settle the state: apply the result on
    /// success, or record the stage's user-facing error and stay put on failure.
    async fn run<T>(
        &self,
        ticket: Ticket,
        work: impl Future<Output = StageResult<T>>,
        apply: impl FnOnce(&mut PipelineState, &T),
    ) -> StudioResult<T> {
        let Ticket {
            generation,
            registration,
            mut release,
        } = ticket;
        let outcome = Abortable::new(work, registration).await;
        release.armed = false;

        let mut shared = self.lock();
        if shared.generation != generation {
            return Err(StudioError::Cancelled);
        }
        shared.abort = None;
        shared.state.busy = false;
        shared.state.message = None;

        match outcome {
            Err(_aborted) => Err(StudioError::Cancelled),
            Ok(Ok(value)) => {
                apply(&mut shared.state, &value);
                info!(step = %shared.state.step, "Pipeline step finished");
                Ok(value)
            }
            Ok(Err((stage, err))) => {
                let message = stage.user_message(&err, &shared.state);
                error!(?stage, error = %err, "{message}");
                shared.state.error = Some(message);
                Err(err)
            }
        }
    }

    /// Apply a partial result, unless the run it belongs to was abandoned.
    fn update(&self, generation: u64, f: impl FnOnce(&mut PipelineState)) {
        let mut shared = self.lock();
        if shared.generation == generation {
            f(&mut shared.state);
        }
    }

    /// Wrap the caller's progress so messages also land in `state.message`.
    fn tracked(&self, generation: u64, progress: &Progress) -> Progress {
        let inner = Arc::downgrade(&self.inner);
        progress.clone().with_listener(move |message| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut shared = inner.shared.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.generation == generation {
                shared.state.message = Some(message.to_string());
            }
        })
    }

    async fn render_video(
        &self,
        prompt: &str,
        scenes: &[GeneratedScene],
        progress: &Progress,
    ) -> StudioResult<MediaHandle> {
        let _ticker = Ticker::spawn(progress.clone(), self.inner.ticker_interval);
        info!(
            provider = self.inner.services.video.name(),
            scenes = scenes.len(),
            "Synthesizing video"
        );
        self.inner
            .services
            .video
            .synthesize(prompt, scenes, &self.inner.output_dir, progress)
            .await
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("variant", &self.inner.variant)
            .field("output_dir", &self.inner.output_dir)
            .finish_non_exhaustive()
    }
}
