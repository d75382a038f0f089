use super::cli_progress;
use super::step::{export_scenes, print_draft, settle};
use crate::controller::{PipelineStep, PipelineVariant};
use crate::error::{StudioError, StudioResult};
use crate::media::MediaPayload;
use crate::session::RunSession;
use colored::*;
use std::path::Path;
use tracing::warn;

/// `doodlemagic run`: drive a fresh run from drawing to final video in one call.
pub async fn run(
    dir: &Path,
    drawing: &Path,
    photo: &Path,
    voice: Option<&Path>,
) -> StudioResult<()> {
    let session = RunSession::open(dir)?;
    let variant = session.controller.variant();

    // Decode every input up front so a bad path fails before any provider call.
    let drawing = MediaPayload::encode_file(drawing)?;
    let photo = MediaPayload::encode_file(photo)?;
    let voice = match (variant, voice) {
        (PipelineVariant::Narrated, Some(path)) => Some(MediaPayload::encode_file(path)?),
        (PipelineVariant::Narrated, None) => {
            return Err(StudioError::Other(
                "This run narrates its video; pass --voice <recording>.".into(),
            ))
        }
        (PipelineVariant::Silent, Some(path)) => {
            warn!(path = %path.display(), "Narration is off in doodlemagic.toml; ignoring --voice");
            None
        }
        (PipelineVariant::Silent, None) => None,
    };

    if session.controller.snapshot().step != PipelineStep::DrawingInput {
        eprintln!("{} discarding the previous run in {}", "note:".yellow().bold(), dir.display());
        session.controller.restart();
    }

    let progress = cli_progress();
    let result = session.controller.submit_drawing(drawing, &progress).await;
    let draft = settle(&session, result)?;
    print_draft(&draft);

    let result = session.controller.submit_photo(photo, &progress).await;
    export_scenes(&session)?;
    settle(&session, result)?;

    let result = match voice {
        Some(sample) => session
            .controller
            .submit_voice_sample(sample, &progress)
            .await
            .map(|_| ()),
        None => session.controller.synthesize_video(&progress).await.map(|_| ()),
    };
    settle(&session, result)?;

    let state = session.controller.snapshot();
    if let Some(video) = state.final_video() {
        eprintln!("{} {}", "done:".green().bold(), video.describe());
    }
    Ok(())
}
