use super::cli_progress;
use crate::error::StudioResult;
use crate::media::{MediaHandle, MediaPayload};
use crate::session::{write_scene_images, RunSession, OUTPUT_DIR};
use crate::story::StoryDraft;
use colored::*;
use std::path::Path;
use tracing::info;

/// Persist the session whatever the outcome, then hand back the step result.
pub(crate) fn settle<T>(session: &RunSession, result: StudioResult<T>) -> StudioResult<T> {
    session.save()?;
    result
}

pub(crate) fn print_draft(draft: &StoryDraft) {
    eprintln!("{} {}", "story:".green().bold(), draft.title.bold());
    for scene in draft.script.scenes() {
        eprintln!("  {}. {}", scene.scene_number, scene.description);
        eprintln!("     {}", scene.conversation.dimmed());
    }
}

/// Write whatever scenes the session holds into the output directory.
pub(crate) fn export_scenes(session: &RunSession) -> StudioResult<usize> {
    let scenes = session.controller.snapshot().scenes;
    let out = session.dir.join(OUTPUT_DIR);
    std::fs::create_dir_all(&out)?;
    let paths = write_scene_images(&out, &scenes)?;
    for path in &paths {
        eprintln!("  {}", path.display());
    }
    Ok(paths.len())
}

fn print_media(label: &str, handle: &MediaHandle) {
    eprintln!("{} {}", label.green().bold(), handle.describe());
}

/// `doodlemagic story`: drawing -> story script.
pub async fn story(dir: &Path, drawing: &Path) -> StudioResult<()> {
    let session = RunSession::open(dir)?;
    let payload = MediaPayload::encode_file(drawing)?;
    info!(bytes = payload.approx_len(), "Submitting drawing");

    let result = session
        .controller
        .submit_drawing(payload, &cli_progress())
        .await;
    let draft = settle(&session, result)?;

    print_draft(&draft);
    eprintln!();
    eprintln!(
        "Next: doodlemagic scenes {} --photo <image>",
        dir.display()
    );
    Ok(())
}

/// `doodlemagic scenes`: photo -> chained scene images.
pub async fn scenes(dir: &Path, photo: &Path) -> StudioResult<()> {
    let session = RunSession::open(dir)?;
    let payload = MediaPayload::encode_file(photo)?;

    let result = session
        .controller
        .submit_photo(payload, &cli_progress())
        .await;
    // Scenes that finished before a failure are still worth keeping on disk.
    let written = export_scenes(&session)?;
    let scenes = settle(&session, result)?;

    eprintln!(
        "{} {} of {} scenes written to {}",
        "done:".green().bold(),
        written,
        scenes.len(),
        dir.join(OUTPUT_DIR).display()
    );
    eprintln!();
    let next = match session.controller.variant() {
        crate::controller::PipelineVariant::Silent => "video",
        crate::controller::PipelineVariant::Narrated => "narrate",
    };
    eprintln!("Next: doodlemagic {next} {}", dir.display());
    Ok(())
}

/// `doodlemagic video`: scenes -> video.
pub async fn video(dir: &Path) -> StudioResult<()> {
    let session = RunSession::open(dir)?;
    let result = session.controller.synthesize_video(&cli_progress()).await;
    let handle = settle(&session, result)?;
    print_media("video:", &handle);
    Ok(())
}

/// `doodlemagic narrate`: voice sample -> narration, merged into the video.
pub async fn narrate(dir: &Path, voice: &Path) -> StudioResult<()> {
    let session = RunSession::open(dir)?;
    let payload = MediaPayload::encode_file(voice)?;

    let result = session
        .controller
        .submit_voice_sample(payload, &cli_progress())
        .await;
    let narration = settle(&session, result)?;

    print_media("narration:", &narration);
    if let Some(video) = session.controller.snapshot().final_video() {
        print_media("video:", video);
    }
    Ok(())
}

/// `doodlemagic merge`: retry the lipsync of an existing narration.
pub async fn merge(dir: &Path) -> StudioResult<()> {
    let session = RunSession::open(dir)?;
    let result = session.controller.merge_narration(&cli_progress()).await;
    let handle = settle(&session, result)?;
    print_media("video:", &handle);
    Ok(())
}
