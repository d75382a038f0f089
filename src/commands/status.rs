//! Session inspection and reset. Neither needs provider credentials.

use crate::controller::PipelineState;
use crate::error::{StudioError, StudioResult};
use crate::session::{load_session, save_session};
use colored::*;
use std::path::Path;

/// Status summary of the run in `dir`.
pub fn pipeline_status(dir: &Path) -> StudioResult<serde_json::Value> {
    if !dir.is_dir() {
        return Err(StudioError::RunNotFound(dir.to_path_buf()));
    }
    Ok(load_session(dir)?.summary())
}

/// Overwrite the saved session with a fresh one. The old file is not parsed, so
/// this also recovers an unreadable session.
pub fn reset_session(dir: &Path) -> StudioResult<()> {
    if !dir.is_dir() {
        return Err(StudioError::RunNotFound(dir.to_path_buf()));
    }
    save_session(dir, &PipelineState::default())
}

pub fn status(dir: &Path) -> StudioResult<()> {
    let summary = pipeline_status(dir)?;
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| StudioError::Other(format!("failed to render status: {e}")))?;
    println!("{json}");
    Ok(())
}

pub fn restart(dir: &Path) -> StudioResult<()> {
    reset_session(dir)?;
    eprintln!(
        "{} {} is back at the drawing step",
        "done:".green().bold(),
        dir.display()
    );
    Ok(())
}
