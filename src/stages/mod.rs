//! Pipeline stages. Each stage owns one external generation step and exposes it
//! behind a trait or a small struct so the controller never sees wire formats.

pub mod jobs;
pub mod lipsync;
pub mod narration;
pub mod operation;
pub mod scenes;
pub mod script;
pub mod video;
