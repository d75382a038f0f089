pub mod init;
pub mod mcp;
pub mod run;
pub mod status;
pub mod step;

use crate::progress::Progress;
use colored::*;

/// Progress reporter that echoes stage messages to stderr.
pub fn cli_progress() -> Progress {
    Progress::noop().with_listener(|message| eprintln!("  {}", message.dimmed()))
}
