use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "doodlemagic",
    about = "Turn a child's drawing into an animated story: drawing -> story -> scene images -> video -> optional narration",
    version,
    after_help = "\x1b[1mExamples:\x1b[0m
  doodlemagic init ./bedtime                          Create a run directory
  doodlemagic story ./bedtime --drawing rocket.png    Write the story from a drawing
  doodlemagic scenes ./bedtime --photo hero.jpg       Render one image per scene
  doodlemagic video ./bedtime                         Animate the scenes
  doodlemagic run ./bedtime -d rocket.png -p hero.jpg One-shot run
  doodlemagic mcp --dir ./bedtime                     Serve the run to an MCP client"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a new run directory
    Init {
        /// Path to create the run directory
        path: PathBuf,
    },
    /// Generate the story script from a drawing (DRAWING_INPUT -> PHOTO_INPUT)
    Story {
        /// Path to the run directory
        path: PathBuf,

        /// Drawing image (png, jpg, webp, gif)
        #[arg(long, short = 'd')]
        drawing: PathBuf,
    },
    /// Render the scene images from a photo of the hero
    Scenes {
        /// Path to the run directory
        path: PathBuf,

        /// Photo of the story's hero
        #[arg(long, short = 'p')]
        photo: PathBuf,
    },
    /// Animate the scenes into the story video
    Video {
        /// Path to the run directory
        path: PathBuf,
    },
    /// Clone a voice, narrate the story, and lipsync it into the video
    Narrate {
        /// Path to the run directory
        path: PathBuf,

        /// Voice recording (webm, mp3, wav, ogg, m4a)
        #[arg(long, short = 'v')]
        voice: PathBuf,
    },
    /// Retry merging an existing narration into the video
    Merge {
        /// Path to the run directory
        path: PathBuf,
    },
    /// Print the run's current step and outputs as JSON
    Status {
        /// Path to the run directory
        path: PathBuf,
    },
    /// Discard the run's progress and go back to the drawing step
    Restart {
        /// Path to the run directory
        path: PathBuf,
    },
    /// Drive a fresh run end to end
    Run {
        /// Path to the run directory
        path: PathBuf,

        /// Drawing image
        #[arg(long, short = 'd')]
        drawing: PathBuf,

        /// Photo of the story's hero
        #[arg(long, short = 'p')]
        photo: PathBuf,

        /// Voice recording, required when narration is on
        #[arg(long, short = 'v')]
        voice: Option<PathBuf>,
    },
    /// Start an MCP server over stdio for AI agent integration
    Mcp {
        /// Run directory to serve (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}
