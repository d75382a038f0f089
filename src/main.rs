mod cli;
mod commands;
mod config;
mod controller;
mod error;
mod gemini;
mod http;
mod mcp;
mod media;
mod progress;
mod services;
mod session;
mod stages;
mod story;
#[cfg(test)]
mod testing;

use clap::Parser;
use cli::{Cli, Command};
use colored::*;
use error::StudioResult;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing for non-MCP commands, gated on RUST_LOG env var
    if !matches!(cli.command, Command::Mcp { .. }) && std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        if let Some(hint) = e.hint() {
            eprintln!("{} {}", "hint:".yellow().bold(), hint);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> StudioResult<()> {
    match cli.command {
        Command::Init { path } => commands::init::run(&path),
        Command::Story { path, drawing } => commands::step::story(&path, &drawing).await,
        Command::Scenes { path, photo } => commands::step::scenes(&path, &photo).await,
        Command::Video { path } => commands::step::video(&path).await,
        Command::Narrate { path, voice } => commands::step::narrate(&path, &voice).await,
        Command::Merge { path } => commands::step::merge(&path).await,
        Command::Status { path } => commands::status::status(&path),
        Command::Restart { path } => commands::status::restart(&path),
        Command::Run {
            path,
            drawing,
            photo,
            voice,
        } => commands::run::run(&path, &drawing, &photo, voice.as_deref()).await,
        Command::Mcp { dir } => commands::mcp::run(dir).await,
    }
}
