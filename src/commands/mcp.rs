use crate::error::{StudioError, StudioResult};
use crate::mcp::StoryServer;
use crate::session::RunSession;
use rmcp::ServiceExt;
use std::path::PathBuf;
use tracing::info;

pub async fn run(dir: Option<PathBuf>) -> StudioResult<()> {
    // Send tracing output to stderr so it doesn't corrupt the MCP stdio JSON-RPC channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let session = RunSession::open(&dir)?;
    info!(run = %dir.display(), step = %session.controller.snapshot().step, "Serving run over MCP");

    let server = StoryServer::new(session);
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| StudioError::Other(format!("MCP server error: {e}")))?;
    service
        .waiting()
        .await
        .map_err(|e| StudioError::Other(format!("MCP server error: {e}")))?;
    Ok(())
}
