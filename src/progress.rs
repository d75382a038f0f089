use rmcp::model::{ProgressNotificationParam, ProgressToken};
use rmcp::{Peer, RoleServer};
use std::sync::Arc;
use tracing::debug;

type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Pipeline progress reporter. Forwards human-readable messages to local listeners
/// (CLI output, the controller's status message) and, when running under the MCP
/// server, to the client as progress notifications.
#[derive(Clone)]
pub struct Progress {
    peer: Option<Peer<RoleServer>>,
    token: Option<ProgressToken>,
    listeners: Vec<Listener>,
}

impl Progress {
    pub fn noop() -> Self {
        Self {
            peer: None,
            token: None,
            listeners: Vec::new(),
        }
    }

    /// Create a progress reporter that sends MCP notifications.
    pub fn mcp(peer: Peer<RoleServer>, token: ProgressToken) -> Self {
        Self {
            peer: Some(peer),
            token: Some(token),
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub async fn report(&self, step: f64, total: f64, message: &str) {
        debug!(step, total, "{message}");
        for listener in &self.listeners {
            listener(message);
        }
        if let (Some(peer), Some(token)) = (&self.peer, &self.token) {
            let _ = peer
                .notify_progress(ProgressNotificationParam {
                    progress_token: token.clone(),
                    progress: step,
                    total: Some(total),
                    message: Some(message.to_string()),
                })
                .await;
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("mcp", &self.peer.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
