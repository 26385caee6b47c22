use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};

use crate::domain::document::DocumentTree;

use super::components::RenderLifecycle;
use super::state::BlockHooks;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("HTML rewrite failed: {message}")]
    Rewrite { message: String },
    #[error("component `{signature}` failed to load: {message}")]
    Component { signature: String, message: String },
}

/// One render of Markdown into a shared destination container.
pub struct MarkdownRequest {
    pub source: String,
    /// Vault path of the note, used to resolve relative links.
    pub context_path: String,
    pub container: Arc<Mutex<DocumentTree>>,
    pub hooks: Arc<dyn BlockHooks>,
    /// Receives the components contributed while rendering.
    pub lifecycle: Arc<RenderLifecycle>,
}

/// Returned once rendering has been scheduled; blocks may still be in progress.
#[derive(Debug, Default)]
pub struct RenderHandle {
    pub completion: Option<oneshot::Receiver<()>>,
}

impl RenderHandle {
    pub fn without_signal() -> Self {
        Self::default()
    }

    pub fn with_signal(completion: oneshot::Receiver<()>) -> Self {
        Self {
            completion: Some(completion),
        }
    }
}

/// The rendering engine: turns Markdown into nodes appended to the request's container.
///
/// Implementations bracket every block with the request's hooks and may finish blocks
/// after `render` has returned.
#[async_trait]
pub trait MarkdownRenderer: Send + Sync {
    async fn render(&self, request: MarkdownRequest) -> Result<RenderHandle, RenderError>;
}
