//! Markdown to transformed document: render, settle, then run the transform stages.

use async_trait::async_trait;

use crate::domain::document::DocumentTree;

use super::render::{DocumentRenderer, RenderError};
use super::transform::TransformPipeline;

/// Produces the final document for a note.
#[async_trait]
pub trait NoteConverter: Send + Sync {
    async fn convert(
        &self,
        markdown: &str,
        context_path: &str,
    ) -> Result<DocumentTree, RenderError>;
}

pub struct DocumentConverter {
    renderer: DocumentRenderer,
    pipeline: TransformPipeline,
}

impl DocumentConverter {
    pub fn new(renderer: DocumentRenderer, pipeline: TransformPipeline) -> Self {
        Self { renderer, pipeline }
    }
}

#[async_trait]
impl NoteConverter for DocumentConverter {
    async fn convert(
        &self,
        markdown: &str,
        context_path: &str,
    ) -> Result<DocumentTree, RenderError> {
        let mut tree = self
            .renderer
            .render(markdown, context_path, self.pipeline.options())
            .await?;
        self.pipeline.apply(&mut tree).await;
        Ok(tree)
    }
}
