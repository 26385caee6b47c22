//! One full render of a note into a detached working copy.

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::RenderSettings;
use crate::domain::document::DocumentTree;
use crate::domain::options::{RenderOptions, SettleStrategy};

use super::components::{ComponentAllowList, RenderLifecycle};
use super::markdown::{MarkdownRenderer, MarkdownRequest, RenderError};
use super::settle::{SettleTiming, await_completion};
use super::state::RenderState;

/// Inline style of the off-screen container the renderer writes into.
pub const CONTAINER_STYLE: &str = "display: hidden";

static DATAVIEW_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[^ \t:#`<>][^:#`<>]+::.*$").expect("dataview line pattern is valid")
});

/// Blank out inline `key:: value` metadata lines.
pub fn strip_dataview_lines(markdown: &str) -> String {
    DATAVIEW_LINE.replace_all(markdown, "").into_owned()
}

pub struct DocumentRenderer {
    renderer: Arc<dyn MarkdownRenderer>,
    timing: SettleTiming,
    strategy: SettleStrategy,
    components: ComponentAllowList,
}

impl DocumentRenderer {
    pub fn new(
        renderer: Arc<dyn MarkdownRenderer>,
        timing: SettleTiming,
        strategy: SettleStrategy,
    ) -> Self {
        Self {
            renderer,
            timing,
            strategy,
            components: ComponentAllowList::default(),
        }
    }

    pub fn from_settings(renderer: Arc<dyn MarkdownRenderer>, settings: &RenderSettings) -> Self {
        let timing = SettleTiming {
            poll_interval: settings.settle_poll,
            settling_window: settings.settle_window,
        };
        Self::new(renderer, timing, settings.settle_strategy)
    }

    pub fn with_components(mut self, components: ComponentAllowList) -> Self {
        self.components = components;
        self
    }

    /// Render `markdown`, wait for it to settle, load components and return a copy of
    /// the container.
    pub async fn render(
        &self,
        markdown: &str,
        context_path: &str,
        options: &RenderOptions,
    ) -> Result<DocumentTree, RenderError> {
        let started = Instant::now();
        let source = if options.remove_dataview_metadata_lines {
            strip_dataview_lines(markdown)
        } else {
            markdown.to_string()
        };

        let mut container = DocumentTree::new("div");
        let root = container.root();
        container.set_attr(root, "style", CONTAINER_STYLE);
        let container = Arc::new(Mutex::new(container));
        let state = Arc::new(RenderState::new());
        let lifecycle = Arc::new(RenderLifecycle::new());

        let handle = self
            .renderer
            .render(MarkdownRequest {
                source,
                context_path: context_path.to_string(),
                container: Arc::clone(&container),
                hooks: state.clone(),
                lifecycle: Arc::clone(&lifecycle),
            })
            .await?;

        let settled =
            await_completion(&state, self.timing, self.strategy, handle.completion).await;
        let summary = lifecycle.load_components(&self.components).await;

        let working_copy = container.lock().await.clone();
        info!(
            target = "application::render::document",
            op = "document::render",
            result = "ok",
            settled = ?settled,
            components_loaded = summary.loaded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            context_path,
            "document rendered"
        );
        Ok(working_copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::markdown::RenderHandle;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Appends one paragraph per line from a background task.
    struct LineRenderer;

    #[async_trait]
    impl MarkdownRenderer for LineRenderer {
        async fn render(&self, request: MarkdownRequest) -> Result<RenderHandle, RenderError> {
            let lines: Vec<String> = request
                .source
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect();
            if lines.is_empty() {
                return Ok(RenderHandle::without_signal());
            }
            request.hooks.on_block_enter();
            tokio::spawn(async move {
                for (index, line) in lines.into_iter().enumerate() {
                    if index > 0 {
                        request.hooks.on_block_enter();
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    {
                        let mut tree = request.container.lock().await;
                        let root = tree.root();
                        tree.append_html(root, &format!("<p>{line}</p>"));
                    }
                    request.hooks.on_block_leave();
                }
            });
            Ok(RenderHandle::without_signal())
        }
    }

    #[test]
    fn dataview_lines_are_blanked() {
        let stripped = strip_dataview_lines("status:: draft\nBody text\n# Heading:: kept\n");
        assert_eq!(stripped, "\nBody text\n# Heading:: kept\n");
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_late_blocks_before_copying() {
        let renderer = DocumentRenderer::new(
            Arc::new(LineRenderer),
            SettleTiming::default(),
            SettleStrategy::HeuristicOnly,
        );
        let tree = renderer
            .render("one\n\ntwo\n\nthree", "Note.md", &RenderOptions::default())
            .await
            .expect("rendered");
        let root = tree.root();
        assert_eq!(tree.attr(root, "style"), Some(CONTAINER_STYLE));
        assert_eq!(tree.inner_html(root), "<p>one</p><p>two</p><p>three</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn dataview_option_applies_before_rendering() {
        let renderer = DocumentRenderer::new(
            Arc::new(LineRenderer),
            SettleTiming::default(),
            SettleStrategy::HeuristicOnly,
        );
        let options = RenderOptions {
            remove_dataview_metadata_lines: true,
            ..RenderOptions::default()
        };
        let tree = renderer
            .render("rating:: 5\nvisible", "Note.md", &options)
            .await
            .expect("rendered");
        assert_eq!(tree.inner_html(tree.root()), "<p>visible</p>");
    }
}
