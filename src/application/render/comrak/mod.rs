//! Markdown renderer built on comrak that emits the live-view document shape.
//!
//! Rendering happens in three steps: wiki-link expansion over the source text, comrak
//! HTML generation with front matter kept as a block, and lol_html shaping. The result
//! is split into top-level blocks which are post-processed and appended to the
//! destination container one at a time from a background task, bracketed by the
//! request's block hooks.

mod blocks;
mod shaping;
mod sheets;
mod wikilinks;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use comrak::options::Options;
use comrak::{Arena, format_html, parse_document};
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use crate::domain::document::{DocumentTree, NodeData, NodeId};
use crate::infra::vault::Vault;

use super::components::RenderLifecycle;
use super::markdown::{MarkdownRenderer, MarkdownRequest, RenderError, RenderHandle};
use super::mermaid::MermaidRenderer;
use super::state::BlockHooks;

use self::sheets::SheetElement;

pub struct ComrakRenderer {
    options: Options<'static>,
    vault: Arc<dyn Vault>,
    mermaid: Option<MermaidRenderer>,
}

impl ComrakRenderer {
    pub fn new(vault: Arc<dyn Vault>, mermaid: Option<MermaidRenderer>) -> Self {
        Self {
            options: default_options(),
            vault,
            mermaid,
        }
    }

    /// Full HTML for `source` before it is split into blocks.
    pub fn to_html(&self, source: &str, context_path: &str) -> Result<String, RenderError> {
        let expanded = wikilinks::expand(source, self.vault.as_ref(), context_path);
        let arena = Arena::new();
        let root = parse_document(&arena, &expanded, &self.options);
        keep_front_matter(root);

        let mut html = String::new();
        format_html(root, &self.options, &mut html).map_err(|err| RenderError::Markdown {
            message: err.to_string(),
        })?;
        shaping::shape(&html, self.vault.as_ref(), context_path)
    }
}

#[async_trait]
impl MarkdownRenderer for ComrakRenderer {
    async fn render(&self, request: MarkdownRequest) -> Result<RenderHandle, RenderError> {
        let started = Instant::now();
        let html = self.to_html(&request.source, &request.context_path)?;
        let blocks = split_blocks(&DocumentTree::from_fragment("div", &html));
        debug!(
            target = "application::render::comrak",
            op = "comrak::render",
            blocks = blocks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "markdown converted; scheduling blocks"
        );
        if blocks.is_empty() {
            return Ok(RenderHandle::without_signal());
        }

        let MarkdownRequest {
            container,
            hooks,
            lifecycle,
            ..
        } = request;
        let (done, completion) = oneshot::channel();
        hooks.on_block_enter();
        tokio::spawn(run_blocks(
            blocks,
            container,
            hooks,
            lifecycle,
            self.mermaid.clone(),
            done,
        ));
        Ok(RenderHandle::with_signal(completion))
    }
}

async fn run_blocks(
    pending: Vec<DocumentTree>,
    container: Arc<Mutex<DocumentTree>>,
    hooks: Arc<dyn BlockHooks>,
    lifecycle: Arc<RenderLifecycle>,
    mermaid: Option<MermaidRenderer>,
    done: oneshot::Sender<()>,
) {
    for (index, mut block) in pending.into_iter().enumerate() {
        if index > 0 {
            hooks.on_block_enter();
        }
        blocks::post_process(&mut block, mermaid.as_ref()).await;

        let tables = {
            let mut tree = container.lock().await;
            graft(&mut tree, &block)
        };
        for table in tables {
            lifecycle.add_child(Arc::new(SheetElement::new(Arc::clone(&container), table)));
        }

        hooks.on_block_leave();
        tokio::task::yield_now().await;
    }
    let _ = done.send(());
}

/// Append the block's nodes to the container; returns the tables that landed there.
fn graft(container: &mut DocumentTree, block: &DocumentTree) -> Vec<NodeId> {
    let root = container.root();
    let mut tables = Vec::new();
    for child in block.children(block.root()) {
        let copy = container.import_subtree(block, *child);
        container.append_child(root, copy);
        if container.is_element(copy, "table") {
            tables.push(copy);
        }
        tables.extend(container.select(copy, |el| el.is("table")));
    }
    tables
}

/// One tree per top-level node; whitespace between blocks is dropped.
fn split_blocks(staged: &DocumentTree) -> Vec<DocumentTree> {
    staged
        .children(staged.root())
        .iter()
        .filter(|child| match staged.data(**child) {
            NodeData::Element(_) => true,
            NodeData::Text(text) => !text.trim().is_empty(),
            NodeData::Comment(_) => false,
        })
        .map(|child| {
            let mut block = DocumentTree::new("div");
            let copy = block.import_subtree(staged, *child);
            let root = block.root();
            block.append_child(root, copy);
            block
        })
        .collect()
}

/// Turn the front-matter node into a visible YAML block.
fn keep_front_matter<'a>(root: &'a AstNode<'a>) {
    for node in root.children() {
        let yaml = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::FrontMatter(raw) => Some(front_matter_body(raw)),
                _ => None,
            }
        };
        if let Some(yaml) = yaml {
            let mut data = node.data.borrow_mut();
            data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                block_type: 0,
                literal: format!(
                    "<pre class=\"frontmatter language-yaml\"><code class=\"language-yaml\">{}</code></pre>\n",
                    escape(&yaml)
                ),
            });
        }
    }
}

fn front_matter_body(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.trim_end().lines().collect();
    if lines.first().is_some_and(|line| line.trim() == "---") {
        lines.remove(0);
    }
    if lines.last().is_some_and(|line| line.trim() == "---") {
        lines.pop();
    }
    lines.join("\n")
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.front_matter_delimiter = Some("---".to_string());

    let render = &mut options.render;
    render.github_pre_lang = false;
    render.tasklist_classes = true;
    render.r#unsafe = true;
    render.sourcepos = false;

    options
}

/// Escape text for use in HTML content and double-quoted attributes.
pub(super) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::state::RenderState;
    use crate::infra::vault::FsVault;
    use tempfile::TempDir;

    fn renderer() -> (TempDir, ComrakRenderer) {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("Other.md"), "# Other").expect("write");
        let vault = FsVault::open(dir.path(), "Vault").expect("vault");
        (dir, ComrakRenderer::new(Arc::new(vault), None))
    }

    #[test]
    fn front_matter_becomes_a_yaml_block() {
        let (_dir, renderer) = renderer();
        let html = renderer
            .to_html("---\ntitle: x\n---\n\nBody\n", "Note.md")
            .expect("html");
        assert!(
            html.contains(r#"<pre class="frontmatter language-yaml"><code class="language-yaml">title: x</code>"#),
            "{html}"
        );
        assert!(html.contains("<p>Body</p>"));
    }

    #[test]
    fn footnotes_get_link_classes() {
        let (_dir, renderer) = renderer();
        let html = renderer
            .to_html("Text[^1].\n\n[^1]: Note.\n", "Note.md")
            .expect("html");
        assert!(html.contains("footnote-link"), "{html}");
        assert!(html.contains("↩︎"), "{html}");
        assert!(html.contains(r#"class="footnotes""#), "{html}");
    }

    #[tokio::test]
    async fn blocks_land_in_the_container_between_hooks() {
        let (_dir, renderer) = renderer();
        let container = Arc::new(Mutex::new(DocumentTree::new("div")));
        let state = Arc::new(RenderState::new());
        let lifecycle = Arc::new(RenderLifecycle::new());

        let handle = renderer
            .render(MarkdownRequest {
                source: "# Title\n\nSee [[Other]].\n\n| a | b |\n|---|---|\n| 1 | < |\n".to_string(),
                context_path: "Note.md".to_string(),
                container: Arc::clone(&container),
                hooks: state.clone(),
                lifecycle: Arc::clone(&lifecycle),
            })
            .await
            .expect("rendered");
        assert!(state.is_processing(), "first block entered before returning");

        handle
            .completion
            .expect("signal")
            .await
            .expect("completed");
        assert!(!state.is_processing());
        assert!(state.last_block_finished_at().is_some());

        let tree = container.lock().await;
        let html = tree.inner_html(tree.root());
        assert!(html.contains("<h1>"), "{html}");
        assert!(html.contains(r#"class="internal-link""#), "{html}");
        assert_eq!(lifecycle.children().len(), 1);
    }

    #[tokio::test]
    async fn empty_documents_render_no_blocks() {
        let (_dir, renderer) = renderer();
        let state = Arc::new(RenderState::new());
        let handle = renderer
            .render(MarkdownRequest {
                source: "   \n".to_string(),
                context_path: "Note.md".to_string(),
                container: Arc::new(Mutex::new(DocumentTree::new("div"))),
                hooks: state.clone(),
                lifecycle: Arc::new(RenderLifecycle::new()),
            })
            .await
            .expect("rendered");
        assert!(handle.completion.is_none());
        assert!(!state.is_processing());
        assert!(state.last_block_finished_at().is_none());
    }
}
