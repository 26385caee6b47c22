//! Ordered rewrites applied to the working copy of a rendered document.
//!
//! Stages run strictly in sequence; later stages rely on the shape left by earlier ones
//! (callout tables, for instance, expect links to have been rewritten already).

pub mod cleanup;
pub mod footnotes;
pub mod links;
pub mod tables;

use std::time::Instant;

use tracing::{debug, info};

use crate::application::images::{ImagePolicy, ImageResolver};
use crate::domain::document::DocumentTree;
use crate::domain::options::RenderOptions;

use self::links::HostLinks;

pub struct TransformPipeline {
    options: RenderOptions,
    links: HostLinks,
    images: ImageResolver,
}

impl TransformPipeline {
    pub fn new(options: RenderOptions, links: HostLinks, images: ImageResolver) -> Self {
        Self {
            options,
            links,
            images,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Structural stages, everything except image resolution.
    pub fn apply_structural(&self, tree: &mut DocumentTree) {
        let options = &self.options;

        cleanup::strip_root_style(tree);
        if options.remove_front_matter {
            cleanup::remove_front_matter(tree);
        }
        links::rewrite_links(tree, options.internal_link_handling, &self.links);
        cleanup::disable_checkboxes(tree);
        cleanup::remove_collapse_indicators(tree);
        cleanup::remove_buttons(tree);
        cleanup::remove_third_party_decorations(tree);
        if options.format_code_with_tables {
            tables::code_blocks_to_tables(tree);
        }
        if options.format_callouts_with_tables {
            tables::callouts_to_tables(tree);
        }
        footnotes::handle_footnotes(tree, options.footnote_handling);

        debug!(
            target = "application::transform",
            op = "transform::structural",
            result = "ok",
            links = %options.internal_link_handling,
            footnotes = %options.footnote_handling,
            "structural stages applied"
        );
    }

    /// Every stage, ending with image resolution unless embedding is disabled.
    pub async fn apply(&self, tree: &mut DocumentTree) {
        let started = Instant::now();
        self.apply_structural(tree);

        let mut embedded = 0;
        if !self.options.disable_image_embedding {
            let policy = ImagePolicy::from_options(&self.options);
            embedded += self.images.embed_images(tree, policy).await;
            embedded += self.images.render_svgs(tree, policy).await;
        }

        info!(
            target = "application::transform",
            op = "transform::apply",
            result = "ok",
            embedded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document transformed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::{FootnoteHandling, InternalLinkHandling};
    use crate::infra::fetch::HttpFetcher;
    use crate::infra::vault::FsVault;
    use std::sync::Arc;
    use std::time::Duration;

    const RENDERED: &str = concat!(
        r#"<pre class="frontmatter language-yaml"><code class="language-yaml">a: 1</code></pre>"#,
        r#"<h1><span class="heading-collapse-indicator collapse-indicator collapse-icon"></span>Title</h1>"#,
        r#"<p>See <a data-href="Other" href="Other" class="internal-link">Other</a>"#,
        r##"<sup class="footnote-ref"><a href="#fn-1" class="footnote-link">1</a></sup></p>"##,
        r#"<pre><code>let x = 1;"#,
        "\n",
        r#"</code><button class="copy-code-button">Copy</button></pre>"#,
        r#"<div class="callout" data-callout="note"><div class="callout-title"><div class="callout-title-inner">Note</div></div>"#,
        r#"<div class="callout-content"><p>Body</p></div></div>"#,
        r##"<section class="footnotes"><ol><li><p>Foot <a href="#fnref-1" class="footnote-backref footnote-link">↩︎</a></p></li></ol></section>"##,
    );

    fn pipeline(options: RenderOptions) -> (tempfile::TempDir, TransformPipeline) {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let vault = FsVault::open(dir.path(), "Vault").expect("vault");
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).expect("client");
        let images = ImageResolver::new(Arc::new(vault), Arc::new(fetcher));
        let pipeline = TransformPipeline::new(options, HostLinks::for_vault("Vault"), images);
        (dir, pipeline)
    }

    fn rendered() -> DocumentTree {
        let mut tree = DocumentTree::from_fragment("div", RENDERED);
        let root = tree.root();
        tree.set_attr(root, "style", "display: hidden");
        tree
    }

    #[tokio::test]
    async fn stages_run_in_order_with_table_formatting() {
        let (_dir, pipeline) = pipeline(RenderOptions {
            format_code_with_tables: true,
            format_callouts_with_tables: true,
            footnote_handling: FootnoteHandling::RemoveAll,
            internal_link_handling: InternalLinkHandling::ToText,
            ..RenderOptions::default()
        });
        let mut tree = rendered();
        pipeline.apply(&mut tree).await;

        assert_eq!(
            tree.outer_html(tree.root()),
            concat!(
                "<div>",
                "<h1>Title</h1>",
                r#"<p>See <span class="internal-link">Other</span></p>"#,
                r#"<table class="source-table"><tbody><tr><td><pre>let x = 1;</pre></td></tr></tbody></table>"#,
                r#"<table class="callout-table callout" data-callout="note">"#,
                r#"<tr><td class="callout-title"><span>Note</span></td></tr>"#,
                r#"<tr><td><p>Body</p></td></tr></table>"#,
                "</div>",
            )
        );
    }

    #[tokio::test]
    async fn running_twice_is_a_no_op() {
        let (_dir, pipeline) = pipeline(RenderOptions {
            format_code_with_tables: true,
            format_callouts_with_tables: true,
            ..RenderOptions::default()
        });
        let mut tree = rendered();
        pipeline.apply(&mut tree).await;
        let once = tree.outer_html(tree.root());
        pipeline.apply(&mut tree).await;
        assert_eq!(tree.outer_html(tree.root()), once);
    }

    #[test]
    fn front_matter_can_be_kept() {
        let (_dir, pipeline) = pipeline(RenderOptions {
            remove_front_matter: false,
            ..RenderOptions::default()
        });
        let mut tree = rendered();
        pipeline.apply_structural(&mut tree);
        assert!(tree.outer_html(tree.root()).contains("frontmatter"));
    }
}
