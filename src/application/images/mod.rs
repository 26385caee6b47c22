//! Image resolution: every image reference becomes self-contained data where possible.
//!
//! References are classified by origin, resolved concurrently and written back in one
//! pass. A reference that cannot be resolved keeps its original `src`.

pub mod progress;
pub mod raster;

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::template::MERMAID_STYLESHEET;
use crate::domain::document::{DocumentTree, Namespace, NodeId};
use crate::domain::image::{
    ImageReference, OriginKind, VaultUriPrefix, classify_source, data_uri_mime, guess_mime_type,
};
use crate::domain::options::RenderOptions;
use crate::infra::fetch::{FetchError, ResourceFetcher};
use crate::infra::vault::{Vault, VaultError};

use self::progress::{ProgressSink, TracingProgress, all_with_progress};
use self::raster::{RasterError, data_uri, decode_data_uri, png_data_uri, svg_data_uri};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("`{path}` is not a vault file")]
    MissingFile { path: String },
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("rasterization task failed: {0}")]
    Task(String),
}

/// The parts of [`RenderOptions`] that govern image resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePolicy {
    pub convert_svg: bool,
    pub embed_external: bool,
    pub min_size: u32,
}

impl ImagePolicy {
    pub fn from_options(options: &RenderOptions) -> Self {
        Self {
            convert_svg: options.convert_svg_to_bitmap,
            embed_external: options.embed_external_links,
            min_size: options.image_min_size.get(),
        }
    }

    /// Whether a reference is resolved at all under this policy.
    pub fn wants(&self, reference: &ImageReference) -> bool {
        match &reference.origin {
            OriginKind::InlineData => reference.is_svg() && self.convert_svg,
            OriginKind::External(_) => self.embed_external,
            OriginKind::VaultLocal(_) | OriginKind::Other(_) => true,
        }
    }
}

/// Every `img[src]` below the root, classified against the vault's URI prefix.
pub fn collect_references(tree: &DocumentTree, prefix: &VaultUriPrefix) -> Vec<ImageReference> {
    let root = tree.root();
    tree.select(root, |el| el.is("img"))
        .into_iter()
        .filter_map(|node| {
            let source = tree.attr(node, "src").filter(|src| !src.is_empty())?;
            let origin = classify_source(source, prefix);
            let mime_type = match &origin {
                OriginKind::InlineData => data_uri_mime(source).map(str::to_string),
                OriginKind::VaultLocal(path) => Some(guess_mime_type(path)),
                OriginKind::External(_) | OriginKind::Other(_) => None,
            };
            Some(ImageReference {
                node,
                source: source.to_string(),
                origin,
                mime_type,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct ImageResolver {
    vault: Arc<dyn Vault>,
    fetcher: Arc<dyn ResourceFetcher>,
    progress: Arc<dyn ProgressSink>,
}

impl ImageResolver {
    pub fn new(vault: Arc<dyn Vault>, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            vault,
            fetcher,
            progress: Arc::new(TracingProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace image sources with data URIs according to `policy`.
    ///
    /// Returns the number of images whose source changed.
    pub async fn embed_images(&self, tree: &mut DocumentTree, policy: ImagePolicy) -> usize {
        let started = Instant::now();
        let references: Vec<ImageReference> = collect_references(tree, self.vault.uri_prefix())
            .into_iter()
            .filter(|reference| policy.wants(reference))
            .collect();
        let total = references.len();

        let tasks: Vec<_> = references
            .iter()
            .map(|reference| async move {
                match self.resolve(reference, policy).await {
                    Ok(uri) => Some(uri),
                    Err(err) => {
                        warn!(
                            target = "application::images",
                            op = "images::resolve",
                            result = "fallback",
                            source = %abbreviate(&reference.source),
                            error = %err,
                            "image left at its original source"
                        );
                        None
                    }
                }
            })
            .collect();
        let resolved = all_with_progress(tasks, self.progress.as_ref()).await;

        let mut replaced = 0;
        for (reference, uri) in references.iter().zip(resolved) {
            if let Some(uri) = uri {
                tree.set_attr(reference.node, "src", uri);
                replaced += 1;
            }
        }

        info!(
            target = "application::images",
            op = "images::embed",
            result = "ok",
            total,
            replaced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "images embedded"
        );
        replaced
    }

    async fn resolve(
        &self,
        reference: &ImageReference,
        policy: ImagePolicy,
    ) -> Result<String, ImageError> {
        match &reference.origin {
            OriginKind::InlineData => {
                let bytes = decode_data_uri(&reference.source)?;
                rasterize_to_uri(bytes, policy.min_size).await
            }
            OriginKind::VaultLocal(path) => {
                let file = self
                    .vault
                    .file(path)
                    .ok_or_else(|| ImageError::MissingFile { path: path.clone() })?;
                let bytes = self.vault.read_binary(&file).await?;
                if reference.is_svg() && policy.convert_svg {
                    rasterize_to_uri(bytes.to_vec(), policy.min_size).await
                } else {
                    let mime = reference
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| guess_mime_type(path));
                    Ok(data_uri(&mime, &bytes))
                }
            }
            OriginKind::External(url) | OriginKind::Other(url) => {
                let bytes = self.fetcher.fetch(url).await?;
                rasterize_to_uri(bytes.to_vec(), policy.min_size).await
            }
        }
    }

    /// Replace every outermost inline `<svg>` with an `<img>` holding its rasterized form.
    ///
    /// The diagram stylesheet is injected first so the drawing renders the same anywhere.
    /// When rasterization fails the image carries the SVG itself as a data URI.
    pub async fn render_svgs(&self, tree: &mut DocumentTree, policy: ImagePolicy) -> usize {
        if !policy.convert_svg {
            return 0;
        }
        let started = Instant::now();
        let root = tree.root();
        let svgs: Vec<NodeId> = tree
            .select(root, |el| el.is("svg"))
            .into_iter()
            .filter(|svg| {
                !tree
                    .ancestors(*svg)
                    .any(|ancestor| tree.is_element(ancestor, "svg"))
            })
            .collect();

        let documents: Vec<(NodeId, String)> = svgs
            .into_iter()
            .map(|svg| {
                inject_stylesheet(tree, svg);
                (svg, svg_data_uri(&tree.to_xml(svg)))
            })
            .collect();

        let tasks: Vec<_> = documents
            .iter()
            .map(|(_, svg_uri)| async move {
                let bytes = decode_data_uri(svg_uri).map_err(ImageError::from);
                let rasterized = match bytes {
                    Ok(bytes) => rasterize_to_uri(bytes, policy.min_size).await,
                    Err(err) => Err(err),
                };
                rasterized.unwrap_or_else(|err| {
                    debug!(
                        target = "application::images",
                        op = "images::svg",
                        result = "fallback",
                        error = %err,
                        "inline SVG kept as vector data"
                    );
                    svg_uri.clone()
                })
            })
            .collect();
        let uris = all_with_progress(tasks, self.progress.as_ref()).await;

        let mut replaced = 0;
        for ((svg, _), uri) in documents.iter().zip(uris) {
            let img = tree.create_element("img");
            if let Some(style) = tree.attr(*svg, "style").map(str::to_string) {
                tree.set_attr(img, "style", style);
            }
            tree.set_attr(img, "src", uri);
            if tree.replace(*svg, img) {
                replaced += 1;
            }
        }

        info!(
            target = "application::images",
            op = "images::svg",
            result = "ok",
            replaced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inline SVG rasterized"
        );
        replaced
    }
}

fn inject_stylesheet(tree: &mut DocumentTree, svg: NodeId) {
    let style = match tree.select_first(svg, |el| el.is("style")) {
        Some(style) => style,
        None => {
            let style = tree.create_element_ns("style", Namespace::Svg);
            tree.append_child(svg, style);
            style
        }
    };
    let css = tree.create_text(MERMAID_STYLESHEET);
    tree.append_child(style, css);
}

async fn rasterize_to_uri(bytes: Vec<u8>, min_size: u32) -> Result<String, ImageError> {
    let png = tokio::task::spawn_blocking(move || raster::rasterize(&bytes, min_size))
        .await
        .map_err(|err| ImageError::Task(err.to_string()))??;
    Ok(png_data_uri(&png))
}

fn abbreviate(source: &str) -> &str {
    match source.char_indices().nth(80) {
        Some((index, _)) => &source[..index],
        None => source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::vault::FsVault;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::num::NonZeroU32;
    use tempfile::TempDir;

    const RED_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10" fill="red"/></svg>"#;

    struct NoNetwork;

    #[async_trait]
    impl ResourceFetcher for NoNetwork {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            Err(FetchError::UnsupportedScheme {
                scheme: url.split(':').next().unwrap_or_default().to_string(),
            })
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 128, 255, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .expect("encode");
        out
    }

    fn vault(files: &[(&str, &[u8])]) -> (TempDir, Arc<FsVault>) {
        let dir = TempDir::new().expect("temp dir");
        for (path, bytes) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(full, bytes).expect("write");
        }
        let vault = FsVault::open(dir.path(), "Vault").expect("vault");
        (dir, Arc::new(vault))
    }

    fn policy(min_size: u32) -> ImagePolicy {
        ImagePolicy::from_options(&RenderOptions {
            image_min_size: NonZeroU32::new(min_size).expect("non-zero"),
            ..RenderOptions::default()
        })
    }

    fn decode_src(tree: &DocumentTree, img: NodeId) -> image::DynamicImage {
        let src = tree.attr(img, "src").expect("src");
        assert!(src.starts_with("data:image/png;base64,"), "{src}");
        image::load_from_memory(&decode_data_uri(src).expect("data")).expect("png")
    }

    #[tokio::test]
    async fn vault_images_become_data_uris() {
        let source = png(4, 4);
        let (_dir, vault) = vault(&[("pics/dot.png", &source)]);
        let uri = vault.uri_prefix().uri_for("pics/dot.png");
        let mut tree = DocumentTree::from_fragment("div", &format!(r#"<img src="{uri}?1700">"#));
        let resolver = ImageResolver::new(vault, Arc::new(NoNetwork));

        assert_eq!(resolver.embed_images(&mut tree, policy(1080)).await, 1);
        let img = tree.select_first(tree.root(), |el| el.is("img")).expect("img");
        let src = tree.attr(img, "src").expect("src");
        assert_eq!(src, data_uri("image/png", &source));
    }

    #[tokio::test]
    async fn vault_svg_is_rasterized_to_the_floor() {
        let (_dir, vault) = vault(&[("d.svg", RED_SVG.as_bytes())]);
        let uri = vault.uri_prefix().uri_for("d.svg");
        let mut tree = DocumentTree::from_fragment("div", &format!(r#"<img src="{uri}">"#));
        let resolver = ImageResolver::new(vault, Arc::new(NoNetwork));

        resolver.embed_images(&mut tree, policy(40)).await;
        let img = tree.select_first(tree.root(), |el| el.is("img")).expect("img");
        let decoded = decode_src(&tree, img);
        assert_eq!((decoded.width(), decoded.height()), (40, 40));
    }

    #[tokio::test]
    async fn external_and_failing_images_keep_their_source() {
        let (_dir, vault) = vault(&[]);
        let html = concat!(
            r#"<img src="https://example.com/a.png">"#,
            r#"<img src="file:///nowhere/b.png">"#,
            r#"<img src="data:image/png;base64,AAAA">"#,
        );
        let mut tree = DocumentTree::from_fragment("div", html);
        let resolver = ImageResolver::new(vault, Arc::new(NoNetwork));

        assert_eq!(resolver.embed_images(&mut tree, policy(1080)).await, 0);
        assert_eq!(tree.inner_html(tree.root()), html);
    }

    #[tokio::test]
    async fn oversized_rasters_keep_their_source() {
        let (_dir, vault) = vault(&[]);
        let thin = svg_data_uri(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="20000"><rect width="1" height="20000"/></svg>"#,
        );
        let html = format!(r#"<img src="{thin}">"#);
        let mut tree = DocumentTree::from_fragment("div", &html);
        let resolver = ImageResolver::new(vault, Arc::new(NoNetwork));

        assert_eq!(resolver.embed_images(&mut tree, policy(1080)).await, 0);
        let img = tree.select_first(tree.root(), |el| el.is("img")).expect("img");
        assert_eq!(tree.attr(img, "src"), Some(thin.as_str()));
    }

    #[tokio::test]
    async fn inline_svgs_are_replaced_by_images() {
        let (_dir, vault) = vault(&[]);
        let mut tree = DocumentTree::from_fragment(
            "div",
            &format!(r#"<p>before</p><div class="mermaid">{RED_SVG}</div>"#),
        );
        let root = tree.root();
        let svg = tree.select_first(root, |el| el.is("svg")).expect("svg");
        tree.set_attr(svg, "style", "max-width: 10px;");
        let resolver = ImageResolver::new(vault, Arc::new(NoNetwork));

        assert_eq!(resolver.render_svgs(&mut tree, policy(20)).await, 1);
        assert!(tree.select_first(root, |el| el.is("svg")).is_none());
        let img = tree.select_first(root, |el| el.is("img")).expect("img");
        assert_eq!(tree.attr(img, "style"), Some("max-width: 10px;"));
        let decoded = decode_src(&tree, img);
        assert_eq!((decoded.width(), decoded.height()), (20, 20));
    }

    #[tokio::test]
    async fn svg_conversion_can_be_disabled() {
        let (_dir, vault) = vault(&[]);
        let mut tree = DocumentTree::from_fragment("div", RED_SVG);
        let resolver = ImageResolver::new(vault, Arc::new(NoNetwork));
        let policy = ImagePolicy {
            convert_svg: false,
            ..policy(20)
        };
        assert_eq!(resolver.render_svgs(&mut tree, policy).await, 0);
        assert!(tree.select_first(tree.root(), |el| el.is("svg")).is_some());
    }
}
