//! Wiki-link embeds found in raw note text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::document::{DocumentTree, NodeId};
use crate::infra::vault::VaultFile;

static EMBED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!?\[\[([^|\]]+)(?:\|([^\]]+))?\]\]").expect("embed pattern is valid")
});

const BLOCK_ANCHOR: &str = "#^";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedMatch {
    /// The matched text, exactly as written in the note.
    pub full_link: String,
    /// Link target, possibly carrying a `#^block` anchor.
    pub target: String,
    /// Text after the pipe (size or alias).
    pub modifier: Option<String>,
}

impl EmbedMatch {
    pub fn has_block_anchor(&self) -> bool {
        self.target.contains(BLOCK_ANCHOR)
    }

    /// Target with any block anchor removed; this is what gets resolved in the vault.
    pub fn link_path(&self) -> &str {
        self.target
            .split(BLOCK_ANCHOR)
            .next()
            .unwrap_or(&self.target)
    }

    /// Final `/` or `\` segment of [`Self::link_path`].
    pub fn base_name(&self) -> &str {
        let path = self.link_path();
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }

    /// Whether the upload needs a raster re-encode of the rendered image.
    pub fn needs_raster(&self) -> bool {
        self.target.contains(".svg") || self.target.contains("excalidraw.md")
    }
}

/// Every embed in `markdown`, in source order.
pub fn find_embeds(markdown: &str) -> Vec<EmbedMatch> {
    EMBED
        .captures_iter(markdown)
        .filter_map(|caps| {
            Some(EmbedMatch {
                full_link: caps.get(0)?.as_str().to_string(),
                target: caps.get(1)?.as_str().to_string(),
                modifier: caps.get(2).map(|m| m.as_str().to_string()),
            })
        })
        .collect()
}

/// First rendered `img` drawn from `file`: its `filesource` names the file, or its `alt`
/// mentions the full file name, extension included.
pub fn find_rendered_image(tree: &DocumentTree, file: &VaultFile) -> Option<NodeId> {
    let name = file.name();
    let root = tree.root();
    tree.select_first(root, |el| {
        el.is("img")
            && (el
                .attr("filesource")
                .is_some_and(|source| names_file(source, file))
                || el.attr("alt").is_some_and(|alt| alt.contains(name)))
    })
}

fn names_file(source: &str, file: &VaultFile) -> bool {
    let source = source.replace('\\', "/");
    source == file.path()
        || source == file.name()
        || source.ends_with(&format!("/{}", file.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_embeds_and_plain_links() {
        let embeds = find_embeds("a ![[img/cat.png|300]] b [[Note#^abc|100]] c ![[x.svg]]");
        assert_eq!(embeds.len(), 3);
        assert_eq!(embeds[0].full_link, "![[img/cat.png|300]]");
        assert_eq!(embeds[0].base_name(), "cat.png");
        assert_eq!(embeds[0].modifier.as_deref(), Some("300"));

        assert_eq!(embeds[1].full_link, "[[Note#^abc|100]]");
        assert!(embeds[1].has_block_anchor());
        assert_eq!(embeds[1].link_path(), "Note");
        assert_eq!(embeds[1].base_name(), "Note");

        assert!(embeds[2].needs_raster());
        assert!(!embeds[0].needs_raster());
    }

    #[test]
    fn windows_separators_split_base_names() {
        let embeds = find_embeds(r"![[draw\sketch.excalidraw.md]]");
        assert_eq!(embeds[0].base_name(), "sketch.excalidraw.md");
        assert!(embeds[0].needs_raster());
    }

    #[test]
    fn matches_rendered_images_by_filesource_then_alt() {
        let tree = DocumentTree::from_fragment(
            "div",
            concat!(
                r#"<img alt="other.png" src="a">"#,
                r#"<img filesource="draw/sketch.excalidraw.md" alt="x" src="b">"#,
                r#"<img alt="cat.png" src="c">"#,
            ),
        );
        let sketch = find_rendered_image(&tree, &VaultFile::new("draw/sketch.excalidraw.md"))
            .expect("sketch");
        assert_eq!(tree.attr(sketch, "src"), Some("b"));
        let cat = find_rendered_image(&tree, &VaultFile::new("img/cat.png")).expect("cat");
        assert_eq!(tree.attr(cat, "src"), Some("c"));
        assert!(find_rendered_image(&tree, &VaultFile::new("dog.png")).is_none());
    }

    #[test]
    fn plain_note_links_never_claim_an_image() {
        let tree = DocumentTree::from_fragment("div", r#"<img alt="cat.png" src="c">"#);
        let embeds = find_embeds("see [[cat]]");
        assert_eq!(embeds[0].base_name(), "cat");
        assert!(find_rendered_image(&tree, &VaultFile::new("notes/cat.md")).is_none());
    }
}
