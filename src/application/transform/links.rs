//! Rewriting of internal links and tags for use outside the vault.

use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;

use crate::domain::document::{DocumentTree, NodeId};
use crate::domain::options::InternalLinkHandling;

pub const INTERNAL_LINK_CLASS: &str = "internal-link";
pub const TAG_CLASS: &str = "tag";

const HOST_SCHEME: &str = "obsidian://";

/// The characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static MARKDOWN_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)(?:\.md)?(#.*?)?$").expect("markdown target pattern is valid")
});

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Deep-link URIs into the host application for one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLinks {
    open_uri: String,
    search_uri: String,
}

impl HostLinks {
    pub fn for_vault(name: &str) -> Self {
        let vault = encode_uri_component(name);
        Self {
            open_uri: format!("{HOST_SCHEME}open?vault={vault}"),
            search_uri: format!("{HOST_SCHEME}search?vault={vault}"),
        }
    }

    pub fn open_file(&self, path: &str) -> String {
        format!("{}&file={}", self.open_uri, encode_uri_component(path))
    }

    pub fn search_tag(&self, tag: &str) -> String {
        format!("{}&query=tag:{}", self.search_uri, encode_uri_component(tag))
    }
}

/// Rewrite every `a.internal-link` and `a.tag` according to `mode`.
pub fn rewrite_links(tree: &mut DocumentTree, mode: InternalLinkHandling, host: &HostLinks) {
    if mode == InternalLinkHandling::AsIs {
        return;
    }
    rewrite_class(tree, INTERNAL_LINK_CLASS, mode, host);
    rewrite_class(tree, TAG_CLASS, mode, host);
}

fn rewrite_class(
    tree: &mut DocumentTree,
    class: &str,
    mode: InternalLinkHandling,
    host: &HostLinks,
) {
    let root = tree.root();
    let links = tree.select(root, |el| el.is("a") && el.has_class(class));
    for link in links {
        let text = tree.text_content(link);
        let href = link_target(tree, link);
        let replacement = match mode {
            InternalLinkHandling::AsIs => continue,
            InternalLinkHandling::ToText => {
                let span = tree.create_element("span");
                tree.set_text_content(span, text);
                span
            }
            InternalLinkHandling::ToHostUri => {
                if href.starts_with(HOST_SCHEME) {
                    continue;
                }
                let target = if class == TAG_CLASS {
                    host.search_tag(&href)
                } else if href.starts_with('#') {
                    href.clone()
                } else {
                    host.open_file(&href)
                };
                anchor(tree, &text, &target)
            }
            InternalLinkHandling::ToHtmlExtension => {
                if already_html(&href) {
                    continue;
                }
                let target = if href.starts_with('#') {
                    href.clone()
                } else {
                    MARKDOWN_TARGET.replace(&href, "$1.html$2").into_owned()
                };
                anchor(tree, &href, &target)
            }
        };
        tree.set_attr(replacement, "class", class);
        tree.replace(link, replacement);
    }
}

fn link_target(tree: &DocumentTree, link: NodeId) -> String {
    tree.attr(link, "href")
        .or_else(|| tree.attr(link, "data-href"))
        .unwrap_or_default()
        .to_string()
}

fn anchor(tree: &mut DocumentTree, text: &str, href: &str) -> NodeId {
    let a = tree.create_element("a");
    tree.set_attr(a, "href", href);
    tree.set_text_content(a, text);
    a
}

fn already_html(href: &str) -> bool {
    let path = href.split('#').next().unwrap_or(href);
    path.to_ascii_lowercase().ends_with(".html")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = concat!(
        r#"<p><a class="internal-link" data-href="Folder/My Note.md#Part" href="Folder/My Note.md#Part">shown</a>"#,
        r##" <a class="internal-link" href="#Local">here</a>"##,
        r##" <a class="tag" href="#work/alpha">#work/alpha</a></p>"##,
    );

    fn rewrite(mode: InternalLinkHandling) -> String {
        let mut tree = DocumentTree::from_fragment("div", DOC);
        rewrite_links(&mut tree, mode, &HostLinks::for_vault("My Vault"));
        tree.inner_html(tree.root())
    }

    #[test]
    fn to_text_keeps_visible_text_and_class() {
        assert_eq!(
            rewrite(InternalLinkHandling::ToText),
            concat!(
                r#"<p><span class="internal-link">shown</span>"#,
                r#" <span class="internal-link">here</span>"#,
                r#" <span class="tag">#work/alpha</span></p>"#,
            )
        );
    }

    #[test]
    fn to_host_uri_builds_deep_links() {
        let html = rewrite(InternalLinkHandling::ToHostUri);
        assert!(html.contains(
            r#"<a href="obsidian://open?vault=My%20Vault&amp;file=Folder%2FMy%20Note.md%23Part" class="internal-link">shown</a>"#
        ), "{html}");
        assert!(html.contains(r##"<a href="#Local" class="internal-link">here</a>"##), "{html}");
        assert!(html.contains(
            r#"<a href="obsidian://search?vault=My%20Vault&amp;query=tag:%23work%2Falpha" class="tag">#work/alpha</a>"#
        ), "{html}");
    }

    #[test]
    fn to_html_extension_shows_the_target() {
        let html = rewrite(InternalLinkHandling::ToHtmlExtension);
        assert!(html.contains(
            r#"<a href="Folder/My Note.html#Part" class="internal-link">Folder/My Note.md#Part</a>"#
        ), "{html}");
        assert!(html.contains(r##"<a href="#Local" class="internal-link">#Local</a>"##), "{html}");
    }

    #[test]
    fn rewriting_twice_changes_nothing() {
        for mode in [
            InternalLinkHandling::ToText,
            InternalLinkHandling::ToHostUri,
            InternalLinkHandling::ToHtmlExtension,
            InternalLinkHandling::AsIs,
        ] {
            let mut tree = DocumentTree::from_fragment("div", DOC);
            let host = HostLinks::for_vault("V");
            rewrite_links(&mut tree, mode, &host);
            let once = tree.inner_html(tree.root());
            rewrite_links(&mut tree, mode, &host);
            assert_eq!(tree.inner_html(tree.root()), once, "{mode}");
        }
    }
}
