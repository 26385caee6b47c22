//! Per-block post-processors: diagrams, callouts and tags.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::application::render::mermaid::MermaidRenderer;
use crate::domain::document::{DocumentTree, NodeData, NodeId};

static CALLOUT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[!([^\]\s]+)\]([+-]?)[ \t]*").expect("callout pattern is valid")
});

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(#[\p{L}\p{N}_/-]*[\p{L}_/-][\p{L}\p{N}_/-]*)").expect("tag pattern is valid")
});

/// Elements whose text never contains tags.
const TAGLESS: [&str; 6] = ["a", "code", "pre", "style", "script", "svg"];

/// Run every post-processor over one block.
pub(super) async fn post_process(block: &mut DocumentTree, mermaid: Option<&MermaidRenderer>) {
    if let Some(mermaid) = mermaid {
        render_diagrams(block, mermaid).await;
    }
    convert_callouts(block);
    link_tags(block);
}

async fn render_diagrams(block: &mut DocumentTree, mermaid: &MermaidRenderer) {
    let root = block.root();
    let diagrams: Vec<(NodeId, String)> = block
        .select(root, |el| el.is("pre"))
        .into_iter()
        .filter_map(|pre| {
            let code = block.select_first(pre, |el| el.is("code") && el.has_class("language-mermaid"))?;
            Some((pre, block.text_content(code)))
        })
        .collect();

    for (pre, source) in diagrams {
        let renderer = mermaid.clone();
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&source)).await;
        match rendered {
            Ok(Ok(svg)) => {
                let figure = block.create_element("div");
                block.set_attr(figure, "class", "mermaid");
                block.append_html(figure, &svg);
                block.replace(pre, figure);
            }
            Ok(Err(err)) => warn!(
                target = "application::render::blocks",
                op = "blocks::mermaid",
                result = "error",
                error = %err,
                "diagram left as code"
            ),
            Err(err) => warn!(
                target = "application::render::blocks",
                op = "blocks::mermaid",
                result = "error",
                error = %err,
                "diagram task failed"
            ),
        }
    }
}

/// `> [!type]± title` blockquotes become callout markup.
pub(super) fn convert_callouts(block: &mut DocumentTree) {
    let root = block.root();
    let quotes = block.select(root, |el| el.is("blockquote"));
    for quote in quotes.into_iter().rev() {
        convert_callout(block, quote);
    }
}

fn convert_callout(tree: &mut DocumentTree, quote: NodeId) -> bool {
    let Some(para) = tree
        .children(quote)
        .iter()
        .copied()
        .find(|child| tree.element(*child).is_some())
        .filter(|child| tree.is_element(*child, "p"))
    else {
        return false;
    };
    let Some(first) = tree.first_child(para) else {
        return false;
    };
    let Some(text) = tree.text(first).map(str::to_string) else {
        return false;
    };
    let Some(marker) = CALLOUT_MARKER.captures(&text) else {
        return false;
    };
    let kind = marker[1].to_lowercase();
    let fold = marker[2].to_string();
    let rest = text[marker.get(0).map_or(0, |m| m.end())..].to_string();

    let title_inner = tree.create_element("div");
    tree.set_attr(title_inner, "class", "callout-title-inner");

    match rest.split_once('\n') {
        Some((title, body)) => {
            push_text(tree, title_inner, title.trim_end());
            tree.set_text(first, body);
        }
        None => {
            push_text(tree, title_inner, rest.trim_end());
            tree.remove(first);
            collect_title_line(tree, para, title_inner);
        }
    }
    if tree.children(title_inner).is_empty() {
        let title = capitalize(&kind);
        push_text(tree, title_inner, &title);
    }

    let callout = tree.create_element("div");
    tree.set_attr(callout, "data-callout-metadata", "");
    tree.set_attr(callout, "data-callout-fold", fold.as_str());
    tree.set_attr(callout, "data-callout", kind.as_str());
    let mut class = String::from("callout");
    if !fold.is_empty() {
        class.push_str(" is-collapsible");
    }
    if fold == "-" {
        class.push_str(" is-collapsed");
    }
    tree.set_attr(callout, "class", class);

    let title = tree.create_element("div");
    tree.set_attr(title, "class", "callout-title");
    let icon = tree.create_element("div");
    tree.set_attr(icon, "class", "callout-icon");
    tree.append_child(title, icon);
    tree.append_child(title, title_inner);
    tree.append_child(callout, title);

    if is_blank(tree, para) {
        tree.remove(para);
    }
    if tree.children(quote).iter().any(|child| !is_blank(tree, *child)) {
        let content = tree.create_element("div");
        tree.set_attr(content, "class", "callout-content");
        tree.move_children(quote, content);
        tree.append_child(callout, content);
    }

    tree.replace(quote, callout)
}

/// Move inline nodes up to the first line break of `para` into the title.
fn collect_title_line(tree: &mut DocumentTree, para: NodeId, title: NodeId) {
    while let Some(child) = tree.first_child(para) {
        if tree.is_element(child, "br") {
            tree.remove(child);
            return;
        }
        if let Some(text) = tree.text(child).map(str::to_string)
            && let Some((line, rest)) = text.split_once('\n')
        {
            push_text(tree, title, line);
            tree.set_text(child, rest);
            return;
        }
        tree.append_child(title, child);
    }
}

fn push_text(tree: &mut DocumentTree, parent: NodeId, text: &str) {
    if !text.is_empty() {
        let node = tree.create_text(text);
        tree.append_child(parent, node);
    }
}

fn is_blank(tree: &DocumentTree, id: NodeId) -> bool {
    match tree.data(id) {
        NodeData::Text(text) => text.trim().is_empty(),
        NodeData::Comment(_) => true,
        NodeData::Element(_) => {
            tree.is_element(id, "p")
                && tree.children(id).iter().all(|child| is_blank(tree, *child))
        }
    }
}

fn capitalize(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Wrap `#tag` words in tag links.
pub(super) fn link_tags(block: &mut DocumentTree) {
    let root = block.root();
    let candidates: Vec<NodeId> = block
        .descendants(root)
        .into_iter()
        .filter(|id| {
            block.text(*id).is_some_and(|text| text.contains('#'))
                && !block
                    .ancestors(*id)
                    .any(|ancestor| TAGLESS.iter().any(|name| block.is_element(ancestor, name)))
        })
        .collect();

    for text_node in candidates {
        let Some(text) = block.text(text_node).map(str::to_string) else {
            continue;
        };
        let Some(parent) = block.parent(text_node) else {
            continue;
        };
        let mut cursor = 0;
        let mut pieces = Vec::new();
        for caps in TAG.captures_iter(&text) {
            let Some(tag) = caps.get(1) else { continue };
            if tag.start() > cursor {
                pieces.push(block.create_text(&text[cursor..tag.start()]));
            }
            let link = block.create_element("a");
            block.set_attr(link, "href", tag.as_str());
            block.set_attr(link, "class", "tag");
            block.set_attr(link, "target", "_blank");
            block.set_attr(link, "rel", "noopener");
            block.set_text_content(link, tag.as_str());
            pieces.push(link);
            cursor = tag.end();
        }
        if pieces.is_empty() {
            continue;
        }
        if cursor < text.len() {
            pieces.push(block.create_text(&text[cursor..]));
        }
        for piece in pieces {
            block.insert_before(parent, piece, Some(text_node));
        }
        block.remove(text_node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(html: &str) -> DocumentTree {
        DocumentTree::from_fragment("div", html)
    }

    #[test]
    fn converts_callout_with_title_and_body() {
        let mut tree = block("<blockquote>\n<p>[!warning]- Mind the gap\nBody <em>text</em></p>\n</blockquote>");
        convert_callouts(&mut tree);
        let html = tree.inner_html(tree.root());
        assert!(html.contains(r#"data-callout="warning""#), "{html}");
        assert!(html.contains("is-collapsed"), "{html}");
        assert!(html.contains(r#"<div class="callout-title-inner">Mind the gap</div>"#), "{html}");
        assert!(html.contains(r#"<div class="callout-content">"#), "{html}");
        assert!(html.contains("Body <em>text</em>"), "{html}");
        assert!(!html.contains("blockquote"));
    }

    #[test]
    fn callout_without_title_uses_its_type() {
        let mut tree = block("<blockquote><p>[!note]</p></blockquote>");
        convert_callouts(&mut tree);
        let html = tree.inner_html(tree.root());
        assert!(html.contains(r#"<div class="callout-title-inner">Note</div>"#), "{html}");
        assert!(!html.contains("callout-content"), "{html}");
    }

    #[test]
    fn plain_quotes_stay_quotes() {
        let mut tree = block("<blockquote><p>Just a quote</p></blockquote>");
        convert_callouts(&mut tree);
        assert!(tree.inner_html(tree.root()).starts_with("<blockquote>"));
    }

    #[test]
    fn tags_become_links_outside_code() {
        let mut tree = block("<p>Filed under #project/alpha and #42 <code>#nope</code></p>");
        link_tags(&mut tree);
        let html = tree.inner_html(tree.root());
        assert!(
            html.contains(r##"<a href="#project/alpha" class="tag" target="_blank" rel="noopener">#project/alpha</a>"##),
            "{html}"
        );
        assert!(html.contains("and #42 "), "{html}");
        assert!(html.contains("<code>#nope</code>"), "{html}");
    }
}
