//! Footnote rewriting for rendered notes, selected by [`FootnoteHandling`].

use crate::domain::document::DocumentTree;
use crate::domain::options::FootnoteHandling;

pub const FOOTNOTE_LINK_CLASS: &str = "footnote-link";
pub const BACKLINK_GLYPH: &str = "↩︎";

pub fn handle_footnotes(tree: &mut DocumentTree, mode: FootnoteHandling) {
    match mode {
        FootnoteHandling::RemoveAll => remove_all(tree),
        FootnoteHandling::RemoveLink => remove_links(tree),
        // Title attributes are not produced yet; both modes keep the anchors.
        FootnoteHandling::LeaveLink | FootnoteHandling::TitleAttribute => {}
    }
}

/// Drop the footnote section and every reference together with its wrapper.
fn remove_all(tree: &mut DocumentTree) {
    let root = tree.root();
    for section in tree.select(root, |el| el.is("section") && el.has_class("footnotes")) {
        tree.remove(section);
    }
    for link in tree.select(root, |el| el.has_class(FOOTNOTE_LINK_CLASS)) {
        if let Some(wrapper) = tree.parent(link).filter(|parent| *parent != root) {
            tree.remove(wrapper);
        } else {
            tree.remove(link);
        }
    }
}

/// Keep footnote text but unwrap the anchors; back-links disappear.
fn remove_links(tree: &mut DocumentTree) {
    let root = tree.root();
    let links = tree.select(root, |el| el.is("a") && el.has_class(FOOTNOTE_LINK_CLASS));
    for link in links {
        let text = tree.text_content(link);
        if text == BACKLINK_GLYPH {
            tree.remove(link);
            continue;
        }
        let span = tree.create_element("span");
        tree.set_attr(span, "class", FOOTNOTE_LINK_CLASS);
        tree.set_text_content(span, text);
        tree.replace(link, span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = concat!(
        r##"<p>One<sup class="footnote-ref"><a href="#fn-1" id="fnref-1" class="footnote-link">1</a></sup>"##,
        r##" two<sup class="footnote-ref"><a href="#fn-1" id="fnref-1-2" class="footnote-link">1</a></sup></p>"##,
        r##"<section class="footnotes"><ol><li id="fn-1"><p>Note text <a href="#fnref-1" class="footnote-backref footnote-link">↩︎</a></p></li></ol></section>"##,
    );

    fn apply(mode: FootnoteHandling) -> String {
        let mut tree = DocumentTree::from_fragment("div", DOC);
        handle_footnotes(&mut tree, mode);
        tree.inner_html(tree.root())
    }

    #[test]
    fn remove_all_leaves_no_footnote_nodes() {
        assert_eq!(apply(FootnoteHandling::RemoveAll), "<p>One two</p>");
    }

    #[test]
    fn remove_link_keeps_text_without_anchors() {
        let html = apply(FootnoteHandling::RemoveLink);
        assert!(!html.contains("<a "), "{html}");
        assert!(!html.contains(BACKLINK_GLYPH), "{html}");
        assert!(html.contains(r#"<sup class="footnote-ref"><span class="footnote-link">1</span></sup>"#));
        assert!(html.contains("Note text"));
    }

    #[test]
    fn leave_link_and_title_attribute_change_nothing() {
        let original = DocumentTree::from_fragment("div", DOC);
        let expected = original.inner_html(original.root());
        assert_eq!(apply(FootnoteHandling::LeaveLink), expected);
        assert_eq!(apply(FootnoteHandling::TitleAttribute), expected);
    }
}
