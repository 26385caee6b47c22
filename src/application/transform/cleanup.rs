//! Removal of live-view decorations that mean nothing outside the editor.

use crate::domain::document::DocumentTree;

/// Class names of third-party reference-count decorations that are stripped.
pub const THIRD_PARTY_DECORATIONS: [&str; 1] = ["snw-reference"];

/// Drop the root's inline style (the hidden, full-size render container).
pub fn strip_root_style(tree: &mut DocumentTree) {
    let root = tree.root();
    tree.remove_attr(root, "style");
}

pub fn remove_front_matter(tree: &mut DocumentTree) {
    remove_matching(tree, |tree, id| {
        tree.element(id)
            .is_some_and(|el| el.has_class("frontmatter") || el.has_class("frontmatter-container"))
    });
}

/// Checkboxes become read-only but keep their checked state.
pub fn disable_checkboxes(tree: &mut DocumentTree) {
    let root = tree.root();
    let boxes = tree.select(root, |el| {
        el.is("input")
            && el
                .attr("type")
                .is_some_and(|kind| kind.eq_ignore_ascii_case("checkbox"))
    });
    for checkbox in boxes {
        tree.set_attr(checkbox, "disabled", "disabled");
    }
}

pub fn remove_collapse_indicators(tree: &mut DocumentTree) {
    remove_matching(tree, |tree, id| {
        tree.element(id).is_some_and(|el| el.has_class("collapse-indicator"))
    });
}

pub fn remove_buttons(tree: &mut DocumentTree) {
    remove_matching(tree, |tree, id| tree.is_element(id, "button"));
}

pub fn remove_third_party_decorations(tree: &mut DocumentTree) {
    remove_matching(tree, |tree, id| {
        tree.element(id).is_some_and(|el| {
            THIRD_PARTY_DECORATIONS
                .iter()
                .any(|class| el.has_class(class))
        })
    });
}

fn remove_matching<F>(tree: &mut DocumentTree, matches: F)
where
    F: Fn(&DocumentTree, crate::domain::document::NodeId) -> bool,
{
    let root = tree.root();
    let targets: Vec<_> = tree
        .descendants(root)
        .into_iter()
        .filter(|id| matches(tree, *id))
        .collect();
    for id in targets {
        tree.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_decorations_and_freezes_checkboxes() {
        let mut tree = DocumentTree::from_fragment(
            "div",
            concat!(
                r#"<pre class="frontmatter"><code>a: 1</code></pre>"#,
                r#"<h2><span class="collapse-indicator"></span>Title<span class="snw-reference">3</span></h2>"#,
                r#"<ul><li><input type="checkbox" checked="">Done</li></ul>"#,
                r#"<pre><code>x</code><button class="copy-code-button">Copy</button></pre>"#,
            ),
        );
        let root = tree.root();
        tree.set_attr(root, "style", "display: hidden");

        strip_root_style(&mut tree);
        remove_front_matter(&mut tree);
        disable_checkboxes(&mut tree);
        remove_collapse_indicators(&mut tree);
        remove_buttons(&mut tree);
        remove_third_party_decorations(&mut tree);

        assert_eq!(
            tree.outer_html(root),
            concat!(
                "<div>",
                "<h2>Title</h2>",
                r#"<ul><li><input type="checkbox" checked="" disabled="disabled">Done</li></ul>"#,
                "<pre><code>x</code></pre>",
                "</div>"
            )
        );
    }
}
