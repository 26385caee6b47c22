use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, ParseOpts, QualName, parse_fragment};
use markup5ever_rcdom::{Handle, NodeData as DomNode, RcDom};

use super::{DocumentTree, Element, HTML_NAMESPACE, Namespace, NodeData, NodeId};

/// Parse `html` in a `<body>` context and append the resulting nodes to `parent`.
pub(super) fn append_fragment(tree: &mut DocumentTree, parent: NodeId, html: &str) {
    let context = QualName::new(
        None,
        html5ever::Namespace::from(HTML_NAMESPACE),
        LocalName::from("body"),
    );
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new())
        .one(html);

    // Fragment parsing yields document -> <html> -> fragment nodes.
    let document_children = dom.document.children.borrow();
    for top in document_children.iter() {
        if matches!(top.data, DomNode::Element { .. }) {
            for child in top.children.borrow().iter() {
                convert(tree, parent, child);
            }
        }
    }
}

fn convert(tree: &mut DocumentTree, parent: NodeId, handle: &Handle) {
    match &handle.data {
        DomNode::Element {
            name,
            attrs,
            template_contents,
            ..
        } => {
            let mut element =
                Element::with_namespace(name.local.to_string(), Namespace::from_uri(&name.ns));
            for attr in attrs.borrow().iter() {
                let key = match &attr.name.prefix {
                    Some(prefix) => format!("{prefix}:{}", attr.name.local),
                    None => attr.name.local.to_string(),
                };
                element.set_attr(key, attr.value.to_string());
            }
            let id = tree.push(NodeData::Element(element));
            tree.append_child(parent, id);

            if let Some(contents) = template_contents.borrow().as_ref() {
                for child in contents.children.borrow().iter() {
                    convert(tree, id, child);
                }
            }
            for child in handle.children.borrow().iter() {
                convert(tree, id, child);
            }
        }
        DomNode::Text { contents } => {
            let text = tree.create_text(contents.borrow().to_string());
            tree.append_child(parent, text);
        }
        DomNode::Comment { contents } => {
            let comment = tree.create_comment(contents.to_string());
            tree.append_child(parent, comment);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn svg_children_keep_their_namespace() {
        let tree = DocumentTree::from_fragment(
            "div",
            r##"<svg viewBox="0 0 10 10"><use xlink:href="#a"></use></svg>"##,
        );
        let svg = tree
            .select_first(tree.root(), |el| el.is("svg"))
            .expect("svg parsed");
        let element = tree.element(svg).expect("element");
        assert_eq!(element.namespace, Namespace::Svg);
        assert_eq!(element.attr("viewBox"), Some("0 0 10 10"));
        let use_node = tree.children(svg)[0];
        assert_eq!(tree.attr(use_node, "xlink:href"), Some("#a"));
    }

    #[test]
    fn table_fragments_get_implied_bodies() {
        let tree = DocumentTree::from_fragment("div", "<table><tr><td>x</td></tr></table>");
        assert!(
            tree.select_first(tree.root(), |el| el.is("tbody"))
                .is_some()
        );
    }
}
