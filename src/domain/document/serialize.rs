use super::{DocumentTree, Element, Namespace, NodeData, NodeId, XLINK_NAMESPACE};

const VOID_ELEMENTS: [&str; 16] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr", "basefont",
];

const RAW_TEXT_ELEMENTS: [&str; 7] = [
    "style",
    "script",
    "xmp",
    "iframe",
    "noembed",
    "noframes",
    "plaintext",
];

pub(super) fn outer_html(tree: &DocumentTree, id: NodeId) -> String {
    let mut out = String::new();
    write_html(tree, id, false, &mut out);
    out
}

pub(super) fn inner_html(tree: &DocumentTree, id: NodeId) -> String {
    let raw = tree.element(id).is_some_and(is_raw_text);
    let mut out = String::new();
    for child in tree.children(id) {
        write_html(tree, *child, raw, &mut out);
    }
    out
}

fn is_raw_text(element: &Element) -> bool {
    element.namespace == Namespace::Html
        && RAW_TEXT_ELEMENTS
            .iter()
            .any(|name| element.name.eq_ignore_ascii_case(name))
}

fn is_void(element: &Element) -> bool {
    element.namespace == Namespace::Html
        && VOID_ELEMENTS
            .iter()
            .any(|name| element.name.eq_ignore_ascii_case(name))
}

fn write_html(tree: &DocumentTree, id: NodeId, raw_parent: bool, out: &mut String) {
    match tree.data(id) {
        NodeData::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            for (key, value) in element.attrs() {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_html_attr(value, out);
                out.push('"');
            }
            out.push('>');
            if is_void(element) {
                return;
            }
            let raw = is_raw_text(element);
            for child in tree.children(id) {
                write_html(tree, *child, raw, out);
            }
            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
        NodeData::Text(text) if raw_parent => out.push_str(text),
        NodeData::Text(text) => escape_html_text(text, out),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn escape_html_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

fn escape_html_attr(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

pub(super) fn to_xml(tree: &DocumentTree, id: NodeId) -> String {
    let mut out = String::new();
    let needs_xlink = uses_xlink(tree, id);
    write_xml(tree, id, None, needs_xlink, &mut out);
    out
}

fn uses_xlink(tree: &DocumentTree, id: NodeId) -> bool {
    std::iter::once(id)
        .chain(tree.descendants(id))
        .filter_map(|node| tree.element(node))
        .any(|element| element.attrs().any(|(key, _)| key.starts_with("xlink:")))
}

fn write_xml(
    tree: &DocumentTree,
    id: NodeId,
    inherited: Option<Namespace>,
    declare_xlink: bool,
    out: &mut String,
) {
    match tree.data(id) {
        NodeData::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            if inherited != Some(element.namespace) && !element.has_attr("xmlns") {
                out.push_str(" xmlns=\"");
                out.push_str(element.namespace.uri());
                out.push('"');
            }
            if declare_xlink && !element.has_attr("xmlns:xlink") {
                out.push_str(" xmlns:xlink=\"");
                out.push_str(XLINK_NAMESPACE);
                out.push('"');
            }
            for (key, value) in element.attrs() {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_xml(value, true, out);
                out.push('"');
            }
            let children = tree.children(id);
            if children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children {
                write_xml(tree, *child, Some(element.namespace), false, out);
            }
            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
        NodeData::Text(text) => escape_xml(text, false, out),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(&text.replace("--", "- -"));
            out.push_str("-->");
        }
    }
}

fn escape_xml(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&#160;"),
            other => out.push(other),
        }
    }
}
