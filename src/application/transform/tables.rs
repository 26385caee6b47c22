//! Table layouts for code blocks and callouts, for targets that drop block styling.

use crate::domain::document::{DocumentTree, NodeData, NodeId};

pub const DEFAULT_CALLOUT_TYPE: &str = "quote";

/// Wrap every `pre > code` in a single-cell `table.source-table`.
pub fn code_blocks_to_tables(tree: &mut DocumentTree) {
    let root = tree.root();
    let blocks: Vec<(NodeId, NodeId)> = tree
        .select(root, |el| el.is("pre"))
        .into_iter()
        .filter_map(|pre| {
            let code = tree.select_first(pre, |el| el.is("code"))?;
            Some((pre, code))
        })
        .collect();

    for (pre, code) in blocks {
        let table = tree.create_element("table");
        tree.set_attr(table, "class", "source-table");
        let body = tree.create_element("tbody");
        let row = tree.create_element("tr");
        let cell = tree.create_element("td");
        let inner = tree.create_element("pre");
        tree.move_children(code, inner);
        trim_trailing_newlines(tree, inner);

        tree.append_child(cell, inner);
        tree.append_child(row, cell);
        tree.append_child(body, row);
        tree.append_child(table, body);
        tree.replace(pre, table);
    }
}

fn trim_trailing_newlines(tree: &mut DocumentTree, parent: NodeId) {
    while let Some(last) = tree.last_child(parent) {
        let NodeData::Text(text) = tree.data(last) else {
            return;
        };
        let trimmed = text.trim_end_matches('\n').to_string();
        if !trimmed.is_empty() {
            tree.set_text(last, trimmed);
            return;
        }
        tree.remove(last);
    }
}

/// Replace each `.callout` with a two-row `table.callout-table`, innermost first.
pub fn callouts_to_tables(tree: &mut DocumentTree) {
    let root = tree.root();
    let callouts = tree.select(root, |el| el.has_class("callout") && !el.is("table"));
    for callout in callouts.into_iter().rev() {
        if tree.is_attached(callout) {
            callout_to_table(tree, callout);
        }
    }
}

fn callout_to_table(tree: &mut DocumentTree, callout: NodeId) {
    let kind = tree
        .attr(callout, "data-callout")
        .filter(|kind| !kind.is_empty())
        .unwrap_or(DEFAULT_CALLOUT_TYPE)
        .to_string();

    let table = tree.create_element("table");
    tree.set_attr(table, "class", "callout-table callout");
    tree.set_attr(table, "data-callout", kind);

    let title_row = tree.create_element("tr");
    let title_cell = tree.create_element("td");
    tree.set_attr(title_cell, "class", "callout-title");
    let title = tree.create_element("span");
    if let Some(inner) = tree.select_first(callout, |el| el.has_class("callout-title-inner")) {
        tree.move_children(inner, title);
    }
    tree.append_child(title_cell, title);
    tree.append_child(title_row, title_cell);
    tree.append_child(table, title_row);

    if let Some(content) = tree.select_first(callout, |el| el.has_class("callout-content")) {
        let content_row = tree.create_element("tr");
        let content_cell = tree.create_element("td");
        tree.move_children(content, content_cell);
        tree.append_child(content_row, content_cell);
        tree.append_child(table, content_row);
    }

    tree.replace(callout, table);
}
