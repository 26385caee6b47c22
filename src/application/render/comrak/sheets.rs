//! Spreadsheet-style cell merging for tables (`<` merges left, `^` merges up).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::render::components::RenderComponent;
use crate::application::render::markdown::RenderError;
use crate::domain::document::{DocumentTree, NodeId};

pub(super) const SHEET_SIGNATURE: &str = "SheetElement";

const MERGE_LEFT: &str = "<";
const MERGE_UP: &str = "^";

/// A rendered table whose merge markers are applied when the component loads.
pub(super) struct SheetElement {
    container: Arc<Mutex<DocumentTree>>,
    table: NodeId,
}

impl SheetElement {
    pub(super) fn new(container: Arc<Mutex<DocumentTree>>, table: NodeId) -> Self {
        Self { container, table }
    }
}

#[async_trait]
impl RenderComponent for SheetElement {
    fn signature(&self) -> &str {
        SHEET_SIGNATURE
    }

    async fn on_load(&self) -> Result<(), RenderError> {
        let mut tree = self.container.lock().await;
        if !tree.is_element(self.table, "table") {
            return Err(RenderError::Component {
                signature: SHEET_SIGNATURE.to_string(),
                message: format!("node {} is not a table", self.table),
            });
        }
        merge_cells(&mut tree, self.table);
        Ok(())
    }
}

/// Apply merge markers inside `table`; returns how many cells were absorbed.
pub(super) fn merge_cells(tree: &mut DocumentTree, table: NodeId) -> usize {
    let rows: Vec<NodeId> = tree
        .select(table, |el| el.is("tr"))
        .into_iter()
        .filter(|row| {
            tree.ancestors(*row)
                .find(|ancestor| tree.is_element(*ancestor, "table"))
                == Some(table)
        })
        .collect();

    let mut merged = 0;
    let mut above: Vec<Option<NodeId>> = Vec::new();
    for row in rows {
        let cells: Vec<NodeId> = tree
            .children(row)
            .iter()
            .copied()
            .filter(|cell| tree.is_element(*cell, "td") || tree.is_element(*cell, "th"))
            .collect();
        let mut left: Option<NodeId> = None;
        for (column, cell) in cells.into_iter().enumerate() {
            if above.len() <= column {
                above.resize(column + 1, None);
            }
            let text = tree.text_content(cell);
            match text.trim() {
                MERGE_LEFT if left.is_some() => {
                    if let Some(target) = left {
                        widen(tree, target, "colspan");
                        above[column] = Some(target);
                    }
                    tree.remove(cell);
                    merged += 1;
                }
                MERGE_UP if above[column].is_some() => {
                    if let Some(target) = above[column] {
                        widen(tree, target, "rowspan");
                    }
                    tree.remove(cell);
                    merged += 1;
                }
                _ => {
                    above[column] = Some(cell);
                    left = Some(cell);
                }
            }
        }
    }
    merged
}

fn widen(tree: &mut DocumentTree, cell: NodeId, attribute: &str) {
    let span = tree
        .attr(cell, attribute)
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(1);
    tree.set_attr(cell, attribute, (span + 1).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_left_and_up_markers() {
        let mut tree = DocumentTree::from_fragment(
            "div",
            "<table><tbody><tr><td>a</td><td>&lt;</td><td>b</td></tr><tr><td>^</td><td>c</td><td>d</td></tr></tbody></table>",
        );
        let root = tree.root();
        let table = tree.select_first(root, |el| el.is("table")).expect("table");

        assert_eq!(merge_cells(&mut tree, table), 2);
        let html = tree.inner_html(root);
        assert!(html.contains(r#"<td colspan="2" rowspan="2">a</td>"#), "{html}");
        assert!(!html.contains("&lt;"), "{html}");
        assert!(!html.contains("<td>^</td>"), "{html}");
    }

    #[tokio::test]
    async fn component_loads_through_the_shared_container() {
        let tree = DocumentTree::from_fragment(
            "div",
            "<table><tr><td>x</td><td>&lt;</td></tr></table>",
        );
        let root = tree.root();
        let table = tree.select_first(root, |el| el.is("table")).expect("table");
        let container = Arc::new(Mutex::new(tree));

        let sheet = SheetElement::new(Arc::clone(&container), table);
        assert_eq!(sheet.signature(), SHEET_SIGNATURE);
        sheet.on_load().await.expect("loaded");

        let tree = container.lock().await;
        assert!(tree.inner_html(tree.root()).contains(r#"colspan="2""#));
    }
}
