//! Text renderings of read/write sets.

use crate::extract::{SlicedVariable, VariableTree};

const INDENT: &str = "   ";

/// `- "type": "T", "name": "N", "value": "V"` per node, members indented.
pub fn render_values(items: &[SlicedVariable]) -> String {
    let mut lines = Vec::new();
    for item in items {
        push_tree(&item.tree, 0, &mut lines);
    }
    lines.join("\n")
}

/// `- name: type` per top-level entry.
pub fn render_listing(items: &[SlicedVariable]) -> String {
    items
        .iter()
        .map(|item| format!("- {}: {}", item.var().name, item.var().ty))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_tree(tree: &VariableTree, indent: usize, lines: &mut Vec<String>) {
    let var = &tree.var;
    lines.push(format!(
        "{}- \"type\": \"{}\", \"name\": \"{}\", \"value\": \"{}\"",
        INDENT.repeat(indent),
        var.ty,
        var.name,
        var.value
    ));
    for child in &tree.children {
        push_tree(child, indent + 1, lines);
    }
}
