//! Tree to markdown rendering.
//!
//! Every node becomes `<indent>- [x| ] <!-- sp:ID --> Title` with two spaces
//! per level. Notes are only written under leaves: checklist note lines are
//! pushed to at least four spaces so they re-parse as notes, anything else
//! is written as stored.

use std::collections::HashSet;

use crate::model::{Task, TreeNode};
use crate::parser::{indent_columns, INDENT_WIDTH};
use crate::tree::tasks_to_tree;

/// Minimum indentation of a checklist line inside notes.
pub const NOTE_CHECKLIST_INDENT: usize = 4;

/// Inline identifier marker for a task id.
pub fn id_marker(id: &str) -> String {
    format!("<!-- sp:{id} -->")
}

fn is_checklist_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- [ ]") || trimmed.starts_with("- [x]") || trimmed.starts_with("- [X]")
}

fn normalize_note_line(line: &str) -> String {
    if !is_checklist_line(line) {
        return line.to_string();
    }
    let body = line.trim_start();
    let prefix = &line[..line.len() - body.len()];
    if indent_columns(prefix) >= NOTE_CHECKLIST_INDENT {
        line.to_string()
    } else {
        format!("{}{}", " ".repeat(NOTE_CHECKLIST_INDENT), body)
    }
}

/// Canonical form of a notes block: checklist lines padded, blank lines
/// dropped, trailing whitespace trimmed.
pub fn normalize_notes(notes: &str) -> String {
    notes
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| normalize_note_line(line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn task_line(node: &TreeNode, indent: usize, include_id: bool) -> String {
    let mut line = String::new();
    line.push_str(&" ".repeat(indent));
    line.push_str(if node.is_done { "- [x] " } else { "- [ ] " });
    if include_id {
        if let Some(id) = node.id.as_deref().filter(|id| !id.is_empty()) {
            line.push_str(&id_marker(id));
            line.push(' ');
        }
    }
    line.push_str(&node.title);
    line
}

fn write_node(node: &TreeNode, indent: usize, include_id: bool, out: &mut Vec<String>) {
    out.push(task_line(node, indent, include_id));

    if node.children.is_empty() {
        if let Some(notes) = node.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            for note in notes.lines() {
                out.push(normalize_note_line(note));
            }
        }
        return;
    }

    for child in &node.children {
        write_node(child, indent + INDENT_WIDTH, include_id, out);
    }
}

/// Render a tree whose top-level nodes sit at nesting level `base_level`.
pub fn tree_to_markdown(nodes: &[TreeNode], base_level: usize, include_id: bool) -> String {
    let mut lines = Vec::new();
    for node in nodes {
        write_node(node, base_level * INDENT_WIDTH, include_id, &mut lines);
    }
    lines.join("\n")
}

/// Render the document for a project: roots in `root_order` first, then any
/// remaining roots in graph order. The header, when given, is kept above the
/// task list.
pub fn render_project_document(
    tasks: &[Task],
    root_order: &[String],
    header: Option<&str>,
) -> String {
    let tree = tasks_to_tree(tasks);
    let mut ordered: Vec<&TreeNode> = Vec::with_capacity(tree.len());
    let mut placed: HashSet<&str> = HashSet::new();

    for root_id in root_order {
        if let Some(node) = tree.iter().find(|n| n.id.as_deref() == Some(root_id.as_str())) {
            if placed.insert(root_id.as_str()) {
                ordered.push(node);
            }
        }
    }
    for node in &tree {
        let id = node.id.as_deref().unwrap_or("");
        if !placed.contains(id) {
            ordered.push(node);
        }
    }

    let mut lines = Vec::new();
    for node in ordered {
        write_node(node, 0, true, &mut lines);
    }
    let body = lines.join("\n");

    match header {
        Some(header) if body.is_empty() => header.to_string(),
        Some(header) => format!("{header}\n{body}"),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: Option<&str>, title: &str, level: usize, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            id: id.map(str::to_string),
            title: title.to_string(),
            is_done: false,
            children,
            level,
            notes: None,
        }
    }

    #[test]
    fn empty_tree_renders_empty() {
        assert_eq!(tree_to_markdown(&[], 0, true), "");
    }

    #[test]
    fn renders_ids_and_nesting() {
        let mut done = node(Some("c"), "Child", 1, vec![]);
        done.is_done = true;
        let tree = vec![node(Some("p"), "Parent", 0, vec![done]), node(None, "Loose", 0, vec![])];
        assert_eq!(
            tree_to_markdown(&tree, 0, true),
            "- [ ] <!-- sp:p --> Parent\n  - [x] <!-- sp:c --> Child\n- [ ] Loose"
        );
        assert_eq!(
            tree_to_markdown(&tree, 1, false),
            "  - [ ] Parent\n    - [x] Child\n  - [ ] Loose"
        );
    }

    #[test]
    fn notes_only_for_leaves() {
        let mut child = node(Some("c"), "Child", 1, vec![]);
        child.notes = Some("- [ ] step one\n      - [x] step two\nplain text".to_string());
        let mut parent = node(Some("p"), "Parent", 0, vec![child]);
        parent.notes = Some("hidden".to_string());

        assert_eq!(
            tree_to_markdown(&[parent], 0, true),
            "- [ ] <!-- sp:p --> Parent\n  - [ ] <!-- sp:c --> Child\n    - [ ] step one\n      - [x] step two\nplain text"
        );
    }

    #[test]
    fn normalize_notes_pads_and_drops_blanks() {
        assert_eq!(
            normalize_notes("  - [ ] a  \n\n    - [x] b\ntext"),
            "    - [ ] a\n    - [x] b\ntext"
        );
        assert_eq!(normalize_notes(""), "");
    }

    #[test]
    fn project_document_honors_root_order_and_header() {
        let tasks = vec![
            Task {
                id: "a".to_string(),
                title: "A".to_string(),
                ..Task::default()
            },
            Task {
                id: "b".to_string(),
                title: "B".to_string(),
                is_done: true,
                ..Task::default()
            },
            Task {
                id: "c".to_string(),
                title: "C".to_string(),
                ..Task::default()
            },
        ];
        let order = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            render_project_document(&tasks, &order, Some("# Inbox\n")),
            "# Inbox\n\n- [x] <!-- sp:b --> B\n- [ ] <!-- sp:a --> A\n- [ ] <!-- sp:c --> C"
        );
        assert_eq!(render_project_document(&[], &[], Some("# Inbox")), "# Inbox");
    }
}
