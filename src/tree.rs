//! Builds nested [`TreeNode`] trees from either side of a sync.
//!
//! Document side: parsed tasks are grouped by their enclosing line.
//! Graph side: child order comes from `sub_task_ids`, with `parent_id`
//! back-links appended after. Graph trees are assembled over an index
//! arena with an ancestor set per branch, so cyclic links never attach.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::model::{Task, TreeNode};
use crate::parser::{parse_markdown, ParseOptions, ParsedTask};

/// Nest parsed tasks by their `parent_line`.
pub fn parse_markdown_to_tree(tasks: &[ParsedTask]) -> Vec<TreeNode> {
    let by_line: HashMap<usize, usize> = tasks
        .iter()
        .enumerate()
        .map(|(idx, task)| (task.line, idx))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (idx, task) in tasks.iter().enumerate() {
        match task.parent_line.and_then(|line| by_line.get(&line)) {
            // parents always precede children, so this cannot loop
            Some(&parent) if parent < idx => children[parent].push(idx),
            _ => roots.push(idx),
        }
    }

    fn build(idx: usize, level: usize, tasks: &[ParsedTask], children: &[Vec<usize>]) -> TreeNode {
        let task = &tasks[idx];
        TreeNode {
            id: task.id.clone(),
            title: task.title.clone(),
            is_done: task.completed,
            children: children[idx]
                .iter()
                .map(|&child| build(child, level + 1, tasks, children))
                .collect(),
            level,
            notes: task.notes(),
        }
    }

    roots
        .into_iter()
        .map(|idx| build(idx, 0, tasks, &children))
        .collect()
}

/// Parse document text as an unbounded outline and nest it.
pub fn markdown_to_tree(content: &str) -> Vec<TreeNode> {
    let parsed = parse_markdown(content, ParseOptions::outline());
    parse_markdown_to_tree(&parsed.tasks)
}

/// Nest graph tasks.
///
/// Tasks with an empty id are skipped. A task whose parent is unknown is a
/// root. Roots that another task lists in `sub_task_ids` are attached there
/// instead, as long as that does not close a cycle.
pub fn tasks_to_tree(tasks: &[Task]) -> Vec<TreeNode> {
    let arena: Vec<&Task> = tasks.iter().filter(|t| !t.id.is_empty()).collect();
    let index: HashMap<&str, usize> = arena
        .iter()
        .enumerate()
        .map(|(idx, task)| (task.id.as_str(), idx))
        .collect();

    // children by declared order first, then parent_id back-links
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); arena.len()];
    for (idx, task) in arena.iter().enumerate() {
        let mut listed: HashSet<usize> = HashSet::new();
        for child_id in &task.sub_task_ids {
            if let Some(&child) = index.get(child_id.as_str()) {
                if child != idx && listed.insert(child) {
                    children[idx].push(child);
                }
            }
        }
        for (other, candidate) in arena.iter().enumerate() {
            if other != idx
                && candidate.parent_id.as_deref() == Some(task.id.as_str())
                && listed.insert(other)
            {
                children[idx].push(other);
            }
        }
    }

    let claimed: HashSet<usize> = children.iter().flatten().copied().collect();
    let is_root = |task: &Task| {
        task.parent_id
            .as_deref()
            .map(|parent| !index.contains_key(parent))
            .unwrap_or(true)
    };

    let mut attached: HashSet<usize> = HashSet::new();
    let mut roots: Vec<(usize, TreeNode)> = Vec::new();

    let unclaimed = (0..arena.len()).filter(|idx| is_root(arena[*idx]) && !claimed.contains(idx));
    let claimed_roots: Vec<usize> = (0..arena.len())
        .filter(|idx| is_root(arena[*idx]) && claimed.contains(idx))
        .collect();

    for idx in unclaimed.collect::<Vec<_>>().into_iter().chain(claimed_roots) {
        if attached.contains(&idx) {
            continue;
        }
        let mut path = HashSet::new();
        if let Some(node) = attach(idx, 0, &arena, &children, &mut attached, &mut path) {
            roots.push((idx, node));
        }
    }

    let skipped = arena.len() - attached.len();
    if skipped > 0 {
        warn!(skipped, "tasks left out of the tree (cyclic parent links)");
    }

    roots.sort_by_key(|(idx, _)| *idx);
    roots.into_iter().map(|(_, node)| node).collect()
}

fn attach(
    idx: usize,
    level: usize,
    arena: &[&Task],
    children: &[Vec<usize>],
    attached: &mut HashSet<usize>,
    path: &mut HashSet<usize>,
) -> Option<TreeNode> {
    if path.contains(&idx) || !attached.insert(idx) {
        return None;
    }
    path.insert(idx);

    let mut nodes = Vec::new();
    for &child in &children[idx] {
        if let Some(node) = attach(child, level + 1, arena, children, attached, path) {
            nodes.push(node);
        }
    }
    path.remove(&idx);

    let task = arena[idx];
    Some(TreeNode {
        id: Some(task.id.clone()),
        title: task.title.clone(),
        is_done: task.is_done,
        children: nodes,
        level,
        notes: task.notes.clone().filter(|notes| !notes.is_empty()),
    })
}
