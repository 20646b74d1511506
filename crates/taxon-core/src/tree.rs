//! Forest construction and traversal helpers.
//!
//! Stores return flat rows; these helpers assemble them into the nested,
//! rank-ordered forest used by sessions and display code.

use std::collections::HashMap;

use uuid::Uuid;

use crate::defaults::DEPTH_INDENT;
use crate::models::{EntryNode, VocabularyEntry};

/// Assemble flat rows into a forest of root entries.
///
/// Each level is ordered by rank, then creation time, then id so that
/// duplicate ranks still produce a stable order. Rows whose parent is not
/// part of `entries` are unreachable and dropped.
pub fn build_forest(entries: Vec<VocabularyEntry>) -> Vec<EntryNode> {
    let mut by_parent: HashMap<Option<Uuid>, Vec<VocabularyEntry>> = HashMap::new();
    for entry in entries {
        by_parent.entry(entry.parent_id).or_default().push(entry);
    }
    build_level(None, &mut by_parent)
}

fn build_level(
    parent: Option<Uuid>,
    by_parent: &mut HashMap<Option<Uuid>, Vec<VocabularyEntry>>,
) -> Vec<EntryNode> {
    let mut level = by_parent.remove(&parent).unwrap_or_default();
    level.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then(a.created_at_utc.cmp(&b.created_at_utc))
            .then(a.id.cmp(&b.id))
    });
    level
        .into_iter()
        .map(|entry| {
            let children = build_level(Some(entry.id), by_parent);
            EntryNode { entry, children }
        })
        .collect()
}

/// Pre-order walk yielding `(depth, node)` in display order.
pub fn flatten(forest: &[EntryNode]) -> Vec<(usize, &EntryNode)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, &EntryNode)> = forest.iter().rev().map(|n| (0, n)).collect();
    while let Some((depth, node)) = stack.pop() {
        out.push((depth, node));
        stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
    }
    out
}

/// Find a node anywhere in the forest.
pub fn find_node(forest: &[EntryNode], id: Uuid) -> Option<&EntryNode> {
    forest.iter().find_map(|node| {
        if node.id() == id {
            Some(node)
        } else {
            find_node(&node.children, id)
        }
    })
}

/// Ids of the direct children of `parent` (roots when `None`), in order.
pub fn child_ids(forest: &[EntryNode], parent: Option<Uuid>) -> Vec<Uuid> {
    let level = match parent {
        None => forest,
        Some(id) => match find_node(forest, id) {
            Some(node) => node.children.as_slice(),
            None => return Vec::new(),
        },
    };
    level.iter().map(EntryNode::id).collect()
}

/// Total number of nodes in the forest.
pub fn count_nodes(forest: &[EntryNode]) -> usize {
    forest.iter().map(EntryNode::count).sum()
}

/// Flat `(id, indented label)` list for parent pickers.
///
/// The subtree rooted at `exclude` is left out, since an entry cannot be
/// reparented under itself or a descendant.
pub fn parent_options(
    forest: &[EntryNode],
    locale: &str,
    exclude: Option<Uuid>,
) -> Vec<(Uuid, String)> {
    let mut out = Vec::new();
    collect_options(forest, locale, exclude, 0, &mut out);
    out
}

fn collect_options(
    level: &[EntryNode],
    locale: &str,
    exclude: Option<Uuid>,
    depth: usize,
    out: &mut Vec<(Uuid, String)>,
) {
    for node in level {
        if Some(node.id()) == exclude {
            continue;
        }
        out.push((
            node.id(),
            format!("{}{}", DEPTH_INDENT.repeat(depth), node.entry.label(locale)),
        ));
        collect_options(&node.children, locale, exclude, depth + 1, out);
    }
}
