//! Expand/collapse state.
//!
//! The flag lives on each [`TreeNode`] rather than in a side map, because
//! forests are rebuilt after every refetch. Every update walks the whole
//! forest and returns a new one; a toggle deep in the tree never depends on
//! a cached path.

use std::collections::{HashMap, HashSet};

use super::{Forest, TreeItem, TreeNode, preorder, rebuild};

/// Apply `f` to every node. Children are visited before their parent.
fn map_nodes<T, F>(forest: Forest<T>, f: &mut F) -> Forest<T>
where
    F: FnMut(&mut TreeNode<T>),
{
    rebuild(forest, |mut node| {
        f(&mut node);
        Some(node)
    })
}

/// Flip the `expanded` flag of the node with id `node_id`.
///
/// Unknown ids leave the forest unchanged.
#[must_use]
pub fn toggle_node<T: TreeItem>(forest: Forest<T>, node_id: &str) -> Forest<T> {
    map_nodes(forest, &mut |node: &mut TreeNode<T>| {
        if node.id() == node_id {
            node.expanded = !node.expanded;
        }
    })
}

/// Set the `expanded` flag of one node explicitly.
#[must_use]
pub fn set_expanded<T: TreeItem>(forest: Forest<T>, node_id: &str, expanded: bool) -> Forest<T> {
    map_nodes(forest, &mut |node: &mut TreeNode<T>| {
        if node.id() == node_id {
            node.expanded = expanded;
        }
    })
}

/// Expand every node that has children.
#[must_use]
pub fn expand_all<T: TreeItem>(forest: Forest<T>) -> Forest<T> {
    map_nodes(forest, &mut |node: &mut TreeNode<T>| node.expanded = !node.children.is_empty())
}

/// Collapse every node.
#[must_use]
pub fn collapse_all<T: TreeItem>(forest: Forest<T>) -> Forest<T> {
    map_nodes(forest, &mut |node: &mut TreeNode<T>| node.expanded = false)
}

/// Expand every ancestor of `node_id` so the node becomes visible.
///
/// The node's own flag is left as is. Unknown ids leave the forest
/// unchanged.
#[must_use]
pub fn expand_to<T: TreeItem>(forest: Forest<T>, node_id: &str) -> Forest<T> {
    let Some(path) = ancestors_of(&forest, node_id) else {
        return forest;
    };
    let path: HashSet<String> = path.into_iter().collect();
    map_nodes(forest, &mut |node: &mut TreeNode<T>| {
        if path.contains(node.id()) {
            node.expanded = true;
        }
    })
}

/// Find a node anywhere in the forest.
#[must_use]
pub fn find_node<'a, T: TreeItem>(
    forest: &'a [TreeNode<T>],
    node_id: &str,
) -> Option<&'a TreeNode<T>> {
    preorder(forest)
        .map(|(node, _)| node)
        .find(|node| node.id() == node_id)
}

/// Root-first ids of the ancestors of `node_id`, excluding the node itself.
///
/// Returns `None` if the node is not in the forest and an empty vec for a
/// root.
#[must_use]
pub fn ancestors_of<T: TreeItem>(forest: &[TreeNode<T>], node_id: &str) -> Option<Vec<String>> {
    let mut path: Vec<&str> = Vec::new();
    for (node, depth) in preorder(forest) {
        path.truncate(depth);
        if node.id() == node_id {
            return Some(path.into_iter().map(str::to_string).collect());
        }
        path.push(node.id());
    }
    None
}

/// Carry expand state from `previous` into a freshly rebuilt forest.
///
/// Nodes present in both keep their previous flag; new nodes keep whatever
/// the builder gave them.
#[must_use]
pub fn merge_expansion<T: TreeItem>(previous: &[TreeNode<T>], rebuilt: Forest<T>) -> Forest<T> {
    let state: HashMap<&str, bool> = preorder(previous)
        .map(|(node, _)| (node.id(), node.expanded))
        .collect();
    map_nodes(rebuilt, &mut |node: &mut TreeNode<T>| {
        if let Some(&expanded) = state.get(node.id()) {
            node.expanded = expanded;
        }
    })
}
