//! Flat record list → forest.
//!
//! Construction is two linear passes: index every record by id, then file
//! each record either under its parent or as a root. A parent reference that
//! names no record in the input is not an error; the record is shown as a
//! root instead. Sibling order is input order.
//!
//! Upstream data is not trusted to be acyclic. Records caught in a parent
//! cycle are unreachable from any real root, so after the regular roots are
//! assembled each leftover record (in input order) is promoted to a root and
//! its reachable remainder attached below it. Every record appears exactly
//! once in the output.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{Forest, TreeItem, TreeNode, preorder};

/// Knobs for [`build_tree_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Start root nodes expanded (all deeper nodes start collapsed).
    pub expand_roots: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { expand_roots: true }
    }
}

/// Build a forest with default options (roots expanded).
#[must_use]
pub fn build_tree<T: TreeItem>(items: Vec<T>) -> Forest<T> {
    build_tree_with(items, BuildOptions::default())
}

/// Build a forest from a flat list of records.
#[must_use]
pub fn build_tree_with<T: TreeItem>(items: Vec<T>, options: BuildOptions) -> Forest<T> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(items.len());
    for (pos, item) in items.iter().enumerate() {
        index.entry(item.node_id()).or_insert(pos);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut roots: Vec<usize> = Vec::new();

    for (pos, item) in items.iter().enumerate() {
        match item.parent_id() {
            None => roots.push(pos),
            Some(parent_id) => match index.get(parent_id) {
                Some(&parent) if parent != pos => children[parent].push(pos),
                Some(_) => {
                    debug!(id = item.node_id(), "record names itself as parent, shown as root");
                    roots.push(pos);
                }
                None => {
                    debug!(
                        id = item.node_id(),
                        parent_id, "dangling parent reference, shown as root"
                    );
                    roots.push(pos);
                }
            },
        }
    }
    drop(index);

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut forest = Vec::with_capacity(roots.len());
    for root in roots {
        if let Some(node) = assemble(root, &children, &mut slots, options) {
            forest.push(node);
        }
    }

    for pos in 0..slots.len() {
        if slots[pos].is_some() {
            if let Some(node) = assemble(pos, &children, &mut slots, options) {
                warn!(id = node.id(), "parent cycle in input, record promoted to root");
                forest.push(node);
            }
        }
    }

    forest
}

/// Attach the record at `pos` and everything reachable below it.
///
/// Post-order with an explicit stack: a node is closed and handed to its
/// parent once all of its children are closed.
fn assemble<T: TreeItem>(
    pos: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<T>],
    options: BuildOptions,
) -> Option<TreeNode<T>> {
    struct Frame<T> {
        pos: usize,
        next: usize,
        node: TreeNode<T>,
    }

    let mut root = TreeNode::new(slots[pos].take()?);
    root.expanded = options.expand_roots;
    let mut stack = vec![Frame {
        pos,
        next: 0,
        node: root,
    }];

    loop {
        let frame = stack.last_mut()?;
        if let Some(&child) = children[frame.pos].get(frame.next) {
            frame.next += 1;
            if let Some(item) = slots[child].take() {
                stack.push(Frame {
                    pos: child,
                    next: 0,
                    node: TreeNode::new(item),
                });
            }
            continue;
        }

        let done = stack.pop()?.node;
        match stack.last_mut() {
            Some(parent) => parent.node.children.push(done),
            None => return Some(done),
        }
    }
}

/// Structural `(id, parent_id)` pairs of a forest, in pre-order.
///
/// The parent reported is the node's parent *in the forest*, so a record
/// whose dangling parent reference made it a root reports `None`.
#[must_use]
pub fn flatten<T: TreeItem>(forest: &[TreeNode<T>]) -> Vec<(String, Option<String>)> {
    let mut path: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    for (node, depth) in preorder(forest) {
        path.truncate(depth);
        out.push((node.id().to_string(), path.last().map(|id| (*id).to_string())));
        path.push(node.id());
    }
    out
}

/// Consume a forest and return its records in pre-order.
#[must_use]
pub fn into_items<T>(forest: Forest<T>) -> Vec<T> {
    let mut out = Vec::new();
    let mut stack: Vec<TreeNode<T>> = forest.into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        let TreeNode { item, children, .. } = node;
        out.push(item);
        stack.extend(children.into_iter().rev());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_support::node;

    fn ids<T: TreeItem>(nodes: &[TreeNode<T>]) -> Vec<&str> {
        nodes.iter().map(TreeNode::id).collect()
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        let forest = build_tree(Vec::<crate::tree::test_support::Node>::new());
        assert!(forest.is_empty());
    }

    #[test]
    fn children_are_nested_in_input_order() {
        let forest = build_tree(vec![
            node("b2", Some("a")),
            node("a", None),
            node("b1", Some("a")),
            node("c", Some("b1")),
        ]);

        assert_eq!(ids(&forest), vec!["a"]);
        assert_eq!(ids(&forest[0].children), vec!["b2", "b1"]);
        assert_eq!(ids(&forest[0].children[1].children), vec!["c"]);
    }

    #[test]
    fn dangling_parent_degrades_to_root() {
        let forest = build_tree(vec![node("a", None), node("orphan", Some("ghost"))]);
        assert_eq!(ids(&forest), vec!["a", "orphan"]);
        assert!(forest[1].expanded);
    }

    #[test]
    fn self_parent_is_root() {
        let forest = build_tree(vec![node("loop", Some("loop"))]);
        assert_eq!(ids(&forest), vec!["loop"]);
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn only_roots_start_expanded() {
        let forest = build_tree(vec![
            node("a", None),
            node("b", Some("a")),
            node("c", Some("b")),
        ]);
        assert!(forest[0].expanded);
        assert!(!forest[0].children[0].expanded);
        assert!(!forest[0].children[0].children[0].expanded);
    }

    #[test]
    fn expand_roots_can_be_disabled() {
        let forest = build_tree_with(
            vec![node("a", None)],
            BuildOptions {
                expand_roots: false,
            },
        );
        assert!(!forest[0].expanded);
    }

    #[test]
    fn cycle_members_each_appear_once() {
        let forest = build_tree(vec![
            node("root", None),
            node("x", Some("y")),
            node("y", Some("z")),
            node("z", Some("x")),
        ]);

        let flat = flatten(&forest);
        let mut seen: Vec<&str> = flat.iter().map(|(id, _)| id.as_str()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["root", "x", "y", "z"]);

        // "x" comes first in input order and is the one promoted.
        assert_eq!(ids(&forest), vec!["root", "x"]);
        assert_eq!(ids(&forest[1].children), vec!["z"]);
        assert_eq!(ids(&forest[1].children[0].children), vec!["y"]);
    }

    #[test]
    fn duplicate_ids_do_not_loop() {
        let forest = build_tree(vec![
            node("a", None),
            node("a", None),
            node("b", Some("a")),
        ]);
        assert_eq!(flatten(&forest).len(), 3);
        assert_eq!(ids(&forest[0].children), vec!["b"]);
    }

    #[test]
    fn flatten_reports_structural_parents() {
        let forest = build_tree(vec![
            node("a", None),
            node("b", Some("a")),
            node("orphan", Some("ghost")),
        ]);
        assert_eq!(
            flatten(&forest),
            vec![
                ("a".to_string(), None),
                ("b".to_string(), Some("a".to_string())),
                ("orphan".to_string(), None),
            ]
        );
    }

    #[test]
    fn into_items_is_preorder() {
        let forest = build_tree(vec![
            node("a", None),
            node("c", None),
            node("b", Some("a")),
        ]);
        let order: Vec<String> = into_items(forest).into_iter().map(|n| n.id).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn deep_chain_builds_without_recursion() {
        const DEPTH: usize = 20_000;
        let chain: Vec<_> = (0..DEPTH)
            .map(|i| {
                let parent = (i > 0).then(|| format!("n{}", i - 1));
                node(&format!("n{i}"), parent.as_deref())
            })
            .collect();

        let forest = build_tree(chain);
        assert_eq!(ids(&forest), vec!["n0"]);
        assert_eq!(crate::tree::stats(&forest).max_depth, DEPTH);

        let flat = flatten(&forest);
        assert_eq!(flat.len(), DEPTH);
        assert_eq!(flat[DEPTH - 1].1.as_deref(), Some("n19998"));

        let items = into_items(forest);
        assert_eq!(items.len(), DEPTH);
        assert_eq!(items[DEPTH - 1].id, "n19999");
    }
}
