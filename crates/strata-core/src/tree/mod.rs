//! Single-parent forests: construction, navigation state, and search.
//!
//! The engine is generic over any record that can name itself and its
//! parent ([`TreeItem`]), so the same code renders org units and the
//! primary-placement view of categories.
//!
//! ## Submodules
//!
//! - [`build`]: flat list → forest, and back.
//! - [`navigate`]: expand/collapse state carried on the nodes themselves.
//! - [`filter`]: ancestor-preserving substring search.
//!
//! All operations are pure: they take a forest by value and return a new
//! one, so a caller that wants to diff keeps its own clone of the input.
//!
//! Nothing here recurses on tree depth. Walks go through [`preorder`] and
//! rewrites through [`rebuild`], both driven by an explicit stack, so a
//! single-parent chain many thousands of levels deep is handled like any
//! other input.

#![allow(clippy::module_name_repetitions)]

pub mod build;
pub mod filter;
pub mod navigate;

use std::ops::{Deref, DerefMut};

use serde::Serialize;

pub use build::{BuildOptions, build_tree, build_tree_with, flatten, into_items};
pub use filter::{count_matches, filter_tree, matches_query};
pub use navigate::{
    ancestors_of, collapse_all, expand_all, expand_to, find_node, merge_expansion, set_expanded,
    toggle_node,
};

/// A record that can be placed in a single-parent forest.
pub trait TreeItem {
    /// Unique identifier of this record.
    fn node_id(&self) -> &str;

    /// Identifier of the parent, or `None` for a root.
    fn parent_id(&self) -> Option<&str>;

    /// Text fields a search query is matched against.
    fn search_fields(&self) -> Vec<&str>;
}

/// One node of a forest: the record, its expand flag, and its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub expanded: bool,
    pub children: Children<T>,
}

/// Child list of a [`TreeNode`].
///
/// Derefs to `Vec<TreeNode<T>>`. Dropping it tears the subtree down with a
/// work list instead of nested drop glue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Children<T>(Vec<TreeNode<T>>);

impl<T> Default for Children<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Deref for Children<T> {
    type Target = Vec<TreeNode<T>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Children<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> From<Vec<TreeNode<T>>> for Children<T> {
    fn from(nodes: Vec<TreeNode<T>>) -> Self {
        Self(nodes)
    }
}

impl<T> FromIterator<TreeNode<T>> for Children<T> {
    fn from_iter<I: IntoIterator<Item = TreeNode<T>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Children<T> {
    type Item = TreeNode<T>;
    type IntoIter = std::vec::IntoIter<TreeNode<T>>;

    fn into_iter(mut self) -> Self::IntoIter {
        std::mem::take(&mut self.0).into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Children<T> {
    type Item = &'a TreeNode<T>;
    type IntoIter = std::slice::Iter<'a, TreeNode<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T> Drop for Children<T> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.0);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children.0);
        }
    }
}

/// Ordered roots of a single-parent hierarchy.
pub type Forest<T> = Vec<TreeNode<T>>;

impl<T: TreeItem> TreeNode<T> {
    #[must_use]
    pub const fn new(item: T) -> Self {
        Self {
            item,
            expanded: false,
            children: Children(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.item.node_id()
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes below this one.
    #[must_use]
    pub fn descendant_count(&self) -> usize {
        preorder(&self.children).count()
    }
}

/// Depth-first, parents-before-children walk over a forest.
///
/// Yields each node with its depth (roots are 0), in the same order a
/// recursive pre-order traversal would.
#[derive(Debug)]
pub struct Preorder<'a, T> {
    stack: Vec<(&'a TreeNode<T>, usize)>,
}

impl<'a, T> Iterator for Preorder<'a, T> {
    type Item = (&'a TreeNode<T>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        Some((node, depth))
    }
}

/// Walk `forest` in pre-order. See [`Preorder`].
#[must_use]
pub fn preorder<T>(forest: &[TreeNode<T>]) -> Preorder<'_, T> {
    Preorder {
        stack: forest.iter().rev().map(|node| (node, 0)).collect(),
    }
}

/// Rebuild a forest bottom-up.
///
/// `finish` receives each node after its children have been rebuilt and
/// returns the node to keep, or `None` to drop it with its subtree. Sibling
/// order is preserved.
pub(crate) fn rebuild<T, F>(forest: Forest<T>, mut finish: F) -> Forest<T>
where
    F: FnMut(TreeNode<T>) -> Option<TreeNode<T>>,
{
    struct Frame<T> {
        node: TreeNode<T>,
        pending: std::vec::IntoIter<TreeNode<T>>,
    }

    let mut out = Vec::with_capacity(forest.len());
    let mut roots = forest.into_iter();
    let mut stack: Vec<Frame<T>> = Vec::new();

    loop {
        let next = match stack.last_mut() {
            Some(frame) => frame.pending.next(),
            None => roots.next(),
        };
        if let Some(mut node) = next {
            let pending = std::mem::take(&mut node.children).into_iter();
            stack.push(Frame { node, pending });
            continue;
        }

        let Some(frame) = stack.pop() else {
            break;
        };
        if let Some(done) = finish(frame.node) {
            match stack.last_mut() {
                Some(parent) => parent.node.children.push(done),
                None => out.push(done),
            }
        }
    }

    out
}

/// Size summary of a forest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForestStats {
    pub roots: usize,
    pub nodes: usize,
    /// Depth of the deepest node; roots are depth 1, an empty forest is 0.
    pub max_depth: usize,
    pub expanded: usize,
}

/// Compute [`ForestStats`] for `forest`.
#[must_use]
pub fn stats<T>(forest: &[TreeNode<T>]) -> ForestStats {
    let mut acc = ForestStats {
        roots: forest.len(),
        ..ForestStats::default()
    };
    for (node, depth) in preorder(forest) {
        acc.nodes += 1;
        acc.max_depth = acc.max_depth.max(depth + 1);
        if node.expanded {
            acc.expanded += 1;
        }
    }
    acc
}
