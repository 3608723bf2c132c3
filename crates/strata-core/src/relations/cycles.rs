//! Cycle detection for category parent edges.
//!
//! # Overview
//!
//! Adding the edge `parent → child` closes a cycle exactly when `child` is
//! already an ancestor of `parent`. Detection is a DFS that starts at the
//! proposed parent and follows parent edges upward, looking for the child.
//!
//! # Design
//!
//! - **Lookup-driven**: the full category graph is never loaded. The search
//!   asks a [`ParentLookup`] for one node's parents at a time, so it costs
//!   O(ancestors of the proposed parent), not O(graph).
//! - **Reject, don't warn**: a cycle would make a category its own ancestor,
//!   so the caller turns a found path into a typed rejection.

#![allow(clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

/// Source of parent ids for one category at a time.
pub trait ParentLookup {
    /// Ids of every direct parent of `category_id` (primary or not).
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn parent_ids(&self, category_id: &str) -> anyhow::Result<Vec<String>>;
}

impl ParentLookup for HashMap<String, Vec<String>> {
    fn parent_ids(&self, category_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.get(category_id).cloned().unwrap_or_default())
    }
}

/// The ancestry chain a new edge would close into a loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CyclePath {
    /// Categories from the proposed parent upward to the child, following
    /// existing parent edges. For the edge `B → A` when `A → B` exists the
    /// path is `["B", "A"]`.
    pub path: Vec<String>,

    /// Parent side of the rejected edge.
    pub edge_parent: String,

    /// Child side of the rejected edge.
    pub edge_child: String,
}

impl CyclePath {
    /// Number of categories in the loop.
    #[must_use]
    pub fn cycle_len(&self) -> usize {
        self.path.len()
    }

    /// Returns `true` for a two-category loop (`A ↔ B`).
    #[must_use]
    pub fn is_mutual(&self) -> bool {
        self.cycle_len() == 2
    }
}

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mutual() {
            write!(
                f,
                "cycle detected: '{}' is already a parent of '{}'",
                self.edge_child, self.edge_parent
            )
        } else {
            write!(
                f,
                "cycle detected: '{}' is already an ancestor of '{}' ({})",
                self.edge_child,
                self.edge_parent,
                self.path.join(" → ")
            )
        }
    }
}

/// Would adding the edge `parent → child` make `child` its own ancestor?
///
/// Returns the ancestry path that proves the cycle, or `None` if the edge is
/// safe. Self-edges are not treated here; callers reject those separately.
///
/// # Errors
///
/// Propagates any [`ParentLookup`] failure.
pub fn detect_cycle_on_add<L: ParentLookup + ?Sized>(
    lookup: &L,
    child: &str,
    parent: &str,
) -> anyhow::Result<Option<CyclePath>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut came_from: HashMap<String, String> = HashMap::new();

    if !dfs_find_ancestor(lookup, parent, child, &mut visited, &mut came_from)? {
        return Ok(None);
    }

    Ok(Some(CyclePath {
        path: reconstruct_path(&came_from, parent, child),
        edge_parent: parent.to_string(),
        edge_child: child.to_string(),
    }))
}

/// Returns `true` if `ancestor` is reachable from `category` by following
/// parent edges (or equals it).
///
/// # Errors
///
/// Propagates any [`ParentLookup`] failure.
pub fn is_ancestor<L: ParentLookup + ?Sized>(
    lookup: &L,
    ancestor: &str,
    category: &str,
) -> anyhow::Result<bool> {
    let mut visited = HashSet::new();
    let mut came_from = HashMap::new();
    dfs_find_ancestor(lookup, category, ancestor, &mut visited, &mut came_from)
}

/// DFS upward from `start` looking for `target`, recording each step in
/// `came_from` so the path can be rebuilt.
///
/// Uses an explicit stack, so the depth of the category graph is bounded
/// only by memory. A `came_from` entry is only ever written for a category
/// that has not been visited yet, and always points at one that has.
fn dfs_find_ancestor<L: ParentLookup + ?Sized>(
    lookup: &L,
    start: &str,
    target: &str,
    visited: &mut HashSet<String>,
    came_from: &mut HashMap<String, String>,
) -> anyhow::Result<bool> {
    let mut stack = vec![start.to_string()];

    while let Some(current) = stack.pop() {
        if current == target {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        for parent in lookup.parent_ids(&current)?.into_iter().rev() {
            if visited.contains(&parent) {
                continue;
            }
            came_from.insert(parent.clone(), current.clone());
            stack.push(parent);
        }
    }

    Ok(false)
}

/// Walk `came_from` back from `end` to `start` and return `[start, …, end]`.
fn reconstruct_path(came_from: &HashMap<String, String>, start: &str, end: &str) -> Vec<String> {
    let mut chain = vec![end.to_string()];
    let mut current = end;
    while current != start {
        match came_from.get(current) {
            Some(prev) => {
                chain.push(prev.clone());
                current = prev;
            }
            None => break,
        }
    }
    chain.reverse();
    chain
}
