//! Ancestor-preserving search.
//!
//! Filtering reduces from the leaves upward: a node survives if it matches
//! the query itself or if any descendant survives. A surviving node with
//! surviving children is forced open so the match is visible; a node that
//! survives only on its own match keeps its previous flag. Everything else is
//! dropped, not hidden.
//!
//! Matching is a case-insensitive substring test over
//! [`TreeItem::search_fields`], using Unicode lowercasing so accented
//! names match regardless of case.

use super::{Forest, TreeItem, TreeNode, preorder, rebuild};

/// Filter `forest` down to root-to-match paths for `query`.
///
/// An empty (or whitespace-only) query returns the forest untouched,
/// expand state included.
#[must_use]
pub fn filter_tree<T: TreeItem>(forest: Forest<T>, query: &str) -> Forest<T> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return forest;
    }
    rebuild(forest, |mut node| {
        if node.children.is_empty() && !item_matches(&node.item, &needle) {
            return None;
        }
        node.expanded |= !node.children.is_empty();
        Some(node)
    })
}

fn item_matches<T: TreeItem>(item: &T, needle: &str) -> bool {
    item.search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Returns `true` if `item` matches `query` directly (ignoring descendants).
///
/// An empty query matches everything.
#[must_use]
pub fn matches_query<T: TreeItem>(item: &T, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    needle.is_empty() || item_matches(item, &needle)
}

/// Number of nodes in `forest` that match `query` directly.
#[must_use]
pub fn count_matches<T: TreeItem>(forest: &[TreeNode<T>], query: &str) -> usize {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return 0;
    }

    preorder(forest)
        .filter(|(node, _)| item_matches(&node.item, &needle))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_support::{Node, named};
    use crate::tree::{build_tree, collapse_all, find_node, flatten, toggle_node};

    fn org() -> Forest<Node> {
        build_tree(vec![
            named("dsi", None, "Direction SI"),
            named("infra", Some("dsi"), "Infrastructure"),
            named("net", Some("infra"), "Sécurité Réseau"),
            named("fw", Some("net"), "Pare-feu"),
            named("apps", Some("dsi"), "Applications"),
            named("rh", None, "Ressources Humaines"),
            named("paie", Some("rh"), "Paie"),
        ])
    }

    fn ids(forest: &[TreeNode<Node>]) -> Vec<String> {
        flatten(forest).into_iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn leaf_match_keeps_ancestor_chain_expanded() {
        let filtered = filter_tree(collapse_all(org()), "pare");

        assert_eq!(ids(&filtered), vec!["dsi", "infra", "net", "fw"]);
        for id in ["dsi", "infra", "net"] {
            assert!(find_node(&filtered, id).expect(id).expanded, "{id} open");
        }
        assert!(!find_node(&filtered, "fw").expect("fw").expanded);
    }

    #[test]
    fn sibling_subtrees_without_match_are_dropped() {
        let filtered = filter_tree(org(), "pare-feu");
        assert!(find_node(&filtered, "apps").is_none());
        assert!(find_node(&filtered, "rh").is_none());
    }

    #[test]
    fn matching_is_case_and_accent_case_insensitive() {
        let filtered = filter_tree(org(), "SÉCURITÉ");
        assert_eq!(ids(&filtered), vec!["dsi", "infra", "net"]);
    }

    #[test]
    fn direct_match_without_matching_children_keeps_own_flag() {
        let forest = toggle_node(org(), "rh");
        assert!(!find_node(&forest, "rh").expect("rh").expanded);

        let filtered = filter_tree(forest, "ressources");
        assert_eq!(ids(&filtered), vec!["rh"]);
        let rh = find_node(&filtered, "rh").expect("rh");
        assert!(!rh.expanded);
        assert!(rh.children.is_empty(), "non-matching children are dropped");
    }

    #[test]
    fn empty_query_is_identity() {
        let forest = toggle_node(org(), "infra");
        assert_eq!(filter_tree(forest.clone(), ""), forest);
        assert_eq!(filter_tree(forest.clone(), "   "), forest);
    }

    #[test]
    fn no_match_yields_empty_forest() {
        assert!(filter_tree(org(), "zzz").is_empty());
    }

    #[test]
    fn count_matches_counts_direct_hits() {
        let forest = org();
        assert_eq!(count_matches(&forest, "re"), 4);
        assert_eq!(count_matches(&forest, ""), 0);
        assert!(matches_query(&forest[0].item, "direction"));
        assert!(matches_query(&forest[0].item, ""));
    }

    #[test]
    fn deep_chain_filters_to_single_path() {
        const DEPTH: usize = 12_000;
        let chain: Vec<Node> = (0..DEPTH)
            .map(|i| {
                let parent = (i > 0).then(|| format!("n{}", i - 1));
                named(&format!("n{i}"), parent.as_deref(), &format!("Niveau {i}"))
            })
            .collect();

        let filtered = filter_tree(build_tree(chain), "niveau 11999");
        assert_eq!(ids(&filtered).len(), DEPTH);
        assert!(find_node(&filtered, "n6000").expect("ancestor kept").expanded);
        assert_eq!(count_matches(&filtered, "niveau 1199"), 11);
    }
}
