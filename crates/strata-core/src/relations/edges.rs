//! One child's incoming parent edges.
//!
//! A [`ParentEdgeSet`] is the unit of work for every relationship mutation:
//! the protocol reads it, validates a request against it, and hands its
//! [`EdgeSetFingerprint`] to the store so the write only lands if nobody
//! changed the set in between.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::model::CategoryRelationship;

/// Where a child category stands with respect to its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttachmentState {
    /// No parent edges.
    Unattached,
    /// At least one edge, exactly one of them primary.
    Attached { primary: String },
    /// At least one edge but no primary (after the primary was deleted), or
    /// more than one primary in corrupt data. A promote resolves it.
    Ambiguous,
}

impl AttachmentState {
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        matches!(self, Self::Attached { .. })
    }
}

/// Digest of an edge set, compared by the store before it writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EdgeSetFingerprint(String);

impl EdgeSetFingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeSetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text that is not a fingerprint (64 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not an edge-set fingerprint (expected 64 hex characters)")]
pub struct InvalidFingerprint(pub String);

impl FromStr for EdgeSetFingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(InvalidFingerprint(s.to_string()))
        }
    }
}

/// The incoming edges of a single child category, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentEdgeSet {
    child_id: String,
    edges: Vec<CategoryRelationship>,
}

impl ParentEdgeSet {
    /// An empty set for `child_id`.
    #[must_use]
    pub fn new(child_id: impl Into<String>) -> Self {
        Self {
            child_id: child_id.into(),
            edges: Vec::new(),
        }
    }

    /// Collect the edges of `child_id` from `relationships`.
    ///
    /// Edges that belong to another child are dropped with a warning. The
    /// result is ordered by creation time, then id.
    #[must_use]
    pub fn from_relationships(
        child_id: impl Into<String>,
        relationships: impl IntoIterator<Item = CategoryRelationship>,
    ) -> Self {
        let child_id = child_id.into();
        let mut edges: Vec<CategoryRelationship> = relationships
            .into_iter()
            .filter(|rel| {
                let ours = rel.child_category_id == child_id;
                if !ours {
                    warn!(
                        child_id = %child_id,
                        relationship_id = %rel.id,
                        other_child = %rel.child_category_id,
                        "dropping edge of another child from parent set"
                    );
                }
                ours
            })
            .collect();
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self { child_id, edges }
    }

    #[must_use]
    pub fn child_id(&self) -> &str {
        &self.child_id
    }

    #[must_use]
    pub fn edges(&self) -> &[CategoryRelationship] {
        &self.edges
    }

    #[must_use]
    pub fn into_edges(self) -> Vec<CategoryRelationship> {
        self.edges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The primary edge, if there is exactly one.
    #[must_use]
    pub fn primary(&self) -> Option<&CategoryRelationship> {
        let mut primaries = self.edges.iter().filter(|e| e.is_primary);
        match (primaries.next(), primaries.next()) {
            (Some(edge), None) => Some(edge),
            _ => None,
        }
    }

    #[must_use]
    pub fn primary_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_primary).count()
    }

    /// Look up an edge of this set by relationship id.
    #[must_use]
    pub fn find(&self, relationship_id: &str) -> Option<&CategoryRelationship> {
        self.edges.iter().find(|e| e.id == relationship_id)
    }

    /// The edge from `parent_id`, if one exists.
    #[must_use]
    pub fn edge_from(&self, parent_id: &str) -> Option<&CategoryRelationship> {
        self.edges.iter().find(|e| e.parent_category_id == parent_id)
    }

    #[must_use]
    pub fn has_parent(&self, parent_id: &str) -> bool {
        self.edge_from(parent_id).is_some()
    }

    #[must_use]
    pub fn parent_ids(&self) -> Vec<&str> {
        self.edges
            .iter()
            .map(|e| e.parent_category_id.as_str())
            .collect()
    }

    #[must_use]
    pub fn state(&self) -> AttachmentState {
        if self.edges.is_empty() {
            return AttachmentState::Unattached;
        }
        self.primary()
            .map_or(AttachmentState::Ambiguous, |edge| AttachmentState::Attached {
                primary: edge.id.clone(),
            })
    }

    /// Oldest edge other than `relationship_id`.
    #[must_use]
    pub fn oldest_other(&self, relationship_id: &str) -> Option<&CategoryRelationship> {
        self.edges.iter().find(|e| e.id != relationship_id)
    }

    /// Whether an edge added now should be primary: only when nothing else
    /// currently is.
    #[must_use]
    pub fn next_edge_is_primary(&self) -> bool {
        self.primary_count() == 0
    }

    /// Digest of `(id, parent, is_primary)` over the whole set.
    ///
    /// Independent of edge order; any add, delete, or primary flip changes
    /// it.
    #[must_use]
    pub fn fingerprint(&self) -> EdgeSetFingerprint {
        let mut lines: Vec<String> = self
            .edges
            .iter()
            .map(|e| format!("{}|{}|{}", e.id, e.parent_category_id, u8::from(e.is_primary)))
            .collect();
        lines.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(self.child_id.as_bytes());
        for line in &lines {
            hasher.update(b"\n");
            hasher.update(line.as_bytes());
        }
        EdgeSetFingerprint(hasher.finalize().to_hex().to_string())
    }

    /// Describe every edge-set invariant this set breaks.
    ///
    /// Returns an empty vec for a healthy set. An `Ambiguous` set after a
    /// primary deletion is reported as well, since it needs a promote.
    #[must_use]
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let primaries = self.primary_count();
        if primaries > 1 {
            problems.push(format!(
                "{} has {primaries} primary edges",
                self.child_id
            ));
        } else if primaries == 0 && !self.edges.is_empty() {
            problems.push(format!("{} has parents but no primary edge", self.child_id));
        }

        for (i, edge) in self.edges.iter().enumerate() {
            if edge.parent_category_id == self.child_id {
                problems.push(format!("{} is its own parent ({})", self.child_id, edge.id));
            }
            if self.edges[..i]
                .iter()
                .any(|prev| prev.parent_category_id == edge.parent_category_id)
            {
                problems.push(format!(
                    "{} has a duplicate edge from {}",
                    self.child_id, edge.parent_category_id
                ));
            }
        }

        problems
    }
}

/// Request to create one edge.
///
/// Carries no primary flag: the store sets it from the edge set it reloads
/// inside the write, per [`ParentEdgeSet::next_edge_is_primary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelationship {
    pub parent_category_id: String,
    pub child_category_id: String,
}

/// Request to delete one edge, optionally promoting another in the same
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRelationship {
    pub relationship_id: String,
    /// Edge to make primary once the deleted one is gone. Entities that
    /// were placed through the deleted edge move to this one.
    pub replacement_primary: Option<String>,
}

/// What the store reports after a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteReceipt {
    /// Entities that were placed through the deleted edge.
    pub affected_entity_count: usize,
}
