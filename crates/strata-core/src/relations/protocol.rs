//! The add / promote / delete protocol for one child's parent edges.
//!
//! Every mutation follows the same shape:
//!
//! 1. Read the child's [`ParentEdgeSet`] from the store.
//! 2. Validate the request against it. A failure here is a [`Rejection`]
//!    and nothing is written.
//! 3. Hand the write to the store along with the set's fingerprint. The
//!    store re-checks the fingerprint in the write transaction, so a set
//!    that moved in between comes back as a [`Conflict`].
//! 4. Re-read the set and return it with the outcome.
//!
//! Nothing is retried. A conflict means the caller's view is stale and must
//! be refetched before deciding again.
//!
//! The `*_if_unchanged` variants also take the fingerprint the caller last
//! displayed, so a decision made on an older read is refused even when the
//! set did not move during the call itself.

use serde::Serialize;
use tracing::{info, warn};

use super::cycles::{ParentLookup, detect_cycle_on_add, is_ancestor};
use super::edges::{
    AttachmentState, DeleteRelationship, EdgeSetFingerprint, NewRelationship, ParentEdgeSet,
};
use super::error::{Conflict, RelationError, Rejection};
use crate::model::{Category, CategoryRelationship};
use crate::store::RelationshipStore;

/// Behaviour switches for [`RelationshipProtocol`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolOptions {
    /// When the primary edge is deleted, promote the oldest remaining edge
    /// in the same transaction instead of leaving the child without a
    /// primary.
    pub auto_promote_oldest: bool,
}

/// Result of [`RelationshipProtocol::add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub relationship: CategoryRelationship,
    pub edges: ParentEdgeSet,
}

/// Result of [`RelationshipProtocol::promote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromoteOutcome {
    pub edges: ParentEdgeSet,
    /// `false` when the edge was already primary.
    pub changed: bool,
    pub previous_primary: Option<String>,
}

/// Result of [`RelationshipProtocol::delete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub edges: ParentEdgeSet,
    /// Entities that were placed through the deleted edge. Advisory only.
    pub affected_entity_count: usize,
    pub removed_primary: bool,
    /// Edge promoted in place of the deleted primary, if auto-promotion is on.
    pub auto_promoted: Option<String>,
}

impl DeleteOutcome {
    /// Returns `true` when the child still has parents but none is primary,
    /// and the caller should ask for a promote.
    #[must_use]
    pub fn needs_primary(&self) -> bool {
        self.edges.state() == AttachmentState::Ambiguous
    }
}

/// Refuse to act on `set` if the caller decided on a different one.
fn check_expected(
    set: &ParentEdgeSet,
    expected: Option<&EdgeSetFingerprint>,
) -> Result<(), RelationError> {
    match expected {
        Some(expected) if &set.fingerprint() != expected => {
            warn!(child_id = set.child_id(), "caller acted on a stale parent set");
            Err(Conflict::StaleEdgeSet {
                child_id: set.child_id().to_string(),
            }
            .into())
        }
        _ => Ok(()),
    }
}

struct StoreLookup<'a, S: ?Sized>(&'a S);

impl<S: RelationshipStore + ?Sized> ParentLookup for StoreLookup<'_, S> {
    fn parent_ids(&self, category_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.0.parent_ids(category_id)?)
    }
}

/// Validates relationship mutations and delegates them to a store.
#[derive(Debug)]
pub struct RelationshipProtocol<'a, S: ?Sized> {
    store: &'a S,
    options: ProtocolOptions,
}

impl<'a, S: RelationshipStore + ?Sized> RelationshipProtocol<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self::with_options(store, ProtocolOptions::default())
    }

    #[must_use]
    pub const fn with_options(store: &'a S, options: ProtocolOptions) -> Self {
        Self { store, options }
    }

    #[must_use]
    pub const fn store(&self) -> &'a S {
        self.store
    }

    #[must_use]
    pub const fn options(&self) -> ProtocolOptions {
        self.options
    }

    /// Current parent edges of `child_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelationError::CategoryNotFound`] for an unknown child.
    pub fn parents(&self, child_id: &str) -> Result<ParentEdgeSet, RelationError> {
        self.store.get_category(child_id)?;
        let edges = self.store.list_parent_relationships(child_id)?;
        Ok(ParentEdgeSet::from_relationships(child_id, edges))
    }

    /// Categories that `child_id` could be attached to right now.
    ///
    /// Besides the child itself and its current parents, descendants of the
    /// child are left out since attaching to them would be refused as a
    /// cycle.
    ///
    /// # Errors
    ///
    /// Returns [`RelationError::CategoryNotFound`] for an unknown child.
    pub fn candidates(&self, child_id: &str) -> Result<Vec<Category>, RelationError> {
        self.store.get_category(child_id)?;
        let lookup = StoreLookup(self.store);
        let mut eligible = Vec::new();
        for candidate in self.store.list_candidate_parents(child_id)? {
            if !is_ancestor(&lookup, child_id, &candidate.id).map_err(RelationError::Store)? {
                eligible.push(candidate);
            }
        }
        Ok(eligible)
    }

    /// Attach `child_id` under `parent_id`.
    ///
    /// The new edge is primary exactly when the child has no primary edge
    /// yet, so the first parent of an unattached child becomes its primary.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] for a self-reference, duplicate edge, or
    /// cycle; [`RelationError::CategoryNotFound`] for unknown categories; a
    /// [`super::Conflict`] if the set changed while validating.
    pub fn add(&self, child_id: &str, parent_id: &str) -> Result<AddOutcome, RelationError> {
        self.add_checked(child_id, parent_id, None)
    }

    /// [`add`](Self::add), refused with [`Conflict::StaleEdgeSet`] unless the
    /// child's set still matches `expected`.
    ///
    /// # Errors
    ///
    /// As [`add`](Self::add).
    pub fn add_if_unchanged(
        &self,
        child_id: &str,
        parent_id: &str,
        expected: &EdgeSetFingerprint,
    ) -> Result<AddOutcome, RelationError> {
        self.add_checked(child_id, parent_id, Some(expected))
    }

    fn add_checked(
        &self,
        child_id: &str,
        parent_id: &str,
        expected: Option<&EdgeSetFingerprint>,
    ) -> Result<AddOutcome, RelationError> {
        if child_id == parent_id {
            return Err(Rejection::SelfReference {
                category_id: child_id.to_string(),
            }
            .into());
        }

        let set = self.parents(child_id)?;
        check_expected(&set, expected)?;
        self.store.get_category(parent_id)?;

        if let Some(existing) = set.edge_from(parent_id) {
            return Err(Rejection::DuplicateEdge {
                child_id: child_id.to_string(),
                parent_id: parent_id.to_string(),
                relationship_id: existing.id.clone(),
            }
            .into());
        }
        if let Some(cycle) = detect_cycle_on_add(&StoreLookup(self.store), child_id, parent_id)
            .map_err(RelationError::Store)?
        {
            return Err(Rejection::Cycle { cycle }.into());
        }

        let request = NewRelationship {
            parent_category_id: parent_id.to_string(),
            child_category_id: child_id.to_string(),
        };
        let relationship = self
            .store
            .create_relationship(&request, &set.fingerprint())?;
        info!(
            child_id,
            parent_id,
            relationship_id = %relationship.id,
            is_primary = relationship.is_primary,
            "parent attached"
        );

        Ok(AddOutcome {
            relationship,
            edges: self.parents(child_id)?,
        })
    }

    /// Make `relationship_id` the primary edge of its child.
    ///
    /// Promoting the current primary is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`super::Conflict`] if the edge is gone or the set changed.
    pub fn promote(&self, relationship_id: &str) -> Result<PromoteOutcome, RelationError> {
        self.promote_checked(relationship_id, None)
    }

    /// [`promote`](Self::promote), refused with [`Conflict::StaleEdgeSet`]
    /// unless the child's set still matches `expected`.
    ///
    /// # Errors
    ///
    /// As [`promote`](Self::promote).
    pub fn promote_if_unchanged(
        &self,
        relationship_id: &str,
        expected: &EdgeSetFingerprint,
    ) -> Result<PromoteOutcome, RelationError> {
        self.promote_checked(relationship_id, Some(expected))
    }

    fn promote_checked(
        &self,
        relationship_id: &str,
        expected: Option<&EdgeSetFingerprint>,
    ) -> Result<PromoteOutcome, RelationError> {
        let target = self.store.get_relationship(relationship_id)?;
        let set = self.parents(&target.child_category_id)?;
        check_expected(&set, expected)?;
        let previous_primary = set.primary().map(|e| e.id.clone());

        if previous_primary.as_deref() == Some(relationship_id) {
            return Ok(PromoteOutcome {
                edges: set,
                changed: false,
                previous_primary,
            });
        }

        let edges = self
            .store
            .promote_relationship(relationship_id, &set.fingerprint())?;
        info!(
            relationship_id,
            child_id = %target.child_category_id,
            previous_primary = ?previous_primary,
            "primary parent changed"
        );

        Ok(PromoteOutcome {
            edges: ParentEdgeSet::from_relationships(target.child_category_id, edges),
            changed: true,
            previous_primary,
        })
    }

    /// Remove one parent edge.
    ///
    /// The child's last edge cannot be removed. Deleting the primary leaves
    /// the child without one unless auto-promotion is enabled; check
    /// [`DeleteOutcome::needs_primary`].
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::WouldEmptyParentSet`] for the last edge, or a
    /// [`super::Conflict`] if the edge is gone or the set changed.
    pub fn delete(&self, relationship_id: &str) -> Result<DeleteOutcome, RelationError> {
        self.delete_checked(relationship_id, None)
    }

    /// [`delete`](Self::delete), refused with [`Conflict::StaleEdgeSet`]
    /// unless the child's set still matches `expected`.
    ///
    /// # Errors
    ///
    /// As [`delete`](Self::delete).
    pub fn delete_if_unchanged(
        &self,
        relationship_id: &str,
        expected: &EdgeSetFingerprint,
    ) -> Result<DeleteOutcome, RelationError> {
        self.delete_checked(relationship_id, Some(expected))
    }

    fn delete_checked(
        &self,
        relationship_id: &str,
        expected: Option<&EdgeSetFingerprint>,
    ) -> Result<DeleteOutcome, RelationError> {
        let target = self.store.get_relationship(relationship_id)?;
        let child_id = target.child_category_id.as_str();
        let set = self.parents(child_id)?;
        check_expected(&set, expected)?;

        if set.len() <= 1 {
            return Err(Rejection::WouldEmptyParentSet {
                child_id: child_id.to_string(),
                relationship_id: relationship_id.to_string(),
            }
            .into());
        }

        let removed_primary = target.is_primary;
        let replacement = if removed_primary && self.options.auto_promote_oldest {
            set.oldest_other(relationship_id).map(|e| e.id.clone())
        } else {
            None
        };

        let receipt = self.store.delete_relationship(
            &DeleteRelationship {
                relationship_id: relationship_id.to_string(),
                replacement_primary: replacement.clone(),
            },
            &set.fingerprint(),
        )?;

        let outcome = DeleteOutcome {
            edges: self.parents(child_id)?,
            affected_entity_count: receipt.affected_entity_count,
            removed_primary,
            auto_promoted: replacement,
        };
        if outcome.needs_primary() {
            warn!(
                child_id,
                relationship_id,
                remaining = outcome.edges.len(),
                "primary parent removed; child has no primary until one is promoted"
            );
        } else {
            info!(
                child_id,
                relationship_id,
                affected_entity_count = outcome.affected_entity_count,
                "parent detached"
            );
        }
        Ok(outcome)
    }
}
