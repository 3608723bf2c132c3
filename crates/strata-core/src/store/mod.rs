//! Persistence collaborator.
//!
//! The engine never assumes where records live. Everything it needs from
//! storage goes through [`OrgUnitStore`] and [`RelationshipStore`];
//! [`SqliteStore`] is the implementation the CLI uses.
//!
//! Relationship writes carry the [`EdgeSetFingerprint`] the caller validated
//! against. An implementation must compare it with the current edge set
//! inside the same transaction as the write and fail with
//! [`Conflict::StaleEdgeSet`] on mismatch.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::ErrorCode;
use crate::model::{
    Category, CategoryRelationship, ClassifiedEntity, NewCategory, NewOrgUnit, OrgUnit,
    OrgUnitPatch, ScopeFilter,
};
use crate::relations::{
    Conflict, DeleteReceipt, DeleteRelationship, EdgeSetFingerprint, NewRelationship, Rejection,
};

/// Failure reported by a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("org unit '{unit_id}' still has {child_count} child unit(s)")]
    HasChildren { unit_id: String, child_count: usize },

    /// The proposed parent is the unit itself or one of its descendants.
    #[error("moving '{unit_id}' under '{proposed_parent}' would create a cycle")]
    UnitCycle {
        unit_id: String,
        proposed_parent: String,
    },

    /// An edge invariant refused at the authoritative store.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { entity, .. } => match *entity {
                "category" => ErrorCode::CategoryNotFound,
                "relationship" => ErrorCode::RelationshipNotFound,
                _ => ErrorCode::UnitNotFound,
            },
            Self::Conflict(c) => c.code(),
            Self::HasChildren { .. } => ErrorCode::UnitHasChildren,
            Self::UnitCycle { .. } => ErrorCode::CycleDetected,
            Self::Rejected(r) => r.code(),
            Self::Backend(e) => backend_code(e),
        }
    }
}

fn backend_code(error: &anyhow::Error) -> ErrorCode {
    let corrupt = error.chain().any(|cause| {
        cause
            .downcast_ref::<rusqlite::Error>()
            .and_then(rusqlite::Error::sqlite_error_code)
            .is_some_and(|code| {
                matches!(
                    code,
                    rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
                )
            })
    });
    if corrupt {
        ErrorCode::CorruptDatabase
    } else {
        ErrorCode::DatabaseWriteFailed
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(anyhow::Error::new(e))
    }
}

/// Storage for the single-parent org-unit hierarchy.
pub trait OrgUnitStore {
    /// Every unit visible through `scope`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn list_org_units(&self, scope: &ScopeFilter) -> Result<Vec<OrgUnit>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no unit has this id.
    fn get_org_unit(&self, id: &str) -> Result<OrgUnit, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the named parent does not exist.
    fn create_org_unit(&self, fields: &NewOrgUnit) -> Result<OrgUnit, StoreError>;

    /// A parent change is checked against the stored hierarchy inside the
    /// write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown unit or parent, or
    /// [`StoreError::UnitCycle`] if the new parent lies in the unit's own
    /// subtree.
    fn update_org_unit(&self, id: &str, patch: &OrgUnitPatch) -> Result<OrgUnit, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::HasChildren`] if any unit still names this one
    /// as its parent, or [`StoreError::NotFound`].
    fn delete_org_unit(&self, id: &str) -> Result<(), StoreError>;
}

/// Storage for categories and their parent edges.
pub trait RelationshipStore {
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no category has this id.
    fn get_category(&self, id: &str) -> Result<Category, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn create_category(&self, fields: &NewCategory) -> Result<Category, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] with entity `"relationship"` if the
    /// edge does not exist.
    fn get_relationship(&self, id: &str) -> Result<CategoryRelationship, StoreError>;

    /// Incoming edges of `child_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn list_parent_relationships(
        &self,
        child_id: &str,
    ) -> Result<Vec<CategoryRelationship>, StoreError>;

    /// Every edge in the graph.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn list_relationships(&self) -> Result<Vec<CategoryRelationship>, StoreError>;

    /// Categories that could become a new parent of `child_id`: every
    /// category except the child and its current parents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn list_candidate_parents(&self, child_id: &str) -> Result<Vec<Category>, StoreError>;

    /// Parent ids of one category, for ancestor walks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn parent_ids(&self, category_id: &str) -> Result<Vec<String>, StoreError>;

    /// Insert one edge if the child's edge set still matches `expected`.
    ///
    /// The new edge is primary iff the child currently has no primary edge,
    /// so the one-primary rule holds whatever the caller believed.
    ///
    /// # Errors
    ///
    /// Returns [`Conflict::StaleEdgeSet`] on fingerprint mismatch, or a
    /// [`Rejection`] if the row breaks an edge invariant.
    fn create_relationship(
        &self,
        request: &NewRelationship,
        expected: &EdgeSetFingerprint,
    ) -> Result<CategoryRelationship, StoreError>;

    /// Demote the child's current primary and promote `relationship_id` in
    /// one transaction. Returns the child's updated edge set.
    ///
    /// # Errors
    ///
    /// Returns a [`Conflict`] if the edge is gone or the set changed.
    fn promote_relationship(
        &self,
        relationship_id: &str,
        expected: &EdgeSetFingerprint,
    ) -> Result<Vec<CategoryRelationship>, StoreError>;

    /// Delete one edge, optionally promoting a replacement in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`Conflict`] if the edge is gone or the set changed, or
    /// [`Rejection::WouldEmptyParentSet`] if it is the child's last edge.
    fn delete_relationship(
        &self,
        request: &DeleteRelationship,
        expected: &EdgeSetFingerprint,
    ) -> Result<DeleteReceipt, StoreError>;

    /// Classify `entity_id` under `category_id`, placed through the
    /// category's current primary edge. Re-classifying moves the entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown category.
    fn classify_entity(
        &self,
        entity_id: &str,
        category_id: &str,
    ) -> Result<ClassifiedEntity, StoreError>;

    /// Entities classified under `category_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn list_classified_entities(
        &self,
        category_id: &str,
    ) -> Result<Vec<ClassifiedEntity>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_code_follows_entity() {
        assert_eq!(
            StoreError::not_found("org unit", "pl-x").code(),
            ErrorCode::UnitNotFound
        );
        assert_eq!(
            StoreError::not_found("relationship", "rel-x").code(),
            ErrorCode::RelationshipNotFound
        );
    }

    #[test]
    fn sqlite_corruption_maps_to_corrupt_database() {
        let err = StoreError::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        ));
        assert_eq!(err.code(), ErrorCode::CorruptDatabase);

        let other = StoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(other.code(), ErrorCode::DatabaseWriteFailed);
    }
}
