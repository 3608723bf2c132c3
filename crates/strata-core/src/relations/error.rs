use serde::Serialize;

use super::cycles::CyclePath;
use crate::error::ErrorCode;
use crate::store::StoreError;

/// A mutation refused by local validation, before any write.
///
/// Rejections are user-actionable: the request itself is wrong for the
/// current edge set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error("'{parent_id}' is already a parent of '{child_id}'")]
    DuplicateEdge {
        child_id: String,
        parent_id: String,
        relationship_id: String,
    },

    #[error("category '{category_id}' cannot be its own parent")]
    SelfReference { category_id: String },

    #[error("{cycle}")]
    Cycle { cycle: CyclePath },

    #[error(
        "relationship '{relationship_id}' is the only parent of '{child_id}'; \
         removing it would leave the category without parents"
    )]
    WouldEmptyParentSet {
        child_id: String,
        relationship_id: String,
    },
}

impl Rejection {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateEdge { .. } => ErrorCode::DuplicateEdge,
            Self::SelfReference { .. } => ErrorCode::SelfReference,
            Self::Cycle { .. } => ErrorCode::CycleDetected,
            Self::WouldEmptyParentSet { .. } => ErrorCode::WouldEmptyParentSet,
        }
    }
}

/// The authoritative state moved under the caller.
///
/// The right response is to refetch the parent set and re-present it, not to
/// resubmit the same mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    #[error("relationship '{relationship_id}' no longer exists")]
    RelationshipGone { relationship_id: String },

    #[error("parent set of '{child_id}' changed since it was read")]
    StaleEdgeSet { child_id: String },
}

impl Conflict {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RelationshipGone { .. } => ErrorCode::RelationshipNotFound,
            Self::StaleEdgeSet { .. } => ErrorCode::StaleEdgeSet,
        }
    }
}

/// Failure of a relationship operation.
#[derive(Debug, thiserror::Error)]
pub enum RelationError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error("category not found: '{0}'")]
    CategoryNotFound(String),

    /// Transport or backend failure, propagated unchanged.
    #[error(transparent)]
    Store(anyhow::Error),
}

impl RelationError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected(r) => r.code(),
            Self::Conflict(c) => c.code(),
            Self::CategoryNotFound(_) => ErrorCode::CategoryNotFound,
            Self::Store(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Returns `true` if the caller should refetch the parent set before
    /// deciding what to do next.
    #[must_use]
    pub const fn requires_refetch(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StoreError> for RelationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(r) => Self::Rejected(r),
            StoreError::Conflict(c) => Self::Conflict(c),
            StoreError::NotFound {
                entity: "relationship",
                id,
            } => Self::Conflict(Conflict::RelationshipGone {
                relationship_id: id,
            }),
            StoreError::NotFound { id, .. } => Self::CategoryNotFound(id),
            StoreError::Backend(e) => Self::Store(e),
            other => Self::Store(anyhow::Error::new(other)),
        }
    }
}
