//! Multi-parent category relationships.
//!
//! A category may sit under several parents at once. Each of its incoming
//! edges is either primary or not, and the primary edge decides where the
//! category (and the entities classified under it) is shown by default.
//!
//! Edge-set rules:
//!
//! - at most one edge per `(parent, child)` pair
//! - no self-edges and no cycles through any chain of edges
//! - a child with parents has exactly one primary edge, with one exception:
//!   deleting the primary leaves the child [`AttachmentState::Ambiguous`]
//!   until a promote (unless [`ProtocolOptions::auto_promote_oldest`] is set)
//!
//! [`RelationshipProtocol`] is the only writer. It validates locally, then
//! asks the store to write under an [`EdgeSetFingerprint`] so concurrent
//! sessions surface as [`Conflict`]s instead of silent overwrites.

pub mod cycles;
pub mod edges;
pub mod error;
pub mod protocol;

pub use cycles::{CyclePath, ParentLookup, detect_cycle_on_add};
pub use edges::{
    AttachmentState, DeleteReceipt, DeleteRelationship, EdgeSetFingerprint, InvalidFingerprint,
    NewRelationship, ParentEdgeSet,
};
pub use error::{Conflict, Rejection, RelationError};
pub use protocol::{
    AddOutcome, DeleteOutcome, PromoteOutcome, ProtocolOptions, RelationshipProtocol,
};
