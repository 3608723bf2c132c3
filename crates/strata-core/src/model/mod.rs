//! Plain data records shared by the tree engine, the relationship protocol,
//! and the persistence layer.

pub mod category;
pub mod id;
pub mod org_unit;

pub use category::{
    Category, CategoryRelationship, ClassifiedEntity, NewCategory, PlacedCategory,
    place_categories,
};
pub use org_unit::{NewOrgUnit, OrgUnit, OrgUnitPatch, ScopeFilter};
