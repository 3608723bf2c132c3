//! Classification categories and the parent edges between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::TreeItem;

/// A classification node. Categories carry no parent pointer of their own;
/// placement is expressed through [`CategoryRelationship`] edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Classification tag (e.g. `asset`, `control`, `risk_source`).
    pub entity_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub entity_category: String,
    pub description: Option<String>,
}

impl NewCategory {
    #[must_use]
    pub fn new(name: impl Into<String>, entity_category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_category: entity_category.into(),
            description: None,
        }
    }
}

/// A directed parent → child edge between two categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRelationship {
    pub id: String,
    pub parent_category_id: String,
    pub child_category_id: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// An entity classified under a category.
///
/// `placement_relationship_id` records the parent edge the entity was
/// placed through (the category's primary edge at classification time). It
/// is cleared when that edge is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEntity {
    pub entity_id: String,
    pub category_id: String,
    pub placement_relationship_id: Option<String>,
    pub classified_at: DateTime<Utc>,
}

/// A category positioned under its primary parent, for tree rendering.
///
/// Since every child has at most one primary edge and the edge graph is
/// acyclic, primary edges alone always form a forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedCategory {
    #[serde(flatten)]
    pub category: Category,
    pub primary_parent_id: Option<String>,
    /// Number of parent edges, primary included.
    pub parent_count: usize,
}

impl TreeItem for PlacedCategory {
    fn node_id(&self) -> &str {
        &self.category.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.primary_parent_id.as_deref()
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.category.name.as_str(),
            self.category.entity_category.as_str(),
        ];
        fields.extend(self.category.description.as_deref());
        fields
    }
}

/// Pair each category with its primary parent.
///
/// `edges` may contain any mix of relationships; only primary ones decide
/// placement, all of them count toward `parent_count`.
#[must_use]
pub fn place_categories(
    categories: Vec<Category>,
    edges: &[CategoryRelationship],
) -> Vec<PlacedCategory> {
    categories
        .into_iter()
        .map(|category| {
            let mut primary_parent_id = None;
            let mut parent_count = 0;
            for edge in edges.iter().filter(|e| e.child_category_id == category.id) {
                parent_count += 1;
                if edge.is_primary {
                    primary_parent_id = Some(edge.parent_category_id.clone());
                }
            }
            PlacedCategory {
                category,
                primary_parent_id,
                parent_count,
            }
        })
        .collect()
}
