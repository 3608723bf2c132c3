//! Single-parent rules for org units.
//!
//! Answers the hierarchy questions the pôle screens ask before a write
//! reaches the store:
//!
//! - What are the children / the full subtree / the ancestors of a unit?
//! - Is a reparenting operation valid?
//! - May a unit be deleted?
//!
//! # Cycle prevention
//!
//! [`validate_reparent`] checks that the proposed new parent is not inside
//! the subtree of the unit being moved.
//!
//! # Tenancy
//!
//! A tenant-owned unit may sit under a shared template or under a unit of the
//! same tenant. A shared template may only sit under another template.
//!
//! # Error handling
//!
//! All functions return [`HierarchyError`], which separates domain
//! rejections (not found, cycle, tenant mismatch, children present) from
//! store failures.

#![allow(clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::info;

use crate::error::ErrorCode;
use crate::model::{NewOrgUnit, OrgUnit, OrgUnitPatch, ScopeFilter};
use crate::store::{OrgUnitStore, StoreError};

/// Errors that can occur in org-unit hierarchy operations.
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error("org unit not found: '{0}'")]
    UnitNotFound(String),

    #[error("parent org unit not found: '{0}'")]
    ParentNotFound(String),

    #[error("org unit '{0}' cannot be its own parent")]
    SelfParent(String),

    #[error("moving '{unit_id}' under '{proposed_parent}' would create a cycle")]
    CycleDetected {
        unit_id: String,
        proposed_parent: String,
    },

    #[error(
        "org unit '{unit_id}' ({}) cannot sit under '{parent_id}' ({})",
        scope_label(.unit_tenant.as_deref()),
        scope_label(.parent_tenant.as_deref())
    )]
    TenantMismatch {
        unit_id: String,
        unit_tenant: Option<String>,
        parent_id: String,
        parent_tenant: Option<String>,
    },

    #[error("org unit '{unit_id}' still has {child_count} child unit(s)")]
    HasChildren { unit_id: String, child_count: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HierarchyError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnitNotFound(_) | Self::ParentNotFound(_) => ErrorCode::UnitNotFound,
            Self::SelfParent(_) | Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::TenantMismatch { .. } => ErrorCode::TenantMismatch,
            Self::HasChildren { .. } => ErrorCode::UnitHasChildren,
            Self::Store(e) => e.code(),
        }
    }
}

fn scope_label(tenant: Option<&str>) -> String {
    tenant.map_or_else(|| "shared template".to_string(), |t| format!("tenant {t}"))
}

// ---------------------------------------------------------------------------
// Queries over a loaded unit list
// ---------------------------------------------------------------------------

fn find<'a>(units: &'a [OrgUnit], id: &str) -> Option<&'a OrgUnit> {
    units.iter().find(|u| u.id == id)
}

/// Direct children of `parent_id`, in list order.
#[must_use]
pub fn children_of<'a>(units: &'a [OrgUnit], parent_id: &str) -> Vec<&'a OrgUnit> {
    units
        .iter()
        .filter(|u| u.parent_id.as_deref() == Some(parent_id))
        .collect()
}

/// All unit ids in the subtree rooted at `root_id`, including `root_id`.
///
/// BFS order, children in list order. The parent → children index is built
/// once, so the walk is linear in `units`. Malformed cycles are skipped.
#[must_use]
pub fn subtree_ids(units: &[OrgUnit], root_id: &str) -> Vec<String> {
    let mut index: HashMap<&str, Vec<&str>> = HashMap::new();
    for unit in units {
        if let Some(parent_id) = unit.parent_id.as_deref() {
            index.entry(parent_id).or_default().push(&unit.id);
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([root_id]);
    let mut result = Vec::new();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        result.push(current.to_string());
        if let Some(children) = index.get(current) {
            queue.extend(children.iter().filter(|id| !visited.contains(*id)));
        }
    }

    result
}

/// Ancestor chain of a unit, from immediate parent up to the root.
///
/// A dangling parent reference ends the chain (the unit renders as a root
/// in that case). Cycles truncate the chain at the repeat.
///
/// # Errors
///
/// Returns [`HierarchyError::UnitNotFound`] if `unit_id` is not in `units`.
pub fn ancestors<'a>(units: &'a [OrgUnit], unit_id: &str) -> Result<Vec<&'a OrgUnit>, HierarchyError> {
    let start = find(units, unit_id).ok_or_else(|| HierarchyError::UnitNotFound(unit_id.to_string()))?;

    let mut chain = Vec::new();
    let mut visited: HashSet<&str> = HashSet::from([start.id.as_str()]);
    let mut current = start.parent_id.as_deref();

    while let Some(parent_id) = current {
        if !visited.insert(parent_id) {
            break;
        }
        let Some(parent) = find(units, parent_id) else {
            break;
        };
        chain.push(parent);
        current = parent.parent_id.as_deref();
    }

    Ok(chain)
}

/// Validate that `unit_id` may be moved under `new_parent` (`None` = root).
///
/// Checks, in order:
/// 1. The unit exists.
/// 2. The parent exists and is not the unit itself.
/// 3. The parent is not inside the unit's subtree.
/// 4. The parent's tenant is compatible with the unit's.
///
/// # Errors
///
/// Returns the first failing check as a [`HierarchyError`].
pub fn validate_reparent(
    units: &[OrgUnit],
    unit_id: &str,
    new_parent: Option<&str>,
) -> Result<(), HierarchyError> {
    let unit = find(units, unit_id).ok_or_else(|| HierarchyError::UnitNotFound(unit_id.to_string()))?;

    let Some(parent_id) = new_parent else {
        return Ok(());
    };
    if parent_id == unit_id {
        return Err(HierarchyError::SelfParent(unit_id.to_string()));
    }
    let parent =
        find(units, parent_id).ok_or_else(|| HierarchyError::ParentNotFound(parent_id.to_string()))?;

    if subtree_ids(units, unit_id).iter().any(|id| id == parent_id) {
        return Err(HierarchyError::CycleDetected {
            unit_id: unit_id.to_string(),
            proposed_parent: parent_id.to_string(),
        });
    }

    check_tenancy(unit_id, unit.tenant_scope.as_deref(), parent)
}

/// Validate the parent and tenancy of a unit about to be created.
///
/// # Errors
///
/// Returns [`HierarchyError::ParentNotFound`] or
/// [`HierarchyError::TenantMismatch`].
pub fn validate_new_unit(units: &[OrgUnit], fields: &NewOrgUnit) -> Result<(), HierarchyError> {
    let Some(parent_id) = fields.parent_id.as_deref() else {
        return Ok(());
    };
    let parent =
        find(units, parent_id).ok_or_else(|| HierarchyError::ParentNotFound(parent_id.to_string()))?;
    check_tenancy(&fields.name, fields.tenant_scope.as_deref(), parent)
}

fn check_tenancy(
    unit_id: &str,
    unit_tenant: Option<&str>,
    parent: &OrgUnit,
) -> Result<(), HierarchyError> {
    match parent.tenant_scope.as_deref() {
        None => Ok(()),
        Some(owner) if unit_tenant == Some(owner) => Ok(()),
        Some(_) => Err(HierarchyError::TenantMismatch {
            unit_id: unit_id.to_string(),
            unit_tenant: unit_tenant.map(str::to_string),
            parent_id: parent.id.clone(),
            parent_tenant: parent.tenant_scope.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Store-backed operations
// ---------------------------------------------------------------------------

/// Create a unit after validating its parent.
///
/// # Errors
///
/// Returns a validation [`HierarchyError`] or the store's failure.
pub fn create_unit<S: OrgUnitStore + ?Sized>(
    store: &S,
    fields: &NewOrgUnit,
) -> Result<OrgUnit, HierarchyError> {
    if fields.parent_id.is_some() {
        let units = store.list_org_units(&ScopeFilter::All)?;
        validate_new_unit(&units, fields)?;
    }
    let unit = store.create_org_unit(fields)?;
    info!(unit_id = %unit.id, parent_id = ?unit.parent_id, "org unit created");
    Ok(unit)
}

/// Apply `patch` to a unit, validating any parent change first.
///
/// # Errors
///
/// Returns a validation [`HierarchyError`] or the store's failure.
pub fn update_unit<S: OrgUnitStore + ?Sized>(
    store: &S,
    unit_id: &str,
    patch: &OrgUnitPatch,
) -> Result<OrgUnit, HierarchyError> {
    if let Some(new_parent) = &patch.parent_id {
        let units = store.list_org_units(&ScopeFilter::All)?;
        validate_reparent(&units, unit_id, new_parent.as_deref())?;
    }
    let unit = store.update_org_unit(unit_id, patch).map_err(|e| match e {
        StoreError::NotFound { id, .. } if id == unit_id => HierarchyError::UnitNotFound(id),
        StoreError::NotFound { id, .. } => HierarchyError::ParentNotFound(id),
        StoreError::UnitCycle {
            unit_id,
            proposed_parent,
        } => HierarchyError::CycleDetected {
            unit_id,
            proposed_parent,
        },
        other => HierarchyError::Store(other),
    })?;
    info!(unit_id, parent_id = ?unit.parent_id, "org unit updated");
    Ok(unit)
}

/// Move a unit under `new_parent`, or to the root level with `None`.
///
/// # Errors
///
/// See [`update_unit`].
pub fn reparent_unit<S: OrgUnitStore + ?Sized>(
    store: &S,
    unit_id: &str,
    new_parent: Option<&str>,
) -> Result<OrgUnit, HierarchyError> {
    update_unit(
        store,
        unit_id,
        &OrgUnitPatch::reparent(new_parent.map(str::to_string)),
    )
}

/// Delete a childless unit.
///
/// # Errors
///
/// Returns [`HierarchyError::HasChildren`] if the unit still has children,
/// [`HierarchyError::UnitNotFound`] if it does not exist, or the store's
/// failure.
pub fn delete_unit<S: OrgUnitStore + ?Sized>(store: &S, unit_id: &str) -> Result<(), HierarchyError> {
    store.delete_org_unit(unit_id).map_err(|e| match e {
        StoreError::HasChildren {
            unit_id,
            child_count,
        } => HierarchyError::HasChildren {
            unit_id,
            child_count,
        },
        StoreError::NotFound { id, .. } => HierarchyError::UnitNotFound(id),
        other => HierarchyError::Store(other),
    })?;
    info!(unit_id, "org unit deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn unit(id: &str, parent: Option<&str>, tenant: Option<&str>) -> OrgUnit {
        let now = Utc::now();
        OrgUnit {
            id: id.to_string(),
            name: format!("Pôle {id}"),
            short_code: None,
            description: None,
            parent_id: parent.map(str::to_string),
            tenant_scope: tenant.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample() -> Vec<OrgUnit> {
        vec![
            unit("root", None, None),
            unit("a", Some("root"), None),
            unit("a1", Some("a"), Some("acme")),
            unit("a1x", Some("a1"), Some("acme")),
            unit("b", Some("root"), None),
            unit("g", None, Some("globex")),
        ]
    }

    #[test]
    fn children_and_subtree() {
        let units = sample();
        let kids: Vec<&str> = children_of(&units, "root").iter().map(|u| u.id.as_str()).collect();
        assert_eq!(kids, vec!["a", "b"]);
        assert_eq!(subtree_ids(&units, "a"), vec!["a", "a1", "a1x"]);
        assert_eq!(subtree_ids(&units, "a1x"), vec!["a1x"]);
    }

    #[test]
    fn subtree_of_large_hierarchy_is_complete() {
        // Root with 2000 direct children, each with one child of its own.
        let mut units = vec![unit("root", None, None)];
        for i in 0..2000 {
            units.push(unit(&format!("c{i}"), Some("root"), None));
            units.push(unit(&format!("g{i}"), Some(format!("c{i}").as_str()), None));
        }

        let ids = subtree_ids(&units, "root");
        assert_eq!(ids.len(), units.len());
        assert_eq!(ids[1], "c0");
        assert_eq!(ids[2001], "g0");
        assert_eq!(subtree_ids(&units, "c7"), vec!["c7", "g7"]);
    }

    #[test]
    fn subtree_skips_malformed_cycles() {
        let units = vec![unit("x", Some("y"), None), unit("y", Some("x"), None)];
        assert_eq!(subtree_ids(&units, "x"), vec!["x", "y"]);
    }

    #[test]
    fn ancestors_walk_to_root() {
        let units = sample();
        let chain: Vec<&str> = ancestors(&units, "a1x")
            .expect("known unit")
            .iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(chain, vec!["a1", "a", "root"]);
        assert!(ancestors(&units, "root").expect("root").is_empty());
        assert!(matches!(
            ancestors(&units, "nope"),
            Err(HierarchyError::UnitNotFound(_))
        ));
    }

    #[test]
    fn ancestors_stop_on_cycle() {
        let units = vec![unit("x", Some("y"), None), unit("y", Some("x"), None)];
        let chain = ancestors(&units, "x").expect("known unit");
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn reparent_into_own_subtree_is_a_cycle() {
        let units = sample();
        let err = validate_reparent(&units, "a", Some("a1x")).expect_err("cycle");
        assert!(matches!(err, HierarchyError::CycleDetected { .. }));
        assert!(err.to_string().contains("cycle"));
        assert_eq!(err.code(), ErrorCode::CycleDetected);
    }

    #[test]
    fn reparent_to_self_is_rejected() {
        let err = validate_reparent(&sample(), "b", Some("b")).expect_err("self");
        assert!(matches!(err, HierarchyError::SelfParent(_)));
    }

    #[test]
    fn reparent_to_missing_parent_is_rejected() {
        let err = validate_reparent(&sample(), "b", Some("ghost")).expect_err("missing");
        assert!(matches!(err, HierarchyError::ParentNotFound(_)));
    }

    #[test]
    fn reparent_to_root_is_always_valid() {
        assert!(validate_reparent(&sample(), "a1x", None).is_ok());
    }

    #[test]
    fn tenant_unit_may_sit_under_template_or_same_tenant() {
        let units = sample();
        assert!(validate_reparent(&units, "a1x", Some("b")).is_ok());
        assert!(validate_reparent(&units, "a1x", Some("a1")).is_ok());

        let err = validate_reparent(&units, "a1x", Some("g")).expect_err("other tenant");
        assert!(matches!(err, HierarchyError::TenantMismatch { .. }));
        let msg = err.to_string();
        assert!(msg.contains("tenant acme"), "{msg}");
        assert!(msg.contains("tenant globex"), "{msg}");
    }

    #[test]
    fn template_cannot_sit_under_tenant_unit() {
        let err = validate_reparent(&sample(), "b", Some("a1")).expect_err("template under tenant");
        assert!(err.to_string().contains("shared template"));
    }

    #[test]
    fn new_unit_validation_checks_parent() {
        let units = sample();
        assert!(validate_new_unit(&units, &NewOrgUnit::new("x")).is_ok());
        assert!(validate_new_unit(&units, &NewOrgUnit::new("x").with_parent("root")).is_ok());
        assert!(matches!(
            validate_new_unit(&units, &NewOrgUnit::new("x").with_parent("ghost")),
            Err(HierarchyError::ParentNotFound(_))
        ));
        assert!(matches!(
            validate_new_unit(
                &units,
                &NewOrgUnit::new("x").with_parent("g").with_tenant("acme")
            ),
            Err(HierarchyError::TenantMismatch { .. })
        ));
    }

    #[test]
    fn has_children_display_mentions_count() {
        let err = HierarchyError::HasChildren {
            unit_id: "pl-1".into(),
            child_count: 3,
        };
        assert!(err.to_string().contains('3'));
        assert_eq!(err.code(), ErrorCode::UnitHasChildren);
    }
}
