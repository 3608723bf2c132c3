//! [`SqliteStore`]: both store traits over one rusqlite connection.
//!
//! Reads run directly on the connection. Every relationship write opens an
//! `IMMEDIATE` transaction, reloads the child's edge set inside it, compares
//! the fingerprint the caller validated against, and only then writes. The
//! writer lock is taken before the read, so a second session touching the
//! same child either waits (busy timeout) or sees the first one's result.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params,
};
use tracing::{debug, info};

use super::{OrgUnitStore, RelationshipStore, StoreError};
use crate::db;
use crate::model::id::{self, IdKind};
use crate::model::{
    Category, CategoryRelationship, ClassifiedEntity, NewCategory, NewOrgUnit, OrgUnit,
    OrgUnitPatch, ScopeFilter,
};
use crate::relations::cycles::{ParentLookup, detect_cycle_on_add};
use crate::relations::{
    Conflict, DeleteReceipt, DeleteRelationship, EdgeSetFingerprint, NewRelationship,
    ParentEdgeSet, Rejection,
};

const UNIT_COLUMNS: &str = "unit_id, name, short_code, description, parent_id, tenant_scope, \
                            created_at_us, updated_at_us";
const CATEGORY_COLUMNS: &str = "category_id, name, entity_category, description, created_at_us";
const RELATIONSHIP_COLUMNS: &str =
    "relationship_id, parent_category_id, child_category_id, is_primary, created_at_us";

/// SQLite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_database(path)?,
        })
    }

    /// A fresh private database, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn immediate(&self) -> rusqlite::Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn row_to_org_unit(row: &Row<'_>) -> rusqlite::Result<OrgUnit> {
    Ok(OrgUnit {
        id: row.get(0)?,
        name: row.get(1)?,
        short_code: row.get(2)?,
        description: row.get(3)?,
        parent_id: row.get(4)?,
        tenant_scope: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}

fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        entity_category: row.get(2)?,
        description: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<CategoryRelationship> {
    Ok(CategoryRelationship {
        id: row.get(0)?,
        parent_category_id: row.get(1)?,
        child_category_id: row.get(2)?,
        is_primary: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<ClassifiedEntity> {
    Ok(ClassifiedEntity {
        entity_id: row.get(0)?,
        category_id: row.get(1)?,
        placement_relationship_id: row.get(2)?,
        classified_at: timestamp(row, 3)?,
    })
}

fn fetch_org_unit(conn: &Connection, id: &str) -> rusqlite::Result<Option<OrgUnit>> {
    conn.query_row(
        &format!("SELECT {UNIT_COLUMNS} FROM org_units WHERE unit_id = ?1"),
        [id],
        row_to_org_unit,
    )
    .optional()
}

fn org_unit_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM org_units WHERE unit_id = ?1)",
        [id],
        |row| row.get(0),
    )
}

/// Returns `true` if `unit_id` is `start` or one of its ancestors.
///
/// Walks `parent_id` upward from `start`; a malformed loop in stored data
/// ends the walk.
fn is_unit_or_ancestor(conn: &Connection, unit_id: &str, start: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT parent_id FROM org_units WHERE unit_id = ?1")?;
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = Some(start.to_string());

    while let Some(id) = current {
        if id == unit_id {
            return Ok(true);
        }
        if !visited.insert(id.clone()) {
            break;
        }
        current = stmt
            .query_row([&id], |row| row.get::<_, Option<String>>(0))
            .optional()?
            .flatten();
    }
    Ok(false)
}

fn fetch_category(conn: &Connection, id: &str) -> rusqlite::Result<Option<Category>> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE category_id = ?1"),
        [id],
        row_to_category,
    )
    .optional()
}

fn fetch_relationship(
    conn: &Connection,
    id: &str,
) -> rusqlite::Result<Option<CategoryRelationship>> {
    conn.query_row(
        &format!("SELECT {RELATIONSHIP_COLUMNS} FROM category_relationships WHERE relationship_id = ?1"),
        [id],
        row_to_relationship,
    )
    .optional()
}

fn fetch_parent_edges(conn: &Connection, child_id: &str) -> rusqlite::Result<Vec<CategoryRelationship>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RELATIONSHIP_COLUMNS}
         FROM category_relationships
         WHERE child_category_id = ?1
         ORDER BY created_at_us, relationship_id"
    ))?;
    let rows = stmt.query_map([child_id], row_to_relationship)?;
    rows.collect()
}

/// Reload `child_id`'s edges and fail if they no longer match `expected`.
fn fresh_edge_set(
    conn: &Connection,
    child_id: &str,
    expected: &EdgeSetFingerprint,
) -> Result<ParentEdgeSet, StoreError> {
    let set = ParentEdgeSet::from_relationships(child_id, fetch_parent_edges(conn, child_id)?);
    if &set.fingerprint() != expected {
        debug!(child_id, "edge set changed since it was read");
        return Err(Conflict::StaleEdgeSet {
            child_id: child_id.to_string(),
        }
        .into());
    }
    Ok(set)
}

/// The edge a promote or delete targets; a missing edge is a conflict.
fn target_relationship(
    conn: &Connection,
    relationship_id: &str,
) -> Result<CategoryRelationship, StoreError> {
    fetch_relationship(conn, relationship_id)?.ok_or_else(|| {
        Conflict::RelationshipGone {
            relationship_id: relationship_id.to_string(),
        }
        .into()
    })
}

/// Parent lookup that reads through whatever connection (or open
/// transaction) it wraps.
struct ConnLookup<'a>(&'a Connection);

impl ParentLookup for ConnLookup<'_> {
    fn parent_ids(&self, category_id: &str) -> anyhow::Result<Vec<String>> {
        select_parent_ids(self.0, category_id).context("read category parents")
    }
}

fn select_parent_ids(conn: &Connection, category_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT parent_category_id
         FROM category_relationships
         WHERE child_category_id = ?1
         ORDER BY created_at_us, relationship_id",
    )?;
    let rows = stmt.query_map([category_id], |row| row.get(0))?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Org units
// ---------------------------------------------------------------------------

impl OrgUnitStore for SqliteStore {
    fn list_org_units(&self, scope: &ScopeFilter) -> Result<Vec<OrgUnit>, StoreError> {
        let (clause, tenant) = match scope {
            ScopeFilter::All => ("1 = 1", None),
            ScopeFilter::Templates => ("tenant_scope IS NULL", None),
            ScopeFilter::Tenant(t) => ("tenant_scope = ?1", Some(t.as_str())),
            ScopeFilter::TenantWithTemplates(t) => {
                ("(tenant_scope IS NULL OR tenant_scope = ?1)", Some(t.as_str()))
            }
        };
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM org_units WHERE {clause} ORDER BY created_at_us, rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match tenant {
            Some(t) => stmt.query_map([t], row_to_org_unit)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], row_to_org_unit)?.collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    fn get_org_unit(&self, id: &str) -> Result<OrgUnit, StoreError> {
        fetch_org_unit(&self.conn, id)?.ok_or_else(|| StoreError::not_found("org unit", id))
    }

    fn create_org_unit(&self, fields: &NewOrgUnit) -> Result<OrgUnit, StoreError> {
        let tx = self.immediate()?;
        if let Some(parent_id) = fields.parent_id.as_deref() {
            if !org_unit_exists(&tx, parent_id)? {
                return Err(StoreError::not_found("org unit", parent_id));
            }
        }

        let unit_id = id::generate(IdKind::OrgUnit, &fields.name);
        let now = now_us();
        tx.execute(
            "INSERT INTO org_units (
                unit_id, name, short_code, description, parent_id, tenant_scope,
                created_at_us, updated_at_us
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                unit_id,
                fields.name,
                fields.short_code,
                fields.description,
                fields.parent_id,
                fields.tenant_scope,
                now
            ],
        )?;
        let unit = fetch_org_unit(&tx, &unit_id)?
            .ok_or_else(|| StoreError::not_found("org unit", &unit_id))?;
        tx.commit()?;
        debug!(unit_id = %unit.id, "inserted org unit");
        Ok(unit)
    }

    fn update_org_unit(&self, id: &str, patch: &OrgUnitPatch) -> Result<OrgUnit, StoreError> {
        let tx = self.immediate()?;
        let mut unit = fetch_org_unit(&tx, id)?.ok_or_else(|| StoreError::not_found("org unit", id))?;

        if let Some(name) = &patch.name {
            unit.name.clone_from(name);
        }
        if let Some(code) = &patch.short_code {
            unit.short_code.clone_from(code);
        }
        if let Some(description) = &patch.description {
            unit.description.clone_from(description);
        }
        if let Some(parent_id) = &patch.parent_id {
            if let Some(parent) = parent_id.as_deref() {
                if !org_unit_exists(&tx, parent)? {
                    return Err(StoreError::not_found("org unit", parent));
                }
                if is_unit_or_ancestor(&tx, id, parent)? {
                    return Err(StoreError::UnitCycle {
                        unit_id: id.to_string(),
                        proposed_parent: parent.to_string(),
                    });
                }
            }
            unit.parent_id.clone_from(parent_id);
        }

        tx.execute(
            "UPDATE org_units
             SET name = ?2, short_code = ?3, description = ?4, parent_id = ?5, updated_at_us = ?6
             WHERE unit_id = ?1",
            params![
                id,
                unit.name,
                unit.short_code,
                unit.description,
                unit.parent_id,
                now_us()
            ],
        )?;
        let unit = fetch_org_unit(&tx, id)?.ok_or_else(|| StoreError::not_found("org unit", id))?;
        tx.commit()?;
        Ok(unit)
    }

    fn delete_org_unit(&self, id: &str) -> Result<(), StoreError> {
        let tx = self.immediate()?;
        let child_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM org_units WHERE parent_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if child_count > 0 {
            return Err(StoreError::HasChildren {
                unit_id: id.to_string(),
                child_count: usize::try_from(child_count).unwrap_or(usize::MAX),
            });
        }

        let removed = tx.execute("DELETE FROM org_units WHERE unit_id = ?1", [id])?;
        if removed == 0 {
            return Err(StoreError::not_found("org unit", id));
        }
        tx.commit()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Categories and relationships
// ---------------------------------------------------------------------------

impl RelationshipStore for SqliteStore {
    fn get_category(&self, id: &str) -> Result<Category, StoreError> {
        fetch_category(&self.conn, id)?.ok_or_else(|| StoreError::not_found("category", id))
    }

    fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY created_at_us, rowid"
        ))?;
        let rows = stmt.query_map([], row_to_category)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn create_category(&self, fields: &NewCategory) -> Result<Category, StoreError> {
        let category_id = id::generate(IdKind::Category, &fields.name);
        self.conn.execute(
            "INSERT INTO categories (category_id, name, entity_category, description, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category_id,
                fields.name,
                fields.entity_category,
                fields.description,
                now_us()
            ],
        )?;
        debug!(category_id = %category_id, "inserted category");
        self.get_category(&category_id)
    }

    fn get_relationship(&self, id: &str) -> Result<CategoryRelationship, StoreError> {
        fetch_relationship(&self.conn, id)?.ok_or_else(|| StoreError::not_found("relationship", id))
    }

    fn list_parent_relationships(
        &self,
        child_id: &str,
    ) -> Result<Vec<CategoryRelationship>, StoreError> {
        Ok(fetch_parent_edges(&self.conn, child_id)?)
    }

    fn list_relationships(&self) -> Result<Vec<CategoryRelationship>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RELATIONSHIP_COLUMNS}
             FROM category_relationships
             ORDER BY created_at_us, relationship_id"
        ))?;
        let rows = stmt.query_map([], row_to_relationship)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_candidate_parents(&self, child_id: &str) -> Result<Vec<Category>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS}
             FROM categories c
             WHERE c.category_id <> ?1
               AND NOT EXISTS (
                   SELECT 1 FROM category_relationships r
                   WHERE r.child_category_id = ?1
                     AND r.parent_category_id = c.category_id
               )
             ORDER BY c.name COLLATE NOCASE, c.category_id"
        ))?;
        let rows = stmt.query_map([child_id], row_to_category)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn parent_ids(&self, category_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(select_parent_ids(&self.conn, category_id)?)
    }

    fn create_relationship(
        &self,
        request: &NewRelationship,
        expected: &EdgeSetFingerprint,
    ) -> Result<CategoryRelationship, StoreError> {
        let child_id = request.child_category_id.as_str();
        let parent_id = request.parent_category_id.as_str();

        let tx = self.immediate()?;
        for category_id in [child_id, parent_id] {
            if fetch_category(&tx, category_id)?.is_none() {
                return Err(StoreError::not_found("category", category_id));
            }
        }
        let set = fresh_edge_set(&tx, child_id, expected)?;

        if parent_id == child_id {
            return Err(Rejection::SelfReference {
                category_id: child_id.to_string(),
            }
            .into());
        }
        if let Some(existing) = set.edge_from(parent_id) {
            return Err(Rejection::DuplicateEdge {
                child_id: child_id.to_string(),
                parent_id: parent_id.to_string(),
                relationship_id: existing.id.clone(),
            }
            .into());
        }
        if let Some(cycle) = detect_cycle_on_add(&ConnLookup(&tx), child_id, parent_id)? {
            return Err(Rejection::Cycle { cycle }.into());
        }

        // Keep creation order strict per child so "oldest" is well defined.
        let newest: Option<i64> = tx.query_row(
            "SELECT MAX(created_at_us) FROM category_relationships WHERE child_category_id = ?1",
            [child_id],
            |row| row.get(0),
        )?;
        let created_at_us = newest.map_or_else(now_us, |last| now_us().max(last + 1));
        let is_primary = set.next_edge_is_primary();

        let relationship_id = id::generate(IdKind::Relationship, &format!("{parent_id}>{child_id}"));
        tx.execute(
            "INSERT INTO category_relationships (
                relationship_id, parent_category_id, child_category_id, is_primary, created_at_us
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![relationship_id, parent_id, child_id, is_primary, created_at_us],
        )?;
        let created = target_relationship(&tx, &relationship_id)?;
        tx.commit()?;

        info!(
            relationship_id = %created.id,
            parent_id,
            child_id,
            is_primary = created.is_primary,
            "relationship created"
        );
        Ok(created)
    }

    fn promote_relationship(
        &self,
        relationship_id: &str,
        expected: &EdgeSetFingerprint,
    ) -> Result<Vec<CategoryRelationship>, StoreError> {
        let tx = self.immediate()?;
        let target = target_relationship(&tx, relationship_id)?;
        let child_id = target.child_category_id.as_str();
        let set = fresh_edge_set(&tx, child_id, expected)?;

        if set.primary().is_some_and(|p| p.id == relationship_id) {
            return Ok(set.into_edges());
        }

        // Demote first: the partial unique index admits one primary per child.
        tx.execute(
            "UPDATE category_relationships SET is_primary = 0
             WHERE child_category_id = ?1 AND is_primary = 1",
            [child_id],
        )?;
        tx.execute(
            "UPDATE category_relationships SET is_primary = 1 WHERE relationship_id = ?1",
            [relationship_id],
        )?;
        let edges = fetch_parent_edges(&tx, child_id)?;
        tx.commit()?;

        info!(relationship_id, child_id, "relationship promoted to primary");
        Ok(edges)
    }

    fn delete_relationship(
        &self,
        request: &DeleteRelationship,
        expected: &EdgeSetFingerprint,
    ) -> Result<DeleteReceipt, StoreError> {
        let relationship_id = request.relationship_id.as_str();

        let tx = self.immediate()?;
        let target = target_relationship(&tx, relationship_id)?;
        let child_id = target.child_category_id.as_str();
        let set = fresh_edge_set(&tx, child_id, expected)?;

        if set.len() <= 1 {
            return Err(Rejection::WouldEmptyParentSet {
                child_id: child_id.to_string(),
                relationship_id: relationship_id.to_string(),
            }
            .into());
        }

        let affected: i64 = tx.query_row(
            "SELECT COUNT(*) FROM category_entities WHERE placement_relationship_id = ?1",
            [relationship_id],
            |row| row.get(0),
        )?;

        let replacement = match request.replacement_primary.as_deref() {
            Some(rid) if rid != relationship_id && set.find(rid).is_some() => Some(rid),
            Some(rid) => {
                return Err(Conflict::RelationshipGone {
                    relationship_id: rid.to_string(),
                }
                .into());
            }
            None => None,
        };

        if let Some(rid) = replacement {
            tx.execute(
                "UPDATE category_entities SET placement_relationship_id = ?2
                 WHERE placement_relationship_id = ?1",
                params![relationship_id, rid],
            )?;
        }
        tx.execute(
            "DELETE FROM category_relationships WHERE relationship_id = ?1",
            [relationship_id],
        )?;
        if let Some(rid) = replacement {
            tx.execute(
                "UPDATE category_relationships SET is_primary = 0
                 WHERE child_category_id = ?1 AND is_primary = 1",
                [child_id],
            )?;
            tx.execute(
                "UPDATE category_relationships SET is_primary = 1 WHERE relationship_id = ?1",
                [rid],
            )?;
        }
        tx.commit()?;

        let affected_entity_count = usize::try_from(affected).unwrap_or(0);
        info!(
            relationship_id,
            child_id,
            affected_entity_count,
            replacement_primary = ?replacement,
            "relationship deleted"
        );
        Ok(DeleteReceipt {
            affected_entity_count,
        })
    }

    fn classify_entity(
        &self,
        entity_id: &str,
        category_id: &str,
    ) -> Result<ClassifiedEntity, StoreError> {
        let tx = self.immediate()?;
        if fetch_category(&tx, category_id)?.is_none() {
            return Err(StoreError::not_found("category", category_id));
        }
        let placement: Option<String> = tx
            .query_row(
                "SELECT relationship_id FROM category_relationships
                 WHERE child_category_id = ?1 AND is_primary = 1",
                [category_id],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "INSERT INTO category_entities (
                entity_id, category_id, placement_relationship_id, classified_at_us
             ) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_id) DO UPDATE SET
                category_id = excluded.category_id,
                placement_relationship_id = excluded.placement_relationship_id,
                classified_at_us = excluded.classified_at_us",
            params![entity_id, category_id, placement, now_us()],
        )?;
        let entity = tx.query_row(
            "SELECT entity_id, category_id, placement_relationship_id, classified_at_us
             FROM category_entities WHERE entity_id = ?1",
            [entity_id],
            row_to_entity,
        )?;
        tx.commit()?;
        Ok(entity)
    }

    fn list_classified_entities(
        &self,
        category_id: &str,
    ) -> Result<Vec<ClassifiedEntity>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, category_id, placement_relationship_id, classified_at_us
             FROM category_entities
             WHERE category_id = ?1
             ORDER BY classified_at_us, entity_id",
        )?;
        let rows = stmt.query_map([category_id], row_to_entity)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory store")
    }

    fn category(store: &SqliteStore, name: &str) -> String {
        store
            .create_category(&NewCategory::new(name, "asset"))
            .expect("create category")
            .id
    }

    fn fingerprint(store: &SqliteStore, child: &str) -> EdgeSetFingerprint {
        ParentEdgeSet::from_relationships(
            child,
            store.list_parent_relationships(child).expect("list edges"),
        )
        .fingerprint()
    }

    fn request(parent: &str, child: &str) -> NewRelationship {
        NewRelationship {
            parent_category_id: parent.to_string(),
            child_category_id: child.to_string(),
        }
    }

    fn link(store: &SqliteStore, parent: &str, child: &str) -> CategoryRelationship {
        let expected = fingerprint(store, child);
        store
            .create_relationship(&request(parent, child), &expected)
            .expect("create relationship")
    }

    #[test]
    fn org_unit_crud_and_scope_filters() {
        let store = store();
        let root = store
            .create_org_unit(&NewOrgUnit::new("Direction SI").with_short_code("DSI"))
            .expect("root");
        let acme = store
            .create_org_unit(
                &NewOrgUnit::new("Infra Acme")
                    .with_parent(&root.id)
                    .with_tenant("acme"),
            )
            .expect("acme unit");
        store
            .create_org_unit(&NewOrgUnit::new("Globex").with_tenant("globex"))
            .expect("globex unit");

        assert!(is_well_formed_unit(&root.id));
        assert_eq!(store.list_org_units(&ScopeFilter::All).expect("all").len(), 3);
        assert_eq!(store.list_org_units(&ScopeFilter::Templates).expect("tpl").len(), 1);
        let acme_view = store
            .list_org_units(&ScopeFilter::TenantWithTemplates("acme".into()))
            .expect("acme view");
        let names: Vec<&str> = acme_view.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Direction SI", "Infra Acme"]);

        let renamed = store
            .update_org_unit(
                &acme.id,
                &OrgUnitPatch {
                    name: Some("Infrastructure Acme".into()),
                    description: Some(Some("Réseau et serveurs".into())),
                    ..OrgUnitPatch::default()
                },
            )
            .expect("update");
        assert_eq!(renamed.name, "Infrastructure Acme");
        assert_eq!(renamed.parent_id.as_deref(), Some(root.id.as_str()));

        let moved = store
            .update_org_unit(&acme.id, &OrgUnitPatch::reparent(None))
            .expect("move to root");
        assert!(moved.is_root());
    }

    fn is_well_formed_unit(id: &str) -> bool {
        id::is_well_formed(IdKind::OrgUnit, id)
    }

    #[test]
    fn org_unit_with_children_cannot_be_deleted() {
        let store = store();
        let root = store.create_org_unit(&NewOrgUnit::new("Root")).expect("root");
        let child = store
            .create_org_unit(&NewOrgUnit::new("Child").with_parent(&root.id))
            .expect("child");

        let err = store.delete_org_unit(&root.id).expect_err("has children");
        assert!(matches!(err, StoreError::HasChildren { child_count: 1, .. }));

        store.delete_org_unit(&child.id).expect("delete leaf");
        store.delete_org_unit(&root.id).expect("delete now-empty root");
        assert!(matches!(
            store.delete_org_unit(&root.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn reparent_under_own_descendant_is_refused_in_store() {
        let store = store();
        let dsi = store.create_org_unit(&NewOrgUnit::new("Direction SI")).expect("root");
        let infra = store
            .create_org_unit(&NewOrgUnit::new("Infrastructure").with_parent(&dsi.id))
            .expect("child");
        let reseau = store
            .create_org_unit(&NewOrgUnit::new("Réseau").with_parent(&infra.id))
            .expect("grandchild");

        for target in [&reseau.id, &infra.id, &dsi.id] {
            let err = store
                .update_org_unit(&dsi.id, &OrgUnitPatch::reparent(Some(target.clone())))
                .expect_err("cycle");
            assert!(matches!(err, StoreError::UnitCycle { .. }), "{target}: {err}");
            assert_eq!(err.code(), crate::error::ErrorCode::CycleDetected);
        }

        let roots = store
            .list_org_units(&ScopeFilter::All)
            .expect("units")
            .into_iter()
            .filter(OrgUnit::is_root)
            .count();
        assert_eq!(roots, 1, "hierarchy unchanged");

        // Moving a leaf sideways is still fine.
        let moved = store
            .update_org_unit(&reseau.id, &OrgUnitPatch::reparent(Some(dsi.id.clone())))
            .expect("valid move");
        assert_eq!(moved.parent_id.as_deref(), Some(dsi.id.as_str()));
    }

    #[test]
    fn org_unit_with_unknown_parent_is_not_found() {
        let err = store()
            .create_org_unit(&NewOrgUnit::new("Orphan").with_parent("pl-missing0"))
            .expect_err("unknown parent");
        assert!(matches!(err, StoreError::NotFound { entity: "org unit", .. }));
    }

    #[test]
    fn stale_fingerprint_is_a_conflict() {
        let store = store();
        let infra = category(&store, "Infrastructure");
        let net = category(&store, "Sécurité Réseau");
        let fw = category(&store, "Pare-feu");

        let before = fingerprint(&store, &fw);
        link(&store, &infra, &fw);

        let err = store
            .create_relationship(&request(&net, &fw), &before)
            .expect_err("stale");
        assert!(matches!(err, StoreError::Conflict(Conflict::StaleEdgeSet { .. })));
        assert_eq!(store.list_parent_relationships(&fw).expect("edges").len(), 1);
    }

    #[test]
    fn create_rejects_duplicate_self_and_cycle_inside_transaction() {
        let store = store();
        let a = category(&store, "A");
        let b = category(&store, "B");
        link(&store, &a, &b);

        let dup = store
            .create_relationship(&request(&a, &b), &fingerprint(&store, &b))
            .expect_err("duplicate");
        assert!(matches!(dup, StoreError::Rejected(Rejection::DuplicateEdge { .. })));

        let own = store
            .create_relationship(&request(&a, &a), &fingerprint(&store, &a))
            .expect_err("self");
        assert!(matches!(own, StoreError::Rejected(Rejection::SelfReference { .. })));

        let cycle = store
            .create_relationship(&request(&b, &a), &fingerprint(&store, &a))
            .expect_err("cycle");
        assert!(matches!(cycle, StoreError::Rejected(Rejection::Cycle { .. })));
    }

    #[test]
    fn store_sets_primary_flag_from_current_edges() {
        let store = store();
        let infra = category(&store, "Infrastructure");
        let net = category(&store, "Sécurité Réseau");
        let apps = category(&store, "Applications");
        let fw = category(&store, "Pare-feu");

        let first = link(&store, &infra, &fw);
        assert!(first.is_primary, "first edge of an unattached child");
        let second = link(&store, &net, &fw);
        assert!(!second.is_primary, "child already has a primary");

        // Parents remain but none is primary: the next edge takes the slot.
        store
            .delete_relationship(
                &DeleteRelationship {
                    relationship_id: first.id,
                    replacement_primary: None,
                },
                &fingerprint(&store, &fw),
            )
            .expect("delete primary");
        let third = link(&store, &apps, &fw);
        assert!(third.is_primary);

        let set = ParentEdgeSet::from_relationships(
            fw.as_str(),
            store.list_parent_relationships(&fw).expect("edges"),
        );
        assert_eq!(set.primary_count(), 1);
        assert!(set.check_invariants().is_empty());
    }

    #[test]
    fn promote_swaps_primary_atomically() {
        let store = store();
        let infra = category(&store, "Infrastructure");
        let net = category(&store, "Sécurité Réseau");
        let fw = category(&store, "Pare-feu");
        let first = link(&store, &infra, &fw);
        let second = link(&store, &net, &fw);

        let edges = store
            .promote_relationship(&second.id, &fingerprint(&store, &fw))
            .expect("promote");
        let set = ParentEdgeSet::from_relationships(fw.as_str(), edges);
        assert_eq!(set.primary().map(|e| e.id.as_str()), Some(second.id.as_str()));
        assert!(!set.find(&first.id).expect("first edge").is_primary);
        assert_eq!(set.primary_count(), 1);
    }

    #[test]
    fn promote_missing_relationship_is_gone() {
        let store = store();
        let fw = category(&store, "Pare-feu");
        let err = store
            .promote_relationship("rel-ghost000", &fingerprint(&store, &fw))
            .expect_err("gone");
        assert!(matches!(err, StoreError::Conflict(Conflict::RelationshipGone { .. })));
    }

    #[test]
    fn delete_counts_placed_entities_and_refuses_last_edge() {
        let store = store();
        let infra = category(&store, "Infrastructure");
        let net = category(&store, "Sécurité Réseau");
        let fw = category(&store, "Pare-feu");
        let primary = link(&store, &infra, &fw);
        let other = link(&store, &net, &fw);

        for entity in ["fw-paris-01", "fw-lyon-02"] {
            let placed = store.classify_entity(entity, &fw).expect("classify");
            assert_eq!(placed.placement_relationship_id.as_deref(), Some(primary.id.as_str()));
        }

        let receipt = store
            .delete_relationship(
                &DeleteRelationship {
                    relationship_id: primary.id.clone(),
                    replacement_primary: None,
                },
                &fingerprint(&store, &fw),
            )
            .expect("delete primary");
        assert_eq!(receipt.affected_entity_count, 2);

        let entities = store.list_classified_entities(&fw).expect("entities");
        assert!(entities.iter().all(|e| e.placement_relationship_id.is_none()));

        let err = store
            .delete_relationship(
                &DeleteRelationship {
                    relationship_id: other.id,
                    replacement_primary: None,
                },
                &fingerprint(&store, &fw),
            )
            .expect_err("last edge");
        assert!(matches!(
            err,
            StoreError::Rejected(Rejection::WouldEmptyParentSet { .. })
        ));
    }

    #[test]
    fn delete_with_replacement_moves_placement() {
        let store = store();
        let infra = category(&store, "Infrastructure");
        let net = category(&store, "Sécurité Réseau");
        let fw = category(&store, "Pare-feu");
        let primary = link(&store, &infra, &fw);
        let other = link(&store, &net, &fw);
        store.classify_entity("fw-paris-01", &fw).expect("classify");

        let receipt = store
            .delete_relationship(
                &DeleteRelationship {
                    relationship_id: primary.id,
                    replacement_primary: Some(other.id.clone()),
                },
                &fingerprint(&store, &fw),
            )
            .expect("delete with replacement");
        assert_eq!(receipt.affected_entity_count, 1);

        let remaining = store.get_relationship(&other.id).expect("replacement");
        assert!(remaining.is_primary);
        let entities = store.list_classified_entities(&fw).expect("entities");
        assert_eq!(
            entities[0].placement_relationship_id.as_deref(),
            Some(other.id.as_str())
        );
    }

    #[test]
    fn candidates_exclude_child_and_current_parents() {
        let store = store();
        let infra = category(&store, "Infrastructure");
        let net = category(&store, "Sécurité Réseau");
        let apps = category(&store, "Applications");
        let fw = category(&store, "Pare-feu");
        link(&store, &infra, &fw);

        let ids: Vec<String> = store
            .list_candidate_parents(&fw)
            .expect("candidates")
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![apps, net]);
    }

    #[test]
    fn classify_unknown_category_is_not_found() {
        let err = store()
            .classify_entity("asset-1", "cat-missing0")
            .expect_err("unknown");
        assert!(matches!(err, StoreError::NotFound { entity: "category", .. }));
    }
}
