//! Canonical SQLite schema for strata.
//!
//! - `org_units` holds the single-parent pôle hierarchy; `parent_id` is a
//!   plain self-reference and deletion with children is refused by the store
//! - `categories` and `category_relationships` model the multi-parent
//!   category graph; the edge invariants that can be stated per row or per
//!   index live here so no writer can bypass them
//! - `category_entities` records which edge each classified entity was
//!   placed through, which is what a relationship delete reports on
//! - `strata_meta` tracks the schema version for diagnostics
//!
//! Timestamps are stored as microseconds since the Unix epoch.

/// Migration v1: org units, categories, and the edge table.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS org_units (
    unit_id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    short_code TEXT,
    description TEXT,
    parent_id TEXT REFERENCES org_units(unit_id),
    tenant_scope TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    CHECK (unit_id LIKE 'pl-%'),
    CHECK (parent_id IS NULL OR parent_id <> unit_id)
);

CREATE TABLE IF NOT EXISTS categories (
    category_id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    entity_category TEXT NOT NULL CHECK (length(trim(entity_category)) > 0),
    description TEXT,
    created_at_us INTEGER NOT NULL,
    CHECK (category_id LIKE 'cat-%')
);

CREATE TABLE IF NOT EXISTS category_relationships (
    relationship_id TEXT PRIMARY KEY,
    parent_category_id TEXT NOT NULL REFERENCES categories(category_id) ON DELETE CASCADE,
    child_category_id TEXT NOT NULL REFERENCES categories(category_id) ON DELETE CASCADE,
    is_primary INTEGER NOT NULL DEFAULT 0 CHECK (is_primary IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    UNIQUE (parent_category_id, child_category_id),
    CHECK (parent_category_id <> child_category_id),
    CHECK (relationship_id LIKE 'rel-%')
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_relationships_one_primary
    ON category_relationships(child_category_id)
    WHERE is_primary = 1;

CREATE INDEX IF NOT EXISTS idx_relationships_child_created
    ON category_relationships(child_category_id, created_at_us);

CREATE INDEX IF NOT EXISTS idx_org_units_parent
    ON org_units(parent_id);

CREATE INDEX IF NOT EXISTS idx_org_units_tenant
    ON org_units(tenant_scope);

CREATE TABLE IF NOT EXISTS strata_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO strata_meta (id, schema_version) VALUES (1, 0);
";

/// Migration v2: classified entities and their placement edge.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS category_entities (
    entity_id TEXT PRIMARY KEY CHECK (length(trim(entity_id)) > 0),
    category_id TEXT NOT NULL REFERENCES categories(category_id) ON DELETE CASCADE,
    placement_relationship_id TEXT
        REFERENCES category_relationships(relationship_id) ON DELETE SET NULL,
    classified_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_category_entities_placement
    ON category_entities(placement_relationship_id);

CREATE INDEX IF NOT EXISTS idx_category_entities_category
    ON category_entities(category_id);
";

/// Indexes the store relies on for its query plans.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_relationships_one_primary",
    "idx_relationships_child_created",
    "idx_org_units_parent",
    "idx_org_units_tenant",
    "idx_category_entities_placement",
    "idx_category_entities_category",
];
