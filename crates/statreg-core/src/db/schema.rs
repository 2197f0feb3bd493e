//! Canonical SQLite schema for the register.
//!
//! - one table per unit type; the live row and all of its historical
//!   snapshots share the table, told apart by `history_parent_id IS NULL`
//! - parent pointers are plain columns referencing the parent type's table
//! - `regions`, `activity_categories` and `sector_codes` are adjacency-list
//!   trees with identical shape
//! - `classification_meta` holds per-tree generation counters that triggers
//!   bump on every write, so readers can tell when a cached path is stale
//! - `register_meta` records the schema version

/// Migration v1: classification trees, unit tables and register metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS register_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO register_meta (id, schema_version, created_at_us)
VALUES (1, 0, CAST(unixepoch('subsec') * 1000000 AS INTEGER));

CREATE TABLE IF NOT EXISTS regions (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES regions(id),
    level INTEGER NOT NULL DEFAULT 0 CHECK (level >= 0),
    CHECK (parent_id IS NULL OR parent_id <> id)
);

CREATE TABLE IF NOT EXISTS activity_categories (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES activity_categories(id),
    level INTEGER NOT NULL DEFAULT 0 CHECK (level >= 0),
    CHECK (parent_id IS NULL OR parent_id <> id)
);

CREATE TABLE IF NOT EXISTS sector_codes (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES sector_codes(id),
    level INTEGER NOT NULL DEFAULT 0 CHECK (level >= 0),
    CHECK (parent_id IS NULL OR parent_id <> id)
);

CREATE TABLE IF NOT EXISTS enterprise_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stat_id TEXT,
    name TEXT NOT NULL,
    region_id INTEGER REFERENCES regions(id),
    activity_category_id INTEGER REFERENCES activity_categories(id),
    sector_code_id INTEGER REFERENCES sector_codes(id),
    valid_from_us INTEGER NOT NULL,
    valid_to_us INTEGER NOT NULL,
    history_parent_id INTEGER REFERENCES enterprise_groups(id),
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    change_reason TEXT NOT NULL
        CHECK (change_reason IN ('create', 'edit', 'delete', 'undelete', 'correction')),
    edit_comment TEXT,
    user_id TEXT NOT NULL,
    CHECK (valid_from_us < valid_to_us),
    CHECK (history_parent_id IS NULL OR history_parent_id <> id)
);

CREATE TABLE IF NOT EXISTS enterprise_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stat_id TEXT,
    name TEXT NOT NULL,
    region_id INTEGER REFERENCES regions(id),
    activity_category_id INTEGER REFERENCES activity_categories(id),
    sector_code_id INTEGER REFERENCES sector_codes(id),
    valid_from_us INTEGER NOT NULL,
    valid_to_us INTEGER NOT NULL,
    history_parent_id INTEGER REFERENCES enterprise_units(id),
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    change_reason TEXT NOT NULL
        CHECK (change_reason IN ('create', 'edit', 'delete', 'undelete', 'correction')),
    edit_comment TEXT,
    user_id TEXT NOT NULL,
    ent_group_id INTEGER REFERENCES enterprise_groups(id),
    CHECK (valid_from_us < valid_to_us),
    CHECK (history_parent_id IS NULL OR history_parent_id <> id)
);

CREATE TABLE IF NOT EXISTS legal_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stat_id TEXT,
    name TEXT NOT NULL,
    region_id INTEGER REFERENCES regions(id),
    activity_category_id INTEGER REFERENCES activity_categories(id),
    sector_code_id INTEGER REFERENCES sector_codes(id),
    valid_from_us INTEGER NOT NULL,
    valid_to_us INTEGER NOT NULL,
    history_parent_id INTEGER REFERENCES legal_units(id),
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    change_reason TEXT NOT NULL
        CHECK (change_reason IN ('create', 'edit', 'delete', 'undelete', 'correction')),
    edit_comment TEXT,
    user_id TEXT NOT NULL,
    enterprise_unit_id INTEGER REFERENCES enterprise_units(id),
    ent_group_id INTEGER REFERENCES enterprise_groups(id),
    CHECK (valid_from_us < valid_to_us),
    CHECK (history_parent_id IS NULL OR history_parent_id <> id)
);

CREATE TABLE IF NOT EXISTS local_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stat_id TEXT,
    name TEXT NOT NULL,
    region_id INTEGER REFERENCES regions(id),
    activity_category_id INTEGER REFERENCES activity_categories(id),
    sector_code_id INTEGER REFERENCES sector_codes(id),
    valid_from_us INTEGER NOT NULL,
    valid_to_us INTEGER NOT NULL,
    history_parent_id INTEGER REFERENCES local_units(id),
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    change_reason TEXT NOT NULL
        CHECK (change_reason IN ('create', 'edit', 'delete', 'undelete', 'correction')),
    edit_comment TEXT,
    user_id TEXT NOT NULL,
    legal_unit_id INTEGER REFERENCES legal_units(id),
    enterprise_unit_id INTEGER REFERENCES enterprise_units(id),
    CHECK (valid_from_us < valid_to_us),
    CHECK (history_parent_id IS NULL OR history_parent_id <> id)
);
";

/// Migration v2: lookup indexes and classification generation counters.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_enterprise_groups_history
    ON enterprise_groups(history_parent_id, valid_from_us);
CREATE INDEX IF NOT EXISTS idx_enterprise_units_history
    ON enterprise_units(history_parent_id, valid_from_us);
CREATE INDEX IF NOT EXISTS idx_legal_units_history
    ON legal_units(history_parent_id, valid_from_us);
CREATE INDEX IF NOT EXISTS idx_local_units_history
    ON local_units(history_parent_id, valid_from_us);

CREATE INDEX IF NOT EXISTS idx_enterprise_units_group
    ON enterprise_units(ent_group_id) WHERE history_parent_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_legal_units_enterprise
    ON legal_units(enterprise_unit_id) WHERE history_parent_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_legal_units_group
    ON legal_units(ent_group_id) WHERE history_parent_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_local_units_legal
    ON local_units(legal_unit_id) WHERE history_parent_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_local_units_enterprise
    ON local_units(enterprise_unit_id) WHERE history_parent_id IS NULL;

CREATE INDEX IF NOT EXISTS idx_regions_parent ON regions(parent_id);
CREATE INDEX IF NOT EXISTS idx_activity_categories_parent ON activity_categories(parent_id);
CREATE INDEX IF NOT EXISTS idx_sector_codes_parent ON sector_codes(parent_id);

CREATE TABLE IF NOT EXISTS classification_meta (
    tree TEXT PRIMARY KEY CHECK (tree IN ('region', 'activity_category', 'sector_code')),
    generation INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO classification_meta (tree, generation) VALUES
    ('region', 0),
    ('activity_category', 0),
    ('sector_code', 0);

CREATE TRIGGER IF NOT EXISTS regions_ai AFTER INSERT ON regions
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'region';
END;
CREATE TRIGGER IF NOT EXISTS regions_au AFTER UPDATE ON regions
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'region';
END;
CREATE TRIGGER IF NOT EXISTS regions_ad AFTER DELETE ON regions
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'region';
END;

CREATE TRIGGER IF NOT EXISTS activity_categories_ai AFTER INSERT ON activity_categories
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'activity_category';
END;
CREATE TRIGGER IF NOT EXISTS activity_categories_au AFTER UPDATE ON activity_categories
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'activity_category';
END;
CREATE TRIGGER IF NOT EXISTS activity_categories_ad AFTER DELETE ON activity_categories
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'activity_category';
END;

CREATE TRIGGER IF NOT EXISTS sector_codes_ai AFTER INSERT ON sector_codes
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'sector_code';
END;
CREATE TRIGGER IF NOT EXISTS sector_codes_au AFTER UPDATE ON sector_codes
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'sector_code';
END;
CREATE TRIGGER IF NOT EXISTS sector_codes_ad AFTER DELETE ON sector_codes
BEGIN
    UPDATE classification_meta SET generation = generation + 1 WHERE tree = 'sector_code';
END;
";

/// Indexes expected by history, child-lookup and subtree query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_enterprise_groups_history",
    "idx_enterprise_units_history",
    "idx_legal_units_history",
    "idx_local_units_history",
    "idx_enterprise_units_group",
    "idx_legal_units_enterprise",
    "idx_legal_units_group",
    "idx_local_units_legal",
    "idx_local_units_enterprise",
    "idx_regions_parent",
    "idx_activity_categories_parent",
    "idx_sector_codes_parent",
];

#[cfg(test)]
mod tests {
    use crate::db::migrations;
    use rusqlite::{Connection, params};

    fn seeded_conn() -> rusqlite::Result<Connection> {
        let mut conn = Connection::open_in_memory()?;
        migrations::migrate(&mut conn)?;

        for idx in 1..=24_i64 {
            conn.execute(
                "INSERT INTO legal_units (
                    name, valid_from_us, valid_to_us, history_parent_id,
                    change_reason, user_id, enterprise_unit_id
                 ) VALUES (?1, ?2, ?3, NULL, 'create', 'seed', NULL)",
                params![format!("Legal {idx}"), idx, i64::MAX],
            )?;
        }
        for idx in 1..=24_i64 {
            conn.execute(
                "INSERT INTO legal_units (
                    name, valid_from_us, valid_to_us, history_parent_id,
                    change_reason, user_id
                 ) VALUES (?1, 0, ?2, ?3, 'edit', 'seed')",
                params![format!("Legal {idx} (old)"), idx, idx],
            )?;
        }

        Ok(conn)
    }

    fn query_plan_details(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}"))?;
        stmt.query_map([], |row| row.get::<_, String>(3))?
            .collect::<Result<Vec<_>, _>>()
    }

    #[test]
    fn query_plan_uses_history_index() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let details = query_plan_details(
            &conn,
            "SELECT id FROM legal_units
             WHERE history_parent_id = 3
             ORDER BY valid_from_us DESC",
        )?;
        assert!(
            details
                .iter()
                .any(|detail| detail.contains("idx_legal_units_history")),
            "expected history index in plan: {details:?}"
        );
        Ok(())
    }

    #[test]
    fn query_plan_uses_live_child_index() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let details = query_plan_details(
            &conn,
            "SELECT id FROM legal_units
             WHERE enterprise_unit_id = 1 AND history_parent_id IS NULL",
        )?;
        assert!(
            details
                .iter()
                .any(|detail| detail.contains("idx_legal_units_enterprise")),
            "expected child index in plan: {details:?}"
        );
        Ok(())
    }

    #[test]
    fn window_check_rejects_empty_interval() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let result = conn.execute(
            "INSERT INTO enterprise_groups (name, valid_from_us, valid_to_us, change_reason, user_id)
             VALUES ('Bad', 5, 5, 'create', 'seed')",
            [],
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn classification_writes_bump_generation() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let generation = |tree: &str| -> rusqlite::Result<i64> {
            conn.query_row(
                "SELECT generation FROM classification_meta WHERE tree = ?1",
                [tree],
                |row| row.get(0),
            )
        };
        assert_eq!(generation("region")?, 0);

        conn.execute("INSERT INTO regions (id, code, name) VALUES (1, 'R', 'Root')", [])?;
        conn.execute("UPDATE regions SET name = 'Country' WHERE id = 1", [])?;
        assert_eq!(generation("region")?, 2);
        assert_eq!(generation("sector_code")?, 0);

        conn.execute("DELETE FROM regions WHERE id = 1", [])?;
        assert_eq!(generation("region")?, 3);
        Ok(())
    }
}
