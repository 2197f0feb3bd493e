//! Row-level access to the unit tables.
//!
//! Every unit type shares the same base column set followed by its parent
//! pointer columns, so one set of helpers serves all four tables. Functions
//! return `rusqlite::Result` and leave domain checks to the services.

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};

use crate::model::{ChangeReason, ParentLinks, StatUnit, UnitRef, UnitType, VALID_TO_OPEN};

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

const BASE_COLUMNS: [&str; 13] = [
    "id",
    "stat_id",
    "name",
    "region_id",
    "activity_category_id",
    "sector_code_id",
    "valid_from_us",
    "valid_to_us",
    "history_parent_id",
    "is_deleted",
    "change_reason",
    "edit_comment",
    "user_id",
];

/// Columns written on insert and on a live-row update (everything but `id`).
const WRITE_COLUMNS: [&str; 12] = [
    "stat_id",
    "name",
    "region_id",
    "activity_category_id",
    "sector_code_id",
    "valid_from_us",
    "valid_to_us",
    "history_parent_id",
    "is_deleted",
    "change_reason",
    "edit_comment",
    "user_id",
];

fn select_columns(unit_type: UnitType) -> String {
    BASE_COLUMNS
        .iter()
        .chain(unit_type.link_columns())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT <all columns> FROM <table>` for one unit type.
pub fn select_sql(unit_type: UnitType) -> String {
    format!(
        "SELECT {} FROM {}",
        select_columns(unit_type),
        unit_type.table()
    )
}

impl ToSql for ChangeReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChangeReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// Map one row produced by [`select_sql`] to a [`StatUnit`].
///
/// # Errors
///
/// Returns an error if a column has an unexpected type.
pub fn row_to_unit(unit_type: UnitType, row: &Row<'_>) -> rusqlite::Result<StatUnit> {
    let first_link = BASE_COLUMNS.len();
    let links = match unit_type {
        UnitType::LocalUnit => ParentLinks::LocalUnit {
            legal_unit_id: row.get(first_link)?,
            enterprise_unit_id: row.get(first_link + 1)?,
        },
        UnitType::LegalUnit => ParentLinks::LegalUnit {
            enterprise_unit_id: row.get(first_link)?,
            ent_group_id: row.get(first_link + 1)?,
        },
        UnitType::EnterpriseUnit => ParentLinks::EnterpriseUnit {
            ent_group_id: row.get(first_link)?,
        },
        UnitType::EnterpriseGroup => ParentLinks::EnterpriseGroup,
    };

    Ok(StatUnit {
        id: row.get(0)?,
        stat_id: row.get(1)?,
        name: row.get(2)?,
        region_id: row.get(3)?,
        activity_category_id: row.get(4)?,
        sector_code_id: row.get(5)?,
        valid_from_us: row.get(6)?,
        valid_to_us: row.get(7)?,
        history_parent_id: row.get(8)?,
        is_deleted: row.get(9)?,
        change_reason: row.get(10)?,
        edit_comment: row.get(11)?,
        user_id: row.get(12)?,
        links,
    })
}

fn query_units(
    conn: &Connection,
    unit_type: UnitType,
    sql: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<Vec<StatUnit>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        row_to_unit(unit_type, row)
    })?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch the live row of a unit. Deleted units are returned only when
/// `include_deleted` is set.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_live_unit(
    conn: &Connection,
    unit: UnitRef,
    include_deleted: bool,
) -> rusqlite::Result<Option<StatUnit>> {
    let deleted_filter = if include_deleted {
        ""
    } else {
        " AND is_deleted = 0"
    };
    let sql = format!(
        "{} WHERE id = ?1 AND history_parent_id IS NULL{deleted_filter}",
        select_sql(unit.unit_type)
    );
    conn.query_row(&sql, [unit.id], |row| row_to_unit(unit.unit_type, row))
        .optional()
}

/// Fetch any row (live or historical) by its row id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_row(
    conn: &Connection,
    unit_type: UnitType,
    row_id: i64,
) -> rusqlite::Result<Option<StatUnit>> {
    let sql = format!("{} WHERE id = ?1", select_sql(unit_type));
    conn.query_row(&sql, [row_id], |row| row_to_unit(unit_type, row))
        .optional()
}

/// Historical rows of a unit, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn history_rows(conn: &Connection, unit: UnitRef) -> rusqlite::Result<Vec<StatUnit>> {
    let sql = format!(
        "{} WHERE history_parent_id = ?1 ORDER BY valid_from_us DESC, id DESC",
        select_sql(unit.unit_type)
    );
    query_units(conn, unit.unit_type, &sql, &[&unit.id])
}

/// Live, non-deleted rows of `child_type` whose `column` points at `parent_id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn live_children(
    conn: &Connection,
    child_type: UnitType,
    column: &str,
    parent_id: i64,
) -> rusqlite::Result<Vec<StatUnit>> {
    let sql = format!(
        "{} WHERE {column} = ?1 AND history_parent_id IS NULL AND is_deleted = 0 ORDER BY id",
        select_sql(child_type)
    );
    query_units(conn, child_type, &sql, &[&parent_id])
}

/// Live rows of one type matching a pre-built `WHERE` fragment.
///
/// `conditions` are joined with `AND` after the live-row predicate; `params`
/// bind positionally in the same order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn live_units_where(
    conn: &Connection,
    unit_type: UnitType,
    conditions: &[String],
    params: &[&dyn ToSql],
) -> rusqlite::Result<Vec<StatUnit>> {
    let mut sql = format!("{} WHERE history_parent_id IS NULL", select_sql(unit_type));
    for condition in conditions {
        sql.push_str(" AND ");
        sql.push_str(condition);
    }
    sql.push_str(" ORDER BY id");
    query_units(conn, unit_type, &sql, params)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn write_values(unit: &StatUnit) -> Vec<Box<dyn ToSql + '_>> {
    let mut values: Vec<Box<dyn ToSql + '_>> = vec![
        Box::new(&unit.stat_id),
        Box::new(&unit.name),
        Box::new(unit.region_id),
        Box::new(unit.activity_category_id),
        Box::new(unit.sector_code_id),
        Box::new(unit.valid_from_us),
        Box::new(unit.valid_to_us),
        Box::new(unit.history_parent_id),
        Box::new(unit.is_deleted),
        Box::new(unit.change_reason),
        Box::new(&unit.edit_comment),
        Box::new(&unit.user_id),
    ];
    for value in unit.links.column_values() {
        values.push(Box::new(value));
    }
    values
}

/// Insert a row and return its freshly assigned id. `unit.id` is ignored.
///
/// # Errors
///
/// Returns an error if the insert violates a constraint or fails.
pub fn insert_unit(conn: &Connection, unit: &StatUnit) -> rusqlite::Result<i64> {
    let unit_type = unit.unit_type();
    let columns: Vec<&str> = WRITE_COLUMNS
        .iter()
        .chain(unit_type.link_columns())
        .copied()
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        unit_type.table(),
        columns.join(", "),
        placeholders.join(", ")
    );

    let values = write_values(unit);
    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite the live row `unit.id` with `unit`'s values, but only if it is
/// still the live row whose window started at `expected_valid_from_us`.
///
/// Returns the number of rows changed: `0` means another writer got there
/// first (or the row is not live), `1` means the write applied.
///
/// # Errors
///
/// Returns an error if the update violates a constraint or fails.
pub fn update_live_unit_guarded(
    conn: &Connection,
    unit: &StatUnit,
    expected_valid_from_us: i64,
) -> rusqlite::Result<usize> {
    let unit_type = unit.unit_type();
    let assignments: Vec<String> = WRITE_COLUMNS
        .iter()
        .chain(unit_type.link_columns())
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect();
    let next = assignments.len() + 1;
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{next} AND history_parent_id IS NULL \
         AND valid_from_us = ?{} AND valid_to_us = ?{}",
        unit_type.table(),
        assignments.join(", "),
        next + 1,
        next + 2
    );

    let mut values = write_values(unit);
    values.push(Box::new(unit.id));
    values.push(Box::new(expected_valid_from_us));
    values.push(Box::new(VALID_TO_OPEN));
    conn.execute(&sql, params_from_iter(values.iter()))
}
