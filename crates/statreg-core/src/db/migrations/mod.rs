//! Register schema versions, tracked in `PRAGMA user_version` and mirrored
//! into `register_meta.schema_version`.

use super::schema;
use rusqlite::{Connection, types::Type};
use tracing::{info, warn};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "units and classification trees",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "classification generations",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Schema version stamped on the register file.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read or is negative.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let stamped: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(stamped)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)))
}

fn pending(stamped: u32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS.iter().filter(move |m| m.version > stamped)
}

/// Bring the register up to [`LATEST_SCHEMA_VERSION`], one transaction per
/// step, and return the resulting version.
///
/// A register stamped with a newer version is left alone.
///
/// # Errors
///
/// Returns an error if any step fails; earlier steps stay committed.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let stamped = current_schema_version(conn)?;
    if stamped > LATEST_SCHEMA_VERSION {
        warn!(
            stamped,
            supported = LATEST_SCHEMA_VERSION,
            "register schema is newer than this binary"
        );
        return Ok(stamped);
    }

    let mut reached = stamped;
    for step in pending(stamped) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", i64::from(step.version))?;
        tx.execute(
            "UPDATE register_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(step.version)],
        )?;
        tx.commit()?;
        info!(version = step.version, name = step.name, "register schema upgraded");
        reached = step.version;
    }
    Ok(reached)
}
