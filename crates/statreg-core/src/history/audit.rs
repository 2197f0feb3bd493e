//! Reading a unit's history back: version listing, per-version field diffs
//! and chain verification.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::{
    db::query,
    error::RegisterError,
    model::{StatUnit, UnitRef, VALID_TO_OPEN},
};

/// Every version of a unit: the live row first, then historical rows newest
/// first. Deleted units are included.
///
/// # Errors
///
/// Returns `UnitNotFound` if the unit has no live row.
pub fn unit_history(conn: &Connection, unit: UnitRef) -> Result<Vec<StatUnit>, RegisterError> {
    let live = query::get_live_unit(conn, unit, true)?.ok_or(RegisterError::UnitNotFound(unit))?;
    let mut versions = vec![live];
    versions.extend(query::history_rows(conn, unit)?);
    Ok(versions)
}

/// One field that differs between a version and the version it superseded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedField {
    pub field: &'static str,
    pub before: Option<String>,
    pub after: Option<String>,
}

fn tracked_fields(unit: &StatUnit) -> Vec<(&'static str, Option<String>)> {
    let id = |v: Option<i64>| v.map(|v| v.to_string());
    let mut fields = vec![
        ("stat_id", unit.stat_id.clone()),
        ("name", Some(unit.name.clone())),
        ("region_id", id(unit.region_id)),
        ("activity_category_id", id(unit.activity_category_id)),
        ("sector_code_id", id(unit.sector_code_id)),
        ("is_deleted", Some(unit.is_deleted.to_string())),
    ];
    fields.extend(
        unit.unit_type()
            .link_columns()
            .iter()
            .copied()
            .zip(unit.links.column_values().into_iter().map(id)),
    );
    fields
}

/// Field-level differences introduced by the version stored in row `row_id`.
///
/// `row_id` may be the live id (the current version) or any historical row
/// of the unit. The creating version has no predecessor and yields an empty
/// list.
///
/// # Errors
///
/// Returns `UnitNotFound` if the unit or the row does not exist.
pub fn history_changes(
    conn: &Connection,
    unit: UnitRef,
    row_id: i64,
) -> Result<Vec<ChangedField>, RegisterError> {
    let versions = unit_history(conn, unit)?;
    let after = versions
        .iter()
        .find(|v| v.id == row_id)
        .ok_or(RegisterError::UnitNotFound(UnitRef::new(unit.unit_type, row_id)))?;
    let Some(before) = versions
        .iter()
        .find(|v| v.id != after.id && v.valid_to_us == after.valid_from_us)
    else {
        return Ok(Vec::new());
    };

    Ok(tracked_fields(before)
        .into_iter()
        .zip(tracked_fields(after))
        .filter(|((_, old), (_, new))| old != new)
        .map(|((field, old), (_, new))| ChangedField {
            field,
            before: old,
            after: new,
        })
        .collect())
}

/// A broken invariant in a unit's version chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainViolation {
    /// The live row's window is not open-ended.
    LiveWindowClosed { valid_to_us: i64 },
    /// A historical row still has an open window.
    HistoricalWindowOpen { row_id: i64 },
    /// Time passes between two consecutive versions.
    Gap {
        row_id: i64,
        valid_to_us: i64,
        next_row_id: i64,
        next_valid_from_us: i64,
    },
    /// Two consecutive versions cover the same instant.
    Overlap {
        row_id: i64,
        valid_to_us: i64,
        next_row_id: i64,
        next_valid_from_us: i64,
    },
    /// A historical row starts at or after the live row.
    LiveNotLatest { row_id: i64 },
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LiveWindowClosed { valid_to_us } => {
                write!(f, "live row window closed at {valid_to_us}")
            }
            Self::HistoricalWindowOpen { row_id } => {
                write!(f, "historical row {row_id} has an open window")
            }
            Self::Gap {
                row_id,
                valid_to_us,
                next_row_id,
                next_valid_from_us,
            } => write!(
                f,
                "gap between row {row_id} (ends {valid_to_us}) and row {next_row_id} (starts {next_valid_from_us})"
            ),
            Self::Overlap {
                row_id,
                valid_to_us,
                next_row_id,
                next_valid_from_us,
            } => write!(
                f,
                "row {row_id} (ends {valid_to_us}) overlaps row {next_row_id} (starts {next_valid_from_us})"
            ),
            Self::LiveNotLatest { row_id } => {
                write!(f, "historical row {row_id} starts after the live row")
            }
        }
    }
}

/// Result of [`verify_history_chain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub unit: UnitRef,
    pub versions: usize,
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check the single-live-row and temporal-contiguity invariants of a unit.
///
/// # Errors
///
/// Returns `UnitNotFound` if the unit has no live row.
pub fn verify_history_chain(
    conn: &Connection,
    unit: UnitRef,
) -> Result<ChainReport, RegisterError> {
    let mut versions = unit_history(conn, unit)?;
    let mut violations = Vec::new();

    let live = &versions[0];
    if live.valid_to_us != VALID_TO_OPEN {
        violations.push(ChainViolation::LiveWindowClosed {
            valid_to_us: live.valid_to_us,
        });
    }
    for row in &versions[1..] {
        if row.valid_to_us == VALID_TO_OPEN {
            violations.push(ChainViolation::HistoricalWindowOpen { row_id: row.id });
        }
        if row.valid_from_us >= live.valid_from_us {
            violations.push(ChainViolation::LiveNotLatest { row_id: row.id });
        }
    }

    versions.sort_by_key(|v| (v.valid_from_us, v.id));
    for pair in versions.windows(2) {
        let (row, next) = (&pair[0], &pair[1]);
        if row.valid_to_us == next.valid_from_us {
            continue;
        }
        let (row_id, valid_to_us, next_row_id, next_valid_from_us) =
            (row.id, row.valid_to_us, next.id, next.valid_from_us);
        violations.push(if valid_to_us < next_valid_from_us {
            ChainViolation::Gap {
                row_id,
                valid_to_us,
                next_row_id,
                next_valid_from_us,
            }
        } else {
            ChainViolation::Overlap {
                row_id,
                valid_to_us,
                next_row_id,
                next_valid_from_us,
            }
        });
    }

    if !violations.is_empty() {
        tracing::warn!(unit = %unit, count = violations.len(), "history chain violations found");
    }

    Ok(ChainReport {
        unit,
        versions: versions.len(),
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        history::{Change, track},
        model::{ChangeReason, ParentLinks, UnitType},
    };

    fn seeded() -> (Connection, UnitRef) {
        let conn = db::open_in_memory().unwrap();
        let row = StatUnit {
            id: 0,
            stat_id: Some("EU-1".into()),
            name: "Mill".into(),
            region_id: None,
            activity_category_id: None,
            sector_code_id: None,
            valid_from_us: 100,
            valid_to_us: VALID_TO_OPEN,
            history_parent_id: None,
            is_deleted: false,
            change_reason: ChangeReason::Create,
            edit_comment: None,
            user_id: "seed".into(),
            links: ParentLinks::EnterpriseUnit { ent_group_id: None },
        };
        let id = query::insert_unit(&conn, &row).unwrap();
        (conn, UnitRef::new(UnitType::EnterpriseUnit, id))
    }

    fn edit(conn: &Connection, unit: UnitRef, at_us: i64, mutate: impl FnOnce(&mut StatUnit)) {
        let live = query::get_live_unit(conn, unit, true).unwrap().unwrap();
        let change = Change {
            reason: ChangeReason::Edit,
            comment: None,
            user_id: "clerk",
            at_us,
        };
        track(conn, &live, &change, mutate).unwrap();
    }

    #[test]
    fn history_lists_live_first_then_newest() {
        let (conn, unit) = seeded();
        edit(&conn, unit, 200, |u| u.name = "Mill 2".into());
        edit(&conn, unit, 300, |u| u.name = "Mill 3".into());

        let names: Vec<String> = unit_history(&conn, unit)
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["Mill 3", "Mill 2", "Mill"]);
    }

    #[test]
    fn changes_show_only_differing_fields() {
        let (conn, unit) = seeded();
        edit(&conn, unit, 200, |u| {
            u.name = "Mill 2".into();
            u.stat_id = None;
        });

        let changes = history_changes(&conn, unit, unit.id).unwrap();
        assert_eq!(
            changes,
            vec![
                ChangedField {
                    field: "stat_id",
                    before: Some("EU-1".into()),
                    after: None,
                },
                ChangedField {
                    field: "name",
                    before: Some("Mill".into()),
                    after: Some("Mill 2".into()),
                },
            ]
        );

        let creation = unit_history(&conn, unit).unwrap().pop().unwrap();
        assert!(history_changes(&conn, unit, creation.id).unwrap().is_empty());
    }

    #[test]
    fn changes_reject_foreign_row() {
        let (conn, unit) = seeded();
        let err = history_changes(&conn, unit, 9_999).unwrap_err();
        assert!(matches!(err, RegisterError::UnitNotFound(_)));
    }

    #[test]
    fn intact_chain_verifies() {
        let (conn, unit) = seeded();
        edit(&conn, unit, 200, |u| u.name = "a".into());
        edit(&conn, unit, 300, |u| u.name = "b".into());
        let report = verify_history_chain(&conn, unit).unwrap();
        assert!(report.is_intact(), "{:?}", report.violations);
        assert_eq!(report.versions, 3);
    }

    #[test]
    fn gap_is_reported() {
        let (conn, unit) = seeded();
        edit(&conn, unit, 200, |u| u.name = "a".into());
        conn.execute(
            "UPDATE enterprise_units SET valid_to_us = 150 WHERE history_parent_id = ?1",
            [unit.id],
        )
        .unwrap();

        let report = verify_history_chain(&conn, unit).unwrap();
        assert!(matches!(
            report.violations.as_slice(),
            [ChainViolation::Gap {
                valid_to_us: 150,
                next_valid_from_us: 200,
                ..
            }]
        ));
    }

    #[test]
    fn missing_unit_is_not_found() {
        let (conn, _) = seeded();
        let err = verify_history_chain(&conn, UnitRef::new(UnitType::LocalUnit, 1)).unwrap_err();
        assert!(matches!(err, RegisterError::UnitNotFound(_)));
    }
}
