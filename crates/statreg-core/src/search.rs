//! Listing and aggregating live units.
//!
//! Classification filters match a whole subtree: filtering by a province
//! returns units registered in any of its districts.

use rusqlite::{Connection, ToSql};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::{
    classification::{self, PathResolver, sql::subtree_select},
    error::RegisterError,
    model::{ClassificationTree, StatUnit, UnitType},
};

/// Criteria for [`list_units`]. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    /// Restrict to one unit type; all four otherwise.
    pub unit_type: Option<UnitType>,
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
    pub stat_id: Option<String>,
    /// Region node whose whole subtree matches.
    pub region_subtree: Option<i64>,
    /// Activity category node whose whole subtree matches.
    pub activity_subtree: Option<i64>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

/// `column IN (<recursive subtree of root>)`, resolved inside SQLite so
/// the subtree size never meets the bound-parameter limit.
fn subtree_condition(
    conn: &Connection,
    tree: ClassificationTree,
    root: i64,
    column: &str,
    conditions: &mut Vec<String>,
    params: &mut Vec<Box<dyn ToSql>>,
) -> Result<(), RegisterError> {
    if classification::get_node(conn, tree, root)?.is_none() {
        return Err(RegisterError::ClassificationNodeNotFound { tree, node_id: root });
    }
    conditions.push(format!("{column} IN ({})", subtree_select(tree)));
    params.push(Box::new(root));
    Ok(())
}

/// Live units matching `filter`, ordered by `(type, id)`.
///
/// # Errors
///
/// `ClassificationNodeNotFound` for an unknown subtree root, or `Db`.
pub fn list_units(conn: &Connection, filter: &UnitFilter) -> Result<Vec<StatUnit>, RegisterError> {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if !filter.include_deleted {
        conditions.push("is_deleted = 0".to_string());
    }
    if let Some(name) = &filter.name_contains {
        conditions.push("instr(lower(name), lower(?)) > 0".to_string());
        params.push(Box::new(name.clone()));
    }
    if let Some(stat_id) = &filter.stat_id {
        conditions.push("stat_id = ?".to_string());
        params.push(Box::new(stat_id.clone()));
    }
    if let Some(region) = filter.region_subtree {
        let tree = ClassificationTree::Region;
        subtree_condition(conn, tree, region, "region_id", &mut conditions, &mut params)?;
    }
    if let Some(activity) = filter.activity_subtree {
        let tree = ClassificationTree::ActivityCategory;
        subtree_condition(conn, tree, activity, "activity_category_id", &mut conditions, &mut params)?;
    }

    let param_refs: Vec<&dyn ToSql> = params.iter().map(|param| &**param).collect();
    let types: Vec<UnitType> = filter
        .unit_type
        .map_or_else(|| UnitType::ALL.to_vec(), |unit_type| vec![unit_type]);

    let mut units = Vec::new();
    for unit_type in types {
        units.extend(crate::db::query::live_units_where(
            conn,
            unit_type,
            &conditions,
            &param_refs,
        )?);
    }
    if let Some(limit) = filter.limit {
        units.truncate(limit);
    }
    tracing::debug!(count = units.len(), ?filter, "listed units");
    Ok(units)
}

/// Unit counts grouped by the region ancestor at one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionRollup {
    pub level: usize,
    /// Ancestor region id to number of units beneath it.
    pub counts: BTreeMap<i64, usize>,
    /// Units with no region, or a region shallower than `level`.
    pub unassigned: usize,
}

/// Count live, non-deleted units of `unit_type` per region ancestor at
/// `level`.
///
/// # Errors
///
/// Propagates resolver errors other than `LevelOutOfRange`, and `Db`.
pub fn region_rollup(
    conn: &Connection,
    resolver: &dyn PathResolver,
    unit_type: UnitType,
    level: usize,
) -> Result<RegionRollup, RegisterError> {
    let filter = UnitFilter {
        unit_type: Some(unit_type),
        ..UnitFilter::default()
    };
    let mut rollup = RegionRollup {
        level,
        ..RegionRollup::default()
    };

    for unit in list_units(conn, &filter)? {
        let Some(region_id) = unit.region_id else {
            rollup.unassigned += 1;
            continue;
        };
        match resolver.ancestor_at_level(ClassificationTree::Region, region_id, level) {
            Ok(ancestor) => *rollup.counts.entry(ancestor).or_default() += 1,
            Err(RegisterError::LevelOutOfRange { .. }) => rollup.unassigned += 1,
            Err(err) => return Err(err),
        }
    }
    Ok(rollup)
}
