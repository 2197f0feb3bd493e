//! Hierarchy graph assembly.
//!
//! Starting from a set of units, walk parent pointers upward and return the
//! forest of every unit reached, rooted at the topmost ancestors, with each
//! node's children nested beneath it. Units reached along several paths are
//! materialised once. The starting units are marked `highlighted`.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, warn};

use crate::{db::query, error::RegisterError, model::{StatUnit, UnitRef}};

use super::parent_edges;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub unit: UnitRef,
    pub name: String,
    pub is_deleted: bool,
    pub highlighted: bool,
    pub children: Vec<Self>,
}

impl GraphNode {
    /// Depth-first search for a node by unit.
    pub fn find(&self, unit: UnitRef) -> Option<&Self> {
        if self.unit == unit {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(unit))
    }
}

struct Slot {
    unit: UnitRef,
    name: String,
    is_deleted: bool,
    highlighted: bool,
    children: Vec<usize>,
}

struct Pending {
    unit: StatUnit,
    child: Option<usize>,
    hops: usize,
}

/// Assemble the forest above `roots`.
///
/// - A deleted unit appears with `is_deleted = true` but its own parents are
///   not followed.
/// - A pointer to a row that does not exist ends the branch at the child.
/// - A chain longer than `max_hops` edges aborts with `GraphTooDeep`.
///
/// Roots and every child list are ordered by `(type, id)`.
///
/// # Errors
///
/// Returns `UnitNotFound` for a missing root, `GraphTooDeep` on the hop
/// guard, or `Db` on query failure.
pub fn build_graph(
    conn: &Connection,
    roots: &[UnitRef],
    max_hops: usize,
) -> Result<Vec<GraphNode>, RegisterError> {
    let mut stack = Vec::with_capacity(roots.len());
    for &root in roots.iter().rev() {
        let unit = query::get_live_unit(conn, root, true)?.ok_or(RegisterError::UnitNotFound(root))?;
        stack.push(Pending {
            unit,
            child: None,
            hops: 0,
        });
    }

    let mut slots: Vec<Slot> = Vec::new();
    let mut visited: HashMap<UnitRef, usize> = HashMap::new();
    let mut forest_roots: Vec<usize> = Vec::new();

    while let Some(Pending { unit, child, hops }) = stack.pop() {
        let unit_ref = unit.unit_ref();

        if let Some(&idx) = visited.get(&unit_ref) {
            attach(&mut slots[idx], child);
            continue;
        }

        if hops > max_hops {
            error!(unit = %unit_ref, max_hops, "hierarchy exceeds hop limit");
            return Err(RegisterError::GraphTooDeep {
                unit: unit_ref,
                max_hops,
            });
        }

        let idx = slots.len();
        let mut slot = Slot {
            unit: unit_ref,
            name: unit.name.clone(),
            is_deleted: unit.is_deleted,
            highlighted: false,
            children: Vec::new(),
        };
        attach(&mut slot, child);
        slots.push(slot);
        visited.insert(unit_ref, idx);

        let mut has_parent = false;
        if !unit.is_deleted {
            for edge in parent_edges(unit_ref.unit_type) {
                let Some(parent_id) = edge.parent_id(&unit) else {
                    continue;
                };
                let parent_ref = UnitRef::new(edge.parent, parent_id);
                match query::get_live_unit(conn, parent_ref, true)? {
                    Some(parent) => {
                        has_parent = true;
                        stack.push(Pending {
                            unit: parent,
                            child: Some(idx),
                            hops: hops + 1,
                        });
                    }
                    None => {
                        warn!(unit = %unit_ref, parent = %parent_ref, "dangling parent pointer");
                    }
                }
            }
        }

        if !has_parent {
            forest_roots.push(idx);
        }
    }

    let mut forest: Vec<GraphNode> = forest_roots
        .into_iter()
        .map(|idx| materialize(&slots, idx))
        .collect();
    forest.sort_by_key(|node| node.unit);
    Ok(forest)
}

fn attach(slot: &mut Slot, child: Option<usize>) {
    match child {
        Some(child) if !slot.children.contains(&child) => slot.children.push(child),
        Some(_) => {}
        None => slot.highlighted = true,
    }
}

// Edges only point from lower to higher unit types, so recursion depth is
// bounded by the number of types.
fn materialize(slots: &[Slot], idx: usize) -> GraphNode {
    let slot = &slots[idx];
    let mut children: Vec<GraphNode> = slot
        .children
        .iter()
        .map(|&child| materialize(slots, child))
        .collect();
    children.sort_by_key(|node| node.unit);
    GraphNode {
        unit: slot.unit,
        name: slot.name.clone(),
        is_deleted: slot.is_deleted,
        highlighted: slot.highlighted,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        model::{ChangeReason, ParentLinks, UnitType, VALID_TO_OPEN},
    };

    fn insert(conn: &Connection, name: &str, links: ParentLinks, is_deleted: bool) -> UnitRef {
        let row = StatUnit {
            id: 0,
            stat_id: None,
            name: name.into(),
            region_id: None,
            activity_category_id: None,
            sector_code_id: None,
            valid_from_us: 1,
            valid_to_us: VALID_TO_OPEN,
            history_parent_id: None,
            is_deleted,
            change_reason: ChangeReason::Create,
            edit_comment: None,
            user_id: "seed".into(),
            links,
        };
        let unit_type = row.unit_type();
        UnitRef::new(unit_type, query::insert_unit(conn, &row).unwrap())
    }

    #[test]
    fn single_unit_is_its_own_root() {
        let conn = db::open_in_memory().unwrap();
        let group = insert(&conn, "G", ParentLinks::EnterpriseGroup, false);
        let forest = build_graph(&conn, &[group], 16).unwrap();
        assert_eq!(forest.len(), 1);
        assert!(forest[0].highlighted);
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn deleted_parent_is_shown_but_not_expanded() {
        let conn = db::open_in_memory().unwrap();
        let group = insert(&conn, "G", ParentLinks::EnterpriseGroup, false);
        let enterprise = insert(
            &conn,
            "E",
            ParentLinks::EnterpriseUnit {
                ent_group_id: Some(group.id),
            },
            true,
        );
        let legal = insert(
            &conn,
            "L",
            ParentLinks::LegalUnit {
                enterprise_unit_id: Some(enterprise.id),
                ent_group_id: None,
            },
            false,
        );

        let forest = build_graph(&conn, &[legal], 16).unwrap();
        assert_eq!(forest.len(), 1);
        let top = &forest[0];
        assert_eq!(top.unit, enterprise);
        assert!(top.is_deleted);
        assert!(top.find(group).is_none());
        assert!(top.find(legal).unwrap().highlighted);
    }

    #[test]
    fn dangling_pointer_ends_the_branch() {
        let conn = db::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
        let legal = insert(
            &conn,
            "L",
            ParentLinks::LegalUnit {
                enterprise_unit_id: Some(404),
                ent_group_id: None,
            },
            false,
        );

        let forest = build_graph(&conn, &[legal], 16).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].unit, legal);
    }

    #[test]
    fn hop_guard_trips_on_long_chain() {
        let conn = db::open_in_memory().unwrap();
        let group = insert(&conn, "G", ParentLinks::EnterpriseGroup, false);
        let enterprise = insert(
            &conn,
            "E",
            ParentLinks::EnterpriseUnit {
                ent_group_id: Some(group.id),
            },
            false,
        );
        let legal = insert(
            &conn,
            "L",
            ParentLinks::LegalUnit {
                enterprise_unit_id: Some(enterprise.id),
                ent_group_id: None,
            },
            false,
        );
        let local = insert(
            &conn,
            "U",
            ParentLinks::LocalUnit {
                legal_unit_id: Some(legal.id),
                enterprise_unit_id: None,
            },
            false,
        );

        assert!(build_graph(&conn, &[local], 3).is_ok());
        let err = build_graph(&conn, &[local], 2).unwrap_err();
        assert!(matches!(
            err,
            RegisterError::GraphTooDeep { max_hops: 2, .. }
        ));
    }

    #[test]
    fn missing_root_is_not_found() {
        let conn = db::open_in_memory().unwrap();
        let err = build_graph(&conn, &[UnitRef::new(UnitType::LocalUnit, 5)], 16).unwrap_err();
        assert!(matches!(err, RegisterError::UnitNotFound(_)));
    }

    #[test]
    fn local_unit_under_two_parents_appears_under_both() {
        let conn = db::open_in_memory().unwrap();
        let legal = insert(&conn, "L", ParentLinks::empty(UnitType::LegalUnit), false);
        let enterprise = insert(&conn, "E", ParentLinks::EnterpriseUnit { ent_group_id: None }, false);
        let local = insert(
            &conn,
            "U",
            ParentLinks::LocalUnit {
                legal_unit_id: Some(legal.id),
                enterprise_unit_id: Some(enterprise.id),
            },
            false,
        );

        let forest = build_graph(&conn, &[local], 16).unwrap();
        let roots: Vec<UnitRef> = forest.iter().map(|n| n.unit).collect();
        assert_eq!(roots, vec![legal, enterprise]);
        assert!(forest.iter().all(|root| root.children[0].unit == local));
        assert!(forest.iter().all(|root| root.children[0].highlighted));
    }
}
