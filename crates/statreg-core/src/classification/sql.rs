//! Recursive-CTE forms of the classification queries.
//!
//! Each query runs as one statement inside SQLite. The upward walk is
//! capped at [`MAX_TREE_DEPTH`] steps so a corrupt (cyclic) tree still
//! terminates; a repeated id is reported as a cycle and a walk that hits
//! the cap with a parent still pending as `ClassificationTooDeep`. The
//! downward closure uses `UNION` over ids alone, which ends on loops
//! without any cap.

use rusqlite::Connection;
use std::collections::{BTreeSet, HashSet};
use tracing::error;

use crate::{
    error::RegisterError,
    model::{ClassificationNode, ClassificationTree},
};

use super::{MAX_TREE_DEPTH, PathResolver, row_to_node};

/// Root path of `node_id` via `WITH RECURSIVE`.
///
/// # Errors
///
/// `ClassificationNodeNotFound` for an unknown node or a dangling parent,
/// `ClassificationCycle` when the walk revisits a node,
/// `ClassificationTooDeep` past [`MAX_TREE_DEPTH`].
pub fn root_path(
    conn: &Connection,
    tree: ClassificationTree,
    node_id: i64,
) -> Result<Vec<ClassificationNode>, RegisterError> {
    let table = tree.table();
    let sql = format!(
        "WITH RECURSIVE ancestry(id, code, name, parent_id, level, hops) AS (
             SELECT id, code, name, parent_id, level, 0 FROM {table} WHERE id = ?1
             UNION ALL
             SELECT t.id, t.code, t.name, t.parent_id, t.level, a.hops + 1
             FROM {table} t
             JOIN ancestry a ON t.id = a.parent_id
             WHERE a.hops < {MAX_TREE_DEPTH}
         )
         SELECT id, code, name, parent_id, level FROM ancestry ORDER BY hops DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let path = stmt
        .query_map([node_id], row_to_node)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if path.is_empty() {
        return Err(RegisterError::ClassificationNodeNotFound { tree, node_id });
    }
    let mut seen = HashSet::with_capacity(path.len());
    if !path.iter().all(|node| seen.insert(node.id)) {
        error!(%tree, node_id, "cycle in classification tree");
        return Err(RegisterError::ClassificationCycle { tree, node_id });
    }
    // The topmost row must be a root, otherwise the walk was cut short.
    if let Some(parent_id) = path.first().and_then(|top| top.parent_id) {
        if path.len() > MAX_TREE_DEPTH {
            error!(%tree, node_id, max_depth = MAX_TREE_DEPTH, "classification path too deep");
            return Err(RegisterError::ClassificationTooDeep {
                tree,
                node_id,
                max_depth: MAX_TREE_DEPTH,
            });
        }
        return Err(RegisterError::ClassificationNodeNotFound {
            tree,
            node_id: parent_id,
        });
    }
    Ok(path)
}

/// Subtree closure of `node_id` via `WITH RECURSIVE`.
///
/// # Errors
///
/// `ClassificationNodeNotFound` for an unknown node.
pub fn subtree_ids(
    conn: &Connection,
    tree: ClassificationTree,
    node_id: i64,
) -> Result<BTreeSet<i64>, RegisterError> {
    let mut stmt = conn.prepare(&subtree_select(tree))?;
    let ids = stmt
        .query_map([node_id], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<i64>>>()?;

    if ids.is_empty() {
        return Err(RegisterError::ClassificationNodeNotFound { tree, node_id });
    }
    Ok(ids)
}

/// A `SELECT` of the subtree ids below one `?` parameter, for use as a
/// standalone query or as an `IN (...)` subquery.
pub fn subtree_select(tree: ClassificationTree) -> String {
    let table = tree.table();
    format!(
        "WITH RECURSIVE subtree(id) AS (
             SELECT id FROM {table} WHERE id = ?
             UNION
             SELECT t.id FROM {table} t JOIN subtree s ON t.parent_id = s.id
         )
         SELECT id FROM subtree"
    )
}

/// [`PathResolver`] backed by the recursive-CTE queries.
#[derive(Clone, Copy)]
pub struct SqlResolver<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlResolver<'conn> {
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PathResolver for SqlResolver<'_> {
    fn root_path(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<Vec<ClassificationNode>, RegisterError> {
        root_path(self.conn, tree, node_id)
    }

    fn subtree_ids(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<BTreeSet<i64>, RegisterError> {
        subtree_ids(self.conn, tree, node_id)
    }
}
