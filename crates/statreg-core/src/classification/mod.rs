//! Classification hierarchy resolution.
//!
//! Regions, activity categories and sector codes are adjacency-list trees
//! (`parent_id` pointers) of unbounded depth. Reporting needs two questions
//! answered about them:
//!
//! - **Upward**: which ancestor of a node sits at level N (root is level 0)?
//!   Used to roll units up, e.g. every district to its province.
//! - **Downward**: which nodes lie in the subtree of a node? Used to filter
//!   units by region including all sub-regions.
//!
//! [`PathResolver`] captures both. [`Resolver`] answers them by walking the
//! tree one query per node, [`sql::SqlResolver`] with a single recursive
//! CTE, and [`cache::CachedResolver`] memoises root paths on top of
//! [`Resolver`] until the tree's generation counter moves. All three give
//! identical answers.
//!
//! # Terminology
//!
//! - **Root path**: the nodes from the tree root down to a node, inclusive.
//! - **Depth**: the node's index in its root path (`len - 1`).
//! - **Subtree**: a node plus all of its transitive children.
//!
//! Upward walks stop at [`MAX_TREE_DEPTH`]; a node deeper than that fails
//! with `ClassificationTooDeep` in every resolver rather than yielding a
//! truncated path.

pub mod cache;
pub mod sql;

pub use cache::CachedResolver;
pub use sql::SqlResolver;

use anyhow::Context as _;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use tracing::error;

use crate::{
    config::ClassificationConfig,
    db,
    error::RegisterError,
    model::{ClassificationNode, ClassificationTree, FieldValue, NodeField},
};

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Deepest level an upward walk will reach (root is level 0).
pub const MAX_TREE_DEPTH: usize = 256;

pub trait PathResolver {
    /// Nodes from the root down to `node_id`, inclusive.
    ///
    /// # Errors
    ///
    /// `ClassificationNodeNotFound` for an unknown node, `ClassificationCycle`
    /// when the parent chain loops, `ClassificationTooDeep` past
    /// [`MAX_TREE_DEPTH`].
    fn root_path(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<Vec<ClassificationNode>, RegisterError>;

    /// `node_id` plus every transitive child.
    ///
    /// # Errors
    ///
    /// `ClassificationNodeNotFound` for an unknown node.
    fn subtree_ids(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<BTreeSet<i64>, RegisterError>;

    /// The ancestor of `node_id` at `level`; the node itself when `level`
    /// equals its depth.
    ///
    /// # Errors
    ///
    /// `LevelOutOfRange` when `level` exceeds the node's depth, plus the
    /// errors of [`PathResolver::root_path`].
    fn ancestor_node_at_level(
        &self,
        tree: ClassificationTree,
        node_id: i64,
        level: usize,
    ) -> Result<ClassificationNode, RegisterError> {
        let path = self.root_path(tree, node_id)?;
        let depth = path.len().saturating_sub(1);
        path.into_iter()
            .nth(level)
            .ok_or(RegisterError::LevelOutOfRange {
                tree,
                node_id,
                level,
                depth,
            })
    }

    /// Id of the ancestor of `node_id` at `level`.
    ///
    /// # Errors
    ///
    /// See [`PathResolver::ancestor_node_at_level`].
    fn ancestor_at_level(
        &self,
        tree: ClassificationTree,
        node_id: i64,
        level: usize,
    ) -> Result<i64, RegisterError> {
        Ok(self.ancestor_node_at_level(tree, node_id, level)?.id)
    }

    /// One attribute of the ancestor of `node_id` at `level`.
    ///
    /// # Errors
    ///
    /// See [`PathResolver::ancestor_node_at_level`].
    fn field_of_ancestor(
        &self,
        tree: ClassificationTree,
        node_id: i64,
        level: usize,
        field: NodeField,
    ) -> Result<FieldValue, RegisterError> {
        Ok(self
            .ancestor_node_at_level(tree, node_id, level)?
            .field(field))
    }
}

/// Application-level resolver: one indexed lookup per visited node.
#[derive(Clone, Copy)]
pub struct Resolver<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Resolver<'conn> {
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PathResolver for Resolver<'_> {
    fn root_path(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<Vec<ClassificationNode>, RegisterError> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(node_id);

        while let Some(id) = current {
            if path.len() > MAX_TREE_DEPTH {
                error!(%tree, node_id, max_depth = MAX_TREE_DEPTH, "classification path too deep");
                return Err(RegisterError::ClassificationTooDeep {
                    tree,
                    node_id,
                    max_depth: MAX_TREE_DEPTH,
                });
            }
            if !seen.insert(id) {
                error!(%tree, node_id, repeated = id, "cycle in classification tree");
                return Err(RegisterError::ClassificationCycle { tree, node_id });
            }
            let node = get_node(self.conn, tree, id)?
                .ok_or(RegisterError::ClassificationNodeNotFound { tree, node_id: id })?;
            current = node.parent_id;
            path.push(node);
        }

        path.reverse();
        Ok(path)
    }

    fn subtree_ids(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<BTreeSet<i64>, RegisterError> {
        if get_node(self.conn, tree, node_id)?.is_none() {
            return Err(RegisterError::ClassificationNodeNotFound { tree, node_id });
        }

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([node_id]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            for child in child_ids(self.conn, tree, current)? {
                if !visited.contains(&child) {
                    queue.push_back(child);
                }
            }
        }
        Ok(visited)
    }
}

/// The resolver selected by `[classification] cache`.
pub fn resolver_for<'conn>(
    conn: &'conn Connection,
    config: &ClassificationConfig,
) -> Box<dyn PathResolver + 'conn> {
    if config.cache {
        Box::new(CachedResolver::new(conn))
    } else {
        Box::new(Resolver::new(conn))
    }
}

/// A node's own entry plus one ancestor, for display next to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationLabel {
    pub tree: ClassificationTree,
    pub node: ClassificationNode,
    /// `None` when the node is shallower than the requested level.
    pub ancestor: Option<ClassificationNode>,
}

/// Label `node_id` with its ancestor at `level`.
///
/// # Errors
///
/// Returns the errors of [`PathResolver::root_path`].
pub fn describe(
    resolver: &dyn PathResolver,
    tree: ClassificationTree,
    node_id: i64,
    level: usize,
) -> Result<ClassificationLabel, RegisterError> {
    let mut path = resolver.root_path(tree, node_id)?;
    let ancestor = path.get(level).cloned();
    let node = path
        .pop()
        .ok_or(RegisterError::ClassificationNodeNotFound { tree, node_id })?;
    Ok(ClassificationLabel {
        tree,
        node,
        ancestor,
    })
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub(crate) fn row_to_node(row: &Row<'_>) -> rusqlite::Result<ClassificationNode> {
    Ok(ClassificationNode {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        parent_id: row.get(3)?,
        level: row.get(4)?,
    })
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_node(
    conn: &Connection,
    tree: ClassificationTree,
    node_id: i64,
) -> rusqlite::Result<Option<ClassificationNode>> {
    let sql = format!(
        "SELECT id, code, name, parent_id, level FROM {} WHERE id = ?1",
        tree.table()
    );
    conn.query_row(&sql, [node_id], row_to_node).optional()
}

fn child_ids(
    conn: &Connection,
    tree: ClassificationTree,
    parent_id: i64,
) -> rusqlite::Result<Vec<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE parent_id = ?1 ORDER BY id",
        tree.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt.query_map([parent_id], |row| row.get(0))?;
    ids.collect()
}

/// Current generation counter of `tree`; bumped by triggers on every write.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn generation(conn: &Connection, tree: ClassificationTree) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT generation FROM classification_meta WHERE tree = ?1",
        [tree.as_str()],
        |row| row.get(0),
    )
}

/// Insert or replace one node, keyed by id.
///
/// # Errors
///
/// Returns an error if the write violates a constraint (unknown parent,
/// duplicate code) or fails.
pub fn upsert_node(
    conn: &Connection,
    tree: ClassificationTree,
    node: &ClassificationNode,
) -> rusqlite::Result<()> {
    let sql = format!(
        "INSERT INTO {} (id, code, name, parent_id, level) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             code = excluded.code,
             name = excluded.name,
             parent_id = excluded.parent_id,
             level = excluded.level",
        tree.table()
    );
    conn.execute(
        &sql,
        params![node.id, node.code, node.name, node.parent_id, node.level],
    )?;
    Ok(())
}

/// Upsert a batch of nodes in one transaction. Parents may appear after
/// their children; references are checked at commit.
///
/// # Errors
///
/// Returns an error (and writes nothing) if any node is rejected.
pub fn import_nodes(
    conn: &Connection,
    tree: ClassificationTree,
    nodes: &[ClassificationNode],
) -> rusqlite::Result<usize> {
    let tx = db::begin_immediate(conn)?;
    tx.pragma_update(None, "defer_foreign_keys", "ON")?;
    for node in nodes {
        upsert_node(&tx, tree, node)?;
    }
    tx.commit()?;
    tracing::info!(%tree, count = nodes.len(), "imported classification nodes");
    Ok(nodes.len())
}

/// Read a JSON array of nodes, as exported by reference-data tooling.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a node array.
pub fn load_nodes_file(path: &Path) -> anyhow::Result<Vec<ClassificationNode>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn node(id: i64, code: &str, parent_id: Option<i64>, level: i64) -> ClassificationNode {
        ClassificationNode {
            id,
            code: code.into(),
            name: format!("Node {code}"),
            parent_id,
            level,
        }
    }

    /// R0 -> R1 -> R2, plus R1 -> R3 and a second root R9.
    pub(crate) fn region_tree() -> Connection {
        let conn = db::open_in_memory().unwrap();
        import_nodes(
            &conn,
            ClassificationTree::Region,
            &[
                node(3, "R3", Some(1), 2),
                node(2, "R2", Some(1), 2),
                node(1, "R1", Some(0), 1),
                node(0, "R0", None, 0),
                node(9, "R9", None, 0),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn root_path_runs_root_to_node() {
        let conn = region_tree();
        let resolver = Resolver::new(&conn);
        let ids: Vec<i64> = resolver
            .root_path(ClassificationTree::Region, 2)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn ancestor_levels_and_range() {
        let conn = region_tree();
        let resolver = Resolver::new(&conn);
        let tree = ClassificationTree::Region;
        assert_eq!(resolver.ancestor_at_level(tree, 2, 0).unwrap(), 0);
        assert_eq!(resolver.ancestor_at_level(tree, 2, 1).unwrap(), 1);
        assert_eq!(resolver.ancestor_at_level(tree, 2, 2).unwrap(), 2);
        let err = resolver.ancestor_at_level(tree, 2, 5).unwrap_err();
        assert!(matches!(
            err,
            RegisterError::LevelOutOfRange {
                level: 5,
                depth: 2,
                ..
            }
        ));
    }

    #[test]
    fn field_of_ancestor_selects_attribute() {
        let conn = region_tree();
        let resolver = Resolver::new(&conn);
        assert_eq!(
            resolver
                .field_of_ancestor(ClassificationTree::Region, 3, 1, NodeField::Code)
                .unwrap(),
            FieldValue::Text("R1".into())
        );
    }

    #[test]
    fn subtree_includes_node_and_descendants() {
        let conn = region_tree();
        let resolver = Resolver::new(&conn);
        let tree = ClassificationTree::Region;
        assert_eq!(
            resolver.subtree_ids(tree, 0).unwrap(),
            BTreeSet::from([0, 1, 2, 3])
        );
        assert_eq!(resolver.subtree_ids(tree, 2).unwrap(), BTreeSet::from([2]));
        assert!(matches!(
            resolver.subtree_ids(tree, 77),
            Err(RegisterError::ClassificationNodeNotFound { node_id: 77, .. })
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let conn = region_tree();
        conn.execute("UPDATE regions SET parent_id = 2 WHERE id = 0", [])
            .unwrap();
        let err = Resolver::new(&conn)
            .root_path(ClassificationTree::Region, 2)
            .unwrap_err();
        assert!(matches!(err, RegisterError::ClassificationCycle { .. }));
    }

    #[test]
    fn import_rejects_unknown_parent_atomically() {
        let conn = db::open_in_memory().unwrap();
        let result = import_nodes(
            &conn,
            ClassificationTree::SectorCode,
            &[node(1, "S1", None, 0), node(2, "S2", Some(42), 1)],
        );
        assert!(result.is_err());
        assert!(get_node(&conn, ClassificationTree::SectorCode, 1).unwrap().is_none());
    }

    #[test]
    fn describe_pairs_node_with_ancestor() {
        let conn = region_tree();
        let resolver = Resolver::new(&conn);
        let label = describe(&resolver, ClassificationTree::Region, 2, 1).unwrap();
        assert_eq!(label.node.code, "R2");
        assert_eq!(label.ancestor.unwrap().code, "R1");

        let shallow = describe(&resolver, ClassificationTree::Region, 9, 1).unwrap();
        assert!(shallow.ancestor.is_none());
    }

    #[test]
    fn nodes_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "code": "KG", "name": "Kyrgyzstan"},
                {"id": 2, "code": "KG-B", "name": "Bishkek", "parent_id": 1, "level": 1}]"#,
        )
        .unwrap();
        let nodes = load_nodes_file(&path).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].parent_id, Some(1));
    }
}
