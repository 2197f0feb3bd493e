//! Generation-checked root-path cache.
//!
//! Every write to a classification table bumps that tree's counter in
//! `classification_meta` (see the schema triggers). Before serving a cached
//! path the cache reads the counter; if it moved, every cached path of that
//! tree is dropped first. A stale path is therefore never returned, even
//! when another connection wrote the tree.

use rusqlite::Connection;
use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
};

use crate::{
    error::RegisterError,
    model::{ClassificationNode, ClassificationTree},
};

use super::{PathResolver, Resolver, generation};

#[derive(Default)]
struct TreeCache {
    generation: i64,
    paths: HashMap<i64, Vec<ClassificationNode>>,
}

/// [`Resolver`] with memoised root paths. Subtree queries are not cached.
pub struct CachedResolver<'conn> {
    conn: &'conn Connection,
    inner: Resolver<'conn>,
    trees: RefCell<HashMap<ClassificationTree, TreeCache>>,
}

impl<'conn> CachedResolver<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            inner: Resolver::new(conn),
            trees: RefCell::new(HashMap::new()),
        }
    }

    /// Number of root paths currently held for `tree`.
    pub fn cached_paths(&self, tree: ClassificationTree) -> usize {
        self.trees
            .borrow()
            .get(&tree)
            .map_or(0, |cache| cache.paths.len())
    }
}

impl PathResolver for CachedResolver<'_> {
    fn root_path(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<Vec<ClassificationNode>, RegisterError> {
        let current = generation(self.conn, tree)?;
        {
            let mut trees = self.trees.borrow_mut();
            let cache = trees.entry(tree).or_default();
            if cache.generation != current {
                tracing::debug!(
                    %tree,
                    cached = cache.generation,
                    current,
                    "classification tree changed; dropping cached paths"
                );
                cache.paths.clear();
                cache.generation = current;
            }
            if let Some(path) = cache.paths.get(&node_id) {
                return Ok(path.clone());
            }
        }

        let path = self.inner.root_path(tree, node_id)?;
        self.trees
            .borrow_mut()
            .entry(tree)
            .or_default()
            .paths
            .insert(node_id, path.clone());
        Ok(path)
    }

    fn subtree_ids(
        &self,
        tree: ClassificationTree,
        node_id: i64,
    ) -> Result<BTreeSet<i64>, RegisterError> {
        self.inner.subtree_ids(tree, node_id)
    }
}
