//! Parent/child links between statistical units.
//!
//! The hierarchy has exactly five edges, listed in [`edges`]. Each edge knows
//! the parent-pointer column on the child and how to read and write it on a
//! [`ParentLinks`] value, so validation, mutation and graph assembly all
//! dispatch through the same table.
//!
//! A legal unit belongs either to an enterprise or directly to an
//! enterprise group, never both: its two edges are marked exclusive and
//! linking along one clears the other in the same version.

mod graph;

pub use graph::{GraphNode, build_graph};

use rusqlite::Connection;
use serde::Serialize;
use std::{collections::HashMap, sync::LazyLock};
use tracing::info;

use crate::{
    config::RegisterConfig,
    db::{self, query},
    error::RegisterError,
    history::{self, Change},
    model::{
        Actor, ChangeReason, ParentLinks, StatUnit, UnitRef, UnitType, actor::field_name,
    },
};

// ---------------------------------------------------------------------------
// Edge table
// ---------------------------------------------------------------------------

/// One valid `(child type, parent type)` pair.
pub struct LinkEdge {
    pub child: UnitType,
    pub parent: UnitType,
    /// Parent-pointer column on the child's table.
    pub column: &'static str,
    /// Set on edges of a child that may hold only one of them at a time.
    pub exclusive: bool,
    get: fn(&ParentLinks) -> Option<i64>,
    set: fn(&mut ParentLinks, Option<i64>),
}

impl LinkEdge {
    pub fn parent_id(&self, unit: &StatUnit) -> Option<i64> {
        (self.get)(&unit.links)
    }

    pub fn set_parent_id(&self, unit: &mut StatUnit, parent_id: Option<i64>) {
        self.set_pointer(&mut unit.links, parent_id);
    }

    /// Write the pointer on links that are not attached to a stored row yet,
    /// e.g. [`crate::model::NewUnit::links`].
    pub fn set_pointer(&self, links: &mut ParentLinks, parent_id: Option<i64>) {
        (self.set)(links, parent_id);
    }

    /// The other exclusive edge of the same child, if this edge has one.
    pub fn rival(&self) -> Option<&'static LinkEdge> {
        if !self.exclusive {
            return None;
        }
        parent_edges(self.child).find(|other| other.exclusive && other.parent != self.parent)
    }

    /// Allow-list name of the pointer field, e.g. `legal_unit.ent_group_id`.
    pub fn field(&self) -> String {
        field_name(self.child, self.column)
    }
}

impl std::fmt::Debug for LinkEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEdge")
            .field("child", &self.child)
            .field("parent", &self.parent)
            .field("column", &self.column)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

const fn local_legal(links: &ParentLinks) -> Option<i64> {
    match links {
        ParentLinks::LocalUnit { legal_unit_id, .. } => *legal_unit_id,
        _ => None,
    }
}

const fn set_local_legal(links: &mut ParentLinks, id: Option<i64>) {
    if let ParentLinks::LocalUnit { legal_unit_id, .. } = links {
        *legal_unit_id = id;
    }
}

const fn local_enterprise(links: &ParentLinks) -> Option<i64> {
    match links {
        ParentLinks::LocalUnit {
            enterprise_unit_id, ..
        } => *enterprise_unit_id,
        _ => None,
    }
}

const fn set_local_enterprise(links: &mut ParentLinks, id: Option<i64>) {
    if let ParentLinks::LocalUnit {
        enterprise_unit_id, ..
    } = links
    {
        *enterprise_unit_id = id;
    }
}

const fn legal_enterprise(links: &ParentLinks) -> Option<i64> {
    match links {
        ParentLinks::LegalUnit {
            enterprise_unit_id, ..
        } => *enterprise_unit_id,
        _ => None,
    }
}

const fn set_legal_enterprise(links: &mut ParentLinks, id: Option<i64>) {
    if let ParentLinks::LegalUnit {
        enterprise_unit_id, ..
    } = links
    {
        *enterprise_unit_id = id;
    }
}

const fn legal_group(links: &ParentLinks) -> Option<i64> {
    match links {
        ParentLinks::LegalUnit { ent_group_id, .. } => *ent_group_id,
        _ => None,
    }
}

const fn set_legal_group(links: &mut ParentLinks, id: Option<i64>) {
    if let ParentLinks::LegalUnit { ent_group_id, .. } = links {
        *ent_group_id = id;
    }
}

const fn enterprise_group(links: &ParentLinks) -> Option<i64> {
    match links {
        ParentLinks::EnterpriseUnit { ent_group_id } => *ent_group_id,
        _ => None,
    }
}

const fn set_enterprise_group(links: &mut ParentLinks, id: Option<i64>) {
    if let ParentLinks::EnterpriseUnit { ent_group_id } = links {
        *ent_group_id = id;
    }
}

static EDGES: [LinkEdge; 5] = [
    LinkEdge {
        child: UnitType::LocalUnit,
        parent: UnitType::LegalUnit,
        column: "legal_unit_id",
        exclusive: false,
        get: local_legal,
        set: set_local_legal,
    },
    LinkEdge {
        child: UnitType::LocalUnit,
        parent: UnitType::EnterpriseUnit,
        column: "enterprise_unit_id",
        exclusive: false,
        get: local_enterprise,
        set: set_local_enterprise,
    },
    LinkEdge {
        child: UnitType::LegalUnit,
        parent: UnitType::EnterpriseUnit,
        column: "enterprise_unit_id",
        exclusive: true,
        get: legal_enterprise,
        set: set_legal_enterprise,
    },
    LinkEdge {
        child: UnitType::LegalUnit,
        parent: UnitType::EnterpriseGroup,
        column: "ent_group_id",
        exclusive: true,
        get: legal_group,
        set: set_legal_group,
    },
    LinkEdge {
        child: UnitType::EnterpriseUnit,
        parent: UnitType::EnterpriseGroup,
        column: "ent_group_id",
        exclusive: false,
        get: enterprise_group,
        set: set_enterprise_group,
    },
];

static EDGE_INDEX: LazyLock<HashMap<(UnitType, UnitType), &'static LinkEdge>> =
    LazyLock::new(|| {
        EDGES
            .iter()
            .map(|edge| ((edge.child, edge.parent), edge))
            .collect()
    });

/// All hierarchy edges.
pub fn edges() -> &'static [LinkEdge] {
    &EDGES
}

/// The edge from `child` up to `parent`, if one exists.
pub fn edge(child: UnitType, parent: UnitType) -> Option<&'static LinkEdge> {
    EDGE_INDEX.get(&(child, parent)).copied()
}

/// Edges on which `child` is the child.
pub fn parent_edges(child: UnitType) -> impl Iterator<Item = &'static LinkEdge> {
    EDGES.iter().filter(move |edge| edge.child == child)
}

/// Edges on which `parent` is the parent.
pub fn child_edges(parent: UnitType) -> impl Iterator<Item = &'static LinkEdge> {
    EDGES.iter().filter(move |edge| edge.parent == parent)
}

/// Reject links that set both pointers of an exclusive pair.
///
/// # Errors
///
/// Returns `ExclusiveParents` naming the two parent types.
pub fn check_exclusive(links: &ParentLinks) -> Result<(), RegisterError> {
    let mut held = parent_edges(links.unit_type())
        .filter(|edge| edge.exclusive && (edge.get)(links).is_some());
    if let (Some(first), Some(second)) = (held.next(), held.next()) {
        return Err(RegisterError::ExclusiveParents {
            unit_type: first.child,
            first: first.parent,
            second: second.parent,
        });
    }
    Ok(())
}

/// Two unit references matched to an edge, in child/parent orientation.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedLink {
    pub edge: &'static LinkEdge,
    pub child: UnitRef,
    pub parent: UnitRef,
}

/// Match `a` and `b` to an edge in whichever orientation is valid.
///
/// # Errors
///
/// Returns `InvalidLinkType` if neither orientation is an edge.
pub fn resolve(a: UnitRef, b: UnitRef) -> Result<ResolvedLink, RegisterError> {
    if let Some(edge) = edge(a.unit_type, b.unit_type) {
        return Ok(ResolvedLink {
            edge,
            child: a,
            parent: b,
        });
    }
    if let Some(edge) = edge(b.unit_type, a.unit_type) {
        return Ok(ResolvedLink {
            edge,
            child: b,
            parent: a,
        });
    }
    Err(RegisterError::InvalidLinkType {
        first: a.unit_type,
        second: b.unit_type,
    })
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Short identity of a unit used in link listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub unit: UnitRef,
    pub name: String,
    pub is_deleted: bool,
}

impl From<&StatUnit> for UnitSummary {
    fn from(unit: &StatUnit) -> Self {
        Self {
            unit: unit.unit_ref(),
            name: unit.name.clone(),
            is_deleted: unit.is_deleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkPair {
    pub parent: UnitSummary,
    pub child: UnitSummary,
}

/// Creates, removes and inspects links on behalf of one actor.
pub struct LinkService<'conn> {
    conn: &'conn Connection,
    actor: Actor,
    config: RegisterConfig,
}

impl<'conn> LinkService<'conn> {
    pub fn new(conn: &'conn Connection, actor: Actor) -> Self {
        Self {
            conn,
            actor,
            config: RegisterConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RegisterConfig) -> Self {
        self.config = config;
        self
    }

    fn load(&self, unit: UnitRef, include_deleted: bool) -> Result<StatUnit, RegisterError> {
        query::get_live_unit(self.conn, unit, include_deleted)?
            .ok_or(RegisterError::UnitNotFound(unit))
    }

    fn require_writable(&self, edge: &LinkEdge) -> Result<(), RegisterError> {
        if self.actor.writable.allows(edge.child, edge.column) {
            Ok(())
        } else {
            Err(RegisterError::FieldAccessDenied { field: edge.field() })
        }
    }

    /// Whether `a` and `b` could be linked: the child's pointer for the edge
    /// is empty or already names the parent, and no exclusive rival pointer
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLinkType` for an unrelated pair and `UnitNotFound`
    /// when either unit is missing or deleted.
    pub fn can_link(&self, a: UnitRef, b: UnitRef) -> Result<bool, RegisterError> {
        let link = resolve(a, b)?;
        let child = self.load(link.child, false)?;
        let parent = self.load(link.parent, false)?;
        let rival_held = link
            .edge
            .rival()
            .is_some_and(|rival| rival.parent_id(&child).is_some());
        Ok(!rival_held
            && link
                .edge
                .parent_id(&child)
                .is_none_or(|current| current == parent.id))
    }

    /// Whether the child of `a`/`b` currently points at the parent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLinkType` for an unrelated pair and `UnitNotFound`
    /// when the child is missing.
    pub fn link_exists(&self, a: UnitRef, b: UnitRef) -> Result<bool, RegisterError> {
        let link = resolve(a, b)?;
        let child = self.load(link.child, true)?;
        Ok(link.edge.parent_id(&child) == Some(link.parent.id))
    }

    /// Point the child of `a`/`b` at the parent, versioning both units.
    ///
    /// A child that already points at a different parent is re-pointed, and
    /// a legal unit's rival pointer (enterprise vs. group) is cleared in the
    /// same version.
    ///
    /// # Errors
    ///
    /// - `InvalidLinkType` for an unrelated pair
    /// - `FieldAccessDenied` when the actor may not write the pointer, or the
    ///   rival pointer it would clear
    /// - `UnitNotFound` when either unit is missing or deleted
    /// - `LinkAlreadyExists` when the pointer already names the parent
    /// - `ConcurrentModification` once retries are exhausted
    pub fn create_link(
        &self,
        a: UnitRef,
        b: UnitRef,
        comment: Option<&str>,
    ) -> Result<(), RegisterError> {
        let link = resolve(a, b)?;
        self.require_writable(link.edge)?;
        history::with_retry(self.config.history.max_retries, || {
            self.create_link_once(&link, comment)
        })?;
        info!(child = %link.child, parent = %link.parent, "link created");
        Ok(())
    }

    fn create_link_once(
        &self,
        link: &ResolvedLink,
        comment: Option<&str>,
    ) -> Result<(), RegisterError> {
        let tx = db::begin_immediate(self.conn)?;
        let child = self.load(link.child, false)?;
        let parent = self.load(link.parent, false)?;
        if link.edge.parent_id(&child) == Some(parent.id) {
            return Err(RegisterError::LinkAlreadyExists {
                child: link.child,
                parent: link.parent,
            });
        }

        let rival = link
            .edge
            .rival()
            .filter(|rival| rival.parent_id(&child).is_some());
        if let Some(rival) = rival {
            self.require_writable(rival)?;
            info!(
                child = %link.child,
                cleared = rival.column,
                "clearing exclusive parent pointer"
            );
        }

        let change = Change::now(ChangeReason::Edit, &self.actor.user_id, comment);
        history::track(&tx, &child, &change, |next| {
            link.edge.set_parent_id(next, Some(parent.id));
            if let Some(rival) = rival {
                rival.set_parent_id(next, None);
            }
        })?;
        history::track(&tx, &parent, &change, |_| {})?;
        tx.commit()?;
        Ok(())
    }

    /// Clear the child's pointer to the parent, versioning both units.
    ///
    /// The parent may be deleted, so stale pointers can still be removed.
    ///
    /// # Errors
    ///
    /// - `InvalidLinkType` for an unrelated pair
    /// - `FieldAccessDenied` when the actor may not write the pointer
    /// - `UnitNotFound` when the child is missing or deleted
    /// - `LinkNotExists` when the pointer does not name the parent
    /// - `ConcurrentModification` once retries are exhausted
    pub fn delete_link(
        &self,
        a: UnitRef,
        b: UnitRef,
        comment: Option<&str>,
    ) -> Result<(), RegisterError> {
        let link = resolve(a, b)?;
        self.require_writable(link.edge)?;
        history::with_retry(self.config.history.max_retries, || {
            self.delete_link_once(&link, comment)
        })?;
        info!(child = %link.child, parent = %link.parent, "link deleted");
        Ok(())
    }

    fn delete_link_once(
        &self,
        link: &ResolvedLink,
        comment: Option<&str>,
    ) -> Result<(), RegisterError> {
        let tx = db::begin_immediate(self.conn)?;
        let child = self.load(link.child, false)?;
        if link.edge.parent_id(&child) != Some(link.parent.id) {
            return Err(RegisterError::LinkNotExists {
                child: link.child,
                parent: link.parent,
            });
        }

        let change = Change::now(ChangeReason::Edit, &self.actor.user_id, comment);
        history::track(&tx, &child, &change, |next| {
            link.edge.set_parent_id(next, None);
        })?;
        // A deleted parent stays untouched: tracking it is a no-op.
        if let Some(parent) = query::get_live_unit(&tx, link.parent, true)? {
            history::track(&tx, &parent, &change, |_| {})?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The unit's live parents and live direct children.
    ///
    /// # Errors
    ///
    /// Returns `UnitNotFound` if the unit is missing.
    pub fn links_list(&self, unit: UnitRef) -> Result<Vec<LinkPair>, RegisterError> {
        let this = self.load(unit, true)?;
        let mut pairs = Vec::new();

        for edge in parent_edges(unit.unit_type) {
            let Some(parent_id) = edge.parent_id(&this) else {
                continue;
            };
            let parent_ref = UnitRef::new(edge.parent, parent_id);
            if let Some(parent) = query::get_live_unit(self.conn, parent_ref, false)? {
                pairs.push(LinkPair {
                    parent: UnitSummary::from(&parent),
                    child: UnitSummary::from(&this),
                });
            }
        }

        for child in self.children_of(unit)? {
            pairs.push(LinkPair {
                parent: UnitSummary::from(&this),
                child: UnitSummary::from(&child),
            });
        }

        Ok(pairs)
    }

    /// Live, non-deleted direct children across every edge where `unit` is
    /// the parent, ordered by `(type, id)`.
    ///
    /// # Errors
    ///
    /// Returns `Db` if a query fails.
    pub fn children_of(&self, unit: UnitRef) -> Result<Vec<StatUnit>, RegisterError> {
        let mut children = Vec::new();
        for edge in child_edges(unit.unit_type) {
            children.extend(query::live_children(
                self.conn,
                edge.child,
                edge.column,
                unit.id,
            )?);
        }
        children.sort_by_key(StatUnit::unit_ref);
        Ok(children)
    }

    /// Assemble the hierarchy above `roots`; see [`build_graph`].
    ///
    /// # Errors
    ///
    /// Returns `UnitNotFound` for a missing root and `GraphTooDeep` when a
    /// chain exceeds `graph.max_hops`.
    pub fn build_graph(&self, roots: &[UnitRef]) -> Result<Vec<GraphNode>, RegisterError> {
        build_graph(self.conn, roots, self.config.graph.max_hops)
    }
}
