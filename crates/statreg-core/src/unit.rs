//! Unit lifecycle: create, read, edit and soft delete.
//!
//! Every mutation after creation is versioned through [`crate::history`].

use rusqlite::Connection;
use tracing::info;

use crate::{
    config::RegisterConfig,
    db::{self, query},
    error::RegisterError,
    history::{self, Change, TrackOutcome},
    link,
    model::{
        Actor, ChangeReason, NewUnit, StatUnit, UnitEdit, UnitRef, UnitType, VALID_TO_OPEN,
        actor::field_name,
    },
};

pub struct UnitService<'conn> {
    conn: &'conn Connection,
    actor: Actor,
    config: RegisterConfig,
}

impl<'conn> UnitService<'conn> {
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

    fn require_writable(&self, unit_type: UnitType, column: &str) -> Result<(), RegisterError> {
        if self.actor.writable.allows(unit_type, column) {
            Ok(())
        } else {
            Err(RegisterError::FieldAccessDenied {
                field: field_name(unit_type, column),
            })
        }
    }

    /// The live row of `unit`.
    ///
    /// # Errors
    ///
    /// Returns `UnitNotFound` if the unit does not exist, or is deleted and
    /// `include_deleted` is not set.
    pub fn get_unit(&self, unit: UnitRef, include_deleted: bool) -> Result<StatUnit, RegisterError> {
        query::get_live_unit(self.conn, unit, include_deleted)?
            .ok_or(RegisterError::UnitNotFound(unit))
    }

    /// Insert a new live unit with reason `Create`.
    ///
    /// Parent pointers set on `new` must name live, non-deleted units, and a
    /// legal unit may name an enterprise or an enterprise group but not both.
    ///
    /// # Errors
    ///
    /// `ExclusiveParents` for both legal-unit parents at once,
    /// `FieldAccessDenied` for a parent pointer the actor may not write,
    /// `UnitNotFound` for a missing parent, or `Db`.
    pub fn create_unit(&self, new: &NewUnit) -> Result<StatUnit, RegisterError> {
        let unit_type = new.unit_type();
        link::check_exclusive(&new.links)?;
        let tx = db::begin_immediate(self.conn)?;

        let mut row = StatUnit {
            id: 0,
            stat_id: new.stat_id.clone(),
            name: new.name.clone(),
            region_id: new.region_id,
            activity_category_id: new.activity_category_id,
            sector_code_id: new.sector_code_id,
            valid_from_us: history::now_us(),
            valid_to_us: VALID_TO_OPEN,
            history_parent_id: None,
            is_deleted: false,
            change_reason: ChangeReason::Create,
            edit_comment: new.comment.clone(),
            user_id: self.actor.user_id.clone(),
            links: new.links,
        };

        for edge in link::parent_edges(unit_type) {
            let Some(parent_id) = edge.parent_id(&row) else {
                continue;
            };
            self.require_writable(unit_type, edge.column)?;
            let parent = UnitRef::new(edge.parent, parent_id);
            if query::get_live_unit(&tx, parent, false)?.is_none() {
                return Err(RegisterError::UnitNotFound(parent));
            }
        }

        row.id = query::insert_unit(&tx, &row)?;
        tx.commit()?;
        info!(unit = %row.unit_ref(), name = %row.name, "unit created");
        Ok(row)
    }

    /// Apply `edit` as a new version with `reason` (normally `Edit` or
    /// `Correction`).
    ///
    /// # Errors
    ///
    /// `FieldAccessDenied` for a field the actor may not write,
    /// `UnitNotFound` for a missing or deleted unit,
    /// `ConcurrentModification` once retries are exhausted, or `Db`.
    pub fn edit_unit(
        &self,
        unit: UnitRef,
        edit: &UnitEdit,
        reason: ChangeReason,
        comment: Option<&str>,
    ) -> Result<TrackOutcome, RegisterError> {
        for column in edit.touched_columns() {
            self.require_writable(unit.unit_type, column)?;
        }

        let outcome = history::with_retry(self.config.history.max_retries, || {
            let tx = db::begin_immediate(self.conn)?;
            let live = self.get_unit(unit, false)?;
            let change = Change::now(reason, &self.actor.user_id, comment);
            let outcome = history::track(&tx, &live, &change, |next| edit.apply(next))?;
            tx.commit()?;
            Ok(outcome)
        })?;
        info!(unit = %unit, %reason, fields = ?edit.touched_columns(), "unit edited");
        Ok(outcome)
    }

    /// Soft-delete (`to_delete = true`) or restore a unit.
    ///
    /// Returns `false` without writing anything when the unit is already in
    /// the requested state.
    ///
    /// # Errors
    ///
    /// `UnitNotFound` for a missing unit, `ConcurrentModification` once
    /// retries are exhausted, or `Db`.
    pub fn delete_undelete_unit(&self, unit: UnitRef, to_delete: bool) -> Result<bool, RegisterError> {
        let reason = if to_delete {
            ChangeReason::Delete
        } else {
            ChangeReason::Undelete
        };

        let changed = history::with_retry(self.config.history.max_retries, || {
            let tx = db::begin_immediate(self.conn)?;
            let live = self.get_unit(unit, true)?;
            if live.is_deleted == to_delete {
                return Ok(false);
            }
            let change = Change::now(reason, &self.actor.user_id, None);
            let outcome = history::track(&tx, &live, &change, |next| next.is_deleted = to_delete)?;
            tx.commit()?;
            Ok(outcome.is_tracked())
        })?;

        if changed {
            info!(unit = %unit, %reason, "unit deletion state changed");
        } else {
            tracing::debug!(unit = %unit, to_delete, "unit already in requested state");
        }
        Ok(changed)
    }
}
