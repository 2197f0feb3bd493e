//! Append-only version history for statistical units.
//!
//! # Terminology
//!
//! - **Live row**: the row with `history_parent_id IS NULL`. It keeps the
//!   unit's id for life and always has an open window
//!   (`valid_to_us = VALID_TO_OPEN`).
//! - **Historical row**: a frozen copy of an earlier live state, stored in
//!   the same table under a fresh id with `history_parent_id` naming the
//!   live id.
//! - **Window**: `[valid_from_us, valid_to_us)`. A unit's windows, ordered
//!   by start, tile time without gaps or overlap.
//!
//! Every change goes through [`track`]: the live values are copied into a
//! new historical row closed at the change time, and the live row is
//! rewritten in place with the change applied and a window starting at the
//! same instant. The live-row write is guarded on the window the caller
//! read, so two writers racing on one unit cannot both commit.

mod audit;

pub use audit::{
    ChainReport, ChainViolation, ChangedField, history_changes, unit_history,
    verify_history_chain,
};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::{
    db::query,
    error::RegisterError,
    model::{ChangeReason, StatUnit, VALID_TO_OPEN},
};

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// The two rows a change produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Copy of the pre-change live state, closed at the change time.
    pub historical: StatUnit,
    /// The new live state, keeping the live id.
    pub live: StatUnit,
}

/// Split `live` into a closed historical copy and a mutated successor.
///
/// `at_us` is clamped to `live.valid_from_us + 1` so a clock that has not
/// advanced (or went backwards) never produces an empty window.
pub fn snapshot(live: &StatUnit, at_us: i64, mutate: impl FnOnce(&mut StatUnit)) -> Snapshot {
    let at_us = at_us.max(live.valid_from_us.saturating_add(1));

    let mut historical = live.clone();
    historical.valid_to_us = at_us;
    historical.history_parent_id = Some(live.id);

    let mut next = live.clone();
    mutate(&mut next);
    next.id = live.id;
    next.valid_from_us = at_us;
    next.valid_to_us = VALID_TO_OPEN;
    next.history_parent_id = None;

    Snapshot {
        historical,
        live: next,
    }
}

/// Metadata stamped on the new live state.
#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    pub reason: ChangeReason,
    pub comment: Option<&'a str>,
    pub user_id: &'a str,
    pub at_us: i64,
}

impl<'a> Change<'a> {
    pub fn now(reason: ChangeReason, user_id: &'a str, comment: Option<&'a str>) -> Self {
        Self {
            reason,
            comment,
            user_id,
            at_us: now_us(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The unit was deleted and stays deleted; nothing was written.
    Unchanged,
    /// A historical row was appended and the live row rewritten.
    Tracked {
        history_row_id: i64,
        live: StatUnit,
    },
}

impl TrackOutcome {
    pub const fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked { .. })
    }
}

/// Persist one change of `live` inside the caller's transaction.
///
/// `live` must be the live row as read within the same transaction. If the
/// stored live row no longer has the window `live` was read with, nothing
/// is written and [`RegisterError::ConcurrentModification`] is returned;
/// the caller's transaction then rolls back on drop.
///
/// # Errors
///
/// Returns `ConcurrentModification` on a lost race and `Db` on SQL failure.
pub fn track(
    conn: &Connection,
    live: &StatUnit,
    change: &Change<'_>,
    mutate: impl FnOnce(&mut StatUnit),
) -> Result<TrackOutcome, RegisterError> {
    let unit = live.unit_ref();
    let snap = snapshot(live, change.at_us, |next| {
        mutate(next);
        next.change_reason = change.reason;
        next.edit_comment = change.comment.map(str::to_owned);
        next.user_id = change.user_id.to_owned();
    });

    if live.is_deleted && snap.live.is_deleted {
        debug!(unit = %unit, reason = %change.reason, "unit already deleted; no version written");
        return Ok(TrackOutcome::Unchanged);
    }

    let updated = query::update_live_unit_guarded(conn, &snap.live, live.valid_from_us)?;
    if updated == 0 {
        warn!(
            unit = %unit,
            read_valid_from_us = live.valid_from_us,
            "live row changed since it was read"
        );
        return Err(RegisterError::ConcurrentModification { unit });
    }

    let history_row_id = query::insert_unit(conn, &snap.historical)?;
    debug!(
        unit = %unit,
        history_row_id,
        reason = %change.reason,
        valid_from_us = snap.live.valid_from_us,
        "tracked unit version"
    );

    Ok(TrackOutcome::Tracked {
        history_row_id,
        live: snap.live,
    })
}

/// Run a whole read-modify-write `op`, re-running it when it loses an
/// optimistic race, up to `max_attempts` attempts in total.
///
/// Any other error is returned immediately.
///
/// # Errors
///
/// Returns the last `ConcurrentModification` once attempts are exhausted,
/// or the first non-retryable error.
pub fn with_retry<T>(
    max_attempts: u32,
    mut op: impl FnMut() -> Result<T, RegisterError>,
) -> Result<T, RegisterError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %err, "retrying after concurrent modification");
                attempt += 1;
            }
            result => return result,
        }
    }
}
