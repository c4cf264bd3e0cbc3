use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::db::Database;
use crate::models::{HabitEntry, NewEntry, validate_conditions_met};
use crate::streak;

/// Why the authoritative store rejected (or never received) an entry write.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("habit not found: {0}")]
    NotFound(String),
    #[error("invalid entry: {0}")]
    Invalid(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Transient failures mean the write never reached the server and a
    /// retry can succeed without user action.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// The authoritative entry-upsert operation.
///
/// Production is the REST server (via the CLI's reqwest client); a plain
/// database wrapper serves single-device setups; tests use mocks. Upserts
/// must be idempotent per (habit, day) and replace the stored record whole.
/// Callers drive a backend from one thread at a time, matching the
/// single-threaded event model of the rest of the engine.
pub trait EntryBackend {
    fn upsert_entry(&self, entry: &NewEntry) -> Result<HabitEntry, SyncError>;
}

/// Backend for single-device use: the local database is the authority.
pub struct DirectBackend<'a> {
    db: &'a Database,
}

impl<'a> DirectBackend<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl EntryBackend for DirectBackend<'_> {
    fn upsert_entry(&self, entry: &NewEntry) -> Result<HabitEntry, SyncError> {
        let habit = self
            .db
            .get_habit_by_uuid(&entry.habit_uuid)
            .map_err(|e| SyncError::Storage(e.to_string()))?
            .ok_or_else(|| SyncError::NotFound(entry.habit_uuid.clone()))?;
        let conditions = self
            .db
            .get_conditions(habit.id)
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        validate_conditions_met(&entry.conditions_met, conditions.len())
            .map_err(|e| SyncError::Invalid(e.to_string()))?;
        self.db
            .upsert_entry(habit.id, entry.date, entry.completed, &entry.conditions_met)
            .map_err(|e| SyncError::Storage(e.to_string()))
    }
}

/// Observable online/offline state.
///
/// Starts online-optimistic. Detection is the host's job (the CLI probes the
/// server's health endpoint); this type only tracks the state and reports the
/// offline-to-online edge so reconciliation runs once per transition instead
/// of continuously while online.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: bool,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self { online: true }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Record the observed state; returns `true` exactly when this call moved
    /// the monitor from offline to online.
    pub fn set_online(&mut self, online: bool) -> bool {
        let came_online = online && !self.online;
        self.online = online;
        came_online
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub habit_uuid: String,
    pub date: NaiveDate,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub synced: Vec<HabitEntry>,
    pub failed: Vec<SyncFailure>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drain the offline buffer against the authoritative backend.
pub fn reconcile(db: &Database, backend: &dyn EntryBackend) -> Result<ReconcileReport> {
    reconcile_at(db, backend, Local::now().date_naive())
}

/// Like [`reconcile`], with an explicit reference day for streak recomputation.
///
/// Pending records replay strictly in append order, so the last record for
/// any (habit, day) reflects the most recent user intent. A record is removed
/// only once the backend confirms it; rejected or unreachable records stay
/// queued for the next pass and never block the records behind them. Running
/// with an empty buffer, or re-running after a partial failure, is a no-op
/// for everything already confirmed.
pub fn reconcile_at(
    db: &Database,
    backend: &dyn EntryBackend,
    today: NaiveDate,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for queued in db.get_offline_entries()? {
        let request = queued.to_new_entry();
        match backend.upsert_entry(&request) {
            Ok(confirmed) => {
                db.delete_offline_entry(queued.id)?;
                mirror_confirmed(db, &request, today)?;
                report.synced.push(confirmed);
            }
            Err(err) => {
                report.failed.push(SyncFailure {
                    habit_uuid: queued.habit_uuid,
                    date: queued.date,
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// After the server confirms a write, make the local entry store agree and
/// refresh the habit's persisted streaks.
fn mirror_confirmed(db: &Database, request: &NewEntry, today: NaiveDate) -> Result<()> {
    let Some(habit) = db.get_habit_by_uuid(&request.habit_uuid)? else {
        // The habit only exists remotely; nothing to mirror.
        return Ok(());
    };
    db.upsert_entry(habit.id, request.date, request.completed, &request.conditions_met)?;
    let entries = db.get_entries_for_habit(habit.id)?;
    let streaks = streak::compute_streaks(&entries, today);
    db.update_streaks(habit.id, streaks.current, streaks.best)?;
    Ok(())
}
