use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::db::Database;
use crate::models::{
    Habit, HabitDetail, HabitEntry, HabitStatus, NewEntry, NewHabit, UpdateHabit,
    validate_color, validate_conditions_met, validate_condition_names, validate_habit_name,
    validate_new_habit, validate_reminder_time,
};
use crate::streak::{self, StreakSummary};
use crate::sync::{self, ConnectivityMonitor, EntryBackend, ReconcileReport};

/// Outcome of a completion toggle. `queued` is true when the write could not
/// reach the server and sits in the offline buffer; the entry and streaks are
/// the optimistic local state either way.
#[derive(Debug, Serialize)]
pub struct ToggleOutcome {
    pub entry: HabitEntry,
    pub streaks: StreakSummary,
    pub queued: bool,
}

pub struct HabitService {
    db: Database,
}

impl HabitService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Habit CRUD ---

    pub fn create_habit(&self, habit: &NewHabit) -> Result<Habit> {
        validate_new_habit(habit)?;
        self.db.insert_habit(habit)
    }

    pub fn list_habits(&self) -> Result<Vec<Habit>> {
        self.db.list_habits()
    }

    pub fn get_habit_detail(&self, id: i64) -> Result<HabitDetail> {
        let habit = self.db.get_habit_by_id(id)?;
        let conditions = self.db.get_conditions(id)?;
        let entries = self.db.get_entries_for_habit(id)?;
        Ok(HabitDetail {
            habit,
            conditions,
            entries,
        })
    }

    pub fn update_habit(&self, id: i64, update: &UpdateHabit) -> Result<Habit> {
        if let Some(ref name) = update.name {
            validate_habit_name(name)?;
        }
        if let Some(ref color) = update.color {
            validate_color(color)?;
        }
        if let Some(Some(ref time)) = update.reminder_time {
            validate_reminder_time(time)?;
        }
        if let Some(ref conditions) = update.conditions {
            validate_condition_names(conditions)?;
        }
        self.db.update_habit(id, update)
    }

    pub fn delete_habit(&self, id: i64) -> Result<()> {
        self.db.delete_habit(id)
    }

    // --- Status views ---

    pub fn list_with_status(&self) -> Result<Vec<HabitStatus>> {
        self.list_with_status_at(Local::now().date_naive())
    }

    /// All habits with today's entry and live streaks. Streaks are computed
    /// against `today` rather than read from the persisted columns, so a
    /// current streak that lapsed overnight shows as lapsed.
    pub fn list_with_status_at(&self, today: NaiveDate) -> Result<Vec<HabitStatus>> {
        let mut statuses = Vec::new();
        for habit in self.db.list_habits()? {
            let conditions = self.db.get_conditions(habit.id)?;
            let entries = self.db.get_entries_for_habit(habit.id)?;
            let streaks = streak::compute_streaks(&entries, today);
            let today_entry = entries.iter().find(|e| e.date == today).cloned();
            let completed_today = today_entry.as_ref().is_some_and(|e| e.completed);
            statuses.push(HabitStatus {
                habit,
                conditions,
                today_entry,
                completed_today,
                streak_current: streaks.current,
                streak_best: streaks.best,
            });
        }
        Ok(statuses)
    }

    // --- Streaks ---

    /// Recompute the habit's streaks from its entries and persist them.
    pub fn recompute_streaks_at(&self, habit_id: i64, today: NaiveDate) -> Result<StreakSummary> {
        let entries = self.db.get_entries_for_habit(habit_id)?;
        let streaks = streak::compute_streaks(&entries, today);
        self.db
            .update_streaks(habit_id, streaks.current, streaks.best)?;
        Ok(streaks)
    }

    // --- Completion toggling ---

    pub fn toggle_completion(
        &self,
        monitor: &mut ConnectivityMonitor,
        backend: &dyn EntryBackend,
        entry: &NewEntry,
    ) -> Result<ToggleOutcome> {
        self.toggle_completion_at(monitor, backend, entry, Local::now().date_naive())
    }

    /// Record a completion toggle, routing by connectivity.
    ///
    /// Online: the write goes to the authoritative backend first, then the
    /// local store mirrors it. A transient transport failure flips the
    /// monitor offline and falls through to the offline path; a rejection
    /// (unknown habit, bad payload) surfaces immediately and is never
    /// buffered. Offline: the write is queued durably and applied locally so
    /// the user sees their intent reflected right away.
    pub fn toggle_completion_at(
        &self,
        monitor: &mut ConnectivityMonitor,
        backend: &dyn EntryBackend,
        entry: &NewEntry,
        today: NaiveDate,
    ) -> Result<ToggleOutcome> {
        let habit = self
            .db
            .get_habit_by_uuid(&entry.habit_uuid)?
            .with_context(|| format!("Habit '{}' not found", entry.habit_uuid))?;
        let conditions = self.db.get_conditions(habit.id)?;
        validate_conditions_met(&entry.conditions_met, conditions.len())?;

        if monitor.is_online() {
            match backend.upsert_entry(entry) {
                Ok(_confirmed) => {
                    let stored = self.db.upsert_entry(
                        habit.id,
                        entry.date,
                        entry.completed,
                        &entry.conditions_met,
                    )?;
                    let streaks = self.recompute_streaks_at(habit.id, today)?;
                    return Ok(ToggleOutcome {
                        entry: stored,
                        streaks,
                        queued: false,
                    });
                }
                Err(err) if err.is_transient() => {
                    monitor.set_online(false);
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.db.append_offline_entry(entry)?;
        let stored =
            self.db
                .upsert_entry(habit.id, entry.date, entry.completed, &entry.conditions_met)?;
        let streaks = self.recompute_streaks_at(habit.id, today)?;
        Ok(ToggleOutcome {
            entry: stored,
            streaks,
            queued: true,
        })
    }

    // --- Reconciliation ---

    pub fn reconcile(&self, backend: &dyn EntryBackend) -> Result<ReconcileReport> {
        sync::reconcile(&self.db, backend)
    }

    pub fn reconcile_at(
        &self,
        backend: &dyn EntryBackend,
        today: NaiveDate,
    ) -> Result<ReconcileReport> {
        sync::reconcile_at(&self.db, backend, today)
    }

    pub fn on_connectivity_change(
        &self,
        monitor: &mut ConnectivityMonitor,
        online: bool,
        backend: &dyn EntryBackend,
    ) -> Result<Option<ReconcileReport>> {
        self.on_connectivity_change_at(monitor, online, backend, Local::now().date_naive())
    }

    /// Feed an observed connectivity state through the monitor; on the
    /// offline-to-online edge (and only then) run one reconciliation pass.
    pub fn on_connectivity_change_at(
        &self,
        monitor: &mut ConnectivityMonitor,
        online: bool,
        backend: &dyn EntryBackend,
        today: NaiveDate,
    ) -> Result<Option<ReconcileReport>> {
        if monitor.set_online(online) {
            Ok(Some(self.reconcile_at(backend, today)?))
        } else {
            Ok(None)
        }
    }

    pub fn pending_sync_count(&self) -> Result<i64> {
        self.db.count_offline_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{DirectBackend, SyncError};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_habit() -> NewHabit {
        NewHabit {
            name: "Run".to_string(),
            color: "#10B981".to_string(),
            reminder_time: None,
            conditions: vec![],
        }
    }

    fn toggle_for(uuid: &str, date: NaiveDate, completed: bool) -> NewEntry {
        NewEntry {
            habit_uuid: uuid.to_string(),
            date,
            completed,
            conditions_met: vec![],
        }
    }

    /// Backend that always fails the same way.
    struct FailingBackend(fn(&NewEntry) -> SyncError);

    impl EntryBackend for FailingBackend {
        fn upsert_entry(&self, entry: &NewEntry) -> Result<HabitEntry, SyncError> {
            Err((self.0)(entry))
        }
    }

    fn unreachable_backend() -> FailingBackend {
        FailingBackend(|_| SyncError::Network("connection refused".to_string()))
    }

    #[test]
    fn test_create_and_list_with_status() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc
            .create_habit(&NewHabit {
                conditions: vec!["5k".to_string()],
                ..sample_habit()
            })
            .unwrap();
        let today = day(2024, 6, 15);

        let statuses = svc.list_with_status_at(today).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].habit.id, habit.id);
        assert_eq!(statuses[0].conditions.len(), 1);
        assert!(!statuses[0].completed_today);
        assert_eq!(statuses[0].streak_current, 0);
    }

    #[test]
    fn test_create_habit_rejects_bad_input() {
        let svc = HabitService::new_in_memory().unwrap();
        assert!(
            svc.create_habit(&NewHabit {
                name: "  ".to_string(),
                ..sample_habit()
            })
            .is_err()
        );
        assert!(
            svc.create_habit(&NewHabit {
                color: "green".to_string(),
                ..sample_habit()
            })
            .is_err()
        );
    }

    #[test]
    fn test_toggle_online_persists_and_recomputes() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc.create_habit(&sample_habit()).unwrap();
        let mut monitor = ConnectivityMonitor::new();
        let today = day(2024, 6, 15);

        let backend = DirectBackend::new(svc.db());
        let outcome = svc
            .toggle_completion_at(
                &mut monitor,
                &backend,
                &toggle_for(&habit.uuid, today, true),
                today,
            )
            .unwrap();

        assert!(!outcome.queued);
        assert!(outcome.entry.completed);
        assert_eq!(outcome.streaks.current, 1);
        assert_eq!(svc.pending_sync_count().unwrap(), 0);

        let stored = svc.db().get_habit_by_id(habit.id).unwrap();
        assert_eq!(stored.streak_current, 1);
        assert_eq!(stored.streak_best, 1);
    }

    #[test]
    fn test_toggle_unreachable_queues_and_goes_offline() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc.create_habit(&sample_habit()).unwrap();
        let mut monitor = ConnectivityMonitor::new();
        let today = day(2024, 6, 15);

        let outcome = svc
            .toggle_completion_at(
                &mut monitor,
                &unreachable_backend(),
                &toggle_for(&habit.uuid, today, true),
                today,
            )
            .unwrap();

        assert!(outcome.queued);
        assert!(!monitor.is_online());
        assert_eq!(svc.pending_sync_count().unwrap(), 1);

        // Optimistic local state is already visible.
        let entry = svc.db().get_entry_for_date(habit.id, today).unwrap().unwrap();
        assert!(entry.completed);
        assert_eq!(svc.db().get_habit_by_id(habit.id).unwrap().streak_current, 1);

        // Next toggle skips the dead backend and queues directly.
        let second = svc
            .toggle_completion_at(
                &mut monitor,
                &unreachable_backend(),
                &toggle_for(&habit.uuid, today - chrono::Duration::days(1), true),
                today,
            )
            .unwrap();
        assert!(second.queued);
        assert_eq!(svc.pending_sync_count().unwrap(), 2);
    }

    #[test]
    fn test_toggle_rejection_surfaces_without_buffering() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc.create_habit(&sample_habit()).unwrap();
        let mut monitor = ConnectivityMonitor::new();
        let today = day(2024, 6, 15);

        // The server no longer knows this habit; the failure must surface
        // and nothing may be queued or applied locally.
        let rejecting =
            FailingBackend(|entry| SyncError::NotFound(entry.habit_uuid.clone()));
        let result = svc.toggle_completion_at(
            &mut monitor,
            &rejecting,
            &toggle_for(&habit.uuid, today, true),
            today,
        );

        assert!(result.is_err());
        assert!(monitor.is_online());
        assert_eq!(svc.pending_sync_count().unwrap(), 0);
        assert!(svc.db().get_entry_for_date(habit.id, today).unwrap().is_none());
    }

    #[test]
    fn test_toggle_validates_before_routing() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc
            .create_habit(&NewHabit {
                conditions: vec!["5k".to_string()],
                ..sample_habit()
            })
            .unwrap();
        let mut monitor = ConnectivityMonitor::new();
        let today = day(2024, 6, 15);

        let mut entry = toggle_for(&habit.uuid, today, true);
        entry.conditions_met = vec![true, false];
        let result = svc.toggle_completion_at(
            &mut monitor,
            &unreachable_backend(),
            &entry,
            today,
        );

        assert!(result.is_err());
        // Malformed input is surfaced, never buffered.
        assert_eq!(svc.pending_sync_count().unwrap(), 0);

        let unknown = svc.toggle_completion_at(
            &mut monitor,
            &unreachable_backend(),
            &toggle_for("no-such-habit", today, true),
            today,
        );
        assert!(unknown.is_err());
        assert_eq!(svc.pending_sync_count().unwrap(), 0);
    }

    #[test]
    fn test_offline_round_trip_through_reconcile() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc.create_habit(&sample_habit()).unwrap();
        let mut monitor = ConnectivityMonitor::new();
        let today = day(2024, 6, 15);

        monitor.set_online(false);
        svc.toggle_completion_at(
            &mut monitor,
            &unreachable_backend(),
            &toggle_for(&habit.uuid, today, true),
            today,
        )
        .unwrap();
        assert_eq!(svc.pending_sync_count().unwrap(), 1);

        // Connectivity returns; the edge triggers exactly one pass.
        let backend = DirectBackend::new(svc.db());
        let report = svc
            .on_connectivity_change_at(&mut monitor, true, &backend, today)
            .unwrap()
            .expect("offline-to-online edge should reconcile");
        assert_eq!(report.synced.len(), 1);
        assert!(report.is_clean());
        assert_eq!(svc.pending_sync_count().unwrap(), 0);

        let entry = svc.db().get_entry_for_date(habit.id, today).unwrap().unwrap();
        assert!(entry.completed);

        // Still online: no second pass.
        let again = svc
            .on_connectivity_change_at(&mut monitor, true, &backend, today)
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_update_habit_validation() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc.create_habit(&sample_habit()).unwrap();

        assert!(
            svc.update_habit(
                habit.id,
                &UpdateHabit {
                    color: Some("nope".to_string()),
                    ..UpdateHabit::default()
                }
            )
            .is_err()
        );
        assert!(
            svc.update_habit(
                habit.id,
                &UpdateHabit {
                    reminder_time: Some(Some("25:00".to_string())),
                    ..UpdateHabit::default()
                }
            )
            .is_err()
        );

        let renamed = svc
            .update_habit(
                habit.id,
                &UpdateHabit {
                    name: Some("Evening run".to_string()),
                    ..UpdateHabit::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "Evening run");
    }

    #[test]
    fn test_delete_habit() {
        let svc = HabitService::new_in_memory().unwrap();
        let habit = svc.create_habit(&sample_habit()).unwrap();
        svc.delete_habit(habit.id).unwrap();
        assert!(svc.db().get_habit_by_id(habit.id).is_err());
        assert!(svc.list_habits().unwrap().is_empty());
    }
}
