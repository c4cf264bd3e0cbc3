use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::models::{
    Condition, Habit, HabitEntry, NewEntry, NewHabit, OfflineEntry, UpdateHabit,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS habits (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL,
                    reminder_time TEXT,
                    streak_current INTEGER NOT NULL DEFAULT 0,
                    streak_best INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS habit_conditions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    habit_id INTEGER NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    position INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS habit_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    habit_id INTEGER NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    completed INTEGER NOT NULL,
                    conditions_met TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(habit_id, date)
                );

                CREATE TABLE IF NOT EXISTS offline_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    habit_uuid TEXT NOT NULL,
                    date TEXT NOT NULL,
                    completed INTEGER NOT NULL,
                    conditions_met TEXT NOT NULL,
                    queued_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_conditions_habit ON habit_conditions(habit_id, position);
                CREATE INDEX IF NOT EXISTS idx_entries_habit_date ON habit_entries(habit_id, date);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn habit_from_row(row: &rusqlite::Row) -> rusqlite::Result<Habit> {
        Ok(Habit {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
            reminder_time: row.get(4)?,
            streak_current: row.get(5)?,
            streak_best: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn condition_from_row(row: &rusqlite::Row) -> rusqlite::Result<Condition> {
        Ok(Condition {
            id: row.get(0)?,
            uuid: row.get(1)?,
            habit_id: row.get(2)?,
            name: row.get(3)?,
            position: row.get(4)?,
        })
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<HabitEntry> {
        let date: String = row.get(3)?;
        let met_raw: String = row.get(5)?;
        Ok(HabitEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            habit_id: row.get(2)?,
            date: parse_date_col(3, &date)?,
            completed: row.get(4)?,
            conditions_met: serde_json::from_str(&met_raw).unwrap_or_default(),
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn offline_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<OfflineEntry> {
        let date: String = row.get(2)?;
        let met_raw: String = row.get(4)?;
        Ok(OfflineEntry {
            id: row.get(0)?,
            habit_uuid: row.get(1)?,
            date: parse_date_col(2, &date)?,
            completed: row.get(3)?,
            conditions_met: serde_json::from_str(&met_raw).unwrap_or_default(),
            queued_at: row.get(5)?,
        })
    }

    // --- Habits ---

    pub fn insert_habit(&self, habit: &NewHabit) -> Result<Habit> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO habits (uuid, name, color, reminder_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![uuid, habit.name.trim(), habit.color, habit.reminder_time, now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.replace_conditions(id, &habit.conditions)?;
        self.get_habit_by_id(id)
    }

    pub fn get_habit_by_id(&self, id: i64) -> Result<Habit> {
        self.conn
            .query_row(
                "SELECT id, uuid, name, color, reminder_time, streak_current, streak_best,
                        created_at, updated_at
                 FROM habits WHERE id = ?1",
                params![id],
                Self::habit_from_row,
            )
            .context("Habit not found")
    }

    pub fn get_habit_by_uuid(&self, uuid: &str) -> Result<Option<Habit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, color, reminder_time, streak_current, streak_best,
                    created_at, updated_at
             FROM habits WHERE uuid = ?1",
        )?;
        let mut rows = stmt.query(params![uuid])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::habit_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_habit_by_name(&self, name: &str) -> Result<Option<Habit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, color, reminder_time, streak_current, streak_best,
                    created_at, updated_at
             FROM habits WHERE LOWER(name) = LOWER(?1)",
        )?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::habit_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_habits(&self) -> Result<Vec<Habit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, color, reminder_time, streak_current, streak_best,
                    created_at, updated_at
             FROM habits ORDER BY created_at, id",
        )?;
        let habits = stmt
            .query_map([], Self::habit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    pub fn update_habit(&self, id: i64, update: &UpdateHabit) -> Result<Habit> {
        // Verify existence
        self.get_habit_by_id(id)?;

        let now = Local::now().to_rfc3339();
        if let Some(ref name) = update.name {
            self.conn.execute(
                "UPDATE habits SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name.trim(), now, id],
            )?;
        }
        if let Some(ref color) = update.color {
            self.conn.execute(
                "UPDATE habits SET color = ?1, updated_at = ?2 WHERE id = ?3",
                params![color, now, id],
            )?;
        }
        if let Some(ref reminder_time) = update.reminder_time {
            self.conn.execute(
                "UPDATE habits SET reminder_time = ?1, updated_at = ?2 WHERE id = ?3",
                params![reminder_time, now, id],
            )?;
        }
        if let Some(ref conditions) = update.conditions {
            self.replace_conditions(id, conditions)?;
            self.conn.execute(
                "UPDATE habits SET updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
        }

        self.get_habit_by_id(id)
    }

    pub fn delete_habit(&self, id: i64) -> Result<()> {
        self.get_habit_by_id(id)?;
        // Cascade by hand; the schema declares ON DELETE CASCADE but the
        // foreign_keys pragma is off by default in SQLite.
        self.conn.execute(
            "DELETE FROM habit_entries WHERE habit_id = ?1",
            params![id],
        )?;
        self.conn.execute(
            "DELETE FROM habit_conditions WHERE habit_id = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM habits WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn update_streaks(&self, habit_id: i64, current: i64, best: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE habits SET streak_current = ?1, streak_best = ?2 WHERE id = ?3",
            params![current, best, habit_id],
        )?;
        Ok(())
    }

    // --- Conditions ---

    fn replace_conditions(&self, habit_id: i64, names: &[String]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM habit_conditions WHERE habit_id = ?1",
            params![habit_id],
        )?;
        for (position, name) in names.iter().enumerate() {
            let uuid = Uuid::new_v4().to_string();
            self.conn.execute(
                "INSERT INTO habit_conditions (uuid, habit_id, name, position)
                 VALUES (?1, ?2, ?3, ?4)",
                params![uuid, habit_id, name.trim(), position as i64],
            )?;
        }
        Ok(())
    }

    pub fn get_conditions(&self, habit_id: i64) -> Result<Vec<Condition>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, habit_id, name, position
             FROM habit_conditions WHERE habit_id = ?1 ORDER BY position",
        )?;
        let conditions = stmt
            .query_map(params![habit_id], Self::condition_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conditions)
    }

    // --- Entries ---

    /// Write the completion record for one (habit, day). There is at most one
    /// row per pair; a write for an existing day replaces it entirely.
    pub fn upsert_entry(
        &self,
        habit_id: i64,
        date: NaiveDate,
        completed: bool,
        conditions_met: &[bool],
    ) -> Result<HabitEntry> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let date_str = date.format("%Y-%m-%d").to_string();
        let met_json = serde_json::to_string(conditions_met)?;
        self.conn.execute(
            "INSERT INTO habit_entries (uuid, habit_id, date, completed, conditions_met, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(habit_id, date) DO UPDATE SET
                 completed = excluded.completed,
                 conditions_met = excluded.conditions_met,
                 updated_at = excluded.updated_at",
            params![uuid, habit_id, date_str, completed, met_json, now, now],
        )?;
        self.get_entry_for_date(habit_id, date)?
            .context("Entry missing after upsert")
    }

    pub fn get_entry_for_date(
        &self,
        habit_id: i64,
        date: NaiveDate,
    ) -> Result<Option<HabitEntry>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, habit_id, date, completed, conditions_met, created_at, updated_at
             FROM habit_entries WHERE habit_id = ?1 AND date = ?2",
        )?;
        let mut rows = stmt.query(params![habit_id, date_str])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::entry_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_entries_for_habit(&self, habit_id: i64) -> Result<Vec<HabitEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, habit_id, date, completed, conditions_met, created_at, updated_at
             FROM habit_entries WHERE habit_id = ?1 ORDER BY date DESC",
        )?;
        let entries = stmt
            .query_map(params![habit_id], Self::entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- Offline buffer ---

    /// Append a pending write to the durable queue. Deliberately no dedup:
    /// several records for the same (habit, day) replay in append order, so
    /// the last one wins at reconciliation.
    pub fn append_offline_entry(&self, entry: &NewEntry) -> Result<OfflineEntry> {
        let now = Local::now().to_rfc3339();
        let date_str = entry.date.format("%Y-%m-%d").to_string();
        let met_json = serde_json::to_string(&entry.conditions_met)?;
        self.conn.execute(
            "INSERT INTO offline_entries (habit_uuid, date, completed, conditions_met, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entry.habit_uuid, date_str, entry.completed, met_json, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, habit_uuid, date, completed, conditions_met, queued_at
                 FROM offline_entries WHERE id = ?1",
                params![id],
                Self::offline_entry_from_row,
            )
            .context("Offline entry missing after append")
    }

    /// Pending writes, oldest first (append order).
    pub fn get_offline_entries(&self) -> Result<Vec<OfflineEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, habit_uuid, date, completed, conditions_met, queued_at
             FROM offline_entries ORDER BY id",
        )?;
        let entries = stmt
            .query_map([], Self::offline_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn delete_offline_entry(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM offline_entries WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn clear_offline_entries(&self) -> Result<()> {
        self.conn.execute("DELETE FROM offline_entries", [])?;
        Ok(())
    }

    pub fn count_offline_entries(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM offline_entries", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn parse_date_col(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_habit() -> NewHabit {
        NewHabit {
            name: "Meditate".to_string(),
            color: "#10B981".to_string(),
            reminder_time: Some("07:30".to_string()),
            conditions: vec!["10 minutes".to_string(), "No phone".to_string()],
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_insert_and_get_habit() {
        let db = Database::open_in_memory().unwrap();
        let habit = db.insert_habit(&sample_habit()).unwrap();
        assert_eq!(habit.name, "Meditate");
        assert_eq!(habit.color, "#10B981");
        assert_eq!(habit.streak_current, 0);
        assert_eq!(habit.streak_best, 0);
        assert!(!habit.uuid.is_empty());

        let conditions = db.get_conditions(habit.id).unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].name, "10 minutes");
        assert_eq!(conditions[0].position, 0);
        assert_eq!(conditions[1].position, 1);

        let by_uuid = db.get_habit_by_uuid(&habit.uuid).unwrap().unwrap();
        assert_eq!(by_uuid.id, habit.id);
        let by_name = db.get_habit_by_name("meditate").unwrap().unwrap();
        assert_eq!(by_name.id, habit.id);
    }

    #[test]
    fn test_update_habit_replaces_conditions() {
        let db = Database::open_in_memory().unwrap();
        let habit = db.insert_habit(&sample_habit()).unwrap();

        let updated = db
            .update_habit(
                habit.id,
                &UpdateHabit {
                    name: Some("Morning meditation".to_string()),
                    reminder_time: Some(None),
                    conditions: Some(vec!["20 minutes".to_string()]),
                    ..UpdateHabit::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Morning meditation");
        assert!(updated.reminder_time.is_none());

        let conditions = db.get_conditions(habit.id).unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].name, "20 minutes");
        assert_eq!(conditions[0].position, 0);
    }

    #[test]
    fn test_delete_habit_cascades() {
        let db = Database::open_in_memory().unwrap();
        let habit = db.insert_habit(&sample_habit()).unwrap();
        db.upsert_entry(habit.id, day(2024, 6, 15), true, &[true, false])
            .unwrap();

        db.delete_habit(habit.id).unwrap();
        assert!(db.get_habit_by_id(habit.id).is_err());
        assert!(db.get_conditions(habit.id).unwrap().is_empty());
        assert!(db.get_entries_for_habit(habit.id).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_entry_replaces_same_day() {
        let db = Database::open_in_memory().unwrap();
        let habit = db.insert_habit(&sample_habit()).unwrap();
        let date = day(2024, 6, 15);

        let first = db.upsert_entry(habit.id, date, true, &[true, true]).unwrap();
        let second = db.upsert_entry(habit.id, date, false, &[]).unwrap();

        assert_eq!(first.id, second.id, "same (habit, day) row must be reused");
        assert!(!second.completed);
        assert!(second.conditions_met.is_empty());

        let entries = db.get_entries_for_habit(habit.id).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_entries_ordered_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let habit = db.insert_habit(&sample_habit()).unwrap();
        db.upsert_entry(habit.id, day(2024, 6, 13), true, &[]).unwrap();
        db.upsert_entry(habit.id, day(2024, 6, 15), true, &[]).unwrap();
        db.upsert_entry(habit.id, day(2024, 6, 14), false, &[]).unwrap();

        let entries = db.get_entries_for_habit(habit.id).unwrap();
        let dates: Vec<NaiveDate> = entries.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(2024, 6, 15), day(2024, 6, 14), day(2024, 6, 13)]);
    }

    #[test]
    fn test_conditions_met_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let habit = db.insert_habit(&sample_habit()).unwrap();
        let entry = db
            .upsert_entry(habit.id, day(2024, 6, 15), true, &[true, false])
            .unwrap();
        assert_eq!(entry.conditions_met, vec![true, false]);
    }

    #[test]
    fn test_offline_buffer_append_order() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..3 {
            db.append_offline_entry(&NewEntry {
                habit_uuid: format!("habit-{i}"),
                date: day(2024, 6, 15),
                completed: true,
                conditions_met: vec![],
            })
            .unwrap();
        }

        let pending = db.get_offline_entries().unwrap();
        assert_eq!(pending.len(), 3);
        let uuids: Vec<&str> = pending.iter().map(|e| e.habit_uuid.as_str()).collect();
        assert_eq!(uuids, vec!["habit-0", "habit-1", "habit-2"]);
    }

    #[test]
    fn test_offline_buffer_no_dedup() {
        let db = Database::open_in_memory().unwrap();
        let entry = NewEntry {
            habit_uuid: "habit-1".to_string(),
            date: day(2024, 6, 15),
            completed: false,
            conditions_met: vec![],
        };
        db.append_offline_entry(&entry).unwrap();
        db.append_offline_entry(&NewEntry {
            completed: true,
            ..entry
        })
        .unwrap();

        let pending = db.get_offline_entries().unwrap();
        assert_eq!(pending.len(), 2);
        assert!(!pending[0].completed);
        assert!(pending[1].completed);
    }

    #[test]
    fn test_offline_buffer_delete_and_clear() {
        let db = Database::open_in_memory().unwrap();
        let queued = db
            .append_offline_entry(&NewEntry {
                habit_uuid: "habit-1".to_string(),
                date: day(2024, 6, 15),
                completed: true,
                conditions_met: vec![],
            })
            .unwrap();
        assert_eq!(db.count_offline_entries().unwrap(), 1);

        assert!(db.delete_offline_entry(queued.id).unwrap());
        assert!(!db.delete_offline_entry(queued.id).unwrap());
        assert_eq!(db.count_offline_entries().unwrap(), 0);

        db.append_offline_entry(&NewEntry {
            habit_uuid: "habit-2".to_string(),
            date: day(2024, 6, 15),
            completed: true,
            conditions_met: vec![],
        })
        .unwrap();
        db.clear_offline_entries().unwrap();
        assert_eq!(db.count_offline_entries().unwrap(), 0);
    }

    #[test]
    fn test_offline_buffer_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ritual.db");
        {
            let db = Database::open(&path).unwrap();
            db.append_offline_entry(&NewEntry {
                habit_uuid: "habit-1".to_string(),
                date: day(2024, 6, 15),
                completed: true,
                conditions_met: vec![true],
            })
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let pending = db.get_offline_entries().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].habit_uuid, "habit-1");
        assert_eq!(pending[0].conditions_met, vec![true]);
    }
}
