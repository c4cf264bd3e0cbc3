use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub color: String,
    pub reminder_time: Option<String>,
    pub streak_current: i64,
    pub streak_best: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Ordered sub-criterion of a habit. `position` is the index that
/// `HabitEntry::conditions_met` aligns against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub id: i64,
    pub uuid: String,
    pub habit_id: i64,
    pub name: String,
    pub position: i64,
}

/// One completion record per (habit, calendar day).
///
/// `conditions_met[i]` refers to the condition at `position == i` as the
/// condition list stood when the entry was recorded. Editing a habit replaces
/// its condition list wholesale, so old entries can end up index-aligned to
/// different criteria than they were recorded against. Known data-integrity
/// gap; there is no persisted link from met-flag to condition identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitEntry {
    pub id: i64,
    pub uuid: String,
    pub habit_id: i64,
    pub date: NaiveDate,
    pub completed: bool,
    pub conditions_met: Vec<bool>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewHabit {
    pub name: String,
    pub color: String,
    pub reminder_time: Option<String>,
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateHabit {
    pub name: Option<String>,
    pub color: Option<String>,
    pub reminder_time: Option<Option<String>>,
    /// `Some` replaces the whole condition list, in order.
    pub conditions: Option<Vec<String>>,
}

/// An entry write as submitted to the authoritative store. Habits are
/// addressed by uuid so the same write is valid against any replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub habit_uuid: String,
    pub date: NaiveDate,
    pub completed: bool,
    pub conditions_met: Vec<bool>,
}

/// A pending entry write queued while the server was unreachable.
/// Append-only: rowid order is append order, and records are only ever
/// removed whole, once the server confirms them.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineEntry {
    pub id: i64,
    pub habit_uuid: String,
    pub date: NaiveDate,
    pub completed: bool,
    pub conditions_met: Vec<bool>,
    pub queued_at: String,
}

impl OfflineEntry {
    #[must_use]
    pub fn to_new_entry(&self) -> NewEntry {
        NewEntry {
            habit_uuid: self.habit_uuid.clone(),
            date: self.date,
            completed: self.completed,
            conditions_met: self.conditions_met.clone(),
        }
    }
}

/// Habit row plus the pieces the list view needs.
#[derive(Debug, Clone, Serialize)]
pub struct HabitStatus {
    pub habit: Habit,
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today_entry: Option<HabitEntry>,
    pub completed_today: bool,
    pub streak_current: i64,
    pub streak_best: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HabitDetail {
    pub habit: Habit,
    pub conditions: Vec<Condition>,
    pub entries: Vec<HabitEntry>,
}

pub const MAX_HABIT_NAME_LEN: usize = 50;

/// Preset display colors; the first is the default.
pub const HABIT_COLORS: &[&str] = &[
    "#10B981", "#3B82F6", "#8B5CF6", "#F59E0B", "#EF4444", "#EC4899",
];

pub fn validate_habit_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Habit name must not be empty");
    }
    if trimmed.chars().count() > MAX_HABIT_NAME_LEN {
        bail!("Habit name must be at most {MAX_HABIT_NAME_LEN} characters");
    }
    Ok(())
}

/// Display colors are `#RRGGBB` hex strings.
pub fn validate_color(color: &str) -> Result<()> {
    let rest = color
        .strip_prefix('#')
        .filter(|rest| rest.len() == 6 && rest.chars().all(|c| c.is_ascii_hexdigit()));
    if rest.is_none() {
        bail!("Invalid color '{color}'. Use #RRGGBB");
    }
    Ok(())
}

/// Reminder times are 24-hour `HH:MM` strings. Stored only; delivery is up to
/// the host platform.
pub fn validate_reminder_time(time: &str) -> Result<()> {
    let parts: Vec<&str> = time.splitn(2, ':').collect();
    let valid = parts.len() == 2
        && parts[0].len() <= 2
        && parts[1].len() == 2
        && parts[0].parse::<u8>().is_ok_and(|h| h <= 23)
        && parts[1].parse::<u8>().is_ok_and(|m| m <= 59);
    if !valid {
        bail!("Invalid reminder time '{time}'. Use HH:MM (24-hour)");
    }
    Ok(())
}

pub fn validate_condition_names(conditions: &[String]) -> Result<()> {
    for name in conditions {
        if name.trim().is_empty() {
            bail!("Condition names must not be empty");
        }
    }
    Ok(())
}

/// An entry's met-flags must be empty (nothing met) or exactly one flag per
/// condition; any other length cannot be index-aligned and is rejected.
pub fn validate_conditions_met(met: &[bool], condition_count: usize) -> Result<()> {
    if !met.is_empty() && met.len() != condition_count {
        bail!(
            "conditions_met has {} flags but the habit has {condition_count} conditions",
            met.len()
        );
    }
    Ok(())
}

pub fn validate_new_habit(habit: &NewHabit) -> Result<()> {
    validate_habit_name(&habit.name)?;
    validate_color(&habit.color)?;
    if let Some(ref time) = habit.reminder_time {
        validate_reminder_time(time)?;
    }
    validate_condition_names(&habit.conditions)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_habit_name() {
        assert!(validate_habit_name("Meditate").is_ok());
        assert!(validate_habit_name("  ").is_err());
        assert!(validate_habit_name("").is_err());
        assert!(validate_habit_name(&"x".repeat(50)).is_ok());
        assert!(validate_habit_name(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_color() {
        assert!(validate_color("#10B981").is_ok());
        assert!(validate_color("#abcdef").is_ok());
        assert!(validate_color("10B981").is_err());
        assert!(validate_color("#10B98").is_err());
        assert!(validate_color("#10B9811").is_err());
        assert!(validate_color("#10B98G").is_err());
    }

    #[test]
    fn test_validate_reminder_time() {
        assert!(validate_reminder_time("07:30").is_ok());
        assert!(validate_reminder_time("7:30").is_ok());
        assert!(validate_reminder_time("23:59").is_ok());
        assert!(validate_reminder_time("24:00").is_err());
        assert!(validate_reminder_time("12:60").is_err());
        assert!(validate_reminder_time("noon").is_err());
        assert!(validate_reminder_time("12:5").is_err());
    }

    #[test]
    fn test_validate_conditions_met_lengths() {
        assert!(validate_conditions_met(&[], 3).is_ok());
        assert!(validate_conditions_met(&[true, false, true], 3).is_ok());
        assert!(validate_conditions_met(&[true], 3).is_err());
        assert!(validate_conditions_met(&[true, false], 0).is_err());
        assert!(validate_conditions_met(&[], 0).is_ok());
    }

    #[test]
    fn test_validate_new_habit() {
        let habit = NewHabit {
            name: "Read".to_string(),
            color: "#3B82F6".to_string(),
            reminder_time: Some("21:00".to_string()),
            conditions: vec!["30 minutes".to_string()],
        };
        assert!(validate_new_habit(&habit).is_ok());

        let bad_color = NewHabit {
            color: "blue".to_string(),
            ..habit.clone()
        };
        assert!(validate_new_habit(&bad_color).is_err());

        let empty_condition = NewHabit {
            conditions: vec![String::new()],
            ..habit
        };
        assert!(validate_new_habit(&empty_condition).is_err());
    }
}
