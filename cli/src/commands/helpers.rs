use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use ritual_core::db::Database;
use ritual_core::models::{Habit, HabitEntry};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday")),
        },
    }
}

/// Find a habit by numeric ID, exact name, or unambiguous name prefix.
pub(crate) fn resolve_habit(db: &Database, selector: &str) -> Result<Habit> {
    if let Ok(id) = selector.parse::<i64>() {
        return db
            .get_habit_by_id(id)
            .with_context(|| format!("No habit with ID {id}"));
    }

    if let Some(habit) = db.get_habit_by_name(selector)? {
        return Ok(habit);
    }

    let needle = selector.to_lowercase();
    let matches: Vec<Habit> = db
        .list_habits()?
        .into_iter()
        .filter(|h| h.name.to_lowercase().starts_with(&needle))
        .collect();

    match matches.len() {
        0 => bail!("No habit matching '{selector}'. See: ritual list"),
        1 => Ok(matches.into_iter().next().unwrap()),
        _ => {
            let names: Vec<String> = matches.iter().map(|h| h.name.clone()).collect();
            bail!(
                "'{selector}' is ambiguous: {}. Use the full name or ID",
                names.join(", ")
            )
        }
    }
}

/// Parse `--met` (comma-separated 1-based condition indices, e.g. "1,3")
/// into the index-aligned flag vector the entry stores.
pub(crate) fn parse_met_flags(raw: Option<&str>, condition_count: usize) -> Result<Vec<bool>> {
    let Some(raw) = raw else {
        return Ok(vec![]);
    };
    if condition_count == 0 {
        bail!("This habit has no conditions; drop --met");
    }

    let mut flags = vec![false; condition_count];
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let index: usize = part
            .parse()
            .with_context(|| format!("Invalid condition index '{part}'"))?;
        if index < 1 || index > condition_count {
            bail!("Condition index {index} out of range (1-{condition_count})");
        }
        flags[index - 1] = true;
    }
    Ok(flags)
}

/// One character per day, oldest to newest: filled for a completed entry,
/// a dot for anything else.
pub(crate) fn activity_strip(entries: &[HabitEntry], today: NaiveDate, days: u32) -> String {
    let mut strip = String::with_capacity(days as usize);
    for offset in (0..i64::from(days)).rev() {
        let date = today - chrono::Duration::days(offset);
        let completed = entries.iter().any(|e| e.date == date && e.completed);
        strip.push(if completed { '█' } else { '·' });
    }
    strip
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
